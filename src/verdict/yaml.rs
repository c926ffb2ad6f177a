//! YAML conversion phase verdict payload: per-file conversion records
//! and the four-dimension conversion assessment.

use super::{
    ArtifactCheck, FieldViolation, VerdictPayload, require_non_empty, require_percent,
    require_text,
};
use crate::roster::PhaseKind;
use crate::storage::CONVERTED_FILE_PREFIX;
use serde::{Deserialize, Serialize};

/// Per-file conversion outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionStatus {
    Success,
    Partial,
    Failed,
}

/// One converted manifest with its conversion metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConvertedFile {
    pub source_file: String,
    pub converted_file: String,
    pub conversion_status: ConversionStatus,
    /// Percentage string, e.g. "95%".
    pub accuracy_rating: String,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub azure_enhancements: Vec<String>,
    /// deployment, service, configmap, ...
    pub file_type: String,
}

/// Assessment of one conversion dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DimensionalAnalysis {
    pub complexity: String,
    #[serde(default)]
    pub converted_components: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    /// Percentage string.
    pub success_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiDimensionalAnalysis {
    pub network: DimensionalAnalysis,
    pub security: DimensionalAnalysis,
    pub storage: DimensionalAnalysis,
    pub compute: DimensionalAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionMetrics {
    pub total_files: u32,
    pub successful_conversions: u32,
    pub failed_conversions: u32,
    /// Percentage string.
    pub overall_accuracy: String,
    pub azure_compatibility: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionQuality {
    pub azure_best_practices: String,
    pub security_hardening: String,
    pub performance_optimization: String,
    pub production_readiness: String,
}

/// Payload of a YAML conversion termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlOutput {
    pub converted_files: Vec<ConvertedFile>,
    pub multi_dimensional_analysis: MultiDimensionalAnalysis,
    pub overall_conversion_metrics: ConversionMetrics,
    pub conversion_quality: ConversionQuality,
    #[serde(default)]
    pub expert_insights: Vec<String>,
    /// Report written to the output folder.
    pub conversion_report_file: String,
}

impl YamlOutput {
    pub fn successful_files(&self) -> impl Iterator<Item = &ConvertedFile> {
        self.converted_files
            .iter()
            .filter(|f| f.conversion_status != ConversionStatus::Failed)
    }
}

impl VerdictPayload for YamlOutput {
    fn phase() -> PhaseKind {
        PhaseKind::Yaml
    }

    fn schema_name() -> &'static str {
        "YamlVerdict"
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        require_non_empty("converted_files", &self.converted_files, &mut violations);
        for (index, file) in self.converted_files.iter().enumerate() {
            require_text(
                &format!("converted_files[{index}].source_file"),
                &file.source_file,
                &mut violations,
            );
            require_text(
                &format!("converted_files[{index}].file_type"),
                &file.file_type,
                &mut violations,
            );
            require_percent(
                &format!("converted_files[{index}].accuracy_rating"),
                &file.accuracy_rating,
                &mut violations,
            );
            if file.conversion_status != ConversionStatus::Failed
                && !file.converted_file.starts_with(CONVERTED_FILE_PREFIX)
            {
                violations.push(FieldViolation::new(
                    format!("converted_files[{index}].converted_file"),
                    format!(
                        "converted manifests must carry the '{CONVERTED_FILE_PREFIX}' prefix, got '{}'",
                        file.converted_file
                    ),
                ));
            }
        }

        let metrics = &self.overall_conversion_metrics;
        if metrics.total_files as usize != self.converted_files.len() {
            violations.push(FieldViolation::new(
                "overall_conversion_metrics.total_files",
                format!(
                    "reports {} files but {} conversion records exist",
                    metrics.total_files,
                    self.converted_files.len()
                ),
            ));
        }
        if metrics.successful_conversions + metrics.failed_conversions > metrics.total_files {
            violations.push(FieldViolation::new(
                "overall_conversion_metrics",
                "successful + failed exceeds total_files",
            ));
        }
        require_percent(
            "overall_conversion_metrics.overall_accuracy",
            &metrics.overall_accuracy,
            &mut violations,
        );

        for (dimension, analysis) in [
            ("network", &self.multi_dimensional_analysis.network),
            ("security", &self.multi_dimensional_analysis.security),
            ("storage", &self.multi_dimensional_analysis.storage),
            ("compute", &self.multi_dimensional_analysis.compute),
        ] {
            require_text(
                &format!("multi_dimensional_analysis.{dimension}.complexity"),
                &analysis.complexity,
                &mut violations,
            );
            require_percent(
                &format!("multi_dimensional_analysis.{dimension}.success_rate"),
                &analysis.success_rate,
                &mut violations,
            );
        }

        for (field, value) in [
            (
                "conversion_quality.azure_best_practices",
                &self.conversion_quality.azure_best_practices,
            ),
            (
                "conversion_quality.security_hardening",
                &self.conversion_quality.security_hardening,
            ),
            (
                "conversion_quality.performance_optimization",
                &self.conversion_quality.performance_optimization,
            ),
            (
                "conversion_quality.production_readiness",
                &self.conversion_quality.production_readiness,
            ),
        ] {
            require_text(field, value, &mut violations);
        }
        require_text(
            "conversion_report_file",
            &self.conversion_report_file,
            &mut violations,
        );

        violations
    }

    fn artifact_checks(&self) -> Vec<ArtifactCheck> {
        let mut checks = vec![ArtifactCheck::report(&self.conversion_report_file)];
        for file in self.successful_files() {
            checks.push(ArtifactCheck::converted_manifest(&file.converted_file));
        }
        checks
    }

    fn progress_artifacts(&self) -> Vec<String> {
        self.converted_files
            .iter()
            .map(|f| f.converted_file.clone())
            .collect()
    }
}
