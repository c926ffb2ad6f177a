//! Documentation phase verdict payload: aggregated results and the
//! categorised collection of files produced across the whole run.

use super::{
    ArtifactCheck, ConvertedFile, FieldViolation, VerdictPayload, require_non_empty,
    require_percent, require_text,
};
use crate::roster::PhaseKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregatedResults {
    pub total_files_analyzed: String,
    pub total_files_converted: String,
    pub overall_migration_complexity: String,
    pub overall_success_metrics: String,
    #[serde(default)]
    pub executive_summary: String,
    #[serde(default)]
    pub total_files_processed: u32,
    #[serde(default)]
    pub overall_success_rate: String,
}

/// A file produced during one of the phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedFile {
    pub file_name: String,
    pub file_type: String,
    pub content_summary: String,
}

/// All generated files, categorised by producing phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedFiles {
    #[serde(default)]
    pub analysis: Vec<GeneratedFile>,
    #[serde(default)]
    pub design: Vec<GeneratedFile>,
    #[serde(default)]
    pub yaml: Vec<ConvertedFile>,
    #[serde(default)]
    pub documentation: Vec<GeneratedFile>,
}

impl GeneratedFiles {
    /// Derived, never hardcoded.
    pub fn total(&self) -> usize {
        self.analysis.len() + self.design.len() + self.yaml.len() + self.documentation.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpertCollaboration {
    pub participating_experts: Vec<String>,
    pub consensus_achieved: bool,
    #[serde(default)]
    pub expert_insights: Vec<String>,
    #[serde(default)]
    pub quality_validation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessMetrics {
    pub phases_completed: u32,
    pub total_files_processed: u32,
    /// Percentage string.
    pub overall_success_rate: String,
}

/// Payload of a Documentation termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentationOutput {
    pub aggregated_results: AggregatedResults,
    pub generated_files: GeneratedFiles,
    pub expert_collaboration: ExpertCollaboration,
    pub process_metrics: ProcessMetrics,
}

impl VerdictPayload for DocumentationOutput {
    fn phase() -> PhaseKind {
        PhaseKind::Documentation
    }

    fn schema_name() -> &'static str {
        "DocumentationVerdict"
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        require_text(
            "aggregated_results.total_files_analyzed",
            &self.aggregated_results.total_files_analyzed,
            &mut violations,
        );
        require_text(
            "aggregated_results.overall_migration_complexity",
            &self.aggregated_results.overall_migration_complexity,
            &mut violations,
        );
        require_text(
            "aggregated_results.overall_success_metrics",
            &self.aggregated_results.overall_success_metrics,
            &mut violations,
        );
        require_non_empty(
            "generated_files.documentation",
            &self.generated_files.documentation,
            &mut violations,
        );
        for (index, file) in self.generated_files.documentation.iter().enumerate() {
            require_text(
                &format!("generated_files.documentation[{index}].file_name"),
                &file.file_name,
                &mut violations,
            );
        }
        require_non_empty(
            "expert_collaboration.participating_experts",
            &self.expert_collaboration.participating_experts,
            &mut violations,
        );
        require_percent(
            "process_metrics.overall_success_rate",
            &self.process_metrics.overall_success_rate,
            &mut violations,
        );
        if self.process_metrics.phases_completed == 0 || self.process_metrics.phases_completed > 4 {
            violations.push(FieldViolation::new(
                "process_metrics.phases_completed",
                format!(
                    "{} is not a real phase count",
                    self.process_metrics.phases_completed
                ),
            ));
        }

        violations
    }

    fn artifact_checks(&self) -> Vec<ArtifactCheck> {
        let report = PhaseKind::Documentation.report_artifact();
        let mut checks = vec![ArtifactCheck::report(report)];
        for file in &self.generated_files.documentation {
            if file.file_name != report {
                checks.push(ArtifactCheck::report(&file.file_name));
            }
        }
        checks
    }

    fn progress_artifacts(&self) -> Vec<String> {
        self.generated_files
            .documentation
            .iter()
            .map(|f| f.file_name.clone())
            .collect()
    }
}
