//! Analysis phase verdict payload: platform detection, file discovery,
//! and migration readiness.

use super::{
    ArtifactCheck, FieldViolation, VerdictPayload, parse_percent, require_non_empty,
    require_percent, require_text,
};
use crate::context::Platform;
use crate::roster::PhaseKind;
use serde::{Deserialize, Serialize};

/// Coded blocking issues the Analysis manager may declare when hard
/// terminating.
pub mod blocking {
    pub const NO_YAML_FILES: &str = "NO_YAML_FILES";
    pub const NO_KUBERNETES_CONTENT: &str = "NO_KUBERNETES_CONTENT";
    pub const ALL_CORRUPTED: &str = "ALL_CORRUPTED";
    pub const SECURITY_POLICY_VIOLATION: &str = "SECURITY_POLICY_VIOLATION";
    pub const RAI_POLICY_VIOLATION: &str = "RAI_POLICY_VIOLATION";
    pub const NOT_EKS_GKE_PLATFORM: &str = "NOT_EKS_GKE_PLATFORM";
    pub const PLATFORM_DETECTION_AMBIGUOUS: &str = "PLATFORM_DETECTION_AMBIGUOUS";

    /// All codes the manager is allowed to emit, in prompt order.
    pub const ALL: &[&str] = &[
        NO_YAML_FILES,
        NO_KUBERNETES_CONTENT,
        ALL_CORRUPTED,
        SECURITY_POLICY_VIOLATION,
        RAI_POLICY_VIOLATION,
        NOT_EKS_GKE_PLATFORM,
        PLATFORM_DETECTION_AMBIGUOUS,
    ];
}

/// Source platform conclusion, including the honest "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectedPlatform {
    #[serde(rename = "EKS")]
    Eks,
    #[serde(rename = "GKE")]
    Gke,
    #[serde(rename = "none")]
    None,
}

impl DetectedPlatform {
    pub fn platform(&self) -> Option<Platform> {
        match self {
            Self::Eks => Some(Platform::Eks),
            Self::Gke => Some(Platform::Gke),
            Self::None => None,
        }
    }
}

/// One source file catalogued during discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveredFile {
    pub filename: String,
    /// Kubernetes kind (Deployment, Service, Ingress, ...).
    pub kind: String,
    pub complexity: String,
    pub azure_mapping: String,
}

/// Severity assessment for one migration dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DimensionSeverity {
    pub severity: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplexityAnalysis {
    pub network: DimensionSeverity,
    pub security: DimensionSeverity,
    pub storage: DimensionSeverity,
    pub compute: DimensionSeverity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationReadiness {
    pub overall_score: String,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// Payload of a successful Analysis termination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisOutput {
    pub platform_detected: DetectedPlatform,
    /// Percentage string, e.g. "92%".
    pub confidence_score: String,
    pub files_discovered: Vec<DiscoveredFile>,
    pub complexity_analysis: ComplexityAnalysis,
    pub migration_readiness: MigrationReadiness,
    #[serde(default)]
    pub expert_insights: Vec<String>,
    /// Report written to the output folder.
    pub analysis_file: String,
}

impl AnalysisOutput {
    /// Detection confidence as a number, when parseable.
    pub fn confidence(&self) -> Option<f64> {
        parse_percent(&self.confidence_score)
    }
}

impl VerdictPayload for AnalysisOutput {
    fn phase() -> PhaseKind {
        PhaseKind::Analysis
    }

    fn schema_name() -> &'static str {
        "AnalysisVerdict"
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        if self.platform_detected == DetectedPlatform::None {
            violations.push(FieldViolation::new(
                "platform_detected",
                "success requires a concluded platform; 'none' must hard-terminate instead",
            ));
        }
        require_percent("confidence_score", &self.confidence_score, &mut violations);
        require_non_empty("files_discovered", &self.files_discovered, &mut violations);
        for (index, file) in self.files_discovered.iter().enumerate() {
            require_text(
                &format!("files_discovered[{index}].filename"),
                &file.filename,
                &mut violations,
            );
            require_text(
                &format!("files_discovered[{index}].kind"),
                &file.kind,
                &mut violations,
            );
        }
        for (dimension, severity) in [
            ("network", &self.complexity_analysis.network),
            ("security", &self.complexity_analysis.security),
            ("storage", &self.complexity_analysis.storage),
            ("compute", &self.complexity_analysis.compute),
        ] {
            require_text(
                &format!("complexity_analysis.{dimension}.severity"),
                &severity.severity,
                &mut violations,
            );
        }
        require_text(
            "migration_readiness.overall_score",
            &self.migration_readiness.overall_score,
            &mut violations,
        );
        require_text("analysis_file", &self.analysis_file, &mut violations);

        violations
    }

    fn artifact_checks(&self) -> Vec<ArtifactCheck> {
        vec![ArtifactCheck::report(&self.analysis_file)]
    }

    fn progress_artifacts(&self) -> Vec<String> {
        self.files_discovered
            .iter()
            .map(|f| f.filename.clone())
            .collect()
    }
}
