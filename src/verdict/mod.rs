//! Structured termination protocol: verdict envelope, per-phase payload
//! schemas, and the validation rules applied before a phase may claim
//! success.
//!
//! Every schema rejects unknown fields; the manager's JSON is re-parsed
//! strictly rather than trusted.

mod analysis;
mod design;
mod documentation;
pub mod quality;
mod yaml;

pub use analysis::{
    AnalysisOutput, ComplexityAnalysis, DetectedPlatform, DimensionSeverity, DiscoveredFile,
    MigrationReadiness, blocking,
};
pub use design::{DesignArtifact, DesignOutput};
pub use documentation::{
    AggregatedResults, DocumentationOutput, ExpertCollaboration, GeneratedFile, GeneratedFiles,
    ProcessMetrics,
};
pub use yaml::{
    ConversionMetrics, ConversionQuality, ConversionStatus, ConvertedFile, DimensionalAnalysis,
    MultiDimensionalAnalysis, YamlOutput,
};

// Valid-payload builders shared by tests across the crate.
#[cfg(test)]
pub(crate) use analysis::tests::valid_output as analysis_fixture;
#[cfg(test)]
pub(crate) use design::tests::valid_output as design_fixture;
#[cfg(test)]
pub(crate) use documentation::tests::valid_output as documentation_fixture;
#[cfg(test)]
pub(crate) use yaml::tests::valid_output as yaml_fixture;

use crate::roster::PhaseKind;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// How a phase conversation ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationType {
    /// All required fields populated and artifacts verified.
    #[default]
    SoftCompletion,
    /// A declared blocking condition holds; permanent for this run.
    HardBlocked,
    /// Infrastructure-level failure raised by the runner.
    HardError,
    /// Round budget or wall clock exhausted.
    HardTimeout,
}

impl TerminationType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SoftCompletion => "soft_completion",
            Self::HardBlocked => "hard_blocked",
            Self::HardError => "hard_error",
            Self::HardTimeout => "hard_timeout",
        }
    }
}

/// The structured output of a phase's manager at termination time.
///
/// `result == false` with `is_hard_terminated == false` means "keep
/// talking"; the manager returns a fully-shaped verdict either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseVerdict<T> {
    pub result: bool,
    pub reason: String,
    #[serde(default)]
    pub is_hard_terminated: bool,
    #[serde(default)]
    pub termination_type: TerminationType,
    #[serde(default)]
    pub blocking_issues: Vec<String>,
    #[serde(default = "Option::default")]
    pub termination_output: Option<T>,
}

impl<T> PhaseVerdict<T> {
    /// A continue decision: the conversation is not done.
    pub fn continue_with(reason: impl Into<String>) -> Self {
        Self {
            result: false,
            reason: reason.into(),
            is_hard_terminated: false,
            termination_type: TerminationType::SoftCompletion,
            blocking_issues: Vec::new(),
            termination_output: None,
        }
    }

    /// A runner-synthesized infrastructure failure verdict.
    pub fn hard_error(reason: impl Into<String>) -> Self {
        Self {
            result: false,
            reason: reason.into(),
            is_hard_terminated: true,
            termination_type: TerminationType::HardError,
            blocking_issues: Vec::new(),
            termination_output: None,
        }
    }

    /// Whether the manager asked to keep the conversation going.
    pub fn is_continue(&self) -> bool {
        !self.result && !self.is_hard_terminated
    }
}

/// One schema-validation deficiency, named so diagnostics can list the
/// exact fields that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub problem: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.problem)
    }
}

/// An artifact the verdict promises to have written to the output
/// folder, cross-checked against the blob workspace after termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCheck {
    pub file_name: String,
    /// Converted manifests must begin with the AI-content header.
    pub requires_ai_header: bool,
}

impl ArtifactCheck {
    pub fn report(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            requires_ai_header: false,
        }
    }

    pub fn converted_manifest(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            requires_ai_header: true,
        }
    }
}

/// Phase-specific verdict payload: schema, content validation, promised
/// artifacts, and the texts subject to the reasoning-quality scan.
pub trait VerdictPayload:
    DeserializeOwned + Serialize + Clone + std::fmt::Debug + Send + Sync + 'static
{
    fn phase() -> PhaseKind;

    /// Schema name passed to the LLM as `response_format`.
    fn schema_name() -> &'static str;

    /// Content validation beyond what the type system enforces.
    fn validate(&self) -> Vec<FieldViolation>;

    /// Artifacts that must exist in the output folder.
    fn artifact_checks(&self) -> Vec<ArtifactCheck>;

    /// Reasoning texts subject to the evidence/hallucination scan.
    fn reasoning_fields(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Short artifact strings recorded on the phase state for progress
    /// reporting.
    fn progress_artifacts(&self) -> Vec<String>;
}

/// Strings a success verdict must never use for required fields.
pub const PLACEHOLDER_SENTINELS: &[&str] = &[
    "tbd",
    "todo",
    "template",
    "example",
    "placeholder",
    "n/a",
    "xxx",
];

/// Hard-block codes that request prompt requeue by the outer system
/// instead of exponential backoff. Everything else is permanent.
pub const IMMEDIATE_RETRY_CODES: &[&str] = &["PLATFORM_DETECTION_AMBIGUOUS"];

/// Whether any of the given blocking codes requests an immediate retry.
pub fn requests_immediate_retry(blocking_issues: &[String]) -> bool {
    blocking_issues
        .iter()
        .any(|code| IMMEDIATE_RETRY_CODES.contains(&code.as_str()))
}

/// Parse a free-form percentage string ("95%", "95", "95.5 %").
pub fn parse_percent(text: &str) -> Option<f64> {
    let trimmed = text.trim().trim_end_matches('%').trim();
    trimmed.parse::<f64>().ok().filter(|v| (0.0..=100.0).contains(v))
}

pub(crate) fn require_text(field: &str, value: &str, out: &mut Vec<FieldViolation>) {
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        out.push(FieldViolation::new(field, "must not be empty"));
    } else if PLACEHOLDER_SENTINELS.contains(&normalized.as_str()) {
        out.push(FieldViolation::new(
            field,
            format!("placeholder value '{value}' is not a real measurement"),
        ));
    }
}

pub(crate) fn require_non_empty<T>(field: &str, values: &[T], out: &mut Vec<FieldViolation>) {
    if values.is_empty() {
        out.push(FieldViolation::new(
            field,
            "must contain at least one entry",
        ));
    }
}

pub(crate) fn require_percent(field: &str, value: &str, out: &mut Vec<FieldViolation>) {
    if parse_percent(value).is_none() {
        out.push(FieldViolation::new(
            field,
            format!("'{value}' is not a percentage"),
        ));
    }
}
