//! Design phase verdict payload: Azure target architecture.

use super::{
    ArtifactCheck, FieldViolation, VerdictPayload, require_non_empty, require_text,
};
use crate::roster::PhaseKind;
use serde::{Deserialize, Serialize};

/// One design document promised in the output folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignArtifact {
    pub file: String,
    pub description: String,
}

/// Payload of a Design termination.
///
/// A partial design is acceptable only when it says so: empty
/// `azure_services` or `architecture_decisions` without an explicit
/// `incomplete_reason` is a validation failure, not an honest partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesignOutput {
    pub summary: String,
    #[serde(default)]
    pub azure_services: Vec<String>,
    #[serde(default)]
    pub architecture_decisions: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<DesignArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_information: Option<String>,
}

impl DesignOutput {
    pub fn is_partial(&self) -> bool {
        self.incomplete_reason.is_some()
    }
}

impl VerdictPayload for DesignOutput {
    fn phase() -> PhaseKind {
        PhaseKind::Design
    }

    fn schema_name() -> &'static str {
        "DesignVerdict"
    }

    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        require_text("summary", &self.summary, &mut violations);

        if !self.is_partial() {
            require_non_empty("azure_services", &self.azure_services, &mut violations);
            require_non_empty(
                "architecture_decisions",
                &self.architecture_decisions,
                &mut violations,
            );
            require_non_empty("outputs", &self.outputs, &mut violations);
        }
        for (index, artifact) in self.outputs.iter().enumerate() {
            require_text(
                &format!("outputs[{index}].file"),
                &artifact.file,
                &mut violations,
            );
        }

        violations
    }

    fn artifact_checks(&self) -> Vec<ArtifactCheck> {
        let mut checks = vec![ArtifactCheck::report(PhaseKind::Design.report_artifact())];
        for artifact in &self.outputs {
            if artifact.file != PhaseKind::Design.report_artifact() {
                checks.push(ArtifactCheck::report(&artifact.file));
            }
        }
        checks
    }

    fn reasoning_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if let Some(reason) = &self.incomplete_reason {
            fields.push(("incomplete_reason", reason.clone()));
        }
        if let Some(missing) = &self.missing_information {
            fields.push(("missing_information", missing.clone()));
        }
        fields
    }

    fn progress_artifacts(&self) -> Vec<String> {
        self.architecture_decisions.clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn valid_output() -> DesignOutput {
        DesignOutput {
            summary: "AKS with Application Gateway ingress and managed identity".to_string(),
            azure_services: vec!["AKS".to_string(), "Application Gateway".to_string()],
            architecture_decisions: vec![
                "Replace ALB ingress class with AGIC annotations".to_string(),
            ],
            outputs: vec![DesignArtifact {
                file: "design_result.md".to_string(),
                description: "Target architecture".to_string(),
            }],
            incomplete_reason: None,
            missing_information: None,
        }
    }

    #[test]
    fn valid_payload_passes() {
        assert!(valid_output().validate().is_empty());
    }

    #[test]
    fn empty_services_without_reason_fails() {
        let mut output = valid_output();
        output.azure_services.clear();
        assert!(
            output
                .validate()
                .iter()
                .any(|v| v.field == "azure_services")
        );
    }

    #[test]
    fn empty_services_with_incomplete_reason_passes() {
        let mut output = valid_output();
        output.azure_services.clear();
        output.architecture_decisions.clear();
        output.incomplete_reason =
            Some("check_blob_exists('analysis_result.md') returned: false".to_string());
        assert!(output.validate().is_empty());
    }

    #[test]
    fn placeholder_summary_fails() {
        let mut output = valid_output();
        output.summary = "TODO".to_string();
        assert!(output.validate().iter().any(|v| v.field == "summary"));
    }

    #[test]
    fn artifact_checks_include_report_and_outputs() {
        let mut output = valid_output();
        output.outputs.push(DesignArtifact {
            file: "network_topology.md".to_string(),
            description: "Network layout".to_string(),
        });
        let files: Vec<_> = output
            .artifact_checks()
            .into_iter()
            .map(|c| c.file_name)
            .collect();
        assert_eq!(files, vec!["design_result.md", "network_topology.md"]);
    }

    #[test]
    fn reasoning_fields_expose_partial_explanations() {
        let mut output = valid_output();
        output.incomplete_reason = Some("insufficient details".to_string());
        output.missing_information = Some("storage classes".to_string());
        let fields = output.reasoning_fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "incomplete_reason");
    }
}
