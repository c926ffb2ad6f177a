//! Process context: the evolving bundle threaded through the pipeline.
//!
//! The driver is the only writer between phases; within a phase the
//! context is read-only. A phase may only read results produced by
//! strictly earlier phases.

use crate::verdict::{AnalysisOutput, DesignOutput, DocumentationOutput, YamlOutput};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source platform concluded by the Analysis phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "EKS")]
    Eks,
    #[serde(rename = "GKE")]
    Gke,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Eks => "EKS",
            Self::Gke => "GKE",
        }
    }
}

/// The migration request handed to the pipeline entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub process_id: String,
    pub container_name: String,
    pub source_file_folder: String,
    pub workspace_file_folder: String,
    pub output_file_folder: String,
}

impl MigrationRequest {
    /// Request with a generated process id, for callers that do not
    /// bring their own.
    pub fn with_generated_id(
        container_name: &str,
        source_file_folder: &str,
        workspace_file_folder: &str,
        output_file_folder: &str,
    ) -> Self {
        Self {
            process_id: Uuid::new_v4().to_string(),
            container_name: container_name.to_string(),
            source_file_folder: source_file_folder.to_string(),
            workspace_file_folder: workspace_file_folder.to_string(),
            output_file_folder: output_file_folder.to_string(),
        }
    }
}

/// Evolving bundle passed into each phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessContext {
    pub process_id: String,
    pub user_id: String,
    pub container_name: String,
    pub source_file_folder: String,
    pub workspace_file_folder: String,
    pub output_file_folder: String,

    pub analysis_result: Option<AnalysisOutput>,
    pub design_result: Option<DesignOutput>,
    pub yaml_result: Option<YamlOutput>,
    pub documentation_result: Option<DocumentationOutput>,
}

impl ProcessContext {
    pub fn new(user_id: &str, request: &MigrationRequest) -> Self {
        Self {
            process_id: request.process_id.clone(),
            user_id: user_id.to_string(),
            container_name: request.container_name.clone(),
            source_file_folder: request.source_file_folder.clone(),
            workspace_file_folder: request.workspace_file_folder.clone(),
            output_file_folder: request.output_file_folder.clone(),
            analysis_result: None,
            design_result: None,
            yaml_result: None,
            documentation_result: None,
        }
    }

    /// Platform concluded by Analysis, once available.
    pub fn detected_platform(&self) -> Option<Platform> {
        self.analysis_result
            .as_ref()
            .and_then(|a| a.platform_detected.platform())
    }
}
