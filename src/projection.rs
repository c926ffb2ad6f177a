//! Read-only projection of a finished run into the structures
//! downstream UIs and dashboards consume. Cannot affect the pipeline
//! outcome.

use crate::context::ProcessContext;
use crate::roster::PhaseKind;
use crate::runner::{PhaseResult, PhaseState};
use crate::verdict::ConversionStatus;
use serde::{Deserialize, Serialize};

/// A file the conversion could not produce, with a hint for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub file_name: String,
    pub remediation_hint: String,
}

/// A downloadable report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFile {
    pub file_name: String,
    /// Folder holding the artifact, for download references.
    pub folder: String,
}

/// Source, converted, failed, and report files of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub source_files: Vec<String>,
    pub converted_files: Vec<String>,
    pub failed_files: Vec<FailedFile>,
    pub report_files: Vec<ReportFile>,
}

/// One row of the per-step progress table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub step: PhaseKind,
    pub status: String,
    pub rounds: u32,
    pub duration_secs: Option<f64>,
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub completion_percent: f64,
    pub source_file_count: usize,
    pub converted_file_count: usize,
    pub failed_file_count: usize,
    pub status_summary: String,
    pub steps: Vec<StepProgress>,
}

/// Build the file manifest from the final context.
pub fn build_file_manifest(ctx: &ProcessContext) -> FileManifest {
    let mut manifest = FileManifest::default();

    if let Some(analysis) = &ctx.analysis_result {
        manifest.source_files = analysis
            .files_discovered
            .iter()
            .map(|f| f.filename.clone())
            .collect();
        manifest.report_files.push(ReportFile {
            file_name: analysis.analysis_file.clone(),
            folder: ctx.output_file_folder.clone(),
        });
    }

    if let Some(design) = &ctx.design_result {
        for artifact in &design.outputs {
            manifest.report_files.push(ReportFile {
                file_name: artifact.file.clone(),
                folder: ctx.output_file_folder.clone(),
            });
        }
    }

    if let Some(yaml) = &ctx.yaml_result {
        for file in &yaml.converted_files {
            match file.conversion_status {
                ConversionStatus::Failed => manifest.failed_files.push(FailedFile {
                    file_name: file.source_file.clone(),
                    remediation_hint: file
                        .concerns
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "review the conversion report".to_string()),
                }),
                _ => manifest.converted_files.push(file.converted_file.clone()),
            }
        }
        manifest.report_files.push(ReportFile {
            file_name: yaml.conversion_report_file.clone(),
            folder: ctx.output_file_folder.clone(),
        });
    }

    if let Some(documentation) = &ctx.documentation_result {
        for file in &documentation.generated_files.documentation {
            manifest.report_files.push(ReportFile {
                file_name: file.file_name.clone(),
                folder: ctx.output_file_folder.clone(),
            });
        }
    }

    manifest.report_files.dedup();
    manifest
}

/// Per-step progress rows for dashboards and the run report.
pub fn build_step_progress(states: &[PhaseState]) -> Vec<StepProgress> {
    states
        .iter()
        .map(|state| StepProgress {
            step: state.kind,
            status: match state.result {
                PhaseResult::NotStarted => "not started",
                PhaseResult::Succeeded => "succeeded",
                PhaseResult::Failed => "failed",
            }
            .to_string(),
            rounds: state.rounds_completed,
            duration_secs: state.total_execution_duration().map(|d| d.as_secs_f64()),
        })
        .collect()
}

/// Build the dashboard metrics from the manifest and phase states.
pub fn build_dashboard_metrics(manifest: &FileManifest, states: &[PhaseState]) -> DashboardMetrics {
    let completed = states
        .iter()
        .filter(|s| s.result == PhaseResult::Succeeded)
        .count();
    let completion_percent = if states.is_empty() {
        0.0
    } else {
        completed as f64 / states.len() as f64 * 100.0
    };

    let status_summary = if states.is_empty() {
        "no phases executed".to_string()
    } else if completed == states.len() {
        format!("{completed}/{} phases completed", states.len())
    } else {
        let failed: Vec<_> = states
            .iter()
            .filter(|s| s.result == PhaseResult::Failed)
            .map(|s| s.name.clone())
            .collect();
        format!(
            "{completed}/{} phases completed; failed: {}",
            states.len(),
            failed.join(", ")
        )
    };

    DashboardMetrics {
        completion_percent,
        source_file_count: manifest.source_files.len(),
        converted_file_count: manifest.converted_files.len(),
        failed_file_count: manifest.failed_files.len(),
        status_summary,
        steps: build_step_progress(states),
    }
}
