//! Run report: operator-facing markdown summary of a finished run,
//! written to the transient workspace folder and mirrored to telemetry.
//!
//! Distinct from `migration_report.md` (the Documentation phase's user
//! deliverable): this one records how the pipeline itself behaved, and
//! is produced on failure paths too.

use crate::clock::Clock;
use crate::context::ProcessContext;
use crate::projection::build_step_progress;
use crate::runner::{PhaseResult, PhaseState};
use crate::storage::BlobStore;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use tracing::warn;

/// File name of the operational run report in the workspace folder.
pub const RUN_REPORT_FILE: &str = "run_report.md";

fn phase_table(states: &[PhaseState]) -> String {
    let mut table = String::from("| Step | Status | Rounds | Duration |\n|---|---|---|---|\n");
    for row in build_step_progress(states) {
        let duration = row
            .duration_secs
            .map(|d| format!("{d:.2}s"))
            .unwrap_or_else(|| "-".to_string());
        table.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            row.step.name(),
            row.status,
            row.rounds,
            duration
        ));
    }
    table
}

/// Markdown report for a completed run.
pub fn build_success_report(
    ctx: &ProcessContext,
    states: &[PhaseState],
    execution_time_secs: f64,
    clock: &dyn Clock,
) -> String {
    let converted = ctx
        .yaml_result
        .as_ref()
        .map(|y| y.converted_files.len())
        .unwrap_or(0);
    let platform = ctx
        .detected_platform()
        .map(|p| p.name())
        .unwrap_or("unknown");

    format!(
        "# Migration run report\n\n\
         - Process: {process_id}\n\
         - Completed: {timestamp}\n\
         - Source platform: {platform}\n\
         - Converted manifests: {converted}\n\
         - Total execution time: {execution_time_secs:.2}s\n\n\
         ## Steps\n\n{table}\n\
         Artifacts are in `{output}`.\n",
        process_id = ctx.process_id,
        timestamp = clock.now().to_rfc3339(),
        table = phase_table(states),
        output = ctx.output_file_folder,
    )
}

/// Markdown report for a failed run, with the failure detail inline so
/// the operator does not have to chase telemetry first.
pub fn build_failure_report(
    ctx: &ProcessContext,
    states: &[PhaseState],
    error_message: &str,
    execution_time_secs: f64,
    clock: &dyn Clock,
) -> String {
    let failed_step = states
        .iter()
        .rfind(|s| s.result == PhaseResult::Failed)
        .map(|s| s.kind.name())
        .unwrap_or("unknown");

    format!(
        "# Migration run report (FAILED)\n\n\
         - Process: {process_id}\n\
         - Failed: {timestamp}\n\
         - Failed step: {failed_step}\n\
         - Total execution time: {execution_time_secs:.2}s\n\n\
         ## Error\n\n```\n{error_message}\n```\n\n\
         ## Steps\n\n{table}\n\
         Artifacts produced before the failure remain in `{output}`.\n",
        process_id = ctx.process_id,
        timestamp = clock.now().to_rfc3339(),
        table = phase_table(states),
        output = ctx.output_file_folder,
    )
}

/// Write the report to the workspace folder and mirror it to telemetry.
/// Report failures never abort the run; they are logged and dropped.
pub async fn save_run_report(
    blob: &dyn BlobStore,
    telemetry: &dyn TelemetrySink,
    ctx: &ProcessContext,
    content: &str,
) {
    if let Err(err) = blob
        .save_content_to_blob(
            RUN_REPORT_FILE,
            content,
            &ctx.container_name,
            &ctx.workspace_file_folder,
        )
        .await
    {
        warn!(error = %err, "failed to persist the run report");
    }

    let summary_line = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("run report")
        .to_string();
    telemetry
        .record(TelemetryEvent::RunReport {
            process_id: ctx.process_id.clone(),
            file_name: RUN_REPORT_FILE.to_string(),
            summary_line,
        })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::context::MigrationRequest;
    use crate::roster::PhaseKind;
    use crate::storage::InMemoryBlobStore;
    use crate::telemetry::MemoryTelemetry;
    use chrono::Utc;

    fn ctx() -> ProcessContext {
        let request = MigrationRequest {
            process_id: "p1".into(),
            container_name: "workloads".into(),
            source_file_folder: "source".into(),
            workspace_file_folder: "workspace".into(),
            output_file_folder: "output".into(),
        };
        let mut ctx = ProcessContext::new("user", &request);
        ctx.analysis_result = Some(crate::verdict::analysis_fixture());
        ctx.yaml_result = Some(crate::verdict::yaml_fixture());
        ctx
    }

    fn states() -> Vec<PhaseState> {
        PhaseKind::ALL
            .iter()
            .map(|kind| {
                let mut state = PhaseState::new(*kind);
                state.result = PhaseResult::Succeeded;
                state.rounds_completed = 2;
                state
            })
            .collect()
    }

    #[test]
    fn success_report_names_platform_and_counts() {
        let clock = FixedClock(Utc::now());
        let report = build_success_report(&ctx(), &states(), 42.5, &clock);

        assert!(report.contains("Source platform: EKS"));
        assert!(report.contains("Converted manifests: 2"));
        assert!(report.contains("42.50s"));
        assert!(report.contains("| Analysis | succeeded | 2 |"));
    }

    #[test]
    fn failure_report_carries_error_and_failed_step() {
        let clock = FixedClock(Utc::now());
        let mut states = states();
        states[1].result = PhaseResult::Failed;
        states.truncate(2);

        let report = build_failure_report(
            &ctx(),
            &states,
            "Hard termination: hard_blocked - NO_YAML_FILES",
            3.0,
            &clock,
        );

        assert!(report.contains("FAILED"));
        assert!(report.contains("Failed step: Design"));
        assert!(report.contains("NO_YAML_FILES"));
    }

    #[tokio::test]
    async fn save_writes_workspace_blob_and_telemetry() {
        let blob = InMemoryBlobStore::new();
        let telemetry = MemoryTelemetry::new();
        let ctx = ctx();
        let clock = FixedClock(Utc::now());
        let report = build_success_report(&ctx, &states(), 1.0, &clock);

        save_run_report(&blob, &telemetry, &ctx, &report).await;

        let saved = blob
            .read_blob_content(RUN_REPORT_FILE, "workloads", "workspace")
            .await
            .unwrap();
        assert!(saved.contains("Migration run report"));
        assert!(telemetry.snapshot().iter().any(|e| matches!(
            e,
            TelemetryEvent::RunReport { file_name, .. } if file_name == RUN_REPORT_FILE
        )));
    }
}
