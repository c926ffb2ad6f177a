//! Pipeline driver: runs the four phases in order exactly once per
//! request, threads context forward, and converts every failure mode
//! into a uniform `PipelineResult` for the outer queue.

use crate::clock::Clock;
use crate::config::PipelineConfig;
use crate::context::{MigrationRequest, ProcessContext};
use crate::docs::DocsLookup;
use crate::errors::{ErrorClassification, classify_failure};
use crate::failure::FailureCollector;
use crate::llm::ChatCompletion;
use crate::phase::PhaseDescriptor;
use crate::projection::{
    DashboardMetrics, FileManifest, build_dashboard_metrics, build_file_manifest,
};
use crate::report::{build_failure_report, build_success_report, save_run_report};
use crate::roster::PhaseKind;
use crate::runner::{PhaseOutcome, PhaseResult, PhaseRunner, PhaseState, TerminationDetails};
use crate::storage::BlobStore;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::verdict::{
    AnalysisOutput, DesignOutput, DocumentationOutput, TerminationType, VerdictPayload, YamlOutput,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Migration process execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Initializing,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl ProcessStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

/// Final result of one pipeline run, consumed by queue processors and
/// dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub process_id: String,
    pub status: ProcessStatus,
    /// Seconds.
    pub execution_time: f64,
    pub error_message: Option<String>,
    pub error_classification: Option<ErrorClassification>,
    pub final_state: Vec<PhaseState>,
    /// Prompt requeue requested by a hard termination; distinct from
    /// the queue's exponential backoff channel.
    pub requires_immediate_retry: bool,
    pub timestamp: DateTime<Utc>,
    pub file_manifest: Option<FileManifest>,
    pub dashboard_metrics: Option<DashboardMetrics>,
}

impl PipelineResult {
    /// Whether the outer queue should requeue with backoff.
    pub fn is_retryable(&self) -> bool {
        !self.success && self.error_classification == Some(ErrorClassification::Retryable)
    }
}

enum PhaseRun<T> {
    Finished(Box<PhaseOutcome<T>>),
    /// Pipeline wall clock fired while this phase was active.
    DeadlineExceeded(PhaseState),
}

/// Drives the four-phase sequence. Stateless across requests;
/// reinvocation with the same process id is a fresh run.
pub struct PipelineDriver {
    config: PipelineConfig,
    llm: Arc<dyn ChatCompletion>,
    blob: Arc<dyn BlobStore>,
    docs: Arc<dyn DocsLookup>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl PipelineDriver {
    pub fn new(
        config: PipelineConfig,
        llm: Arc<dyn ChatCompletion>,
        blob: Arc<dyn BlobStore>,
        docs: Arc<dyn DocsLookup>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            config,
            llm,
            blob,
            docs,
            clock,
            telemetry,
        }
    }

    /// Execute the full migration pipeline for one request.
    pub async fn execute(
        &self,
        process_id: &str,
        user_id: &str,
        request: MigrationRequest,
    ) -> PipelineResult {
        let started = Instant::now();
        let deadline = started + self.config.timeout;

        self.report_status(process_id, ProcessStatus::Initializing).await;

        let mut ctx = ProcessContext::new(user_id, &request);
        ctx.process_id = process_id.to_string();

        let runner = PhaseRunner::new(
            self.config.clone(),
            self.llm.clone(),
            self.blob.clone(),
            self.docs.clone(),
            self.clock.clone(),
            self.telemetry.clone(),
        );

        self.report_status(process_id, ProcessStatus::Running).await;
        let mut states: Vec<PhaseState> = Vec::new();

        // Analysis
        match self
            .run_phase::<AnalysisOutput>(&runner, PhaseKind::Analysis, &ctx, deadline)
            .await
        {
            PhaseRun::Finished(outcome) => {
                let PhaseOutcome { state, verdict, .. } = *outcome;
                if state.result != PhaseResult::Succeeded {
                    states.push(state);
                    return self.failure_result(&ctx, started, states, false).await;
                }
                ctx.analysis_result = verdict.and_then(|v| v.termination_output);
                states.push(state);
            }
            PhaseRun::DeadlineExceeded(state) => {
                states.push(state);
                return self.failure_result(&ctx, started, states, true).await;
            }
        }

        // Design
        match self
            .run_phase::<DesignOutput>(&runner, PhaseKind::Design, &ctx, deadline)
            .await
        {
            PhaseRun::Finished(outcome) => {
                let PhaseOutcome { state, verdict, .. } = *outcome;
                if state.result != PhaseResult::Succeeded {
                    states.push(state);
                    return self.failure_result(&ctx, started, states, false).await;
                }
                ctx.design_result = verdict.and_then(|v| v.termination_output);
                states.push(state);
            }
            PhaseRun::DeadlineExceeded(state) => {
                states.push(state);
                return self.failure_result(&ctx, started, states, true).await;
            }
        }

        // YAML conversion
        match self
            .run_phase::<YamlOutput>(&runner, PhaseKind::Yaml, &ctx, deadline)
            .await
        {
            PhaseRun::Finished(outcome) => {
                let PhaseOutcome { state, verdict, .. } = *outcome;
                if state.result != PhaseResult::Succeeded {
                    states.push(state);
                    return self.failure_result(&ctx, started, states, false).await;
                }
                ctx.yaml_result = verdict.and_then(|v| v.termination_output);
                states.push(state);
            }
            PhaseRun::DeadlineExceeded(state) => {
                states.push(state);
                return self.failure_result(&ctx, started, states, true).await;
            }
        }

        // Documentation
        match self
            .run_phase::<DocumentationOutput>(&runner, PhaseKind::Documentation, &ctx, deadline)
            .await
        {
            PhaseRun::Finished(outcome) => {
                let PhaseOutcome { state, verdict, .. } = *outcome;
                if state.result != PhaseResult::Succeeded {
                    states.push(state);
                    return self.failure_result(&ctx, started, states, false).await;
                }
                ctx.documentation_result = verdict.and_then(|v| v.termination_output);
                states.push(state);
            }
            PhaseRun::DeadlineExceeded(state) => {
                states.push(state);
                return self.failure_result(&ctx, started, states, true).await;
            }
        }

        let execution_time = started.elapsed().as_secs_f64();
        info!(process_id, execution_time, "migration pipeline completed");

        let file_manifest = build_file_manifest(&ctx);
        let dashboard_metrics = build_dashboard_metrics(&file_manifest, &states);

        let report = build_success_report(&ctx, &states, execution_time, self.clock.as_ref());
        save_run_report(
            self.blob.as_ref(),
            self.telemetry.as_ref(),
            &ctx,
            &report,
        )
        .await;

        self.report_status(process_id, ProcessStatus::Completed).await;
        self.telemetry
            .record(TelemetryEvent::PipelineOutcome {
                process_id: process_id.to_string(),
                success: true,
                status: ProcessStatus::Completed.name().to_string(),
                execution_time_secs: execution_time,
                requires_immediate_retry: false,
            })
            .await;
        self.telemetry
            .record(TelemetryEvent::UiProjection {
                process_id: process_id.to_string(),
                file_manifest: file_manifest.clone(),
                dashboard_metrics: dashboard_metrics.clone(),
            })
            .await;

        PipelineResult {
            success: true,
            process_id: process_id.to_string(),
            status: ProcessStatus::Completed,
            execution_time,
            error_message: None,
            error_classification: None,
            final_state: states,
            requires_immediate_retry: false,
            timestamp: self.clock.now(),
            file_manifest: Some(file_manifest),
            dashboard_metrics: Some(dashboard_metrics),
        }
    }

    /// Run one phase under the remaining pipeline wall clock.
    async fn run_phase<T: VerdictPayload>(
        &self,
        runner: &PhaseRunner,
        kind: PhaseKind,
        ctx: &ProcessContext,
        deadline: Instant,
    ) -> PhaseRun<T> {
        let descriptor = PhaseDescriptor::for_phase(kind, ctx);
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return PhaseRun::DeadlineExceeded(self.timed_out_state(kind, ctx).await);
        }

        match tokio::time::timeout(remaining, runner.run::<T>(&descriptor, ctx)).await {
            Ok(outcome) => PhaseRun::Finished(Box::new(outcome)),
            Err(_) => PhaseRun::DeadlineExceeded(self.timed_out_state(kind, ctx).await),
        }
    }

    /// State for a phase cancelled by the pipeline wall clock.
    async fn timed_out_state(&self, kind: PhaseKind, ctx: &ProcessContext) -> PhaseState {
        let message = format!(
            "Migration process timed out after {} minutes while {kind} was active",
            self.config.timeout.as_secs() / 60
        );
        error!(phase = %kind, "{message}");

        let mut state = PhaseState::new(kind);
        state.result = PhaseResult::Failed;
        state.reason = Some(message.clone());
        state.execution_end_time = Some(self.clock.now());
        state.termination_details = Some(TerminationDetails {
            termination_type: TerminationType::HardTimeout,
            blocking_issues: Vec::new(),
            reason: message.clone(),
        });

        let collector = FailureCollector::new();
        let system = collector.collect(
            "TimeoutError",
            &message,
            &format!("{}Step", kind.name()),
            &ctx.process_id,
            "pipeline_timeout",
            self.clock.as_ref(),
        );
        state.failure_context = Some(collector.step_failure(
            &message,
            self.config.timeout.as_secs_f64(),
            Vec::new(),
            system,
            json!({ "timeout_minutes": self.config.timeout.as_secs() / 60 }),
        ));

        self.telemetry
            .record(TelemetryEvent::StepOutcome {
                process_id: ctx.process_id.clone(),
                phase: kind,
                success: false,
                reason: message,
            })
            .await;
        self.telemetry
            .record(TelemetryEvent::PhaseTransition {
                process_id: ctx.process_id.clone(),
                phase: kind,
                transition: "failed".to_string(),
            })
            .await;

        state
    }

    /// Build the failed `PipelineResult` from the collected states.
    async fn failure_result(
        &self,
        ctx: &ProcessContext,
        started: Instant,
        states: Vec<PhaseState>,
        wall_clock_timeout: bool,
    ) -> PipelineResult {
        let process_id = ctx.process_id.as_str();
        let execution_time = started.elapsed().as_secs_f64();
        let failed = states
            .iter()
            .rfind(|s| s.result == PhaseResult::Failed);

        let (error_message, classification, requires_immediate_retry, stack_trace) = match failed {
            Some(state) => {
                let mut message = state
                    .reason
                    .clone()
                    .unwrap_or_else(|| "phase failed without a recorded reason".to_string());
                if let Some(details) = &state.termination_details {
                    if !details.blocking_issues.is_empty() {
                        message.push_str(&format!(
                            " | Blocking issues: [{}]",
                            details.blocking_issues.join(", ")
                        ));
                    }
                }

                let (classification, stack_trace) = match &state.failure_context {
                    Some(failure) => {
                        let system = &failure.system_failure_context;
                        message.push_str(&format!(
                            " | Error: {}: {}",
                            system.error_type, system.error_message
                        ));
                        let excerpt: String = system
                            .stack_trace
                            .lines()
                            .take(8)
                            .collect::<Vec<_>>()
                            .join("\n");
                        let classification = if state
                            .termination_details
                            .as_ref()
                            .is_some_and(|d| d.termination_type == TerminationType::HardBlocked)
                        {
                            // Hard blocks are permanent for this run.
                            ErrorClassification::Critical
                        } else if wall_clock_timeout {
                            ErrorClassification::Retryable
                        } else {
                            classify_failure(&system.error_type, &system.error_message)
                        };
                        (classification, excerpt)
                    }
                    None => (ErrorClassification::Critical, String::new()),
                };
                message.push_str(&format!(" (Execution time: {execution_time:.2}s)"));
                (
                    message,
                    classification,
                    state.requires_immediate_retry,
                    stack_trace,
                )
            }
            None => (
                "pipeline failed with no failed phase state recorded".to_string(),
                ErrorClassification::Critical,
                false,
                String::new(),
            ),
        };

        let status = if wall_clock_timeout {
            ProcessStatus::Timeout
        } else {
            ProcessStatus::Failed
        };

        error!(process_id, %error_message, "migration pipeline failed");
        self.report_status(process_id, status).await;
        self.telemetry
            .record(TelemetryEvent::FailureRecord {
                process_id: process_id.to_string(),
                reason: error_message.clone(),
                stack_trace,
                classification,
            })
            .await;
        self.telemetry
            .record(TelemetryEvent::PipelineOutcome {
                process_id: process_id.to_string(),
                success: false,
                status: status.name().to_string(),
                execution_time_secs: execution_time,
                requires_immediate_retry,
            })
            .await;

        let report = build_failure_report(
            ctx,
            &states,
            &error_message,
            execution_time,
            self.clock.as_ref(),
        );
        save_run_report(self.blob.as_ref(), self.telemetry.as_ref(), ctx, &report).await;

        PipelineResult {
            success: false,
            process_id: process_id.to_string(),
            status,
            execution_time,
            error_message: Some(error_message),
            error_classification: Some(classification),
            final_state: states,
            requires_immediate_retry,
            timestamp: self.clock.now(),
            file_manifest: None,
            dashboard_metrics: None,
        }
    }

    async fn report_status(&self, process_id: &str, status: ProcessStatus) {
        self.telemetry
            .record(TelemetryEvent::ProcessStatus {
                process_id: process_id.to_string(),
                status: status.name().to_string(),
            })
            .await;
    }
}
