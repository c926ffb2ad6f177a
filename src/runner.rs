//! Phase runner: drives one phase's group chat to a validated verdict
//! or a rich failure context. Exceptions never escape a phase; the
//! driver inspects the returned state instead of catching.

use crate::agent::AgentGroup;
use crate::clock::Clock;
use crate::config::PipelineConfig;
use crate::context::ProcessContext;
use crate::docs::DocsLookup;
use crate::errors::LlmError;
use crate::failure::{FailureCollector, StepFailureState, comprehensive_error_message};
use crate::governor::HistoryGovernor;
use crate::history::{ChatHistory, ChatMessage};
use crate::llm::ChatCompletion;
use crate::manager::{GroupChatManager, MANAGER_AGENT_NAME};
use crate::phase::PhaseDescriptor;
use crate::roster::{PhaseKind, canonical_lead};
use crate::storage::{AI_CONTENT_HEADER, BlobStore};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::tools::ToolRouter;
use crate::verdict::{
    PhaseVerdict, TerminationType, VerdictPayload, quality, requests_immediate_retry,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Tri-state outcome of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseResult {
    #[default]
    NotStarted,
    Succeeded,
    Failed,
}

/// Termination metadata carried forward to the pipeline result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationDetails {
    pub termination_type: TerminationType,
    pub blocking_issues: Vec<String>,
    pub reason: String,
}

/// Transient per-phase record: identity, outcome, progress artifacts,
/// timing, control flags, and failure attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    pub name: String,
    pub version: String,
    pub kind: PhaseKind,
    pub result: PhaseResult,
    pub reason: Option<String>,
    pub artifacts: Vec<String>,
    pub rounds_completed: u32,
    pub execution_start_time: Option<DateTime<Utc>>,
    pub orchestration_start_time: Option<DateTime<Utc>>,
    pub orchestration_end_time: Option<DateTime<Utc>>,
    pub execution_end_time: Option<DateTime<Utc>>,
    /// Prompt requeue, distinct from queue-level exponential backoff.
    pub requires_immediate_retry: bool,
    pub termination_details: Option<TerminationDetails>,
    pub failure_context: Option<StepFailureState>,
}

impl PhaseState {
    pub fn new(kind: PhaseKind) -> Self {
        Self {
            name: format!("{}StepState", kind.name()),
            version: "1.0".to_string(),
            kind,
            result: PhaseResult::NotStarted,
            reason: None,
            artifacts: Vec::new(),
            rounds_completed: 0,
            execution_start_time: None,
            orchestration_start_time: None,
            orchestration_end_time: None,
            execution_end_time: None,
            requires_immediate_retry: false,
            termination_details: None,
            failure_context: None,
        }
    }

    fn span(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Option<Duration> {
        match (start, end) {
            (Some(start), Some(end)) => end.signed_duration_since(start).to_std().ok(),
            _ => None,
        }
    }

    pub fn setup_duration(&self) -> Option<Duration> {
        Self::span(self.execution_start_time, self.orchestration_start_time)
    }

    pub fn orchestration_duration(&self) -> Option<Duration> {
        Self::span(self.orchestration_start_time, self.orchestration_end_time)
    }

    pub fn total_execution_duration(&self) -> Option<Duration> {
        Self::span(self.execution_start_time, self.execution_end_time)
    }
}

/// Result of running one phase: the state plus the typed verdict and
/// summary when the phase succeeded.
#[derive(Debug, Clone)]
pub struct PhaseOutcome<T> {
    pub state: PhaseState,
    pub verdict: Option<PhaseVerdict<T>>,
    pub summary: Option<String>,
}

/// Executes one phase's group chat to completion.
pub struct PhaseRunner {
    config: PipelineConfig,
    llm: Arc<dyn ChatCompletion>,
    blob: Arc<dyn BlobStore>,
    docs: Arc<dyn DocsLookup>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl PhaseRunner {
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

    /// Run one phase. Never panics and never returns an error: every
    /// failure path produces a failed `PhaseState` with context.
    pub async fn run<T: VerdictPayload>(
        &self,
        descriptor: &PhaseDescriptor,
        ctx: &ProcessContext,
    ) -> PhaseOutcome<T> {
        let kind = descriptor.kind;
        let mut state = PhaseState::new(kind);
        state.execution_start_time = Some(self.clock.now());

        self.telemetry
            .record(TelemetryEvent::PhaseTransition {
                process_id: ctx.process_id.clone(),
                phase: kind,
                transition: "started".to_string(),
            })
            .await;

        let governor = HistoryGovernor::new(self.config.truncation.clone());
        let mut manager = GroupChatManager::new(
            kind,
            ctx,
            ctx.detected_platform(),
            governor.clone(),
            self.config.retry.clone(),
            self.config.protocol_retry_limit,
        );
        let group = AgentGroup::new(kind, manager.eligible());
        let tools = ToolRouter::new(
            self.blob.clone(),
            self.docs.clone(),
            self.clock.clone(),
            &ctx.container_name,
        );

        let mut history = ChatHistory::new();
        history.push(ChatMessage::system(descriptor.task.as_str()));

        state.orchestration_start_time = Some(self.clock.now());
        let max_rounds = self.config.round_budgets.for_phase(kind);
        let mut final_verdict: Option<PhaseVerdict<T>> = None;

        for round in 1..=max_rounds {
            let selection = match manager
                .select_next_agent(&history, self.llm.as_ref(), self.telemetry.as_ref())
                .await
            {
                Ok(selection) => selection,
                Err(err) if is_ignorable(&err) => {
                    self.note_ignorable(ctx, kind, "select_next_agent", &err).await;
                    manager.abort_round();
                    continue;
                }
                Err(err) => return self.infrastructure_failure(state, ctx, "select_next_agent", &err).await,
            };

            let agent = group
                .agent(selection.role)
                .or_else(|| group.agent(canonical_lead(kind)));
            let Some(agent) = agent else {
                let err = LlmError::InvalidRequest(format!(
                    "no agent available for role {}",
                    selection.role
                ));
                return self.infrastructure_failure(state, ctx, "agent_lookup", &err).await;
            };

            if let Err(err) = agent
                .take_turn(
                    kind,
                    &mut history,
                    self.llm.as_ref(),
                    &tools,
                    &self.config,
                    self.telemetry.as_ref(),
                    &ctx.process_id,
                )
                .await
            {
                if is_ignorable(&err) {
                    self.note_ignorable(ctx, kind, "agent_turn", &err).await;
                    manager.abort_round();
                    continue;
                }
                return self.infrastructure_failure(state, ctx, "agent_turn", &err).await;
            }
            manager.utterance_delivered();

            governor.enforce(&mut history);
            state.rounds_completed = round;

            let verdict = match manager
                .should_terminate::<T>(&history, self.llm.as_ref(), self.telemetry.as_ref())
                .await
            {
                Ok(verdict) => verdict,
                Err(err) if is_ignorable(&err) => {
                    self.note_ignorable(ctx, kind, "should_terminate", &err).await;
                    manager.abort_round();
                    continue;
                }
                Err(err) => return self.infrastructure_failure(state, ctx, "should_terminate", &err).await,
            };

            if verdict.is_continue() {
                continue;
            }
            final_verdict = Some(verdict);
            break;
        }

        state.orchestration_end_time = Some(self.clock.now());

        let Some(verdict) = final_verdict else {
            info!(phase = %kind, max_rounds, "round budget exhausted");
            let timeout_verdict = PhaseVerdict::<T> {
                result: false,
                reason: format!("round budget of {max_rounds} exhausted without termination"),
                is_hard_terminated: true,
                termination_type: TerminationType::HardTimeout,
                blocking_issues: Vec::new(),
                termination_output: None,
            };
            return self.hard_termination_failure(state, ctx, timeout_verdict).await;
        };

        if verdict.is_hard_terminated {
            return self.hard_termination_failure(state, ctx, verdict).await;
        }

        if let Err(diagnostic) = self.validate_success(&verdict, ctx).await {
            return self.validation_failure(state, ctx, diagnostic).await;
        }

        self.assess_reasoning_quality(&verdict, ctx, kind).await;

        let summary = match manager
            .filter_results(&history, self.llm.as_ref(), self.telemetry.as_ref())
            .await
        {
            Ok(summary) => summary,
            Err(err) => return self.infrastructure_failure(state, ctx, "filter_results", &err).await,
        };

        state.artifacts = verdict
            .termination_output
            .as_ref()
            .map(|payload| payload.progress_artifacts())
            .unwrap_or_default();
        state.result = PhaseResult::Succeeded;
        state.reason = Some(verdict.reason.clone());
        state.execution_end_time = Some(self.clock.now());

        self.telemetry
            .record(TelemetryEvent::StepOutcome {
                process_id: ctx.process_id.clone(),
                phase: kind,
                success: true,
                reason: verdict.reason.clone(),
            })
            .await;
        self.telemetry
            .record(TelemetryEvent::PhaseTransition {
                process_id: ctx.process_id.clone(),
                phase: kind,
                transition: "completed".to_string(),
            })
            .await;

        PhaseOutcome {
            state,
            verdict: Some(verdict),
            summary: Some(summary),
        }
    }

    /// Success-path validation: payload content, then the blob-backed
    /// artifact post-conditions.
    async fn validate_success<T: VerdictPayload>(
        &self,
        verdict: &PhaseVerdict<T>,
        ctx: &ProcessContext,
    ) -> Result<(), String> {
        let Some(payload) = verdict.termination_output.as_ref() else {
            return Err("success verdict carries no termination_output".to_string());
        };

        let violations = payload.validate();
        if !violations.is_empty() {
            let joined = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(format!("verdict validation failed: {joined}"));
        }

        for check in payload.artifact_checks() {
            let exists = self
                .blob
                .check_blob_exists(&check.file_name, &ctx.container_name, &ctx.output_file_folder)
                .await
                .map_err(|e| format!("artifact existence check errored: {e}"))?;
            if !exists {
                return Err(format!(
                    "promised artifact '{}' does not exist in '{}'",
                    check.file_name, ctx.output_file_folder
                ));
            }
            if check.requires_ai_header {
                let content = self
                    .blob
                    .read_blob_content(&check.file_name, &ctx.container_name, &ctx.output_file_folder)
                    .await
                    .map_err(|e| format!("artifact read errored: {e}"))?;
                if !content.starts_with(AI_CONTENT_HEADER) {
                    return Err(format!(
                        "converted manifest '{}' is missing the AI content header",
                        check.file_name
                    ));
                }
            }
        }

        Ok(())
    }

    /// Known LLM-service hiccup: log, report, and keep the phase going.
    async fn note_ignorable(
        &self,
        ctx: &ProcessContext,
        kind: PhaseKind,
        operation: &str,
        error: &LlmError,
    ) {
        warn!(phase = %kind, operation, error = %error, "ignorable service glitch; continuing");
        self.telemetry
            .record(TelemetryEvent::AgentActivity {
                process_id: ctx.process_id.clone(),
                agent: MANAGER_AGENT_NAME.to_string(),
                action: "ignorable_service_glitch".to_string(),
                preview: format!("{operation}: {error}"),
            })
            .await;
    }

    /// Evidence/hallucination scan over the verdict's reasoning. One
    /// warning at most per phase; evidence earns a positive signal.
    async fn assess_reasoning_quality<T: VerdictPayload>(
        &self,
        verdict: &PhaseVerdict<T>,
        ctx: &ProcessContext,
        kind: PhaseKind,
    ) {
        if !matches!(kind, PhaseKind::Design | PhaseKind::Yaml) {
            return;
        }

        let mut texts = vec![verdict.reason.clone()];
        if let Some(payload) = verdict.termination_output.as_ref() {
            texts.extend(payload.reasoning_fields().into_iter().map(|(_, text)| text));
        }

        match quality::assess_combined(texts.iter().map(String::as_str)) {
            quality::ReasoningQuality::Generic => {
                warn!(phase = %kind, "reasoning appears generic without tool evidence");
                self.telemetry
                    .record(TelemetryEvent::ReasoningQualityWarning {
                        process_id: ctx.process_id.clone(),
                        phase: kind,
                        detail: "reasoning appears generic - no tool evidence quoted".to_string(),
                    })
                    .await;
            }
            quality::ReasoningQuality::EvidenceBacked => {
                self.telemetry
                    .record(TelemetryEvent::ReasoningQualitySignal {
                        process_id: ctx.process_id.clone(),
                        phase: kind,
                        detail: "evidence-based reasoning detected".to_string(),
                    })
                    .await;
            }
            quality::ReasoningQuality::Neutral => {}
        }
    }

    /// Hard termination (blocked, budget timeout, or protocol hard
    /// error): permanent failure carrying the blocking codes verbatim.
    async fn hard_termination_failure<T: VerdictPayload>(
        &self,
        mut state: PhaseState,
        ctx: &ProcessContext,
        verdict: PhaseVerdict<T>,
    ) -> PhaseOutcome<T> {
        let message = format!(
            "Hard termination: {} - {}",
            verdict.termination_type.name(),
            verdict.reason
        );

        state.requires_immediate_retry = requests_immediate_retry(&verdict.blocking_issues);
        state.termination_details = Some(TerminationDetails {
            termination_type: verdict.termination_type,
            blocking_issues: verdict.blocking_issues.clone(),
            reason: verdict.reason.clone(),
        });

        let context_data = json!({
            "termination_type": verdict.termination_type.name(),
            "blocking_issues": verdict.blocking_issues,
            "termination_reason": verdict.reason,
        });

        let outcome = self
            .fail(state, ctx, "HardTermination", &message, context_data)
            .await;
        PhaseOutcome {
            verdict: Some(verdict),
            ..outcome
        }
    }

    /// Structure/content violations on a claimed success.
    async fn validation_failure<T: VerdictPayload>(
        &self,
        state: PhaseState,
        ctx: &ProcessContext,
        diagnostic: String,
    ) -> PhaseOutcome<T> {
        let context_data = json!({ "diagnostic": diagnostic });
        self.fail(state, ctx, "VerdictValidationError", &diagnostic, context_data)
            .await
    }

    /// LLM/tool infrastructure failure mid-phase.
    async fn infrastructure_failure<T: VerdictPayload>(
        &self,
        mut state: PhaseState,
        ctx: &ProcessContext,
        operation: &str,
        error: &LlmError,
    ) -> PhaseOutcome<T> {
        if state.orchestration_end_time.is_none() {
            state.orchestration_end_time = Some(self.clock.now());
        }
        let message = comprehensive_error_message(error);
        let context_data = json!({ "operation": operation });
        self.fail(state, ctx, &llm_error_type(error), &message, context_data)
            .await
    }

    /// Common failure tail: collect context, stamp timing, report.
    async fn fail<T: VerdictPayload>(
        &self,
        mut state: PhaseState,
        ctx: &ProcessContext,
        error_type: &str,
        message: &str,
        mut context_data: serde_json::Value,
    ) -> PhaseOutcome<T> {
        let kind = state.kind;
        if state.orchestration_end_time.is_none() && state.orchestration_start_time.is_some() {
            state.orchestration_end_time = Some(self.clock.now());
        }
        state.execution_end_time = Some(self.clock.now());
        state.result = PhaseResult::Failed;
        state.reason = Some(message.to_string());

        if let Some(map) = context_data.as_object_mut() {
            map.insert("container_name".to_string(), json!(ctx.container_name));
            map.insert("source_file_folder".to_string(), json!(ctx.source_file_folder));
            map.insert("output_file_folder".to_string(), json!(ctx.output_file_folder));
        }

        let collector = FailureCollector::new();
        let system = collector.collect(
            error_type,
            message,
            &format!("{}Step", kind.name()),
            &ctx.process_id,
            &format!("{}_failure", kind.name().to_lowercase()),
            self.clock.as_ref(),
        );
        let execution_time = state
            .total_execution_duration()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let failure = collector.step_failure(
            message,
            execution_time,
            state.artifacts.clone(),
            system,
            context_data,
        );

        self.telemetry
            .record(TelemetryEvent::StepOutcome {
                process_id: ctx.process_id.clone(),
                phase: kind,
                success: false,
                reason: message.to_string(),
            })
            .await;
        self.telemetry
            .record(TelemetryEvent::PhaseTransition {
                process_id: ctx.process_id.clone(),
                phase: kind,
                transition: "failed".to_string(),
            })
            .await;

        state.failure_context = Some(failure);
        PhaseOutcome {
            state,
            verdict: None,
            summary: None,
        }
    }
}

fn is_ignorable(error: &LlmError) -> bool {
    crate::errors::is_ignorable_message(&error.to_string())
}

fn llm_error_type(error: &LlmError) -> String {
    match error {
        LlmError::Timeout(_) => "Timeout",
        LlmError::Connection(_) => "Connection",
        LlmError::RateLimited(_) => "RateLimited",
        LlmError::ServiceUnavailable(_) => "ServiceUnavailable",
        LlmError::Internal { .. } => "Internal",
        LlmError::Auth(_) => "Auth",
        LlmError::InvalidRequest(_) => "InvalidRequest",
        LlmError::EmptyResponse => "EmptyResponse",
        LlmError::Other(_) => "Other",
    }
    .to_string()
}
