//! Group chat manager: the single role that answers, every round, who
//! speaks next, whether the phase is done, and what the summary is.
//!
//! Concentrating conversational control here keeps agents from
//! terminating their own phase and keeps progress machine-checkable.
//! The manager is an explicit state machine; selection and termination
//! logic never blend.

use crate::context::{Platform, ProcessContext};
use crate::errors::{LlmError, ProtocolError};
use crate::governor::HistoryGovernor;
use crate::history::{ChatHistory, ChatMessage};
use crate::llm::{ChatCompletion, CompletionSettings, StringResult};
use crate::prompts;
use crate::retry::{RetryPolicy, complete_with_retry};
use crate::roster::{AgentRole, PhaseKind, canonical_lead, eligible_roles};
use crate::selection::{SelectionOutcome, resolve_selection};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::verdict::{PhaseVerdict, VerdictPayload};
use tracing::{info, warn};

/// Telemetry author name for manager decisions.
pub const MANAGER_AGENT_NAME: &str = "Conversation_Manager";

/// Where the manager stands in its per-round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Selecting,
    AwaitingUtterance,
    EvaluatingTermination,
    Summarizing,
    Done,
}

/// Per-phase conversation manager.
pub struct GroupChatManager {
    phase: PhaseKind,
    process_id: String,
    eligible: Vec<AgentRole>,
    lead: AgentRole,
    selection_prompt: String,
    termination_prompt: String,
    filter_prompt: String,
    termination_instruction: String,
    governor: HistoryGovernor,
    retry: RetryPolicy,
    protocol_retry_limit: u32,
    state: ManagerState,
}

impl GroupChatManager {
    pub fn new(
        phase: PhaseKind,
        ctx: &ProcessContext,
        platform: Option<Platform>,
        governor: HistoryGovernor,
        retry: RetryPolicy,
        protocol_retry_limit: u32,
    ) -> Self {
        let eligible = eligible_roles(phase, platform);
        Self {
            phase,
            process_id: ctx.process_id.clone(),
            selection_prompt: prompts::selection_prompt(phase, &eligible),
            termination_prompt: prompts::termination_prompt(phase, ctx),
            filter_prompt: prompts::filter_prompt(phase),
            termination_instruction: prompts::termination_instruction(phase),
            eligible,
            lead: canonical_lead(phase),
            governor,
            retry,
            protocol_retry_limit,
            state: ManagerState::Selecting,
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn eligible(&self) -> &[AgentRole] {
        &self.eligible
    }

    /// Pick the next speaker. Malformed or out-of-roster selections
    /// resolve to the canonical lead; this never fails the phase except
    /// on infrastructure errors.
    pub async fn select_next_agent(
        &mut self,
        history: &ChatHistory,
        llm: &dyn ChatCompletion,
        telemetry: &dyn TelemetrySink,
    ) -> Result<SelectionOutcome, LlmError> {
        debug_assert_eq!(self.state, ManagerState::Selecting);

        let view = self.build_view(
            history,
            &self.selection_prompt,
            "Now select the next participant to speak. Keep the current \
             agent speaking if it is mid-task, but keep the conversation moving.",
        );

        let mut outcome: Option<SelectionOutcome> = None;
        for attempt in 0..=self.protocol_retry_limit {
            let message = complete_with_retry(
                llm,
                &view,
                &CompletionSettings::structured(StringResult::SCHEMA),
                &self.retry,
                "select_next_agent",
            )
            .await?;

            match serde_json::from_str::<StringResult>(&message.content) {
                Ok(parsed) => {
                    outcome = Some(resolve_selection(
                        &parsed.result,
                        &parsed.reason,
                        &self.eligible,
                        self.lead,
                    ));
                    break;
                }
                Err(err) => {
                    let violation = ProtocolError::MalformedSelection(err.to_string());
                    warn!(phase = %self.phase, attempt, error = %violation, "retrying selection");
                }
            }
        }

        // Unparseable selections after the ceiling also fall back.
        let outcome = outcome.unwrap_or(SelectionOutcome {
            role: self.lead,
            reason: "selection protocol violations exhausted the retry ceiling".to_string(),
            fell_back: true,
        });

        if outcome.fell_back {
            telemetry
                .record(TelemetryEvent::AgentActivity {
                    process_id: self.process_id.clone(),
                    agent: MANAGER_AGENT_NAME.to_string(),
                    action: "selection_protocol_fallback".to_string(),
                    preview: outcome.reason.clone(),
                })
                .await;
        }
        telemetry
            .record(TelemetryEvent::AgentActivity {
                process_id: self.process_id.clone(),
                agent: MANAGER_AGENT_NAME.to_string(),
                action: "expert_selection".to_string(),
                preview: format!("Selected {}: {}", outcome.role.wire_name(), outcome.reason),
            })
            .await;
        telemetry
            .record(TelemetryEvent::AgentActivity {
                process_id: self.process_id.clone(),
                agent: outcome.role.wire_name().to_string(),
                action: "selected_for_turn".to_string(),
                preview: outcome.reason.clone(),
            })
            .await;

        self.state = ManagerState::AwaitingUtterance;
        Ok(outcome)
    }

    /// Mark the selected agent's utterance as delivered.
    pub fn utterance_delivered(&mut self) {
        debug_assert_eq!(self.state, ManagerState::AwaitingUtterance);
        self.state = ManagerState::EvaluatingTermination;
    }

    /// Abandon the current round (ignorable service glitch) and return
    /// to selection. Conversation progress is kept.
    pub fn abort_round(&mut self) {
        self.state = ManagerState::Selecting;
    }

    /// Decide terminate/continue. Always returns a fully-shaped verdict;
    /// malformed manager JSON becomes a hard_error verdict once the
    /// protocol retry ceiling is spent.
    pub async fn should_terminate<T: VerdictPayload>(
        &mut self,
        history: &ChatHistory,
        llm: &dyn ChatCompletion,
        telemetry: &dyn TelemetrySink,
    ) -> Result<PhaseVerdict<T>, LlmError> {
        debug_assert_eq!(self.state, ManagerState::EvaluatingTermination);

        telemetry
            .record(TelemetryEvent::AgentActivity {
                process_id: self.process_id.clone(),
                agent: MANAGER_AGENT_NAME.to_string(),
                action: "evaluating_termination".to_string(),
                preview: format!("Evaluating whether {} is complete", self.phase),
            })
            .await;

        let view = self.build_view(history, &self.termination_prompt, &self.termination_instruction);

        let mut last_parse_error = String::new();
        for attempt in 0..=self.protocol_retry_limit {
            let message = complete_with_retry(
                llm,
                &view,
                &CompletionSettings::structured(T::schema_name()),
                &self.retry,
                "should_terminate",
            )
            .await?;

            match serde_json::from_str::<PhaseVerdict<T>>(&message.content) {
                Ok(verdict) => {
                    let (action, preview) = if verdict.is_continue() {
                        ("conversation_continuing", verdict.reason.clone())
                    } else {
                        ("conversation_completed", verdict.reason.clone())
                    };
                    telemetry
                        .record(TelemetryEvent::AgentActivity {
                            process_id: self.process_id.clone(),
                            agent: MANAGER_AGENT_NAME.to_string(),
                            action: action.to_string(),
                            preview,
                        })
                        .await;

                    self.state = if verdict.is_continue() {
                        ManagerState::Selecting
                    } else {
                        ManagerState::Summarizing
                    };
                    return Ok(verdict);
                }
                Err(err) => {
                    let violation = ProtocolError::MalformedVerdict(err.to_string());
                    warn!(phase = %self.phase, attempt, error = %violation, "retrying verdict");
                    last_parse_error = violation.to_string();
                }
            }
        }

        info!(phase = %self.phase, "verdict protocol retries exhausted; failing hard_error");
        self.state = ManagerState::Summarizing;
        Ok(PhaseVerdict::hard_error(format!(
            "manager verdict unparseable after {} attempts: {last_parse_error}",
            self.protocol_retry_limit + 1
        )))
    }

    /// Produce the audit-friendly narrative at terminate time. Falls
    /// back to the last utterance when the summary call misbehaves.
    pub async fn filter_results(
        &mut self,
        history: &ChatHistory,
        llm: &dyn ChatCompletion,
        telemetry: &dyn TelemetrySink,
    ) -> Result<String, LlmError> {
        debug_assert_eq!(self.state, ManagerState::Summarizing);

        let view = self.build_view(
            history,
            &self.filter_prompt,
            "Summarize the step results, decisions, and artifacts.",
        );

        let mut summary: Option<String> = None;
        for _ in 0..=self.protocol_retry_limit {
            let message = complete_with_retry(
                llm,
                &view,
                &CompletionSettings::structured(StringResult::SCHEMA),
                &self.retry,
                "filter_results",
            )
            .await?;

            if let Ok(parsed) = serde_json::from_str::<StringResult>(&message.content) {
                summary = Some(parsed.result);
                break;
            }
        }

        let summary = summary.unwrap_or_else(|| {
            history
                .iter()
                .rev()
                .find(|m| m.author_name.is_some())
                .map(|m| m.content.clone())
                .unwrap_or_else(|| format!("{} step terminated", self.phase))
        });

        telemetry
            .record(TelemetryEvent::AgentActivity {
                process_id: self.process_id.clone(),
                agent: MANAGER_AGENT_NAME.to_string(),
                action: "results_filtered".to_string(),
                preview: format!("{} characters summarized", summary.len()),
            })
            .await;

        self.state = ManagerState::Done;
        Ok(summary)
    }

    /// Manager view: instruction prompt, governed conversation window,
    /// and the closing user instruction.
    fn build_view(&self, history: &ChatHistory, system: &str, instruction: &str) -> ChatHistory {
        let mut window = history.clone();
        self.governor.enforce(&mut window);

        let mut view = ChatHistory::new();
        view.push(ChatMessage::system(system));
        for message in &window {
            view.push(message.clone());
        }
        view.push(ChatMessage::user(instruction));
        view
    }
}
