//! Expert agents: a role, its prompt, and the bounded turn loop that
//! lets one agent speak once, invoking tools as it goes.
//!
//! Roles are a closed enum; there is no agent inheritance hierarchy.
//! An agent turn may span several completions when the model requests
//! tools, but always produces exactly one final utterance appended to
//! the shared history.

use crate::config::PipelineConfig;
use crate::errors::LlmError;
use crate::history::{ChatHistory, ChatMessage};
use crate::llm::{ChatCompletion, CompletionSettings};
use crate::prompts;
use crate::retry::complete_with_retry;
use crate::roster::{AgentRole, PhaseKind};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::tools::ToolRouter;
use tracing::{debug, warn};

/// Activity label derived from an utterance, for telemetry dashboards.
fn classify_activity(content: &str, used_tools: bool) -> &'static str {
    if used_tools {
        return "using_tools";
    }
    let lower = content.to_lowercase();
    const ANALYZING: &[&str] = &["analyzing", "examining", "investigating", "checking"];
    const DESIGNING: &[&str] = &["designing", "planning", "creating", "building"];
    const REPORTING: &[&str] = &["found", "discovered", "detected", "identified"];
    const THINKING: &[&str] = &["let me", "i will", "i'll check", "i need to"];
    const COMPLETED: &[&str] = &["completed", "finished", "done", "ready"];

    if ANALYZING.iter().any(|w| lower.contains(w)) {
        "analyzing"
    } else if DESIGNING.iter().any(|w| lower.contains(w)) {
        "designing"
    } else if REPORTING.iter().any(|w| lower.contains(w)) {
        "reporting_findings"
    } else if THINKING.iter().any(|w| lower.contains(w)) {
        "thinking"
    } else if COMPLETED.iter().any(|w| lower.contains(w)) {
        "completed"
    } else {
        "responding"
    }
}

fn preview(content: &str) -> String {
    if content.len() > 150 {
        let cut = content
            .char_indices()
            .take_while(|(i, _)| *i < 150)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &content[..cut])
    } else {
        content.to_string()
    }
}

/// One expert in a phase roster.
#[derive(Debug, Clone)]
pub struct Agent {
    role: AgentRole,
    system_prompt: String,
}

impl Agent {
    pub fn new(role: AgentRole, phase: PhaseKind) -> Self {
        Self {
            role,
            system_prompt: prompts::agent_system_prompt(role, phase),
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Produce one utterance, appending it (and any tool traffic) to
    /// the shared history.
    pub async fn take_turn(
        &self,
        phase: PhaseKind,
        history: &mut ChatHistory,
        llm: &dyn ChatCompletion,
        tools: &ToolRouter,
        config: &PipelineConfig,
        telemetry: &dyn TelemetrySink,
        process_id: &str,
    ) -> Result<(), LlmError> {
        let mut tool_rounds = 0u32;

        loop {
            let view = self.build_view(phase, history);
            let message = complete_with_retry(
                llm,
                &view,
                &CompletionSettings::freeform(),
                &config.retry,
                self.role.wire_name(),
            )
            .await?;

            if message.tool_calls.is_empty() {
                let utterance = ChatMessage::assistant(self.role.wire_name(), message.content);
                telemetry
                    .record(TelemetryEvent::AgentActivity {
                        process_id: process_id.to_string(),
                        agent: self.role.wire_name().to_string(),
                        action: classify_activity(&utterance.content, false).to_string(),
                        preview: preview(&utterance.content),
                    })
                    .await;
                history.push(utterance);
                return Ok(());
            }

            tool_rounds += 1;
            if tool_rounds > config.max_tool_rounds {
                warn!(
                    agent = self.role.wire_name(),
                    rounds = tool_rounds,
                    "tool round budget exhausted; closing turn"
                );
                history.push(ChatMessage::assistant(
                    self.role.wire_name(),
                    "Tool budget exhausted for this turn; reporting findings gathered so far.",
                ));
                return Ok(());
            }

            debug!(
                agent = self.role.wire_name(),
                calls = message.tool_calls.len(),
                "executing tool calls"
            );
            telemetry
                .record(TelemetryEvent::AgentActivity {
                    process_id: process_id.to_string(),
                    agent: self.role.wire_name().to_string(),
                    action: "using_tools".to_string(),
                    preview: message
                        .tool_calls
                        .iter()
                        .map(|c| c.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .await;

            let calls = message.tool_calls.clone();
            history.push(ChatMessage::assistant_with_tools(
                self.role.wire_name(),
                message.content,
                calls.clone(),
            ));
            for call in &calls {
                let result = tools.dispatch(call).await;
                history.push(ChatMessage::tool_result(&call.id, result));
            }
        }
    }

    /// The agent's private view: its system prompt, the shared
    /// conversation, and the hand-off instruction.
    fn build_view(&self, phase: PhaseKind, history: &ChatHistory) -> ChatHistory {
        let mut view = ChatHistory::new();
        view.push(ChatMessage::system(self.system_prompt.as_str()));
        for message in history {
            view.push(message.clone());
        }
        view.push(ChatMessage::user(prompts::turn_prompt(self.role, phase)));
        view
    }
}

/// The fixed set of experts for one phase.
#[derive(Debug, Clone)]
pub struct AgentGroup {
    agents: Vec<Agent>,
}

impl AgentGroup {
    pub fn new(phase: PhaseKind, roles: &[AgentRole]) -> Self {
        Self {
            agents: roles.iter().map(|role| Agent::new(*role, phase)).collect(),
        }
    }

    pub fn agent(&self, role: AgentRole) -> Option<&Agent> {
        self.agents.iter().find(|a| a.role() == role)
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        self.agents.iter().map(|a| a.role()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::docs::StaticDocsLookup;
    use crate::history::ToolCall;
    use crate::storage::InMemoryBlobStore;
    use crate::telemetry::MemoryTelemetry;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    struct QueueChat {
        responses: Mutex<VecDeque<ChatMessage>>,
    }

    impl QueueChat {
        fn new(responses: Vec<ChatMessage>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl ChatCompletion for QueueChat {
        async fn get_chat_message_content(
            &self,
            _history: &ChatHistory,
            _settings: &CompletionSettings,
        ) -> Result<ChatMessage, LlmError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(LlmError::EmptyResponse)
        }
    }

    fn test_router(store: Arc<InMemoryBlobStore>) -> ToolRouter {
        ToolRouter::new(
            store,
            Arc::new(StaticDocsLookup::with_default_corpus()),
            Arc::new(FixedClock(Utc::now())),
            "workloads",
        )
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.retry.max_retries = 0;
        config.retry.jitter = false;
        config
    }

    #[tokio::test]
    async fn plain_turn_appends_one_utterance() {
        let llm = QueueChat::new(vec![ChatMessage::assistant(
            "x",
            "I found three manifests in the source folder",
        )]);
        let store = Arc::new(InMemoryBlobStore::new());
        let tools = test_router(store);
        let telemetry = MemoryTelemetry::new();
        let mut history = ChatHistory::new();

        Agent::new(AgentRole::ChiefArchitect, PhaseKind::Analysis)
            .take_turn(
                PhaseKind::Analysis,
                &mut history,
                &llm,
                &tools,
                &fast_config(),
                &telemetry,
                "p1",
            )
            .await
            .unwrap();

        assert_eq!(history.len(), 1);
        let message = history.last().unwrap();
        assert_eq!(message.author_name.as_deref(), Some("Chief_Architect"));
        assert_eq!(
            telemetry.agent_activity_count("Chief_Architect", Some("reporting_findings")),
            1
        );
    }

    #[tokio::test]
    async fn tool_calls_execute_and_pair_into_history() {
        let store = Arc::new(InMemoryBlobStore::new());
        store.seed("workloads", "source", "deployment.yaml", "kind: Deployment");

        let llm = QueueChat::new(vec![
            ChatMessage::assistant_with_tools(
                "x",
                "",
                vec![ToolCall::new(
                    "c1",
                    "find_blobs",
                    json!({"pattern": "*.yaml", "folder_path": "source"}),
                )],
            ),
            ChatMessage::assistant("x", "find_blobs returned: deployment.yaml"),
        ]);
        let tools = test_router(store);
        let telemetry = MemoryTelemetry::new();
        let mut history = ChatHistory::new();

        Agent::new(AgentRole::EksSpecialist, PhaseKind::Analysis)
            .take_turn(
                PhaseKind::Analysis,
                &mut history,
                &llm,
                &tools,
                &fast_config(),
                &telemetry,
                "p1",
            )
            .await
            .unwrap();

        // call message + tool result + final utterance
        assert_eq!(history.len(), 3);
        let messages = history.messages();
        assert!(!messages[0].tool_calls.is_empty());
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("c1"));
        assert!(messages[1].content.contains("deployment.yaml"));
        assert_eq!(messages[2].author_name.as_deref(), Some("EKS_Specialist"));
    }

    #[tokio::test]
    async fn tool_round_budget_closes_the_turn() {
        let looping_call = || {
            ChatMessage::assistant_with_tools(
                "x",
                "",
                vec![ToolCall::new(
                    "c",
                    "datetime_now",
                    json!({}),
                )],
            )
        };
        let llm = QueueChat::new((0..20).map(|_| looping_call()).collect());
        let store = Arc::new(InMemoryBlobStore::new());
        let tools = test_router(store);
        let telemetry = MemoryTelemetry::new();
        let mut history = ChatHistory::new();
        let mut config = fast_config();
        config.max_tool_rounds = 2;

        Agent::new(AgentRole::QaEngineer, PhaseKind::Yaml)
            .take_turn(
                PhaseKind::Yaml,
                &mut history,
                &llm,
                &tools,
                &config,
                &telemetry,
                "p1",
            )
            .await
            .unwrap();

        let last = history.last().unwrap();
        assert!(last.content.contains("Tool budget exhausted"));
    }

    #[test]
    fn activity_classification_matches_content() {
        assert_eq!(classify_activity("Analyzing the manifests", false), "analyzing");
        assert_eq!(classify_activity("Planning the target design", false), "designing");
        assert_eq!(classify_activity("I found two services", false), "reporting_findings");
        assert_eq!(classify_activity("Let me check the folder", false), "thinking");
        assert_eq!(classify_activity("Conversion completed", false), "completed");
        assert_eq!(classify_activity("Hello", false), "responding");
        assert_eq!(classify_activity("anything", true), "using_tools");
    }

    #[test]
    fn group_exposes_roster_roles() {
        let group = AgentGroup::new(
            PhaseKind::Yaml,
            &[AgentRole::YamlSpecialist, AgentRole::QaEngineer],
        );
        assert!(group.agent(AgentRole::YamlSpecialist).is_some());
        assert!(group.agent(AgentRole::ChiefArchitect).is_none());
        assert_eq!(group.roles().len(), 2);
    }
}
