//! Telemetry sink: append-only reporting of phase transitions, agent
//! activity, outcomes, and the final UI projection.
//!
//! Telemetry failures never abort the pipeline; implementations must
//! swallow their own errors.

use crate::errors::ErrorClassification;
use crate::projection::{DashboardMetrics, FileManifest};
use crate::roster::PhaseKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Events reported by the pipeline. The sink decides durability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    ProcessStatus {
        process_id: String,
        status: String,
    },
    PhaseTransition {
        process_id: String,
        phase: PhaseKind,
        transition: String,
    },
    AgentActivity {
        process_id: String,
        agent: String,
        action: String,
        preview: String,
    },
    StepOutcome {
        process_id: String,
        phase: PhaseKind,
        success: bool,
        reason: String,
    },
    ReasoningQualityWarning {
        process_id: String,
        phase: PhaseKind,
        detail: String,
    },
    ReasoningQualitySignal {
        process_id: String,
        phase: PhaseKind,
        detail: String,
    },
    FailureRecord {
        process_id: String,
        reason: String,
        stack_trace: String,
        classification: ErrorClassification,
    },
    PipelineOutcome {
        process_id: String,
        success: bool,
        status: String,
        execution_time_secs: f64,
        requires_immediate_retry: bool,
    },
    UiProjection {
        process_id: String,
        file_manifest: FileManifest,
        dashboard_metrics: DashboardMetrics,
    },
    RunReport {
        process_id: String,
        file_name: String,
        summary_line: String,
    },
}

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn record(&self, event: TelemetryEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

#[async_trait]
impl TelemetrySink for NoopTelemetry {
    async fn record(&self, _event: TelemetryEvent) {}
}

/// Buffers events in memory for inspection by tests and dashboards.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Count agent-activity events, optionally filtered by action.
    pub fn agent_activity_count(&self, agent: &str, action: Option<&str>) -> usize {
        self.snapshot()
            .iter()
            .filter(|event| match event {
                TelemetryEvent::AgentActivity {
                    agent: event_agent,
                    action: event_action,
                    ..
                } => event_agent == agent && action.is_none_or(|a| a == event_action),
                _ => false,
            })
            .count()
    }

    /// Reasoning-quality warnings recorded for one phase.
    pub fn quality_warnings_for(&self, phase: PhaseKind) -> usize {
        self.snapshot()
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    TelemetryEvent::ReasoningQualityWarning { phase: p, .. } if *p == phase
                )
            })
            .count()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetry {
    async fn record(&self, event: TelemetryEvent) {
        // A poisoned buffer must not take the pipeline down with it.
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_buffers_in_order() {
        let sink = MemoryTelemetry::new();
        sink.record(TelemetryEvent::ProcessStatus {
            process_id: "p1".into(),
            status: "initializing".into(),
        })
        .await;
        sink.record(TelemetryEvent::ProcessStatus {
            process_id: "p1".into(),
            status: "running".into(),
        })
        .await;

        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            TelemetryEvent::ProcessStatus { status, .. } if status == "running"
        ));
    }

    #[tokio::test]
    async fn agent_activity_counting_filters_by_action() {
        let sink = MemoryTelemetry::new();
        for action in ["selected_for_turn", "responding", "selected_for_turn"] {
            sink.record(TelemetryEvent::AgentActivity {
                process_id: "p1".into(),
                agent: "EKS_Specialist".into(),
                action: action.into(),
                preview: String::new(),
            })
            .await;
        }

        assert_eq!(
            sink.agent_activity_count("EKS_Specialist", Some("selected_for_turn")),
            2
        );
        assert_eq!(sink.agent_activity_count("EKS_Specialist", None), 3);
        assert_eq!(sink.agent_activity_count("GKE_Specialist", None), 0);
    }

    #[test]
    fn events_serialize_with_tags() {
        let event = TelemetryEvent::PhaseTransition {
            process_id: "p1".into(),
            phase: PhaseKind::Analysis,
            transition: "started".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"phase_transition\""));
        assert!(json.contains("\"analysis\""));
    }
}
