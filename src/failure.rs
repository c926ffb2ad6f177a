//! Uniform failure records. Every failure path - exceptions, hard
//! terminations, validation failures - produces the same structured
//! context so the outer queue and dashboards never guess.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::backtrace::Backtrace;

/// Keys whose values are scrubbed from failure snapshots.
const REDACTED_KEY_FRAGMENTS: &[&str] = &["secret", "password", "token", "credential", "api_key"];

const REDACTED: &str = "[REDACTED]";

/// System-level attribution of one failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemFailureContext {
    pub error_type: String,
    pub error_message: String,
    /// Captured while the failure is live; never empty.
    pub stack_trace: String,
    pub step_name: String,
    pub process_id: String,
    pub step_phase: String,
    pub captured_at: DateTime<Utc>,
}

/// Step-level failure record attached to a failed phase state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailureState {
    pub reason: String,
    pub execution_time: f64,
    pub files_attempted: Vec<String>,
    pub system_failure_context: SystemFailureContext,
    /// Redacted snapshot of the inputs in play when the step failed.
    pub context_data: Value,
}

/// Builds failure records with live stack capture and input redaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureCollector;

impl FailureCollector {
    pub fn new() -> Self {
        Self
    }

    /// Gather system attribution for a failure that is live right now.
    #[allow(clippy::too_many_arguments)]
    pub fn collect(
        &self,
        error_type: &str,
        error_message: &str,
        step_name: &str,
        process_id: &str,
        step_phase: &str,
        clock: &dyn Clock,
    ) -> SystemFailureContext {
        let stack_trace = Backtrace::force_capture().to_string();
        SystemFailureContext {
            error_type: error_type.to_string(),
            error_message: error_message.to_string(),
            stack_trace,
            step_name: step_name.to_string(),
            process_id: process_id.to_string(),
            step_phase: step_phase.to_string(),
            captured_at: clock.now(),
        }
    }

    /// Wrap system attribution with step-level detail. The context
    /// snapshot is redacted before it is stored.
    pub fn step_failure(
        &self,
        reason: &str,
        execution_time: f64,
        files_attempted: Vec<String>,
        system_failure_context: SystemFailureContext,
        context_data: Value,
    ) -> StepFailureState {
        StepFailureState {
            reason: reason.to_string(),
            execution_time,
            files_attempted,
            system_failure_context,
            context_data: redact(context_data),
        }
    }
}

/// Comprehensive single-line error message: type, message, and cause
/// chain, in the shape the outer queue logs and surfaces to users.
pub fn comprehensive_error_message(error: &dyn std::error::Error) -> String {
    let mut message = format!(
        "Migration process failed - {}: {error}",
        error_type_name(error)
    );
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!(" | Caused by: {cause}"));
        source = cause.source();
    }
    message
}

fn error_type_name(error: &dyn std::error::Error) -> String {
    // The debug form leads with the variant name for our thiserror
    // enums; keep the first identifier-ish token.
    let debug = format!("{error:?}");
    debug
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .next()
        .unwrap_or("Error")
        .to_string()
}

/// Recursively scrub sensitive keys from a JSON snapshot.
pub fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let lower = key.to_lowercase();
                    if REDACTED_KEY_FRAGMENTS.iter().any(|f| lower.contains(f)) {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, redact(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}
