//! Chat-completion collaborator: the one network surface every phase
//! conversation runs through.
//!
//! The service is expected to fail transiently; callers go through the
//! retry utility rather than invoking the trait directly.

use crate::errors::LlmError;
use crate::history::{ChatHistory, ChatMessage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Settings for one completion call. `response_format` names the schema
/// the model must emit when a structured result is required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionSettings {
    pub response_format: Option<&'static str>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionSettings {
    pub fn freeform() -> Self {
        Self::default()
    }

    pub fn structured(schema_name: &'static str) -> Self {
        Self {
            response_format: Some(schema_name),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Chat-completion service handle, shared within a phase and accessed
/// serially by the cooperative scheduler.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn get_chat_message_content(
        &self,
        history: &ChatHistory,
        settings: &CompletionSettings,
    ) -> Result<ChatMessage, LlmError>;
}

/// Structured result for selection and summary calls: a value plus the
/// model's stated reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringResult {
    pub result: String,
    pub reason: String,
}

impl StringResult {
    /// Schema name passed as `response_format`.
    pub const SCHEMA: &'static str = "StringResult";
}
