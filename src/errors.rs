//! Typed error hierarchy for the migration engine.
//!
//! Three top-level enums cover the three collaborator boundaries:
//! - `LlmError` - chat-completion service failures
//! - `BlobError` - blob workspace failures
//! - `ProtocolError` - manager protocol violations (malformed verdicts,
//!   out-of-roster selections)
//!
//! `ErrorClassification` maps any failure onto the retry taxonomy the
//! outer queue understands: retryable, ignorable, or critical.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from the chat-completion collaborator.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("chat completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal server error ({status}): {message}")]
    Internal { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("empty completion response")]
    EmptyResponse,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Auth failures that indicate configuration rather than token timing.
/// These must fail fast; retrying would only mask a permission problem.
const PERMANENT_AUTH_PATTERNS: &[&str] = &[
    "insufficient privileges",
    "access denied",
    "forbidden",
    "not authorized",
    "invalid subscription",
    "quota exceeded",
    "invalid client",
    "invalid secret",
];

/// Auth failures that are usually token-lifecycle timing and resolve on
/// their own once the credential refreshes.
const RETRYABLE_AUTH_PATTERNS: &[&str] = &[
    "token",
    "authentication failed",
    "credential",
    "expired",
    "refresh",
    "temporary",
    "transient",
    "timeout",
];

impl LlmError {
    /// Whether the retry utility should attempt this call again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_)
            | Self::Connection(_)
            | Self::RateLimited(_)
            | Self::ServiceUnavailable(_) => true,
            Self::Internal { status, .. } => *status >= 500,
            Self::Auth(message) => Self::auth_error_is_retryable(message),
            Self::InvalidRequest(_) | Self::EmptyResponse => false,
            Self::Other(err) => {
                let message = err.to_string().to_lowercase();
                RETRYABLE_MESSAGE_PATTERNS
                    .iter()
                    .any(|p| message.contains(p))
            }
        }
    }

    /// Only token-timing auth failures are retried; real permission
    /// problems fail fast so they are not masked by backoff.
    fn auth_error_is_retryable(message: &str) -> bool {
        let message = message.to_lowercase();
        if PERMANENT_AUTH_PATTERNS.iter().any(|p| message.contains(p)) {
            return false;
        }
        RETRYABLE_AUTH_PATTERNS.iter().any(|p| message.contains(p))
    }
}

/// Errors from the blob workspace collaborator.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob '{name}' not found in {container}/{folder}")]
    NotFound {
        name: String,
        container: String,
        folder: String,
    },

    #[error("invalid blob pattern '{0}'")]
    InvalidPattern(String),

    #[error("blob backend error: {0}")]
    Backend(String),
}

/// Manager protocol violations. These are handled inside the phase
/// runner (retry or fallback) and never escape a phase as errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed manager verdict: {0}")]
    MalformedVerdict(String),

    #[error("malformed selection result: {0}")]
    MalformedSelection(String),

    #[error("unknown participant '{name}' selected")]
    UnknownParticipant { name: String },
}

/// Retry taxonomy surfaced to the outer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    /// Transient infrastructure failure; the outer queue may requeue
    /// with exponential backoff.
    Retryable,
    /// Known LLM-service hiccup that does not lose progress; the
    /// pipeline logs it and continues.
    Ignorable,
    /// Permanent for this run.
    Critical,
}

/// Message substrings that mark a failure as transient infrastructure.
pub(crate) const RETRYABLE_MESSAGE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "rate limit",
    "too many requests",
    "internal server",
    "service unavailable",
    "bad gateway",
    "gateway timeout",
];

/// Known LLM-service glitches the phases tolerate without losing
/// progress. Narrow on purpose; reassess once retry coverage is proven.
pub(crate) const IGNORABLE_PATTERNS: &[&str] =
    &["empty choices in completion", "duplicate stream chunk"];

/// Whether a failure message matches the ignorable whitelist.
pub fn is_ignorable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    IGNORABLE_PATTERNS.iter().any(|p| message.contains(p))
}

/// Classify an arbitrary failure by its type name and message.
pub fn classify_failure(error_type: &str, message: &str) -> ErrorClassification {
    let message = message.to_lowercase();

    if IGNORABLE_PATTERNS.iter().any(|p| message.contains(p)) {
        return ErrorClassification::Ignorable;
    }

    let retryable_types = [
        "Timeout",
        "Connection",
        "RateLimited",
        "ServiceUnavailable",
        "Internal",
    ];
    if retryable_types.iter().any(|t| error_type.contains(t))
        || RETRYABLE_MESSAGE_PATTERNS
            .iter()
            .any(|p| message.contains(p))
    {
        return ErrorClassification::Retryable;
    }

    ErrorClassification::Critical
}
