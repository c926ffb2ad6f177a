//! Retry utility for chat-completion calls: exponential backoff with
//! jitter, a per-attempt timeout, and presets tuned per call site.

use crate::errors::LlmError;
use crate::history::{ChatHistory, ChatMessage};
use crate::llm::{ChatCompletion, CompletionSettings};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

/// Backoff and timeout configuration for one call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Timeout applied to each individual attempt.
    pub attempt_timeout: Duration,
    /// Up to 25% randomization to avoid thundering herds.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn conservative() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            attempt_timeout: Duration::from_secs(60),
            jitter: true,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.5,
            attempt_timeout: Duration::from_secs(90),
            jitter: true,
        }
    }

    /// Preset for manager selection/termination calls, which sit on the
    /// critical path of every round.
    pub fn orchestration() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            attempt_timeout: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::conservative()
    }
}

/// Delay before the retry following `attempt` (0-based), capped and
/// jittered per policy. Never below 100ms.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponential =
        policy.base_delay.as_secs_f64() * policy.exponential_base.powi(attempt as i32);
    let mut delay = exponential.min(policy.max_delay.as_secs_f64());

    if policy.jitter {
        let jitter_range = delay * 0.25;
        delay += rand::thread_rng().gen_range(-jitter_range..=jitter_range);
    }

    Duration::from_secs_f64(delay.max(0.1))
}

/// Execute a chat completion with bounded retries.
///
/// Non-retryable errors and exhausted budgets surface the final error;
/// per-attempt timeouts are converted to `LlmError::Timeout` and treated
/// as retryable.
pub async fn complete_with_retry(
    service: &dyn ChatCompletion,
    history: &ChatHistory,
    settings: &CompletionSettings,
    policy: &RetryPolicy,
    operation: &str,
) -> Result<ChatMessage, LlmError> {
    let mut last_error: Option<LlmError> = None;

    for attempt in 0..=policy.max_retries {
        let outcome = tokio::time::timeout(
            policy.attempt_timeout,
            service.get_chat_message_content(history, settings),
        )
        .await
        .unwrap_or(Err(LlmError::Timeout(policy.attempt_timeout)));

        match outcome {
            Ok(message) => {
                if attempt > 0 {
                    info!(operation, attempt = attempt + 1, "completion succeeded after retry");
                }
                return Ok(message);
            }
            Err(err) => {
                warn!(
                    operation,
                    attempt = attempt + 1,
                    error = %err,
                    "completion attempt failed"
                );

                if attempt >= policy.max_retries {
                    error!(
                        operation,
                        attempts = policy.max_retries + 1,
                        "completion failed after all attempts"
                    );
                    return Err(err);
                }
                if !err.is_retryable() {
                    error!(operation, error = %err, "non-retryable completion error");
                    return Err(err);
                }

                let delay = backoff_delay(attempt, policy);
                info!(operation, delay_ms = delay.as_millis() as u64, "retrying");
                last_error = Some(err);
                tokio::time::sleep(delay).await;
            }
        }
    }

    // Loop always returns from the final attempt; kept for totality.
    Err(last_error.unwrap_or(LlmError::EmptyResponse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyService {
        failures_before_success: AtomicU32,
        failure: fn() -> LlmError,
    }

    impl FlakyService {
        fn new(failures: u32, failure: fn() -> LlmError) -> Self {
            Self {
                failures_before_success: AtomicU32::new(failures),
                failure,
            }
        }
    }

    #[async_trait]
    impl ChatCompletion for FlakyService {
        async fn get_chat_message_content(
            &self,
            _history: &ChatHistory,
            _settings: &CompletionSettings,
        ) -> Result<ChatMessage, LlmError> {
            if self.failures_before_success.load(Ordering::SeqCst) > 0 {
                self.failures_before_success.fetch_sub(1, Ordering::SeqCst);
                return Err((self.failure)());
            }
            Ok(ChatMessage::assistant("Chief_Architect", "ok"))
        }
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            exponential_base: 2.0,
            attempt_timeout: Duration::from_secs(5),
            jitter: false,
        }
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::conservative()
        };
        assert_eq!(backoff_delay(0, &policy), Duration::from_secs(2));
        assert_eq!(backoff_delay(1, &policy), Duration::from_secs(4));
        assert_eq!(backoff_delay(2, &policy), Duration::from_secs(8));
        // Capped at max_delay.
        assert_eq!(backoff_delay(10, &policy), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_quarter_band() {
        let policy = RetryPolicy::conservative();
        for _ in 0..50 {
            let delay = backoff_delay(1, &policy).as_secs_f64();
            assert!((3.0..=5.0).contains(&delay), "delay {delay} out of band");
        }
    }

    #[test]
    fn presets_match_expected_budgets() {
        assert_eq!(RetryPolicy::conservative().max_retries, 3);
        assert_eq!(RetryPolicy::aggressive().max_retries, 5);
        assert_eq!(RetryPolicy::orchestration().max_retries, 5);
        assert_eq!(
            RetryPolicy::aggressive().attempt_timeout,
            Duration::from_secs(90)
        );
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let service = FlakyService::new(2, || LlmError::RateLimited("429".into()));
        let history = ChatHistory::new();

        let message = complete_with_retry(
            &service,
            &history,
            &CompletionSettings::freeform(),
            &fast_policy(3),
            "test_op",
        )
        .await
        .unwrap();

        assert_eq!(message.content, "ok");
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let service = FlakyService::new(5, || LlmError::InvalidRequest("bad".into()));
        let history = ChatHistory::new();

        let err = complete_with_retry(
            &service,
            &history,
            &CompletionSettings::freeform(),
            &fast_policy(3),
            "test_op",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LlmError::InvalidRequest(_)));
        // Only the initial attempt ran.
        assert_eq!(service.failures_before_success.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_last_error() {
        let service = FlakyService::new(10, || LlmError::ServiceUnavailable("503".into()));
        let history = ChatHistory::new();

        let err = complete_with_retry(
            &service,
            &history,
            &CompletionSettings::freeform(),
            &fast_policy(2),
            "test_op",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LlmError::ServiceUnavailable(_)));
    }
}
