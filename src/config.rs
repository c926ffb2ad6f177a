//! Immutable pipeline configuration, passed explicitly to the driver.

use crate::governor::TruncationPolicy;
use crate::retry::RetryPolicy;
use crate::roster::{PhaseKind, default_round_budget};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Round budgets per phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundBudgets {
    pub analysis: u32,
    pub design: u32,
    pub yaml: u32,
    pub documentation: u32,
}

impl RoundBudgets {
    pub fn for_phase(&self, phase: PhaseKind) -> u32 {
        match phase {
            PhaseKind::Analysis => self.analysis,
            PhaseKind::Design => self.design,
            PhaseKind::Yaml => self.yaml,
            PhaseKind::Documentation => self.documentation,
        }
    }
}

impl Default for RoundBudgets {
    fn default() -> Self {
        Self {
            analysis: default_round_budget(PhaseKind::Analysis),
            design: default_round_budget(PhaseKind::Design),
            yaml: default_round_budget(PhaseKind::Yaml),
            documentation: default_round_budget(PhaseKind::Documentation),
        }
    }
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Wall-clock budget for the whole pipeline, not per phase.
    pub timeout: Duration,
    pub truncation: TruncationPolicy,
    pub retry: RetryPolicy,
    pub round_budgets: RoundBudgets,
    /// Malformed-verdict retries before a phase fails hard_error.
    pub protocol_retry_limit: u32,
    /// Tool-call rounds one agent may run within a single utterance.
    pub max_tool_rounds: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(25 * 60),
            truncation: TruncationPolicy::default(),
            retry: RetryPolicy::orchestration(),
            round_budgets: RoundBudgets::default(),
            protocol_retry_limit: 2,
            max_tool_rounds: 8,
        }
    }
}

impl PipelineConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_truncation(mut self, truncation: TruncationPolicy) -> Self {
        self.truncation = truncation;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_round_budgets(mut self, budgets: RoundBudgets) -> Self {
        self.round_budgets = budgets;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_phase_table() {
        let config = PipelineConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(1500));
        assert_eq!(config.round_budgets.for_phase(PhaseKind::Analysis), 50);
        assert_eq!(config.round_budgets.for_phase(PhaseKind::Design), 100);
        assert_eq!(config.protocol_retry_limit, 2);
    }

    #[test]
    fn builders_override_fields() {
        let config = PipelineConfig::default()
            .with_timeout(Duration::from_secs(60))
            .with_round_budgets(RoundBudgets {
                analysis: 5,
                design: 5,
                yaml: 5,
                documentation: 5,
            });
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.round_budgets.for_phase(PhaseKind::Yaml), 5);
    }
}
