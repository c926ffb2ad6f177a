//! Chat history governor: keeps a phase conversation under the model's
//! context budget without losing the evidence the termination protocol
//! depends on.
//!
//! Agents are coached to cite literal tool outputs when making
//! termination claims. A naive keep-last-N window discards exactly those
//! outputs, so the governor reserves recent tool call/result units
//! before filling the remaining window with regular messages.

use crate::history::{ChatHistory, ChatMessage, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Coarse token estimate, deliberately conservative on the high side.
const CHARS_PER_TOKEN: f64 = 3.5;

/// Budgets applied when truncating a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationPolicy {
    /// Estimated-token ceiling across all surviving messages.
    pub max_total_tokens: usize,
    /// Maximum number of surviving messages.
    pub max_messages: usize,
    /// Per-message token ceiling; longer content is elided head+tail.
    pub max_tokens_per_message: usize,
    /// Keep the most recent system message.
    pub preserve_system: bool,
    /// Number of recent tool-traffic messages reserved, counted in
    /// whole call/result units.
    pub preserve_recent_tool_calls: usize,
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self {
            max_total_tokens: 3000,
            max_messages: 8,
            max_tokens_per_message: 400,
            preserve_system: true,
            preserve_recent_tool_calls: 6,
        }
    }
}

/// Estimate the token count of a text.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        (text.len() as f64 / CHARS_PER_TOKEN) as usize
    }
}

fn floor_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Elide the middle of an oversized message, keeping the first and last
/// thirds with a visible marker naming the removed size.
pub fn truncate_content(content: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens * 4;
    if content.len() <= max_chars {
        return content.to_string();
    }

    let keep = max_chars / 3;
    if keep == 0 {
        return content[..floor_boundary(content, max_chars)].to_string();
    }

    let head = &content[..floor_boundary(content, keep)];
    let tail = &content[ceil_boundary(content, content.len() - keep)..];
    let removed = content.len() - head.len() - tail.len();
    format!("{head}\n\n[... CONTENT TRUNCATED - REMOVED {removed} CHARACTERS ...]\n\n{tail}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitKind {
    System,
    Tool,
    Regular,
}

/// A preservation unit: either a single message, or an assistant
/// tool-call message together with its result messages.
struct Unit {
    kind: UnitKind,
    indices: Vec<usize>,
}

fn partition_units(history: &ChatHistory) -> Vec<Unit> {
    let mut units: Vec<Unit> = Vec::new();
    for (index, message) in history.iter().enumerate() {
        if message.role == Role::System {
            units.push(Unit {
                kind: UnitKind::System,
                indices: vec![index],
            });
        } else if !message.tool_calls.is_empty() {
            units.push(Unit {
                kind: UnitKind::Tool,
                indices: vec![index],
            });
        } else if message.role == Role::Tool {
            // Attach the result to the call that requested it when the
            // pair is adjacent, otherwise track it as its own unit.
            let previous = index.checked_sub(1);
            match units.last_mut() {
                Some(unit)
                    if unit.kind == UnitKind::Tool
                        && unit.indices.last().copied() == previous =>
                {
                    unit.indices.push(index)
                }
                _ => units.push(Unit {
                    kind: UnitKind::Tool,
                    indices: vec![index],
                }),
            }
        } else {
            units.push(Unit {
                kind: UnitKind::Regular,
                indices: vec![index],
            });
        }
    }
    units
}

/// Enforces a `TruncationPolicy` over a phase conversation.
#[derive(Debug, Clone)]
pub struct HistoryGovernor {
    policy: TruncationPolicy,
}

impl HistoryGovernor {
    pub fn new(policy: TruncationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TruncationPolicy {
        &self.policy
    }

    /// Mutate the history in place so that total estimated tokens,
    /// message count, and per-message size all fit the policy. Surviving
    /// messages keep their original relative order.
    pub fn enforce(&self, history: &mut ChatHistory) {
        if history.is_empty() {
            return;
        }

        let total: usize = history.iter().map(|m| estimate_tokens(&m.content)).sum();
        if total <= self.policy.max_total_tokens && history.len() <= self.policy.max_messages {
            self.cap_message_sizes(history);
            return;
        }

        debug!(
            messages = history.len(),
            estimated_tokens = total,
            "truncating chat history"
        );

        let units = partition_units(history);

        // Most recent system message.
        let mut kept: Vec<usize> = Vec::new();
        let mut system_count = 0usize;
        if self.policy.preserve_system {
            if let Some(unit) = units.iter().rev().find(|u| u.kind == UnitKind::System) {
                kept.extend(&unit.indices);
                system_count = 1;
            }
        }

        // Recent tool traffic, whole units, most recent first.
        let mut tool_budget = self
            .policy
            .preserve_recent_tool_calls
            .min(self.policy.max_messages.saturating_sub(system_count));
        let mut tool_kept = 0usize;
        for unit in units.iter().rev().filter(|u| u.kind == UnitKind::Tool) {
            if unit.indices.len() > tool_budget {
                continue;
            }
            kept.extend(&unit.indices);
            tool_budget -= unit.indices.len();
            tool_kept += unit.indices.len();
        }

        // Fill the remaining window with the most recent regular messages.
        let mut regular_budget = self
            .policy
            .max_messages
            .saturating_sub(system_count + tool_kept);
        for unit in units.iter().rev().filter(|u| u.kind == UnitKind::Regular) {
            if regular_budget == 0 {
                break;
            }
            kept.extend(&unit.indices);
            regular_budget -= 1;
        }

        kept.sort_unstable();
        let mut survivors: Vec<(usize, ChatMessage)> = kept
            .into_iter()
            .map(|i| (i, history.messages()[i].clone()))
            .collect();

        for (_, message) in survivors.iter_mut() {
            message.content = truncate_content(&message.content, self.policy.max_tokens_per_message);
        }

        self.drop_until_within_budget(&mut survivors);

        history.replace(survivors.into_iter().map(|(_, m)| m).collect());
    }

    fn cap_message_sizes(&self, history: &mut ChatHistory) {
        for message in history.messages_mut() {
            if estimate_tokens(&message.content) > self.policy.max_tokens_per_message {
                message.content =
                    truncate_content(&message.content, self.policy.max_tokens_per_message);
            }
        }
    }

    /// Final token-budget pass. Preference order for further drops:
    /// oldest regular survivors, then oldest whole tool units, never
    /// the preserved system message.
    fn drop_until_within_budget(&self, survivors: &mut Vec<(usize, ChatMessage)>) {
        let total = |msgs: &[(usize, ChatMessage)]| -> usize {
            msgs.iter().map(|(_, m)| estimate_tokens(&m.content)).sum()
        };

        while total(survivors) > self.policy.max_total_tokens {
            if let Some(index) = survivors
                .iter()
                .position(|(_, m)| m.role != Role::System && !m.is_tool_traffic())
            {
                survivors.remove(index);
                continue;
            }

            if let Some(index) = survivors.iter().position(|(_, m)| m.is_tool_traffic()) {
                // Remove the whole unit: the call message and the
                // results that follow it.
                survivors.remove(index);
                while index < survivors.len() && survivors[index].1.role == Role::Tool {
                    survivors.remove(index);
                }
                continue;
            }

            // Only the system message remains; shrink it to fit.
            if let Some((_, message)) = survivors.first_mut() {
                message.content =
                    truncate_content(&message.content, self.policy.max_total_tokens / 2);
            }
            break;
        }
    }
}
