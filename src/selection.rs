//! Selection sanitizer: turns whatever the manager model emitted into a
//! role from the phase roster, or the canonical lead when it cannot.
//!
//! Models dress up role names ("I select EKS_Specialist as the next
//! participant") or answer with verdict words ("Complete"). Neither may
//! abort a phase; every malformed selection resolves to the safe
//! fallback.

use crate::roster::AgentRole;
use regex::Regex;
use std::sync::LazyLock;

/// Verbosity prefixes models prepend to the role name.
const PREFIXES: &[&str] = &[
    "Select ",
    "Selected ",
    "I select ",
    "I choose ",
    "Let me select ",
    "I will select ",
    "Next participant selected: ",
    "Next participant: ",
    "Selected participant: ",
    "Participant: ",
];

/// Known illegitimate outputs: termination vocabulary leaking into the
/// selection channel.
const ILLEGITIMATE: &[&str] = &[
    "Success",
    "Complete",
    "Completed",
    "Terminate",
    "Terminated",
    "Done",
    "Finished",
    "Yes",
    "No",
    "None",
    "Unknown",
];

static EXTRACTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(\w+)(?:\s+as\s+the\s+next\s+participant.*)?$",
        r"(\w+)\s+(?:as\s+the\s+next\s+participant|should\s+be\s+next|for\s+the\s+next\s+step)",
        r"Next:\s*(\w+)",
        r"Agent:\s*(\w+)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Outcome of resolving a raw selection against the eligible roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOutcome {
    pub role: AgentRole,
    pub reason: String,
    /// True when the raw output was unusable and the canonical lead was
    /// substituted.
    pub fell_back: bool,
}

/// Resolve the model's raw selection output.
pub fn resolve_selection(
    raw: &str,
    reason: &str,
    eligible: &[AgentRole],
    canonical_lead: AgentRole,
) -> SelectionOutcome {
    let fallback = |reason: String| SelectionOutcome {
        role: canonical_lead,
        reason,
        fell_back: true,
    };

    let mut candidate = raw.trim().to_string();
    for prefix in PREFIXES {
        if let Some(stripped) = candidate.strip_prefix(prefix) {
            candidate = stripped.trim().to_string();
            break;
        }
    }

    if ILLEGITIMATE
        .iter()
        .any(|word| candidate.eq_ignore_ascii_case(word))
    {
        return fallback(format!(
            "selection channel produced termination vocabulary '{candidate}'"
        ));
    }

    if let Some(role) = lookup(&candidate, eligible) {
        return SelectionOutcome {
            role,
            reason: reason.to_string(),
            fell_back: false,
        };
    }

    // The candidate is not a bare role name; try extraction patterns.
    for pattern in EXTRACTION_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(&candidate) {
            if let Some(name) = captures.get(1) {
                if let Some(role) = lookup(name.as_str(), eligible) {
                    return SelectionOutcome {
                        role,
                        reason: reason.to_string(),
                        fell_back: false,
                    };
                }
            }
        }
    }

    fallback(format!("'{raw}' is not an eligible participant"))
}

fn lookup(name: &str, eligible: &[AgentRole]) -> Option<AgentRole> {
    AgentRole::from_wire_name(name).filter(|role| eligible.contains(role))
}
