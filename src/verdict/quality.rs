//! Reasoning-quality assessment for "cannot complete" claims.
//!
//! An agent that says it could not finish must ground the claim in tool
//! output. Reasons that match the generic-excuse patterns without any
//! quoted tool evidence earn a telemetry warning (never a failure); the
//! manager is coached via the next phase's prompt instead.

/// Generic excuses that indicate no verification was performed.
pub const HALLUCINATION_PATTERNS: &[&str] = &[
    "limited analysis data",
    "require deeper investigation",
    "complex configurations",
    "advanced settings need",
    "insufficient details",
    "further investigation needed",
];

/// Markers that the agent actually invoked tools and quoted results.
pub const EVIDENCE_PATTERNS: &[&str] = &[
    "check_blob_exists",
    "list_blobs_in_container",
    "read_blob_content",
    "returned:",
    "got error:",
    "file not found",
    "access denied",
    "empty folder",
];

/// Outcome of scanning a reasoning text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningQuality {
    /// Quoted tool output present.
    EvidenceBacked,
    /// Generic excuse with no evidence.
    Generic,
    /// Neither pattern set matched.
    Neutral,
}

/// Assess a single reasoning text.
pub fn assess_reasoning(text: &str) -> ReasoningQuality {
    let lower = text.to_lowercase();
    let has_evidence = EVIDENCE_PATTERNS.iter().any(|p| lower.contains(p));
    let has_hallucination = HALLUCINATION_PATTERNS.iter().any(|p| lower.contains(p));

    if has_evidence {
        ReasoningQuality::EvidenceBacked
    } else if has_hallucination {
        ReasoningQuality::Generic
    } else {
        ReasoningQuality::Neutral
    }
}

/// Assess a set of reasoning texts as one claim: evidence anywhere
/// redeems the whole set; a generic excuse anywhere without evidence
/// marks the set generic.
pub fn assess_combined<'a>(texts: impl IntoIterator<Item = &'a str>) -> ReasoningQuality {
    let mut saw_generic = false;
    for text in texts {
        match assess_reasoning(text) {
            ReasoningQuality::EvidenceBacked => return ReasoningQuality::EvidenceBacked,
            ReasoningQuality::Generic => saw_generic = true,
            ReasoningQuality::Neutral => {}
        }
    }
    if saw_generic {
        ReasoningQuality::Generic
    } else {
        ReasoningQuality::Neutral
    }
}
