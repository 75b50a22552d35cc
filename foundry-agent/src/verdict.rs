//! Safety verdicts produced by the classifier.

use serde::{Deserialize, Serialize};

/// The classifier's conclusion about a prompt or generated source.
///
/// Exactly one level applies; `Unsafe` always wins over `NeedsReview`,
/// which wins over `Safe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    /// No rule fired; eligible for approval.
    Safe,
    /// Suspicious signals; a human reviewer has to look before approval
    /// proceeds on their judgement.
    NeedsReview,
    /// A denylist rule fired; approval is permanently blocked.
    Unsafe,
}

impl SafetyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "safe",
            SafetyLevel::NeedsReview => "needs_review",
            SafetyLevel::Unsafe => "unsafe",
        }
    }
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classification result with its supporting evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub level: SafetyLevel,
    /// Confidence that the subject is safe: 1.0 clean, 0.5 suspicious,
    /// 0.0 denied.
    pub score: f32,
    /// One line per rule that fired, or a single "passed" line.
    pub reasons: Vec<String>,
    pub needs_human_review: bool,
}

impl Verdict {
    pub fn safe() -> Self {
        Self::safe_with("passed all safety checks")
    }

    pub fn safe_with(reason: impl Into<String>) -> Self {
        Self {
            level: SafetyLevel::Safe,
            score: 1.0,
            reasons: vec![reason.into()],
            needs_human_review: false,
        }
    }

    pub fn needs_review(reasons: Vec<String>) -> Self {
        Self {
            level: SafetyLevel::NeedsReview,
            score: 0.5,
            reasons,
            needs_human_review: true,
        }
    }

    pub fn unsafe_with(reason: impl Into<String>) -> Self {
        Self {
            level: SafetyLevel::Unsafe,
            score: 0.0,
            reasons: vec![reason.into()],
            needs_human_review: false,
        }
    }

    /// Whether the subject may proceed toward approval. A needs-review
    /// verdict passes; it just keeps the human in the loop.
    pub fn passed(&self) -> bool {
        self.level != SafetyLevel::Unsafe
    }

    /// Flattened reason list for storage in safety notes.
    pub fn notes(&self) -> String {
        self.reasons.join("; ")
    }
}
