//! Progressive disclosure: when a final answer may appear, and how to spot
//! one that slipped through.
//!
//! Leak detection is heuristic. False positives only cost one rewrite call;
//! false negatives are tracked by the labeled corpus in the tests below.

use std::sync::LazyLock;

use regex::Regex;

use crate::context::TutoringContext;
use crate::request::{Action, MAX_ATTEMPT, Role};

/// Fixed hint returned when the model keeps revealing the answer.
/// Must never satisfy [`AttemptGate::is_leak`].
/// Carries no verdict: it may replace a reply that confirmed correct work.
pub const SAFE_HINT_FALLBACK: &str = "Let's work through it together. \
Walk through each step you wrote and check every operation carefully. \
Which step do you feel least sure about?";

/// Longest line still treated as a bare result such as `x = 12`.
pub const BARE_RESULT_MAX_CHARS: usize = 24;

pub trait DisclosurePolicy: Send + Sync {
    /// Whether a definitive final answer must be withheld for this request.
    fn withholds_final_answer(&self, ctx: &TutoringContext) -> bool;

    /// Whether sanitized model output reveals a final answer.
    fn is_leak(&self, text: &str) -> bool;
}

static ANNOUNCEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(?:the\s+)?(?:final|correct|right|exact)\s+(?:answer|result|solution|value)\b
        | \bthe\s+(?:answer|result|solution)\s+(?:is|would\s+be|should\s+be|equals)\b
        | \b(?:so|therefore|thus|hence),?\s+(?:the\s+)?(?:answer|result)\b
        | \banswer\s*:
        | \bit\s+(?:equals|comes\s+out\s+to)\b
        | \byou\s+should\s+(?:get|have\s+gotten)\b
        ",
    )
    .expect("valid announcement regex")
});

static EQUALS_NUMERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=\s*[-−]?\d").expect("valid equals regex"));

static BARE_RESULT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\d\s.,+\-−*/×÷=^()%]+$").expect("valid bare result regex")
});

/// Default policy: withhold for students in check mode until the attempt
/// counter reaches `reveal_at`.
#[derive(Debug, Clone, Copy)]
pub struct AttemptGate {
    pub reveal_at: u8,
}

impl Default for AttemptGate {
    fn default() -> Self {
        Self {
            reveal_at: MAX_ATTEMPT,
        }
    }
}

impl DisclosurePolicy for AttemptGate {
    fn withholds_final_answer(&self, ctx: &TutoringContext) -> bool {
        ctx.role == Role::Student
            && ctx.effective_action == Action::Check
            && ctx.attempt > 0
            && ctx.attempt < self.reveal_at
    }

    fn is_leak(&self, text: &str) -> bool {
        ANNOUNCEMENT_RE.is_match(text)
            || EQUALS_NUMERAL_RE.is_match(text)
            || has_bare_result_line(text)
    }
}

fn has_bare_result_line(text: &str) -> bool {
    text.lines().map(str::trim).any(|line| {
        !line.is_empty()
            && line.chars().count() <= BARE_RESULT_MAX_CHARS
            && line.chars().any(|c| c.is_ascii_digit())
            && BARE_RESULT_LINE_RE.is_match(line)
    })
}
