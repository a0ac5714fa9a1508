//! Lexical intent inference.
//!
//! A learner who asks to have an answer checked is in `check` mode even when
//! the client declared something else. The override only ever points towards
//! `check`; it never downgrades a declared `check`.

use std::sync::LazyLock;

use regex::Regex;

use crate::request::Action;

static CHECK_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \bcheck\s+(?:my|this|the)\s+(?:answer|work|solution|result)s?\b
        | \bcan\s+you\s+check\b
        | \bis\s+(?:this|that|it|mine)\s+(?:correct|right)\b
        | \bis\s+my\s+(?:answer|solution|result|working)\s+(?:correct|right)\b
        | \bis\s+the\s+answer\s+(?:correct|right)\b
        | \bdid\s+i\s+(?:get\s+(?:it|this|that)\s+)?(?:right|correct)\b
        | \bdid\s+i\s+do\s+(?:it|this|that)\s+right\b
        | \bam\s+i\s+(?:right|correct)\b
        ",
    )
    .expect("valid check phrase regex")
});

/// An arithmetic expression followed by `=` and a number, e.g. `2+2=5` or
/// `12 ÷ 4 = 3`.
static EQUATION_RESULT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\d)]\s*[-+*/×÷^x]\s*[\d(][\d\s.,+\-*/×÷^x()]*=\s*-?\d")
        .expect("valid equation regex")
});

/// True when the message reads as a request to verify an answer.
pub fn wants_answer_check(message: &str) -> bool {
    let normalized = message.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
    CHECK_PHRASE_RE.is_match(&normalized) || EQUATION_RESULT_RE.is_match(&normalized)
}

/// Resolve the action that will actually run.
pub fn effective_action(requested: Action, message: &str) -> Action {
    if requested != Action::Check && wants_answer_check(message) {
        Action::Check
    } else {
        requested
    }
}
