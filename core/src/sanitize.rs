//! Plain-text normalization of raw model output.
//!
//! Every rule either removes characters or rewrites a token into a form the
//! rule no longer matches, so repeating the rule set reaches a fixed point.
//! [`sanitize`] iterates to that fixed point, which makes it idempotent and
//! independent of the order in which markup is nested.

use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    re: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        re: Regex::new(pattern).expect("valid sanitizer regex"),
        replacement,
    }
}

const HIDDEN_TAGS: &str =
    "think|thinking|thought|analysis|reasoning|internal|hidden|scratchpad|system";
const EMPHASIS_TAGS: &str = "b|i|u|em|strong|mark|ins|del|s|sup|sub|span|font";
const QUOTED_ATTRS: &str = r#"(?:\s+[\w:-]+\s*=\s*(?:"[^"]*"|'[^']*'))*"#;

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"\r\n?", "\n"),
        // Hidden spans the model may echo, then any unpaired leftovers.
        rule(
            &format!(r"(?is)<(?:{HIDDEN_TAGS})\b[^>]*>.*?</(?:{HIDDEN_TAGS})\s*>"),
            "",
        ),
        rule(&format!(r"(?i)</?(?:{HIDDEN_TAGS})\b[^>]*>"), ""),
        // Code fences and inline code.
        rule(r"(?m)^[ \t]*(?:```|~~~)[^\n]*$", ""),
        rule(r"`+", ""),
        // Headings and blockquotes.
        rule(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+", ""),
        rule(r"(?m)^[ \t]{0,3}#{1,6}$", ""),
        rule(r"(?m)^[ \t]*>[ \t]?", ""),
        // Horizontal rules.
        rule(r"(?m)^[ \t]*(?:[-*_][ \t]*){3,}$", ""),
        // Links and images keep their text.
        rule(r"!?\[([^\]\n]*)\]\([^)\n]*\)", "$1"),
        // Emphasis.
        rule(
            r"(^|[^\w*])\*\*\*([^\s*](?:[^*\n]*[^\s*])?)\*\*\*($|[^\w*])",
            "$1$2$3",
        ),
        rule(
            r"(^|[^\w*])\*\*([^\s*](?:[^*\n]*[^\s*])?)\*\*($|[^\w*])",
            "$1$2$3",
        ),
        rule(r"(^|[^\w_])__([^\s_](?:[^_\n]*[^\s_])?)__($|[^\w_])", "$1$2$3"),
        rule(r"~~([^~\n]+)~~", "$1"),
        rule(
            r"(^|[^\w*])\*([^\s*](?:[^*\n]*[^\s*])?)\*($|[^\w*])",
            "$1$2$3",
        ),
        rule(r"(^|[^\w_])_([^\s_](?:[^_\n]*[^\s_])?)_($|[^\w_])", "$1$2$3"),
        // Only real tag syntax: `a<b and b>c` is an inequality, not a tag.
        rule(&format!(r"(?i)<(?:{EMPHASIS_TAGS}){QUOTED_ATTRS}\s*/?>"), ""),
        rule(&format!(r"(?i)</(?:{EMPHASIS_TAGS})\s*>"), ""),
        // Bullets drawn with asterisks or plus signs become dashes.
        rule(r"(?m)^([ \t]*)[*+][ \t]+", "$1- "),
        // Math markup.
        rule(r"\\[dt]?frac\s*\{([^{}]*)\}\s*\{([^{}]*)\}", "$1/$2"),
        rule(r"\\sqrt\s*\{([^{}]*)\}", "sqrt($1)"),
        rule(
            r"\\(?:text|textbf|textit|textrm|mathrm|mathbf|mathit|operatorname|mbox)\s*\{([^{}]*)\}",
            "$1",
        ),
        rule(r"\\(?:begin|end)\s*\{[^{}]*\}", ""),
        rule(r"\\(?:times|cdot|ast)([^A-Za-z]|$)", "×$1"),
        rule(r"\\div([^A-Za-z]|$)", "÷$1"),
        rule(r"\\pm([^A-Za-z]|$)", "±$1"),
        rule(r"\\(?:leq|le)([^A-Za-z]|$)", "≤$1"),
        rule(r"\\(?:geq|ge)([^A-Za-z]|$)", "≥$1"),
        rule(r"\\(?:neq|ne)([^A-Za-z]|$)", "≠$1"),
        rule(r"\\approx([^A-Za-z]|$)", "≈$1"),
        rule(r"\\pi([^A-Za-z]|$)", "π$1"),
        rule(r"\\(?:left|right)([^A-Za-z]|$)", "$1"),
        rule(r"[⋅∙]", "×"),
        rule(r"\^\{([^{}]*)\}", "^$1"),
        // Math delimiters and spacing commands.
        rule(r"\$\$", ""),
        rule(r"\\[\[\]()]", ""),
        rule(r"\$([^$\n]+)\$", "$1"),
        rule(r"\\[,;:! ]", " "),
        // Whitespace.
        rule(r"(?m)[ \t]+$", ""),
        rule(r"\n{3,}", "\n\n"),
    ]
});

/// Strip markup and math notation from raw model text, producing plain prose.
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.to_string();
    loop {
        let next = apply_rules(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn apply_rules(text: &str) -> String {
    let mut out = text.to_string();
    for rule in RULES.iter() {
        out = rule.re.replace_all(&out, rule.replacement).into_owned();
    }
    out.trim().to_string()
}
