//! Prompt composition. Pure: the same context always yields the same
//! messages.

use crate::context::TutoringContext;
use crate::exchange::ChatMessage;
use crate::request::{Action, MAX_ATTEMPT};

pub const CORRECT_MARKER: &str = "Correct";
pub const NOT_QUITE_MARKER: &str = "Not quite";

const FORMAT_RULES: &str = "Output rules:
- Write plain text only. No Markdown, no headings, no bold or italics, no tables, no code blocks.
- Never use LaTeX or any math markup. Write math the way it reads, for example \"5 divided by 4 = 1.25\", \"3 × 4 = 12\" or \"sqrt(16) = 4\".
- Be direct and confident. Do not hedge with phrases like \"I think\", \"maybe\" or \"it seems\".
- If information you need is missing, ask exactly one short clarifying question and stop.";

const IMAGE_RULES: &str = "The learner attached an image. Start by describing what it shows in one short sentence. \
If the image is unreadable, ask at most one clarifying question about it.";

pub const REWRITE_DIRECTIVE: &str = "Rewrite directive: the reply below revealed a final answer, which is not allowed yet. \
Rewrite it so that it removes any final answer and any final-answer phrasing (such as \"the answer is\" or an equals sign followed by a result). \
Keep only hints and the next step the learner should look at. Keep the same first line marker and the plain-text rules.";

/// The two segments sent on the primary call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub user: ChatMessage,
}

impl ComposedPrompt {
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![ChatMessage::system(self.system.clone()), self.user.clone()]
    }
}

pub fn compose(ctx: &TutoringContext) -> ComposedPrompt {
    let system = system_block(ctx);
    let text = user_block(ctx);
    let user = match ctx.image_data_url.as_deref() {
        Some(url) if ctx.has_image => ChatMessage::user_with_image(text, url),
        _ => ChatMessage::user(text),
    };
    ComposedPrompt { system, user }
}

/// Messages for the corrective call: the original system block extended with
/// the rewrite directive, and the leaking reply as the only user input.
pub fn rewrite_messages(system: &str, prior_reply: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!("{system}\n\n{REWRITE_DIRECTIVE}")),
        ChatMessage::user(format!("Reply to rewrite:\n{prior_reply}")),
    ]
}

fn system_block(ctx: &TutoringContext) -> String {
    let mut sections = vec![
        format!(
            "You are a patient tutor helping a {}{}.",
            ctx.role.as_str(),
            learner_profile(ctx)
        ),
        FORMAT_RULES.to_string(),
        disclosure_rules(ctx.attempt),
    ];
    if ctx.has_image {
        sections.push(IMAGE_RULES.to_string());
    }
    sections.join("\n\n")
}

fn learner_profile(ctx: &TutoringContext) -> String {
    let mut parts = Vec::new();
    if !ctx.subject.is_empty() {
        parts.push(format!(" with {}", ctx.subject));
    }
    if !ctx.topic.is_empty() {
        parts.push(format!(" (topic: {})", ctx.topic));
    }
    if !ctx.level.is_empty() {
        parts.push(format!(" at {} level", ctx.level));
    }
    if !ctx.country.is_empty() {
        parts.push(format!(" following the curriculum used in {}", ctx.country));
    }
    parts.concat()
}

fn disclosure_rules(attempt: u8) -> String {
    match attempt {
        0 => "Disclosure: this is the learner's first look at the problem. Explain the method clearly \
and show how each step works."
            .to_string(),
        a if a < MAX_ATTEMPT => format!(
            "Disclosure: the learner is on attempt {a} of {MAX_ATTEMPT}. Do not state the final answer or final result. \
Give hints, point to the first step that went wrong, and say what to try next."
        ),
        _ => format!(
            "Disclosure: the learner has made {MAX_ATTEMPT} attempts. You may now state the final result, \
then show the steps that lead to it."
        ),
    }
}

fn user_block(ctx: &TutoringContext) -> String {
    let framing = match ctx.effective_action {
        Action::Check => format!(
            "Check the learner's work. The first line of your reply must be exactly \"{CORRECT_MARKER}\" or \"{NOT_QUITE_MARKER}\". \
After that line, give short numbered steps."
        ),
        Action::Explain => "Explain this to the learner.".to_string(),
        Action::Lesson => {
            "Create a lesson plan with objectives, activities and timings.".to_string()
        }
        Action::Worksheet => {
            "Create a practice worksheet with graded questions and an answer key at the end.".to_string()
        }
        Action::Assessment => {
            "Create a short assessment with questions, marks and a marking rubric.".to_string()
        }
        Action::Slides => {
            "Create a slide outline with a title and key points for each slide.".to_string()
        }
        Action::Custom => "Respond to the request below.".to_string(),
    };

    let shape = if ctx.effective_action == Action::Check {
        ""
    } else {
        "\nUse short numbered steps. End with one optional quick question that checks understanding."
    };

    let message = if ctx.message.is_empty() {
        "(no text, see the attached image)"
    } else {
        ctx.message.as_str()
    };

    format!("{framing}{shape}\n\nLearner message:\n{message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MessageContent, MessageRole};
    use crate::request::{AuthContext, Role};

    fn ctx(action: Action, attempt: u8) -> TutoringContext {
        TutoringContext {
            role: Role::Student,
            country: "Kenya".to_string(),
            level: "Grade 6".to_string(),
            subject: "Mathematics".to_string(),
            topic: "Fractions".to_string(),
            requested_action: action,
            effective_action: action,
            message: "What is 5/4 as a decimal?".to_string(),
            attempt,
            image_data_url: None,
            has_image: false,
            auth: AuthContext::default(),
        }
    }

    #[test]
    fn system_block_carries_format_rules_and_profile() {
        let prompt = compose(&ctx(Action::Explain, 0));
        assert!(prompt.system.contains("plain text only"));
        assert!(prompt.system.contains("5 divided by 4 = 1.25"));
        assert!(prompt.system.contains("exactly one short clarifying question"));
        assert!(prompt.system.contains("Mathematics"));
        assert!(prompt.system.contains("Kenya"));
        assert!(!prompt.system.contains("attached an image"));
    }

    #[test]
    fn disclosure_paragraph_tracks_attempt() {
        for attempt in [1, 2] {
            let prompt = compose(&ctx(Action::Check, attempt));
            assert!(prompt.system.contains("Do not state the final answer"));
        }
        let final_round = compose(&ctx(Action::Check, 3));
        assert!(final_round.system.contains("You may now state the final result"));
        assert!(!final_round.system.contains("Do not state the final answer"));
    }

    #[test]
    fn check_mode_requires_marker_first_line() {
        let prompt = compose(&ctx(Action::Check, 1));
        let text = prompt.user.text();
        assert!(text.contains("\"Correct\" or \"Not quite\""));
        assert!(!text.contains("quick question"));
    }

    #[test]
    fn explain_mode_requests_numbered_steps() {
        let prompt = compose(&ctx(Action::Explain, 0));
        let text = prompt.user.text();
        assert!(text.starts_with("Explain this"));
        assert!(text.contains("short numbered steps"));
        assert!(text.ends_with("What is 5/4 as a decimal?"));
    }

    #[test]
    fn image_requests_use_composite_user_segment() {
        let mut context = ctx(Action::Explain, 0);
        context.image_data_url = Some("data:image/png;base64,AAAA".to_string());
        context.has_image = true;
        context.message.clear();
        let prompt = compose(&context);
        assert!(prompt.system.contains("describing what it shows"));
        assert!(matches!(
            prompt.user.content,
            MessageContent::Parts(ref parts) if parts.len() == 2
        ));
        assert!(prompt.user.text().contains("see the attached image"));
    }

    #[test]
    fn composition_is_deterministic() {
        let context = ctx(Action::Worksheet, 2);
        assert_eq!(compose(&context), compose(&context));
    }

    #[test]
    fn rewrite_extends_original_system_prompt() {
        let prompt = compose(&ctx(Action::Check, 1));
        let messages = rewrite_messages(&prompt.system, "The answer is 4.");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        let system = messages[0].text();
        assert!(system.starts_with(&prompt.system));
        assert!(system.contains("removes any final answer"));
        assert!(messages[1].text().ends_with("The answer is 4."));
    }
}
