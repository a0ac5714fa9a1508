use crate::intent;
use crate::request::{Action, AuthContext, Role, TutoringRequest};

/// Immutable, request-scoped view of everything the pipeline needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TutoringContext {
    pub role: Role,
    pub country: String,
    pub level: String,
    pub subject: String,
    pub topic: String,
    pub requested_action: Action,
    /// Action after lexical intent inference.
    pub effective_action: Action,
    pub message: String,
    pub attempt: u8,
    pub image_data_url: Option<String>,
    pub has_image: bool,
    pub auth: AuthContext,
}

impl TutoringContext {
    pub fn build(request: TutoringRequest) -> Self {
        let effective_action = intent::effective_action(request.requested_action, &request.message);
        let has_image = request.image_data_url.is_some();
        Self {
            role: request.role,
            country: request.country,
            level: request.level,
            subject: request.subject,
            topic: request.topic,
            requested_action: request.requested_action,
            effective_action,
            message: request.message,
            attempt: request.attempt,
            image_data_url: request.image_data_url,
            has_image,
            auth: request.auth,
        }
    }

    pub fn intent_overridden(&self) -> bool {
        self.effective_action != self.requested_action
    }
}
