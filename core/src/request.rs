use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::codes;

pub const MAX_COUNTRY_CHARS: usize = 64;
pub const MAX_LEVEL_CHARS: usize = 64;
pub const MAX_SUBJECT_CHARS: usize = 80;
pub const MAX_TOPIC_CHARS: usize = 160;
pub const MAX_MESSAGE_CHARS: usize = 2400;
pub const MAX_ATTEMPT: u8 = 3;
/// Upper bound on the encoded image data URL, in bytes.
pub const MAX_IMAGE_BYTES: usize = 6 * 1024 * 1024;

const IMAGE_MEDIA_TYPE_MARKER: &str = "data:image/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Educator,
    Parent,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Educator => "educator",
            Role::Parent => "parent",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "student" => Some(Role::Student),
            "educator" => Some(Role::Educator),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Explain,
    Check,
    Lesson,
    Worksheet,
    Assessment,
    Slides,
    Custom,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Explain => "explain",
            Action::Check => "check",
            Action::Lesson => "lesson",
            Action::Worksheet => "worksheet",
            Action::Assessment => "assessment",
            Action::Slides => "slides",
            Action::Custom => "custom",
        }
    }

    /// Generation modes that produce teaching material rather than help
    /// for a single learner.
    pub fn is_privileged(self) -> bool {
        matches!(
            self,
            Action::Lesson | Action::Worksheet | Action::Assessment | Action::Slides
        )
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "explain" => Some(Action::Explain),
            "check" => Some(Action::Check),
            "lesson" => Some(Action::Lesson),
            "worksheet" => Some(Action::Worksheet),
            "assessment" => Some(Action::Assessment),
            "slides" => Some(Action::Slides),
            "custom" => Some(Action::Custom),
            _ => None,
        }
    }
}

/// Caller identity as resolved by the verification service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub verified: bool,
    pub teacher_licensed: bool,
}

/// Inbound tutoring payload exactly as the client sent it.
///
/// Every field is loosely typed: numbers may arrive as strings, strings may
/// arrive as numbers, and anything may be missing. [`normalize`] turns this
/// into a [`TutoringRequest`] without ever rejecting a malformed field.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawTutoringRequest {
    /// student | educator | parent (default student)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub role: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub country: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub level: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub subject: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub topic: Option<Value>,
    /// explain | check | lesson | worksheet | assessment | slides | custom (default explain)
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub action: Option<Value>,
    /// Learner message, truncated to 2400 characters
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub message: Option<Value>,
    /// Attempt counter, clamped to 0..=3
    #[serde(default)]
    #[schema(value_type = Option<u8>)]
    pub attempt: Option<Value>,
    /// Optional `data:image/...` URL, at most 6 MiB
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub image_data_url: Option<Value>,
}

/// Normalized, bounded request.
#[derive(Debug, Clone, PartialEq)]
pub struct TutoringRequest {
    pub role: Role,
    pub country: String,
    pub level: String,
    pub subject: String,
    pub topic: String,
    pub requested_action: Action,
    pub message: String,
    pub attempt: u8,
    pub image_data_url: Option<String>,
    pub auth: AuthContext,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("a message or an image is required")]
    MissingMessage,
}

impl NormalizeError {
    pub fn code(&self) -> &'static str {
        match self {
            NormalizeError::MissingMessage => codes::MISSING_MESSAGE,
        }
    }
}

/// Bound and coerce every field. The caller starts unverified; attach the
/// resolved identity with [`TutoringRequest::with_auth`].
pub fn normalize(raw: RawTutoringRequest) -> Result<TutoringRequest, NormalizeError> {
    let message = clamp_text(raw.message.as_ref(), MAX_MESSAGE_CHARS);
    let image_data_url = coerce_image(raw.image_data_url);

    if message.is_empty() && image_data_url.is_none() {
        return Err(NormalizeError::MissingMessage);
    }

    Ok(TutoringRequest {
        role: coerce_text(raw.role.as_ref())
            .as_deref()
            .and_then(Role::parse)
            .unwrap_or(Role::Student),
        country: clamp_text(raw.country.as_ref(), MAX_COUNTRY_CHARS),
        level: clamp_text(raw.level.as_ref(), MAX_LEVEL_CHARS),
        subject: clamp_text(raw.subject.as_ref(), MAX_SUBJECT_CHARS),
        topic: clamp_text(raw.topic.as_ref(), MAX_TOPIC_CHARS),
        requested_action: coerce_text(raw.action.as_ref())
            .as_deref()
            .and_then(Action::parse)
            .unwrap_or(Action::Explain),
        message,
        attempt: clamp_attempt(raw.attempt.as_ref()),
        image_data_url,
        auth: AuthContext::default(),
    })
}

impl TutoringRequest {
    pub fn with_auth(self, auth: AuthContext) -> Self {
        Self { auth, ..self }
    }
}

fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Trim and truncate to `max_chars` Unicode scalar values.
pub fn clamp_text(value: Option<&Value>, max_chars: usize) -> String {
    let Some(text) = coerce_text(value) else {
        return String::new();
    };
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

pub fn clamp_attempt(value: Option<&Value>) -> u8 {
    let parsed = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    };
    parsed.unwrap_or(0).clamp(0, i64::from(MAX_ATTEMPT)) as u8
}

fn coerce_image(value: Option<Value>) -> Option<String> {
    let Value::String(url) = value? else {
        return None;
    };
    let url = url.trim();
    if url.len() > MAX_IMAGE_BYTES {
        return None;
    }
    let marker = url.get(..IMAGE_MEDIA_TYPE_MARKER.len())?;
    if !marker.eq_ignore_ascii_case(IMAGE_MEDIA_TYPE_MARKER) {
        return None;
    }
    Some(url.to_string())
}
