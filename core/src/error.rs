use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response returned by every failing endpoint.
/// Carries a stable machine code plus a message that is safe to show the
/// learner: never a stack trace, never configuration.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Human-readable description of what went wrong, safe to show as is
    pub error: String,
    /// Machine-readable error code (e.g. "validation_failed", "teacher_license_required")
    pub code: String,
    /// Narrower machine code for deterministic remediation (e.g. "missing_message")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about how to resolve the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const MISSING_MESSAGE: &str = "missing_message";
    pub const VERIFICATION_REQUIRED: &str = "verification_required";
    pub const TEACHER_LICENSE_REQUIRED: &str = "teacher_license_required";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const UPSTREAM_TIMEOUT: &str = "upstream_timeout";
    pub const METHOD_NOT_ALLOWED: &str = "method_not_allowed";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const RATE_LIMITED: &str = "rate_limited";
}
