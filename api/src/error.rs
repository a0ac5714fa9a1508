use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tutorgate_core::access::AccessDenied;
use tutorgate_core::error::{self, ApiError};
use tutorgate_core::request::NormalizeError;

use crate::completion::CompletionError;

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        error_code: Option<String>,
        field: Option<String>,
        docs_hint: Option<String>,
    },
    /// Role, verification or license gate rejected the request (401/403)
    Access(AccessDenied),
    /// Model provider failed or timed out (502/504)
    Upstream(CompletionError),
    /// Request method not served by this route (405)
    MethodNotAllowed { allow: &'static str },
    /// Internal error (500)
    Internal(String),
}

impl From<NormalizeError> for AppError {
    fn from(err: NormalizeError) -> Self {
        AppError::Validation {
            message: err.to_string(),
            error_code: Some(err.code().to_string()),
            field: Some("message".to_string()),
            docs_hint: Some("Send a non-empty message or attach an image.".to_string()),
        }
    }
}

impl From<AccessDenied> for AppError {
    fn from(err: AccessDenied) -> Self {
        AppError::Access(err)
    }
}

impl From<CompletionError> for AppError {
    fn from(err: CompletionError) -> Self {
        AppError::Upstream(err)
    }
}

impl AppError {
    /// Stable code for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => error::codes::VALIDATION_FAILED,
            AppError::Access(denied) => denied.code(),
            AppError::Upstream(CompletionError::Timeout) => error::codes::UPSTREAM_TIMEOUT,
            AppError::Upstream(_) => error::codes::UPSTREAM_ERROR,
            AppError::MethodNotAllowed { .. } => error::codes::METHOD_NOT_ALLOWED,
            AppError::Internal(_) => error::codes::INTERNAL_ERROR,
        }
    }
}

fn api_error(code: &str, message: String, request_id: String) -> ApiError {
    ApiError {
        error: message,
        code: code.to_string(),
        error_code: None,
        field: None,
        request_id,
        docs_hint: None,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();
        let code = self.code();
        let mut allow = None;

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                error_code,
                field,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error_code,
                    field,
                    docs_hint,
                    ..api_error(code, message, request_id)
                },
            ),
            AppError::Access(denied) => {
                let status = match denied {
                    AccessDenied::VerificationRequired => StatusCode::UNAUTHORIZED,
                    AccessDenied::TeacherLicenseRequired => StatusCode::FORBIDDEN,
                };
                (
                    status,
                    ApiError {
                        docs_hint: Some(denied.docs_hint().to_string()),
                        ..api_error(code, denied.to_string(), request_id)
                    },
                )
            }
            AppError::Upstream(err) => {
                tracing::warn!(error = %err, "upstream failure");
                let status = match err {
                    CompletionError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, api_error(code, err.to_string(), request_id))
            }
            AppError::MethodNotAllowed { allow: methods } => {
                allow = Some(methods);
                (
                    StatusCode::METHOD_NOT_ALLOWED,
                    api_error(
                        code,
                        format!("Method not allowed. Use {methods}."),
                        request_id,
                    ),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    api_error(code, "An internal error occurred".to_string(), request_id),
                )
            }
        };

        let mut response = (status, Json(api_error)).into_response();
        if let Some(methods) = allow {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(methods));
        }
        response
    }
}

/// Handler for `CatchPanicLayer::custom`: a panicking handler becomes a
/// structured 500 instead of a dropped connection.
pub fn panic_response(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    AppError::Internal(format!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[tokio::test]
    async fn validation_error_carries_missing_message_code() {
        let response = AppError::from(NormalizeError::MissingMessage).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "validation_failed");
        assert_eq!(body["error_code"], "missing_message");
        assert_eq!(body["field"], "message");
    }

    #[tokio::test]
    async fn error_field_is_the_displayable_message() {
        let response = AppError::from(AccessDenied::TeacherLicenseRequired).into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "This action requires a verified teacher license.");
        assert_eq!(body["code"], "teacher_license_required");
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn access_errors_map_to_auth_statuses() {
        let response = AppError::from(AccessDenied::VerificationRequired).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "verification_required");

        let response = AppError::from(AccessDenied::TeacherLicenseRequired).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["code"], "teacher_license_required");
    }

    #[tokio::test]
    async fn upstream_errors_surface_provider_text() {
        let response = AppError::from(CompletionError::Provider {
            status: 429,
            message: "Rate limit reached".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["code"], "upstream_error");
        assert_eq!(body["error"], "Rate limit reached");

        let response = AppError::from(CompletionError::Timeout).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(response).await["code"], "upstream_timeout");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let response = AppError::Internal("db password wrong".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "An internal error occurred");
        assert!(!body.to_string().contains("password"));
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let response = panic_response(Box::new("index out of bounds"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["code"], "internal_error");
    }

    #[tokio::test]
    async fn method_not_allowed_advertises_allow_header() {
        let response = AppError::MethodNotAllowed { allow: "POST" }.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers().get(header::ALLOW).expect("allow header"),
            "POST"
        );
    }
}
