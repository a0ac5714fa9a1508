use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tutorgate_core::request::{MAX_IMAGE_BYTES, RawTutoringRequest};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;
use crate::verification::bearer_token;

/// One embedded image plus the text fields and JSON framing.
pub const MAX_BODY_BYTES: usize = MAX_IMAGE_BYTES + 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tutor", post(tutor).fallback(method_not_allowed))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TutorResponse {
    /// Plain-text reply, free of markup
    pub reply: String,
}

/// Ask the tutor.
///
/// The declared `action` may be overridden to `check` when the message asks
/// for an answer to be verified. While a student is between attempts 1 and 2
/// in check mode, the reply never contains the final answer.
#[utoipa::path(
    post,
    path = "/v1/tutor",
    request_body = RawTutoringRequest,
    responses(
        (status = 200, description = "Tutoring reply", body = TutorResponse),
        (status = 400, description = "Missing message and image, or malformed body", body = tutorgate_core::error::ApiError),
        (status = 401, description = "Verification required", body = tutorgate_core::error::ApiError),
        (status = 403, description = "Teacher license required", body = tutorgate_core::error::ApiError),
        (status = 405, description = "Only POST is accepted", body = tutorgate_core::error::ApiError),
        (status = 429, description = "Rate limited", body = tutorgate_core::error::ApiError),
        (status = 502, description = "Model provider error", body = tutorgate_core::error::ApiError),
        (status = 504, description = "Model provider timed out", body = tutorgate_core::error::ApiError)
    ),
    security(("bearer_auth" = []), ()),
    tag = "tutoring"
)]
pub async fn tutor(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<RawTutoringRequest>,
) -> Result<Json<TutorResponse>, AppError> {
    let outcome = state.pipeline.run(req, bearer_token(&headers)).await?;
    Ok(Json(TutorResponse {
        reply: outcome.reply,
    }))
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed { allow: "POST" }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::json;
    use tower::ServiceExt;
    use tutorgate_core::disclosure::{AttemptGate, SAFE_HINT_FALLBACK};

    use super::*;
    use crate::completion::CompletionError;
    use crate::config::PipelineConfig;
    use crate::pipeline::TutorPipeline;
    use crate::pipeline::testing::{ScriptedCompletion, StaticVerification};

    fn app(completion: &Arc<ScriptedCompletion>, verifier: &Arc<StaticVerification>) -> Router {
        let pipeline = TutorPipeline::new(
            completion.clone(),
            verifier.clone(),
            Arc::new(AttemptGate::default()),
            PipelineConfig::default(),
        );
        router().with_state(AppState {
            pipeline: Arc::new(pipeline),
        })
    }

    fn post_json(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/tutor")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[tokio::test]
    async fn explain_request_returns_plain_reply() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok(
            "## Steps\n1. Divide 5 by 4.\n2. You get **1.25**.",
        )]));
        let verifier = Arc::new(StaticVerification::default());
        let response = app(&completion, &verifier)
            .oneshot(post_json(json!({
                "role": "student",
                "action": "explain",
                "message": "What is 5/4 as a decimal?",
                "attempt": 0
            })))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({ "reply": "Steps\n1. Divide 5 by 4.\n2. You get 1.25." })
        );
    }

    #[tokio::test]
    async fn failed_rewrite_still_succeeds_with_fallback() {
        let completion = Arc::new(ScriptedCompletion::new(vec![
            Ok("Not quite\nThe answer is 4."),
            Err(CompletionError::Unreachable),
        ]));
        let verifier = Arc::new(StaticVerification::default());
        let response = app(&completion, &verifier)
            .oneshot(post_json(json!({
                "role": "student",
                "action": "check",
                "message": "Is 2+2=5 correct?",
                "attempt": 1
            })))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["reply"], SAFE_HINT_FALLBACK);
    }

    #[tokio::test]
    async fn unverified_educator_gets_authorization_error() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok("unused")]));
        let verifier = Arc::new(StaticVerification::new(false, false));
        let mut request = post_json(json!({
            "role": "educator",
            "action": "lesson",
            "message": "Fractions for grade 5"
        }));
        request
            .headers_mut()
            .insert(header::AUTHORIZATION, "Bearer sess_abc".parse().expect("header"));
        let response = app(&completion, &verifier)
            .oneshot(request)
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "verification_required");
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_message_is_a_validation_error() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Ok("unused")]));
        let verifier = Arc::new(StaticVerification::default());
        let response = app(&completion, &verifier)
            .oneshot(post_json(json!({ "role": "student", "message": "" })))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "validation_failed");
        assert_eq!(body["error_code"], "missing_message");
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let completion = Arc::new(ScriptedCompletion::new(vec![]));
        let verifier = Arc::new(StaticVerification::default());
        let request = Request::builder()
            .method("POST")
            .uri("/v1/tutor")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request should build");
        let response = app(&completion, &verifier)
            .oneshot(request)
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["field"], "body");
    }

    #[tokio::test]
    async fn other_methods_are_rejected_with_allow_header() {
        let completion = Arc::new(ScriptedCompletion::new(vec![]));
        let verifier = Arc::new(StaticVerification::default());
        for method in ["GET", "PUT", "DELETE"] {
            let response = app(&completion, &verifier)
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri("/v1/tutor")
                        .body(Body::empty())
                        .expect("request should build"),
                )
                .await
                .expect("request should succeed");

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(
                response.headers().get(header::ALLOW).expect("allow header"),
                "POST"
            );
            assert_eq!(body_json(response).await["code"], "method_not_allowed");
        }
    }

    #[tokio::test]
    async fn upstream_failure_maps_to_bad_gateway() {
        let completion = Arc::new(ScriptedCompletion::new(vec![Err(
            CompletionError::Provider {
                status: 503,
                message: "The server is overloaded".to_string(),
            },
        )]));
        let verifier = Arc::new(StaticVerification::default());
        let response = app(&completion, &verifier)
            .oneshot(post_json(json!({ "message": "Help with fractions" })))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert_eq!(body["code"], "upstream_error");
        assert_eq!(body["error"], "The server is overloaded");
    }
}
