use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use axum::http::HeaderMap;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tutorgate_core::request::AuthContext;
use url::Url;

pub type VerificationFuture<'a> = Pin<Box<dyn Future<Output = Identity> + Send + 'a>>;

/// Resolved identity of the caller. Unknown callers are unverified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub verified: bool,
    pub email: Option<String>,
    pub teacher: bool,
}

impl Identity {
    pub fn auth_context(&self) -> AuthContext {
        AuthContext {
            verified: self.verified,
            teacher_licensed: self.verified && self.teacher,
        }
    }
}

/// Resolves a session token to an identity. Never fails: an unreachable or
/// erroring service yields an unverified identity.
pub trait VerificationService: Send + Sync {
    fn resolve<'a>(&'a self, session_token: &'a str) -> VerificationFuture<'a>;
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    teacher: bool,
}

/// HTTP verification backend: `GET {url}` with the session token as bearer.
pub struct HttpVerificationService {
    http: reqwest::Client,
    url: Url,
}

impl HttpVerificationService {
    /// `timeout` bounds the whole lookup, connect through body.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url })
    }

    async fn lookup(&self, session_token: &str) -> Identity {
        let fingerprint = token_fingerprint(session_token);
        let response = match self
            .http
            .get(self.url.clone())
            .bearer_auth(session_token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    token = %fingerprint,
                    error = %err.without_url(),
                    "verification service unreachable, treating caller as unverified"
                );
                return Identity::default();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                token = %fingerprint,
                status = %response.status(),
                "verification service returned non-success status"
            );
            return Identity::default();
        }

        match response.json::<VerifyResponse>().await {
            Ok(body) => Identity {
                verified: body.verified,
                email: body.email,
                teacher: body.teacher,
            },
            Err(_) => {
                tracing::warn!(token = %fingerprint, "verification response could not be parsed");
                Identity::default()
            }
        }
    }
}

impl VerificationService for HttpVerificationService {
    fn resolve<'a>(&'a self, session_token: &'a str) -> VerificationFuture<'a> {
        Box::pin(self.lookup(session_token))
    }
}

/// Used when no verification service is configured.
pub struct NoVerification;

impl VerificationService for NoVerification {
    fn resolve<'a>(&'a self, _session_token: &'a str) -> VerificationFuture<'a> {
        Box::pin(async { Identity::default() })
    }
}

/// Session token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Short, non-reversible identifier for a token, safe to log.
pub fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}
