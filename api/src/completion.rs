use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tutorgate_core::exchange::ChatMessage;
use url::Url;

use crate::config::ModelConfig;

static SECRET_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bsk-[A-Za-z0-9*_\-]{4,}").expect("valid secret key regex"));

pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;

/// One request/response round trip with a text-generation provider.
/// Implementations never retry.
pub trait CompletionClient: Send + Sync {
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionFuture<'a>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// Non-success response; `message` is the provider's own text.
    #[error("{message}")]
    Provider { status: u16, message: String },
    #[error("The model provider could not be reached.")]
    Unreachable,
    #[error("The model provider returned an unreadable response.")]
    Malformed,
    #[error("The model provider returned an empty reply.")]
    Empty,
    #[error("The model provider did not respond in time.")]
    Timeout,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
}

/// OpenAI-compatible `chat/completions` client.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    endpoint: Url,
    config: ModelConfig,
}

impl HttpCompletionClient {
    pub fn new(config: ModelConfig) -> Result<Self, url::ParseError> {
        let endpoint = Url::parse(&format!(
            "{}/chat/completions",
            config.base_url.as_str().trim_end_matches('/')
        ))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            config,
        })
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String, CompletionError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_output_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                tracing::error!(error = %err.without_url(), "model provider request failed");
                CompletionError::Unreachable
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|err| {
            tracing::error!(error = %err.without_url(), "model provider body could not be read");
            CompletionError::Malformed
        })?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "model provider returned non-success status");
            return Err(provider_error(status.as_u16(), &text, &self.config.api_key));
        }

        parse_completion(&text)
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete<'a>(&'a self, messages: &'a [ChatMessage]) -> CompletionFuture<'a> {
        Box::pin(self.send(messages))
    }
}

fn parse_completion(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|_| CompletionError::Malformed)?;
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(CompletionError::Empty);
    }
    Ok(text)
}

fn provider_error(status: u16, body: &str, api_key: &str) -> CompletionError {
    let message = serde_json::from_str::<ProviderErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .ok()
        .map(|message| redact_secrets(&message, api_key))
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("The model provider returned status {status}."));
    CompletionError::Provider { status, message }
}

fn redact_secrets(message: &str, api_key: &str) -> String {
    let message = if api_key.is_empty() {
        message.to_string()
    } else {
        message.replace(api_key, "[redacted]")
    };
    SECRET_KEY_RE.replace_all(&message, "[redacted]").into_owned()
}
