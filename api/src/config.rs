use std::fmt;
use std::time::Duration;

use url::Url;

const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Provider settings injected into the completion client.
#[derive(Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: Url,
    pub model: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("model", &self.model)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Deadline applied to every provider call.
    pub call_timeout: Duration,
    /// Corrective rewrite calls allowed after a detected leak.
    pub rewrite_rounds: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(30_000),
            rewrite_rounds: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub pipeline: PipelineConfig,
    pub verify_url: Option<Url>,
    pub cors_origins: Vec<String>,
    pub require_https: bool,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_key =
            get("TUTOR_MODEL_API_KEY").ok_or(ConfigError::Missing("TUTOR_MODEL_API_KEY"))?;
        let base_url = parse_url(
            "TUTOR_MODEL_BASE_URL",
            &get("TUTOR_MODEL_BASE_URL").unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.to_string()),
        )?;
        let verify_url = get("TUTOR_VERIFY_URL")
            .map(|raw| parse_url("TUTOR_VERIFY_URL", &raw))
            .transpose()?;

        let model = ModelConfig {
            api_key,
            base_url,
            model: get("TUTOR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_output_tokens: get("TUTOR_MODEL_MAX_TOKENS")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(700)
                .clamp(64, 4096),
            temperature: get("TUTOR_MODEL_TEMPERATURE")
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|t| t.is_finite())
                .unwrap_or(0.2)
                .clamp(0.0, 1.0),
        };

        let pipeline = PipelineConfig {
            call_timeout: Duration::from_millis(
                get("TUTOR_MODEL_TIMEOUT_MS")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(30_000)
                    .clamp(1_000, 120_000),
            ),
            rewrite_rounds: get("TUTOR_REWRITE_ROUNDS")
                .and_then(|v| v.parse::<u8>().ok())
                .unwrap_or(1)
                .min(3),
        };

        let cors_origins = get("TUTOR_CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            model,
            pipeline,
            verify_url,
            cors_origins,
            require_https: get("TUTOR_REQUIRE_HTTPS").is_some_and(|v| v == "true"),
            port: get("PORT").and_then(|p| p.parse().ok()).unwrap_or(3000),
        })
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { name, source })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn api_key_is_required() {
        let err = config(&[]).expect_err("missing key must fail");
        assert!(matches!(err, ConfigError::Missing("TUTOR_MODEL_API_KEY")));
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("TUTOR_MODEL_API_KEY", "sk-test")]).expect("valid config");
        assert_eq!(cfg.model.base_url.as_str(), "https://api.openai.com/v1");
        assert_eq!(cfg.model.model, "gpt-4o-mini");
        assert_eq!(cfg.model.max_output_tokens, 700);
        assert_eq!(cfg.pipeline, PipelineConfig::default());
        assert!(cfg.verify_url.is_none());
        assert_eq!(cfg.cors_origins, vec!["http://localhost:3000".to_string()]);
        assert!(!cfg.require_https);
        assert_eq!(cfg.port, 3000);
    }

    #[test]
    fn numeric_settings_are_clamped() {
        let cfg = config(&[
            ("TUTOR_MODEL_API_KEY", "sk-test"),
            ("TUTOR_MODEL_MAX_TOKENS", "999999"),
            ("TUTOR_MODEL_TEMPERATURE", "7"),
            ("TUTOR_MODEL_TIMEOUT_MS", "5"),
            ("TUTOR_REWRITE_ROUNDS", "9"),
        ])
        .expect("valid config");
        assert_eq!(cfg.model.max_output_tokens, 4096);
        assert_eq!(cfg.model.temperature, 1.0);
        assert_eq!(cfg.pipeline.call_timeout, Duration::from_millis(1_000));
        assert_eq!(cfg.pipeline.rewrite_rounds, 3);
    }

    #[test]
    fn invalid_urls_are_rejected() {
        let err = config(&[
            ("TUTOR_MODEL_API_KEY", "sk-test"),
            ("TUTOR_VERIFY_URL", "not a url"),
        ])
        .expect_err("bad url");
        assert!(matches!(err, ConfigError::InvalidUrl { name: "TUTOR_VERIFY_URL", .. }));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let cfg = config(&[("TUTOR_MODEL_API_KEY", "sk-very-secret")]).expect("valid config");
        let rendered = format!("{:?}", cfg);
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
