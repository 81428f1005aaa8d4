//! HTTP backend adapters.
//!
//! Concrete [`LlmBackend`] implementations for OpenAI-compatible chat
//! completions and the Anthropic Messages API, plus the factory that turns
//! `[llm]` configuration into a [`BackendChain`].

pub mod anthropic;
pub mod openai_compat;

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use secrecy::SecretString;

use meshrelay_core::llm::{BackendChain, BoxLlmBackend, ChainLink};
use meshrelay_types::config::{LlmBackendConfig, LlmConfig};
use meshrelay_types::error::ConfigError;
use meshrelay_types::llm::{BackendKind, LlmError};

use self::anthropic::AnthropicBackend;
use self::openai_compat::OpenAiCompatBackend;
use crate::config::resolve_api_key;

/// Characters of an error body kept in `LlmError::Service`.
const ERROR_BODY_CHARS: usize = 200;

/// Build the primary backend and optional fallback from `[llm]`.
pub fn build_backend_chain(config: &LlmConfig) -> Result<BackendChain, ConfigError> {
    let primary = build_link(&config.primary, "llm")?;
    let fallback = config
        .fallback
        .as_ref()
        .map(|fb| build_link(fb, "llm.fallback"))
        .transpose()?;
    Ok(BackendChain::new(primary, fallback))
}

fn build_link(config: &LlmBackendConfig, section: &str) -> Result<ChainLink, ConfigError> {
    let backend = build_backend(config, resolve_api_key(config), section)?;
    Ok(ChainLink::new(backend, config.timeout()))
}

/// Construct one backend from its config section and resolved key.
pub fn build_backend(
    config: &LlmBackendConfig,
    api_key: Option<SecretString>,
    section: &str,
) -> Result<BoxLlmBackend, ConfigError> {
    let client = http_client(config.timeout())?;
    match config.backend {
        BackendKind::OpenAi => {
            if api_key.is_none() && config.base_url.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "{section}: no API key for the openai backend (set api_key, LLM_API_KEY or OPENAI_API_KEY)"
                )));
            }
            let mut backend = OpenAiCompatBackend::new(client, api_key, config.model.clone())
                .with_timeout(config.timeout());
            if let Some(url) = &config.base_url {
                backend = backend.with_base_url(url);
            }
            Ok(BoxLlmBackend::new(backend))
        }
        BackendKind::Anthropic => {
            let key = api_key.ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "{section}: no API key for the anthropic backend (set api_key, LLM_API_KEY or ANTHROPIC_API_KEY)"
                ))
            })?;
            let mut backend = AnthropicBackend::new(client, key, config.model.clone())
                .with_timeout(config.timeout());
            if let Some(url) = &config.base_url {
                backend = backend.with_base_url(url);
            }
            Ok(BoxLlmBackend::new(backend))
        }
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to create HTTP client: {e}")))
}

/// Map a transport-level reqwest failure.
pub(crate) fn request_error(err: reqwest::Error, timeout: Duration) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout {
            elapsed_ms: timeout.as_millis() as u64,
        }
    } else {
        LlmError::Service(format!("HTTP request failed: {err}"))
    }
}

/// Map a non-success HTTP status.
pub(crate) fn status_error(status: StatusCode, headers: &HeaderMap, body: &str) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited {
            retry_after_ms: retry_after_ms(headers),
        };
    }
    let body: String = body.chars().take(ERROR_BODY_CHARS).collect();
    LlmError::Service(format!("HTTP {status}: {body}"))
}

/// `Retry-After` in delta-seconds form.
fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(|s| (s * 1000.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrelay_core::llm::LlmBackend;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_build_chain_with_fallback() {
        let config = LlmConfig {
            primary: LlmBackendConfig {
                backend: BackendKind::Anthropic,
                model: "claude-3-5-haiku-latest".to_string(),
                api_key: Some("sk-ant".to_string()),
                ..LlmBackendConfig::default()
            },
            fallback: Some(LlmBackendConfig {
                base_url: Some("http://localhost:11434/v1".to_string()),
                model: "llama3.2".to_string(),
                ..LlmBackendConfig::default()
            }),
        };
        let chain = build_backend_chain(&config).unwrap();
        assert!(chain.has_fallback());
        assert_eq!(chain.name(), "anthropic+openai");
    }

    #[test]
    fn test_anthropic_requires_key() {
        let config = LlmBackendConfig {
            backend: BackendKind::Anthropic,
            ..LlmBackendConfig::default()
        };
        let err = build_backend(&config, None, "llm").unwrap_err();
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn test_local_openai_compatible_needs_no_key() {
        let config = LlmBackendConfig {
            base_url: Some("http://localhost:11434/v1".to_string()),
            ..LlmBackendConfig::default()
        };
        let backend = build_backend(&config, None, "llm").unwrap();
        assert_eq!(backend.name(), "openai");

        let hosted = LlmBackendConfig::default();
        assert!(build_backend(&hosted, None, "llm").is_err());
    }

    #[test]
    fn test_status_error_rate_limited() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, &headers, "slow down");
        assert!(matches!(
            err,
            LlmError::RateLimited {
                retry_after_ms: Some(7000)
            }
        ));
    }

    #[test]
    fn test_status_error_truncates_body() {
        let body = "e".repeat(1000);
        let err = status_error(StatusCode::BAD_GATEWAY, &HeaderMap::new(), &body);
        let LlmError::Service(message) = err else {
            panic!("expected service error");
        };
        assert!(message.starts_with("HTTP 502"));
        assert!(message.len() < 300);
    }
}
