//! OpenAI-compatible chat completions backend.
//!
//! One client serves OpenAI and any server speaking the same
//! `/chat/completions` shape (Ollama, OpenRouter, vLLM) via `base_url`.
//! Requests are non-streaming; a mesh reply is a single short text.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use meshrelay_core::llm::LlmBackend;
use meshrelay_types::conversation::Role;
use meshrelay_types::llm::{GenerateRequest, LlmError};

use super::{request_error, status_error};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Backend for any OpenAI-compatible endpoint.
///
/// Does not derive Debug; the key only leaves the secret when building the
/// `Authorization` header.
pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiCompatBackend {
    pub fn new(client: reqwest::Client, api_key: Option<SecretString>, model: String) -> Self {
        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            timeout: Duration::from_secs(30),
        }
    }

    /// Point at a different server, e.g. `http://localhost:11434/v1`.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Timeout reported in `LlmError::Timeout` when the HTTP client expires.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_wire<'a>(&'a self, request: &'a GenerateRequest) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = request.system_prompt.as_deref() {
            messages.push(WireMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| WireMessage {
            role: role_name(m.role),
            content: &m.content,
        }));

        ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

impl LlmBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let body = self.to_wire(request);
        let url = format!("{}/chat/completions", self.base_url);

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &headers, &error_body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Service(format!("failed to parse response: {e}")))?;

        tracing::debug!(model = %self.model, "Chat completion received");
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
