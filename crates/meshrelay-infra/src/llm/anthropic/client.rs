//! AnthropicBackend -- [`LlmBackend`] for the Anthropic Messages API.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building request headers.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use meshrelay_core::llm::LlmBackend;
use meshrelay_types::llm::{ChatMessage, GenerateRequest, LlmError};

use super::types::{AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse};
use crate::llm::{request_error, status_error};

pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl AnthropicBackend {
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(client: reqwest::Client, api_key: SecretString, model: String) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            model,
            timeout: Duration::from_secs(30),
        }
    }

    /// Override the base URL (proxies, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_anthropic_request(&self, request: &GenerateRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_output_tokens,
            messages: alternate_roles(&request.messages),
            system: request.system_prompt.clone(),
            temperature: request.temperature,
        }
    }
}

/// The Messages API wants strictly alternating roles starting with `user`.
/// Leading assistant turns are dropped and same-role runs are joined.
fn alternate_roles(messages: &[ChatMessage]) -> Vec<AnthropicMessage> {
    let mut out: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        let role = message.role.to_string();
        match out.last_mut() {
            None if role != "user" => continue,
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.content);
            }
            _ => out.push(AnthropicMessage {
                role,
                content: message.content.clone(),
            }),
        }
    }
    out
}

impl LlmBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let body = self.to_anthropic_request(request);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &headers, &error_body));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Service(format!("failed to parse response: {e}")))?;

        tracing::debug!(
            model = %self.model,
            stop_reason = parsed.stop_reason.as_deref().unwrap_or("unknown"),
            "Message received"
        );

        Ok(parsed
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                AnthropicContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> AnthropicBackend {
        AnthropicBackend::new(
            reqwest::Client::new(),
            SecretString::from("sk-ant-test".to_string()),
            "claude-3-5-haiku-latest".to_string(),
        )
        .with_base_url(&server.uri())
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            messages: vec![ChatMessage::user("hello")],
            system_prompt: Some("Be brief.".to_string()),
            max_output_tokens: 300,
            temperature: Some(0.3),
        }
    }

    #[test]
    fn test_alternate_roles() {
        let messages = vec![
            ChatMessage::assistant("orphan"),
            ChatMessage::user("a"),
            ChatMessage::user("b"),
            ChatMessage::assistant("c"),
        ];
        let out = alternate_roles(&messages);
        assert_eq!(
            out,
            vec![
                AnthropicMessage {
                    role: "user".to_string(),
                    content: "a\n\nb".to_string()
                },
                AnthropicMessage {
                    role: "assistant".to_string(),
                    content: "c".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_generate_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "system": "Be brief.",
                "max_tokens": 300
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_01",
                "content": [
                    {"type": "text", "text": "Hi "},
                    {"type": "text", "text": "there."}
                ],
                "stop_reason": "end_turn"
            })))
            .mount(&server)
            .await;

        let text = backend(&server).generate(&request()).await.unwrap();
        assert_eq!(text, "Hi there.");
    }

    #[tokio::test]
    async fn test_generate_maps_overload_to_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = backend(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Service(ref m) if m.contains("overloaded")));
    }

    #[tokio::test]
    async fn test_generate_maps_rate_limit_without_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = backend(&server).generate(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::RateLimited {
                retry_after_ms: None
            }
        ));
    }
}
