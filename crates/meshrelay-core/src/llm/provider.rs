//! LlmBackend trait definition.
//!
//! This is the core abstraction that every generative backend implements.

use meshrelay_types::llm::{GenerateRequest, LlmError};

/// Trait for generative backends (OpenAI-compatible, Anthropic, test mocks).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in meshrelay-infra.
pub trait LlmBackend: Send + Sync {
    /// Human-readable backend name used in logs (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Generate a single reply for the request.
    fn generate(
        &self,
        request: &GenerateRequest,
    ) -> impl std::future::Future<Output = Result<String, LlmError>> + Send;
}
