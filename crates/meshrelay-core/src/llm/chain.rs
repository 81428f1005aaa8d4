//! Primary/fallback backend chain.
//!
//! Every attempt is bounded by its backend's timeout; expiry counts as a
//! backend failure. A failed primary is retried once against the fallback.

use std::time::{Duration, Instant};

use meshrelay_types::llm::{GenerateRequest, LlmError};

use super::box_backend::BoxLlmBackend;
use super::provider::LlmBackend;

/// A backend together with its per-call timeout.
#[derive(Debug)]
pub struct ChainLink {
    pub backend: BoxLlmBackend,
    pub timeout: Duration,
}

impl ChainLink {
    pub fn new(backend: BoxLlmBackend, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    async fn attempt(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, self.backend.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }
}

/// Routes generate calls to the primary backend, falling back once.
#[derive(Debug)]
pub struct BackendChain {
    primary: ChainLink,
    fallback: Option<ChainLink>,
    name: String,
}

impl BackendChain {
    pub fn new(primary: ChainLink, fallback: Option<ChainLink>) -> Self {
        let name = match &fallback {
            Some(fb) => format!("{}+{}", primary.backend.name(), fb.backend.name()),
            None => primary.backend.name().to_string(),
        };
        Self {
            primary,
            fallback,
            name,
        }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

impl LlmBackend for BackendChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let primary_err = match self.primary.attempt(request).await {
            Ok(text) => return Ok(text),
            Err(err) => err,
        };

        let Some(fallback) = &self.fallback else {
            tracing::warn!(
                backend = %self.primary.backend.name(),
                error = %primary_err,
                "Backend failed, no fallback configured"
            );
            return Err(primary_err);
        };

        tracing::warn!(
            backend = %self.primary.backend.name(),
            fallback = %fallback.backend.name(),
            error = %primary_err,
            "Primary backend failed, trying fallback"
        );

        fallback.attempt(request).await.inspect_err(|err| {
            tracing::error!(
                backend = %fallback.backend.name(),
                error = %err,
                "Fallback backend failed"
            );
        })
    }
}
