//! BoxLlmBackend -- object-safe dynamic dispatch wrapper for LlmBackend.
//!
//! 1. `LlmBackendDyn` is an object-safe mirror with boxed futures
//! 2. Blanket impl of `LlmBackendDyn` for all `T: LlmBackend`
//! 3. `BoxLlmBackend` wraps `Box<dyn LlmBackendDyn>` and is itself an `LlmBackend`

use std::future::Future;
use std::pin::Pin;

use meshrelay_types::llm::{GenerateRequest, LlmError};

use super::provider::LlmBackend;

/// Object-safe version of [`LlmBackend`] with boxed futures.
pub trait LlmBackendDyn: Send + Sync {
    fn name(&self) -> &str;

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;
}

impl<T: LlmBackend> LlmBackendDyn for T {
    fn name(&self) -> &str {
        LlmBackend::name(self)
    }

    fn generate_boxed<'a>(
        &'a self,
        request: &'a GenerateRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        Box::pin(self.generate(request))
    }
}

/// Type-erased backend for runtime selection from configuration.
///
/// Since `LlmBackend` uses RPITIT it cannot be a trait object directly;
/// this wrapper delegates to the inner `LlmBackendDyn`.
pub struct BoxLlmBackend {
    inner: Box<dyn LlmBackendDyn + Send + Sync>,
}

impl BoxLlmBackend {
    /// Wrap a concrete `LlmBackend` in a type-erased box.
    pub fn new<T: LlmBackend + 'static>(backend: T) -> Self {
        Self {
            inner: Box::new(backend),
        }
    }
}

impl LlmBackend for BoxLlmBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        self.inner.generate_boxed(request).await
    }
}

impl std::fmt::Debug for BoxLlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxLlmBackend")
            .field("name", &self.inner.name())
            .finish()
    }
}
