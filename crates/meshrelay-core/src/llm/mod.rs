//! Generative backend abstractions for meshrelay.
//!
//! - `LlmBackend`: RPITIT trait for concrete backend adapters
//! - `BoxLlmBackend`: object-safe wrapper for dynamic dispatch
//! - `BackendChain`: primary plus optional fallback, each call time-bounded

pub mod box_backend;
pub mod chain;
pub mod provider;

pub use box_backend::BoxLlmBackend;
pub use chain::{BackendChain, ChainLink};
pub use provider::LlmBackend;
