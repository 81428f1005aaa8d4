//! Anthropic Messages API backend.

pub mod client;
pub mod types;

pub use client::AnthropicBackend;
