//! Shared domain types for meshrelay.
//!
//! Conversation turns and summaries, mesh messages, backend request shapes,
//! configuration, and the error enums shared across the workspace.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod message;
