//! Conversation memory, admission control and message pipeline for meshrelay.
//!
//! This crate defines the "ports" (repository, backend and transport traits)
//! that the infrastructure layer implements, plus the pipeline built on them.
//! It depends only on `meshrelay-types` -- never on `meshrelay-infra` or any
//! database/IO crate.

pub mod chunk;
pub mod command;
pub mod llm;
pub mod memory;
pub mod rate_limit;
pub mod repository;
pub mod router;
pub mod sync;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
