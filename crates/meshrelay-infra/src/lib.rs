//! Infrastructure layer for meshrelay.
//!
//! Implementations of the ports defined in `meshrelay-core`: SQLite turn and
//! summary stores, HTTP backend adapters, the console transport, and the
//! TOML configuration loader.

pub mod config;
pub mod console;
pub mod llm;
pub mod sqlite;
