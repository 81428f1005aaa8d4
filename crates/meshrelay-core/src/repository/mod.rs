//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (meshrelay-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod history;
pub mod summary;

pub use history::HistoryRepository;
pub use summary::SummaryRepository;
