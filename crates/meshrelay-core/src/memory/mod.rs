//! Conversation memory: rolling summaries over the turn log.
//!
//! `MemoryManager` decides what context a reply sees; `Summarizer` compacts
//! older turns through the generative backend.

pub mod manager;
pub mod summarizer;

pub use manager::{MemoryContext, MemoryManager};
pub use summarizer::Summarizer;
