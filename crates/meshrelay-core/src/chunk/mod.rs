//! Outbound reply sizing and pacing.
//!
//! `split` fits a reply into at most `max_chunks` segments of `max_len`
//! characters; `Pacer` transmits them with a jittered lead-in delay.

pub mod pacer;
pub mod splitter;

pub use pacer::{DeliveryOutcome, DeliveryReport, Pacer};
pub use splitter::{TRUNCATION_MARKER, fits, split};
