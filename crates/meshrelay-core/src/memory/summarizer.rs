//! Conversation summarizer for rolling-summary compaction.
//!
//! `Summarizer` condenses a run of older turns into two or three sentences.
//! It never fails: backend errors and empty output are replaced by a fixed
//! text that records how many turns were covered.

use std::sync::Arc;

use meshrelay_types::conversation::Turn;
use meshrelay_types::llm::{ChatMessage, GenerateRequest};

use crate::llm::LlmBackend;

const SUMMARY_INSTRUCTION: &str = "Summarize this conversation in 2-3 concise sentences. Focus on:
- Main topics discussed
- Important context or user preferences
- Key information to remember";

pub const DEFAULT_SUMMARY_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_SUMMARY_MAX_TOKENS: u32 = 150;

/// Text used when there is nothing to summarize.
pub const EMPTY_SUMMARY: &str = "No previous conversation.";

pub struct Summarizer<L> {
    backend: Arc<L>,
    temperature: f64,
    max_output_tokens: u32,
}

impl<L: LlmBackend> Summarizer<L> {
    pub fn new(backend: Arc<L>) -> Self {
        Self {
            backend,
            temperature: DEFAULT_SUMMARY_TEMPERATURE,
            max_output_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
        }
    }

    pub fn with_output_budget(mut self, temperature: f64, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Summarize `turns`, substituting a fixed text on any backend failure.
    #[tracing::instrument(
        name = "summarize_turns",
        skip(self, turns),
        fields(backend = %self.backend.name(), turn_count = turns.len())
    )]
    pub async fn summarize(&self, turns: &[Turn]) -> String {
        if turns.is_empty() {
            return EMPTY_SUMMARY.to_string();
        }

        let request = GenerateRequest {
            messages: vec![ChatMessage::user(Self::build_prompt(turns))],
            system_prompt: None,
            max_output_tokens: self.max_output_tokens,
            temperature: Some(self.temperature),
        };

        match self.backend.generate(&request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Summarizer returned empty text, using turn count");
                format!("Previous conversation: {} messages.", turns.len())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to generate summary, using fallback");
                fallback_summary(turns.len())
            }
        }
    }

    /// One line per turn, `ROLE: content`, wrapped in the fixed instruction.
    fn build_prompt(turns: &[Turn]) -> String {
        let conversation = turns
            .iter()
            .map(|t| format!("{}: {}", t.role.to_string().to_uppercase(), t.content))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{SUMMARY_INSTRUCTION}\n\nConversation:\n{conversation}\n\nSummary (2-3 sentences):")
    }
}

/// Deterministic stand-in used when the backend is unavailable.
pub fn fallback_summary(turn_count: usize) -> String {
    format!("Previous conversation: {turn_count} messages about various topics.")
}
