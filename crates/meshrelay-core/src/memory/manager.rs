//! Rolling-summary memory manager.
//!
//! Keeps the last `window_size` exchange pairs verbatim and stands a single
//! summary in for everything older. The summary is regenerated only once
//! `summarize_threshold` turns have accumulated past its checkpoint.
//!
//! The in-memory cache is a read-through copy of the summary store: it is
//! warmed by [`MemoryManager::reconcile`], filled on miss, written through on
//! regeneration and evicted by [`MemoryManager::invalidate`]. It is never
//! more authoritative than the store.

use std::sync::Arc;

use dashmap::DashMap;

use meshrelay_types::config::MemoryConfig;
use meshrelay_types::conversation::{Summary, Turn};
use meshrelay_types::error::RepositoryError;

use super::summarizer::Summarizer;
use crate::llm::LlmBackend;
use crate::repository::SummaryRepository;
use crate::sync::KeyedLocks;

/// Context handed to the backend for one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryContext {
    /// Summary of turns older than the window, if any were compacted.
    pub summary: Option<String>,
    /// Turns kept verbatim, oldest first.
    pub recent: Vec<Turn>,
}

pub struct MemoryManager<S, L> {
    summaries: Arc<S>,
    summarizer: Summarizer<L>,
    config: MemoryConfig,
    cache: DashMap<String, Summary>,
    locks: KeyedLocks,
}

impl<S, L> MemoryManager<S, L>
where
    S: SummaryRepository,
    L: LlmBackend,
{
    pub fn new(summaries: Arc<S>, summarizer: Summarizer<L>, config: MemoryConfig) -> Self {
        Self {
            summaries,
            summarizer,
            config,
            cache: DashMap::new(),
            locks: KeyedLocks::new(),
        }
    }

    /// Load every stored summary into the cache. Returns how many were loaded.
    pub async fn reconcile(&self) -> Result<usize, RepositoryError> {
        let stored = self.summaries.list_summaries().await?;
        let count = stored.len();
        for summary in stored {
            self.cache.insert(summary.user_id.clone(), summary);
        }
        tracing::info!(count, "Summary cache reconciled from store");
        Ok(count)
    }

    /// Split `history` into a summary of older turns plus the recent window.
    pub async fn get_context(
        &self,
        user_id: &str,
        mut history: Vec<Turn>,
    ) -> Result<MemoryContext, RepositoryError> {
        let keep = self.config.window_size.saturating_mul(2);
        if !self.config.enabled || history.len() <= keep {
            return Ok(MemoryContext {
                summary: None,
                recent: history,
            });
        }

        let recent = history.split_off(history.len() - keep);
        let summary = self.get_or_create_summary(user_id, &history).await?;
        Ok(MemoryContext {
            summary: Some(summary.text),
            recent,
        })
    }

    /// Reuse the current summary for `old` or generate and persist a new one.
    ///
    /// Serialized per user so concurrent callers never summarize twice.
    pub async fn get_or_create_summary(
        &self,
        user_id: &str,
        old: &[Turn],
    ) -> Result<Summary, RepositoryError> {
        let _guard = self.locks.lock(user_id).await;

        if let Some(existing) = self.current(user_id).await? {
            let checkpoint = existing.checkpoint_count as usize;
            if checkpoint > old.len() {
                tracing::info!(
                    user_id,
                    checkpoint,
                    old_turns = old.len(),
                    "Stored summary covers missing turns, regenerating"
                );
            } else if old.len() - checkpoint < self.config.summarize_threshold {
                return Ok(existing);
            }
        }

        tracing::debug!(user_id, old_turns = old.len(), "Generating summary");
        let text = self.summarizer.summarize(old).await;
        let checkpoint = u32::try_from(old.len()).unwrap_or(u32::MAX);
        let summary = Summary::new(user_id, text, checkpoint);
        self.summaries.store_summary(&summary).await?;
        self.cache.insert(user_id.to_string(), summary.clone());
        Ok(summary)
    }

    /// Drop a user's cached summary (after a reset).
    pub fn invalidate(&self, user_id: &str) {
        self.cache.remove(user_id);
    }

    /// Cached summary for a user, without touching the store.
    pub fn cached(&self, user_id: &str) -> Option<Summary> {
        self.cache.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    async fn current(&self, user_id: &str) -> Result<Option<Summary>, RepositoryError> {
        if let Some(cached) = self.cached(user_id) {
            return Ok(Some(cached));
        }
        let stored = self.summaries.get_summary(user_id).await?;
        if let Some(summary) = &stored {
            self.cache.insert(user_id.to_string(), summary.clone());
        }
        Ok(stored)
    }
}
