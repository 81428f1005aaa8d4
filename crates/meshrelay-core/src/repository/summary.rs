//! Summary repository trait definition.

use meshrelay_types::conversation::Summary;
use meshrelay_types::error::RepositoryError;

/// Durable single-row-per-user summary store.
///
/// Writes replace the whole row (last writer wins).
pub trait SummaryRepository: Send + Sync {
    /// Insert or replace the summary for `summary.user_id`.
    fn store_summary(
        &self,
        summary: &Summary,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get_summary(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Summary>, RepositoryError>> + Send;

    /// Remove a user's summary. Returns `true` if a row existed.
    fn clear_summary(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Every stored summary, used to warm caches at startup.
    fn list_summaries(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Summary>, RepositoryError>> + Send;
}
