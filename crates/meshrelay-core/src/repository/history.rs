//! Turn log repository trait definition.

use meshrelay_types::conversation::{HistoryStats, Role, Turn};
use meshrelay_types::error::RepositoryError;

/// Durable append-only log of per-user conversation turns.
///
/// Every mutating call commits before returning.
pub trait HistoryRepository: Send + Sync {
    /// Append a turn and return its insertion sequence id.
    fn append_turn(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> impl std::future::Future<Output = Result<i64, RepositoryError>> + Send;

    /// All turns for a user in arrival order. No implicit limit.
    fn get_history(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Turn>, RepositoryError>> + Send;

    /// Delete every turn for a user and return how many were removed.
    ///
    /// Leaves the user's summary in place.
    fn clear_history(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Aggregate counters across all users.
    fn stats(&self) -> impl std::future::Future<Output = Result<HistoryStats, RepositoryError>> + Send;
}
