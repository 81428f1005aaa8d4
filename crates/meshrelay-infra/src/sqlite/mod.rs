//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod history;
pub mod pool;
pub mod summary;

use chrono::{DateTime, SecondsFormat, Utc};
use meshrelay_types::error::RepositoryError;

pub use history::SqliteHistoryRepository;
pub use pool::DatabasePool;
pub use summary::SqliteSummaryRepository;

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width UTC form so text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}
