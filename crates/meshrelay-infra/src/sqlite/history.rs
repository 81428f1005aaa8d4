//! SQLite turn log.
//!
//! Implements `HistoryRepository` from `meshrelay-core`. Turns are ordered by
//! `(timestamp, id)` so rows written in the same microsecond keep insertion
//! order.

use chrono::Utc;
use meshrelay_core::repository::HistoryRepository;
use meshrelay_types::conversation::{HistoryStats, Role, Turn};
use meshrelay_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed implementation of `HistoryRepository`.
#[derive(Clone)]
pub struct SqliteHistoryRepository {
    pool: DatabasePool,
}

impl SqliteHistoryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct TurnRow {
    id: i64,
    user_id: String,
    role: String,
    content: String,
    timestamp: String,
}

impl TurnRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    fn into_turn(self) -> Result<Turn, RepositoryError> {
        let role: Role = self.role.parse().map_err(RepositoryError::Query)?;
        Ok(Turn {
            id: self.id,
            user_id: self.user_id,
            role,
            content: self.content,
            timestamp: parse_datetime(&self.timestamp)?,
        })
    }
}

impl HistoryRepository for SqliteHistoryRepository {
    async fn append_turn(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
    ) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO turns (user_id, role, content, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(role.to_string())
        .bind(content)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn get_history(&self, user_id: &str) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, role, content, timestamp FROM turns WHERE user_id = ? ORDER BY timestamp, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                TurnRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_turn()
            })
            .collect()
    }

    async fn clear_history(&self, user_id: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM turns WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn stats(&self) -> Result<HistoryStats, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(DISTINCT user_id) AS users, MIN(timestamp) AS oldest FROM turns",
        )
        .fetch_one(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let total: i64 = row
            .try_get("total")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let users: i64 = row
            .try_get("users")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let oldest: Option<String> = row
            .try_get("oldest")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(HistoryStats {
            total_turns: total as u64,
            unique_users: users as u64,
            oldest_turn_at: oldest.as_deref().map(parse_datetime).transpose()?,
        })
    }
}
