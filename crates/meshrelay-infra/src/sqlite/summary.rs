//! SQLite summary store. One row per user, replaced on every write.

use meshrelay_core::repository::SummaryRepository;
use meshrelay_types::conversation::Summary;
use meshrelay_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed implementation of `SummaryRepository`.
#[derive(Clone)]
pub struct SqliteSummaryRepository {
    pool: DatabasePool,
}

impl SqliteSummaryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct SummaryRow {
    user_id: String,
    text: String,
    checkpoint_count: i64,
    updated_at: String,
}

impl SummaryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            text: row.try_get("text")?,
            checkpoint_count: row.try_get("checkpoint_count")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_summary(self) -> Result<Summary, RepositoryError> {
        let checkpoint_count = u32::try_from(self.checkpoint_count).map_err(|_| {
            RepositoryError::Query(format!(
                "invalid checkpoint_count: {}",
                self.checkpoint_count
            ))
        })?;
        Ok(Summary {
            user_id: self.user_id,
            text: self.text,
            checkpoint_count,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<Summary, RepositoryError> {
    SummaryRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_summary()
}

impl SummaryRepository for SqliteSummaryRepository {
    async fn store_summary(&self, summary: &Summary) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO summaries (user_id, text, checkpoint_count, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT (user_id) DO UPDATE SET
                   text = excluded.text,
                   checkpoint_count = excluded.checkpoint_count,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&summary.user_id)
        .bind(&summary.text)
        .bind(i64::from(summary.checkpoint_count))
        .bind(format_datetime(&summary.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_summary(&self, user_id: &str) -> Result<Option<Summary>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, text, checkpoint_count, updated_at FROM summaries WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(decode).transpose()
    }

    async fn clear_summary(&self, user_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM summaries WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_summaries(&self) -> Result<Vec<Summary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id, text, checkpoint_count, updated_at FROM summaries ORDER BY user_id",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(decode).collect()
    }
}
