//! Durable log of crawl failures.

use crate::error::DatabaseError;
use crate::types::{ErrorEntry, SourceId};
use crate::{Error, Result};

use super::{Database, ErrorRow};

impl Database {
    /// Append error entries
    pub async fn append_error_entries(&self, entries: &[ErrorEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        // 3 bind variables per entry
        const MAX_ENTRIES_PER_BATCH: usize = 333;

        for chunk in entries.chunks(MAX_ENTRIES_PER_BATCH) {
            let mut query_builder =
                sqlx::QueryBuilder::new("INSERT INTO crawl_errors (source_id, cause, occurred_at) ");

            query_builder.push_values(chunk, |mut b, entry| {
                b.push_bind(&entry.source_id)
                    .push_bind(&entry.cause)
                    .push_bind(entry.occurred_at.timestamp());
            });

            query_builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to insert error entries: {}",
                        e
                    )))
                })?;
        }

        Ok(())
    }

    /// Error entries recorded for `source`, oldest first
    pub async fn error_entries(&self, source: &SourceId) -> Result<Vec<ErrorEntry>> {
        let rows: Vec<ErrorRow> = sqlx::query_as(
            "SELECT id, source_id, cause, occurred_at FROM crawl_errors WHERE source_id = ? ORDER BY id ASC",
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list error entries: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(ErrorEntry::from).collect())
    }
}
