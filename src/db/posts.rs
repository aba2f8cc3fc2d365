//! Post record persistence and the pending-article pool.

use crate::error::DatabaseError;
use crate::types::{PostRecord, SourceId};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};

use super::{Database, PendingQuery, PostRow};

impl Database {
    /// Append post records, skipping any `(source_id, post_id)` already stored
    ///
    /// Returns the number of rows actually written. Chunks the input to stay within
    /// SQLite's bind variable limit.
    pub async fn append_post_records(&self, records: &[PostRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        // SQLite default SQLITE_MAX_VARIABLE_NUMBER is 999.
        // Each record uses 9 bind variables, so max 111 records per batch.
        const MAX_RECORDS_PER_BATCH: usize = 111;

        let mut inserted = 0;
        for chunk in records.chunks(MAX_RECORDS_PER_BATCH) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT OR IGNORE INTO posts (source_id, post_id, page_name, link, resolved_url, base_domain, shares, created_time, retrieved_on) ",
            );

            query_builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.source_id)
                    .push_bind(&record.post_id)
                    .push_bind(&record.page_name)
                    .push_bind(&record.link)
                    .push_bind(&record.resolved_url)
                    .push_bind(&record.base_domain)
                    .push_bind(record.shares)
                    .push_bind(record.created_time.timestamp())
                    .push_bind(record.retrieved_on.timestamp());
            });

            let result = query_builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to insert post records: {}",
                        e
                    )))
                })?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    /// Post identifiers already stored for `source`
    pub async fn known_post_ids(&self, source: &SourceId) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT post_id FROM posts WHERE source_id = ?")
            .bind(source)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list known post ids: {}",
                    e
                )))
            })?;

        Ok(ids.into_iter().collect())
    }

    /// Resolved posts with no archived article yet, grouped by source
    ///
    /// Each source's list is ordered newest first.
    pub async fn list_pending_posts(
        &self,
        query: &PendingQuery,
    ) -> Result<BTreeMap<SourceId, Vec<PostRecord>>> {
        let mut query_builder = sqlx::QueryBuilder::new(
            r#"
            SELECT p.source_id, p.post_id, p.page_name, p.link, p.resolved_url, p.base_domain,
                   p.shares, p.created_time, p.retrieved_on
            FROM posts p
            WHERE p.resolved_url IS NOT NULL
              AND NOT EXISTS (SELECT 1 FROM articles a WHERE a.post_id = p.post_id)
            "#,
        );

        if !query.sources.is_empty() {
            query_builder.push(" AND p.source_id IN (");
            let mut separated = query_builder.separated(", ");
            for source in &query.sources {
                separated.push_bind(source);
            }
            separated.push_unseparated(")");
        }

        if let Some(range) = query.retrieved_between {
            let start = range.start.and_time(chrono::NaiveTime::MIN).and_utc();
            let end = range
                .end
                .succ_opt()
                .unwrap_or(range.end)
                .and_time(chrono::NaiveTime::MIN)
                .and_utc();
            query_builder
                .push(" AND p.retrieved_on >= ")
                .push_bind(start.timestamp())
                .push(" AND p.retrieved_on < ")
                .push_bind(end.timestamp());
        }

        query_builder.push(" ORDER BY p.source_id ASC, p.created_time DESC, p.post_id ASC");

        let rows: Vec<PostRow> = query_builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list pending posts: {}",
                    e
                )))
            })?;

        let mut pending: BTreeMap<SourceId, Vec<PostRecord>> = BTreeMap::new();
        for row in rows {
            let record = PostRecord::from(row);
            pending
                .entry(record.source_id.clone())
                .or_default()
                .push(record);
        }

        Ok(pending)
    }

    /// How often each base domain appears among `source`'s resolved posts, most common first
    pub async fn base_domain_counts(&self, source: &SourceId) -> Result<Vec<(String, i64)>> {
        sqlx::query_as(
            r#"
            SELECT base_domain, COUNT(*) AS n
            FROM posts
            WHERE source_id = ? AND base_domain IS NOT NULL
            GROUP BY base_domain
            ORDER BY n DESC, base_domain ASC
            "#,
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count base domains: {}",
                e
            )))
        })
    }

    /// Number of stored post records, optionally for one source
    pub async fn count_posts(&self, source: Option<&SourceId>) -> Result<i64> {
        let result: std::result::Result<i64, sqlx::Error> = match source {
            Some(source) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE source_id = ?")
                    .bind(source)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM posts")
                    .fetch_one(&self.pool)
                    .await
            }
        };

        result.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count posts: {}",
                e
            )))
        })
    }
}
