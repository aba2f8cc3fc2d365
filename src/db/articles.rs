//! Archived article persistence.

use crate::error::DatabaseError;
use crate::types::{ArticleRecord, SourceId};
use crate::{Error, Result};

use super::{ArticleRow, Database};

impl Database {
    /// Append article records, skipping any post already archived
    ///
    /// Returns the number of rows actually written. Records with empty body text are
    /// never stored.
    pub async fn append_article_records(&self, articles: &[ArticleRecord]) -> Result<u64> {
        let articles: Vec<(&ArticleRecord, String)> = articles
            .iter()
            .filter(|a| !a.body_text.trim().is_empty())
            .map(|a| -> Result<(&ArticleRecord, String)> {
                Ok((a, serde_json::to_string(&a.authors)?))
            })
            .collect::<Result<_>>()?;
        if articles.is_empty() {
            return Ok(0);
        }

        // SQLite default SQLITE_MAX_VARIABLE_NUMBER is 999.
        // Each article uses 9 bind variables, so max 111 articles per batch.
        const MAX_ARTICLES_PER_BATCH: usize = 111;

        let mut inserted = 0;
        for chunk in articles.chunks(MAX_ARTICLES_PER_BATCH) {
            let mut query_builder = sqlx::QueryBuilder::new(
                "INSERT OR IGNORE INTO articles (post_id, source_id, url, base_domain, title, authors, body_text, post_created_time, retrieved_on) ",
            );

            query_builder.push_values(chunk, |mut b, (article, authors)| {
                b.push_bind(&article.post_id)
                    .push_bind(&article.source_id)
                    .push_bind(&article.url)
                    .push_bind(&article.base_domain)
                    .push_bind(&article.title)
                    .push_bind(authors)
                    .push_bind(&article.body_text)
                    .push_bind(article.post_created_time.timestamp())
                    .push_bind(article.retrieved_on.timestamp());
            });

            let result = query_builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to insert article records: {}",
                        e
                    )))
                })?;
            inserted += result.rows_affected();
        }

        Ok(inserted)
    }

    /// Get the archived article for a post
    pub async fn get_article(&self, post_id: &str) -> Result<Option<ArticleRecord>> {
        let row: Option<ArticleRow> = sqlx::query_as(
            r#"
            SELECT post_id, source_id, url, base_domain, title, authors, body_text,
                   post_created_time, retrieved_on
            FROM articles
            WHERE post_id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get article: {}",
                e
            )))
        })?;

        Ok(row.map(ArticleRecord::from))
    }

    /// Number of archived articles, optionally for one source
    pub async fn count_articles(&self, source: Option<&SourceId>) -> Result<i64> {
        let result: std::result::Result<i64, sqlx::Error> = match source {
            Some(source) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE source_id = ?")
                    .bind(source)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM articles")
                    .fetch_one(&self.pool)
                    .await
            }
        };

        result.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count articles: {}",
                e
            )))
        })
    }
}
