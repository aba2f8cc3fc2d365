//! Database layer for news-archives
//!
//! Handles SQLite persistence for crawled post records, archived articles, and the
//! per-source error log. Every table is append-only: inserts use `INSERT OR IGNORE` on the
//! natural key, so replaying a crawl or a batch never overwrites stored rows.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`posts`] — Post records and the pending-article pool
//! - [`articles`] — Archived article records
//! - [`errors`] — Durable crawl error entries

use crate::config::DateRange;
use crate::types::{ArticleRecord, ErrorEntry, PostRecord, SourceId};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod articles;
mod errors;
mod migrations;
mod posts;

/// Selection of posts that still need their article archived
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingQuery {
    /// Restrict to these sources (empty = every source)
    pub sources: Vec<SourceId>,
    /// Restrict to posts retrieved within this inclusive date range
    pub retrieved_between: Option<DateRange>,
}

impl PendingQuery {
    /// Pending posts of every source
    pub fn all() -> Self {
        Self::default()
    }

    /// Pending posts of the given sources
    pub fn for_sources(sources: impl IntoIterator<Item = SourceId>) -> Self {
        Self {
            sources: sources.into_iter().collect(),
            retrieved_between: None,
        }
    }

    /// Restrict to posts retrieved within `range`
    pub fn retrieved_between(mut self, range: Option<DateRange>) -> Self {
        self.retrieved_between = range;
        self
    }
}

/// Post record row from database
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    /// Page the post was published on
    pub source_id: String,
    /// Post identifier
    pub post_id: String,
    /// Page display name at crawl time
    pub page_name: String,
    /// Link as published
    pub link: Option<String>,
    /// Canonical URL after redirects
    pub resolved_url: Option<String>,
    /// Host of the resolved URL
    pub base_domain: Option<String>,
    /// Share count
    pub shares: Option<i64>,
    /// Unix timestamp when the post was created
    pub created_time: i64,
    /// Unix timestamp when the post was crawled
    pub retrieved_on: i64,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        PostRecord {
            source_id: SourceId::new(row.source_id),
            post_id: row.post_id,
            page_name: row.page_name,
            link: row.link,
            resolved_url: row.resolved_url,
            base_domain: row.base_domain,
            shares: row.shares,
            created_time: from_timestamp(row.created_time),
            retrieved_on: from_timestamp(row.retrieved_on),
        }
    }
}

/// Article record row from database
#[derive(Debug, Clone, FromRow)]
pub struct ArticleRow {
    /// Post the article was linked from
    pub post_id: String,
    /// Page the post was published on
    pub source_id: String,
    /// Article URL
    pub url: String,
    /// Host of the article URL
    pub base_domain: Option<String>,
    /// Article title
    pub title: String,
    /// JSON array of author names
    pub authors: String,
    /// Extracted body text
    pub body_text: String,
    /// Unix timestamp when the linking post was created
    pub post_created_time: i64,
    /// Unix timestamp when the article was retrieved
    pub retrieved_on: i64,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        ArticleRecord {
            post_id: row.post_id,
            source_id: SourceId::new(row.source_id),
            url: row.url,
            base_domain: row.base_domain,
            title: row.title,
            authors: serde_json::from_str(&row.authors).unwrap_or_default(),
            body_text: row.body_text,
            post_created_time: from_timestamp(row.post_created_time),
            retrieved_on: from_timestamp(row.retrieved_on),
        }
    }
}

/// Crawl error row from database
#[derive(Debug, Clone, FromRow)]
pub struct ErrorRow {
    /// Unique database ID
    pub id: i64,
    /// Source the failure was recorded for
    pub source_id: String,
    /// Failure cause
    pub cause: String,
    /// Unix timestamp of the failure
    pub occurred_at: i64,
}

impl From<ErrorRow> for ErrorEntry {
    fn from(row: ErrorRow) -> Self {
        ErrorEntry {
            source_id: SourceId::new(row.source_id),
            cause: row.cause,
            occurred_at: from_timestamp(row.occurred_at),
        }
    }
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// Database handle for news-archives
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
