//! Core types and events for news-archives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier of a social-media page
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub String);

impl SourceId {
    /// Create a new SourceId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SourceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for SourceId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SourceId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SourceId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// A social-media page whose feed is crawled
///
/// Created once when a run is configured and never changed during the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Stable page identifier
    pub id: SourceId,
    /// Display name
    pub name: String,
    /// Domains the page publishes under (heuristic, used only by the self-published filter)
    #[serde(default)]
    pub base_urls: Vec<String>,
}

impl Source {
    /// Create a source with no base URL hints
    pub fn new(id: impl Into<SourceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_urls: vec![],
        }
    }
}

/// One externally-linked post observed in a source's feed
///
/// `(source_id, post_id)` is the natural key. Records are appended once and never
/// updated; a record whose link could not be resolved keeps `resolved_url: None` and
/// is never handed to the article fetcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    /// Page the post was published on
    pub source_id: SourceId,
    /// Post identifier
    pub post_id: String,
    /// Display name of the page at crawl time
    pub page_name: String,
    /// Link as published in the post
    pub link: Option<String>,
    /// Canonical URL after following redirects (None = unresolved)
    pub resolved_url: Option<String>,
    /// Host of the resolved URL
    pub base_domain: Option<String>,
    /// Share count reported by the feed
    pub shares: Option<i64>,
    /// When the post was created
    pub created_time: DateTime<Utc>,
    /// When the post was observed by the crawler
    pub retrieved_on: DateTime<Utc>,
}

impl PostRecord {
    /// Whether the record can be handed to the article fetcher
    pub fn is_fetchable(&self) -> bool {
        self.resolved_url.is_some()
    }
}

/// Result of a successful content extraction for one post record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    /// Post the article was linked from
    pub post_id: String,
    /// Page the post was published on
    pub source_id: SourceId,
    /// Resolved article URL
    pub url: String,
    /// Host of the article URL
    pub base_domain: Option<String>,
    /// Article title
    pub title: String,
    /// Article authors
    pub authors: Vec<String>,
    /// Extracted body text (never empty)
    pub body_text: String,
    /// When the linking post was created
    pub post_created_time: DateTime<Utc>,
    /// When the article was retrieved
    pub retrieved_on: DateTime<Utc>,
}

/// One failure observed while crawling a source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Source the failure was observed for
    pub source_id: SourceId,
    /// Human-readable cause
    pub cause: String,
    /// When the failure was recorded
    pub occurred_at: DateTime<Utc>,
}

/// Why the crawl of one source stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// The feed had no further pages
    Exhausted,
    /// The last post seen was older than the requested lower date bound
    DateBoundaryReached,
    /// The source failed too many times in a row
    ErrorLimitExceeded,
}

impl DoneReason {
    /// Whether the crawl stopped before reaching the end of the requested history
    pub fn is_truncated(&self) -> bool {
        matches!(self, DoneReason::ErrorLimitExceeded)
    }
}

impl std::fmt::Display for DoneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoneReason::Exhausted => write!(f, "exhausted"),
            DoneReason::DateBoundaryReached => write!(f, "date boundary reached"),
            DoneReason::ErrorLimitExceeded => write!(f, "error limit exceeded"),
        }
    }
}

/// Outcome of crawling one source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCrawlSummary {
    /// Source that was crawled
    pub source_id: SourceId,
    /// Display name of the source
    pub name: String,
    /// Post records produced by the crawler
    pub records: usize,
    /// Records newly written (records already stored are skipped)
    pub saved: usize,
    /// Failures recorded against the source during the crawl
    pub errors: usize,
    /// Why the crawl stopped
    pub reason: DoneReason,
}

/// Outcome of a "crawl all sources" run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    /// One summary per crawled source, in crawl order
    pub sources: Vec<SourceCrawlSummary>,
    /// Configured page names that could not be resolved to a source
    pub unknown_pages: Vec<String>,
    /// Whether the run stopped early because of a shutdown request
    pub interrupted: bool,
}

impl CrawlReport {
    /// Sources whose crawl was cut short by their error budget
    pub fn truncated(&self) -> Vec<&SourceCrawlSummary> {
        self.sources
            .iter()
            .filter(|s| s.reason.is_truncated())
            .collect()
    }

    /// Total records newly written across all sources
    pub fn total_saved(&self) -> usize {
        self.sources.iter().map(|s| s.saved).sum()
    }
}

/// Outcome of an "archive all pending posts" run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReport {
    /// Fetch batches processed
    pub batches: usize,
    /// Post records handed to the fetcher
    pub attempted: usize,
    /// Article records written
    pub archived: usize,
    /// Records dropped (filtered out, failed, or empty)
    pub dropped: usize,
    /// Whether the run stopped early because of a shutdown request
    pub interrupted: bool,
}

/// Event emitted while crawling feeds and archiving articles
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Crawl of a source started
    CrawlStarted {
        /// Source being crawled
        source_id: SourceId,
        /// Display name
        name: String,
    },

    /// Post records were appended to the database
    RecordsSaved {
        /// Source the records belong to
        source_id: SourceId,
        /// Number of records newly written
        count: usize,
        /// Creation time of the oldest record in the append
        oldest: Option<DateTime<Utc>>,
    },

    /// Crawl of a source finished
    CrawlFinished {
        /// Source that was crawled
        source_id: SourceId,
        /// Why the crawl stopped
        reason: DoneReason,
        /// Post records produced
        records: usize,
    },

    /// A fetch batch is about to be processed
    BatchStarted {
        /// Batch sequence number (0-based)
        index: usize,
        /// Records in the batch
        records: usize,
        /// Sources represented in the batch
        sources: usize,
        /// Oldest post in the batch
        oldest: Option<DateTime<Utc>>,
        /// Newest post in the batch
        newest: Option<DateTime<Utc>>,
    },

    /// A fetch batch was extracted and persisted
    BatchArchived {
        /// Batch sequence number (0-based)
        index: usize,
        /// Article records written
        articles: usize,
    },

    /// Archive run finished
    ArchiveFinished {
        /// Batches processed
        batches: usize,
        /// Article records written
        articles: usize,
    },
}
