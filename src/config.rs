//! Configuration types for news-archives

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// One social-media page to crawl
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Page name as it appears in the page URL (e.g., "nytimes")
    pub name: String,

    /// Stable page identifier. Looked up through the feed API when absent.
    #[serde(default)]
    pub id: Option<String>,

    /// Base domains this page publishes under, used by the self-published filter.
    /// When empty, the page's declared website and historical link domains are used.
    #[serde(default)]
    pub base_urls: Vec<String>,
}

impl SourceConfig {
    /// Create a source config from a page name with no known identifier
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            base_urls: vec![],
        }
    }
}

/// Graph API connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphApiConfig {
    /// API root (default: "https://graph.facebook.com")
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,

    /// API version path segment (default: "v2.8")
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Access token sent with every request
    #[serde(default)]
    pub access_token: String,

    /// Posts requested per page (default: 100)
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Post fields requested (default: "id,link,shares,created_time,type")
    #[serde(default = "default_fields")]
    pub fields: String,
}

impl Default for GraphApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_graph_base_url(),
            api_version: default_api_version(),
            access_token: String::new(),
            page_limit: default_page_limit(),
            fields: default_fields(),
        }
    }
}

/// Feed crawl behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Consecutive failures tolerated per source before its crawl is abandoned (default: 30)
    #[serde(default = "default_error_limit")]
    pub error_limit: u32,

    /// Oldest post date to paginate back to (None = crawl the whole history)
    #[serde(default)]
    pub through_date: Option<NaiveDate>,

    /// Number of records buffered before an incremental append to the database (default: 100)
    #[serde(default = "default_persist_every")]
    pub persist_every: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            error_limit: default_error_limit(),
            through_date: None,
            persist_every: default_persist_every(),
        }
    }
}

/// What to do with an extraction that produced no body text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyBodyPolicy {
    /// Silently drop the record (default)
    #[default]
    Drop,
    /// Treat the empty body as a retryable failure, then drop once retries are exhausted
    Retry,
}

/// Inclusive date range
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day included
    pub start: NaiveDate,
    /// Last day included
    pub end: NaiveDate,
}

impl DateRange {
    /// Whether `date` falls inside the range
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Article archive behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Target records per fetch batch (None = the whole pending pool is one batch)
    #[serde(default)]
    pub chunk_size: Option<usize>,

    /// Concurrent extraction calls per source within a batch (default: 1)
    #[serde(default = "default_threads_per_source")]
    pub threads_per_source: usize,

    /// Handling of extractions with empty body text
    #[serde(default)]
    pub empty_body_policy: EmptyBodyPolicy,

    /// Only archive posts retrieved within this range (None = all pending posts)
    #[serde(default)]
    pub retrieved_between: Option<DateRange>,

    /// Only archive links published under the source's own domain (default: false)
    #[serde(default)]
    pub self_published_only: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            chunk_size: None,
            threads_per_source: default_threads_per_source(),
            empty_body_policy: EmptyBodyPolicy::default(),
            retrieved_between: None,
            self_published_only: false,
        }
    }
}

/// HTTP client settings shared by the resolver and the extractor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Longest redirect chain followed when resolving a link (default: 10)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_http_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient extraction failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./news-archives.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`NewsArchiver`](crate::NewsArchiver)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Pages to crawl
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Graph API connection settings
    #[serde(default)]
    pub graph_api: GraphApiConfig,

    /// Feed crawl behavior
    #[serde(default)]
    pub crawl: CrawlConfig,

    /// Article archive behavior
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry behavior for extraction
    #[serde(default)]
    pub retry: RetryConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check values that would otherwise make a run loop or divide by zero
    pub fn validate(&self) -> Result<()> {
        if self.crawl.error_limit == 0 {
            return Err(Error::config(
                "crawl.error_limit",
                "error limit must be at least 1",
            ));
        }
        if self.crawl.persist_every == 0 {
            return Err(Error::config(
                "crawl.persist_every",
                "persist_every must be at least 1",
            ));
        }
        if self.archive.chunk_size == Some(0) {
            return Err(Error::config(
                "archive.chunk_size",
                "chunk size must be at least 1 (omit it to archive everything in one batch)",
            ));
        }
        if self.archive.threads_per_source == 0 {
            return Err(Error::config(
                "archive.threads_per_source",
                "threads per source must be at least 1",
            ));
        }
        if let Some(range) = self.archive.retrieved_between
            && range.start > range.end
        {
            return Err(Error::config(
                "archive.retrieved_between",
                format!("range start {} is after end {}", range.start, range.end),
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "backoff multiplier must be a finite number of at least 1.0",
            ));
        }
        if self.graph_api.page_limit == 0 {
            return Err(Error::config(
                "graph_api.page_limit",
                "page limit must be at least 1",
            ));
        }
        for (idx, source) in self.sources.iter().enumerate() {
            if source.name.trim().is_empty() && source.id.is_none() {
                return Err(Error::config(
                    format!("sources[{idx}]"),
                    "a source needs a name or an id",
                ));
            }
        }
        Ok(())
    }
}

// Default value functions
fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v2.8".to_string()
}

fn default_page_limit() -> u32 {
    100
}

fn default_fields() -> String {
    "id,link,shares,created_time,type".to_string()
}

fn default_error_limit() -> u32 {
    30
}

fn default_persist_every() -> usize {
    100
}

fn default_threads_per_source() -> usize {
    1
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    concat!("news-archives/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("news-archives.db")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
