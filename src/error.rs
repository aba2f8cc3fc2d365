//! Error types for news-archives
//!
//! The taxonomy follows the way failures are handled by the crawl and archive drivers:
//! - Transient failures (a feed page or redirect that failed once) are recorded against
//!   the source's error budget and retried on the next loop iteration.
//! - Source-fatal failures end crawling for one source only.
//! - Record-local failures ([`ResolveError`], [`ExtractionError`]) null out or drop a
//!   single record and never propagate past the component that saw them.
//!
//! Nothing in the library is process-fatal except configuration and database errors
//! surfaced at construction time.

use thiserror::Error;

/// Result type alias for news-archives operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for news-archives
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "crawl.error_limit")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Network error outside of the feed, resolver, and extraction collaborators
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Feed API error
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Redirect resolution error
    #[error("resolution error: {0}")]
    Resolve(#[from] ResolveError),

    /// Article content extraction error
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Shutdown in progress - no new sources or batches are started
    #[error("shutdown in progress: not starting new work")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Failures of the page-feed API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The request never produced a response (connect, timeout, TLS)
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message returned by the API
        message: String,
    },

    /// The access token was rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),

    /// The page name or identifier does not exist
    #[error("page not found: {0}")]
    PageNotFound(String),
}

// Graph request URLs carry the access token, so it is stripped before the error is
// rendered into logs or the crawl error table.
impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_decode() {
            FeedError::Parse(err.to_string())
        } else {
            FeedError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}

/// Why a short URL could not be resolved to a canonical URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Network failure while following the redirect chain
    #[error("connection failed for {url}: {reason}")]
    Connection {
        /// URL being resolved
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// The redirect chain exceeded the configured limit
    #[error("too many redirects for {url}")]
    TooManyRedirects {
        /// URL being resolved
        url: String,
    },

    /// The URL or a redirect target was not valid
    #[error("malformed URL or response encoding for {url}: {reason}")]
    Encoding {
        /// URL being resolved
        url: String,
        /// Underlying failure
        reason: String,
    },
}

/// Why article content could not be extracted from a URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The article could not be fetched
    #[error("network error: {message}")]
    Network {
        /// Underlying failure
        message: String,
        /// Whether the failure was a timeout or connection failure
        transient: bool,
    },

    /// The article server answered with a non-success status
    #[error("HTTP {status}")]
    Http {
        /// HTTP status code
        status: u16,
    },

    /// The document could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Extraction produced no body text
    #[error("extracted body text is empty")]
    EmptyBody,
}

impl From<reqwest::Error> for ExtractionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ExtractionError::Parse(err.to_string());
        }
        ExtractionError::Network {
            transient: err.is_timeout() || err.is_connect(),
            message: err.to_string(),
        }
    }
}
