//! # news-archives
//!
//! Crawl the link history of social-media pages and archive the articles they link to.
//!
//! ## Design Philosophy
//!
//! news-archives is designed to be:
//! - **Resumable** - Every table is append-only; rerunning a crawl or an archive job only
//!   adds what is missing
//! - **Failure-tolerant** - A flaky page or a dead link costs one record, never the run;
//!   a source that keeps failing is cut short and reported
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Pipeline
//!
//! 1. [`crawler`] paginates each source's feed, keeps link posts and resolves their
//!    short URLs through [`resolver`], with failures counted by [`error_budget`].
//! 2. [`partition`] splits the posts still missing an article into balanced batches.
//! 3. [`fetch`] extracts every batch concurrently, one bounded worker pool per source.
//!
//! [`NewsArchiver`] drives both halves against a SQLite [`Database`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use news_archives::{Config, NewsArchiver, SourceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.graph_api.access_token = "app-id|app-secret".to_string();
//!     config.sources = vec![SourceConfig::named("nytimes")];
//!     config.archive.chunk_size = Some(200);
//!
//!     let archiver = NewsArchiver::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = archiver.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let crawl = archiver.crawl_all_sources().await?;
//!     for source in crawl.truncated() {
//!         eprintln!("{} stopped early after {} errors", source.name, source.errors);
//!     }
//!
//!     let archive = archiver.archive_pending().await?;
//!     println!("archived {} articles", archive.archived);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Crawl and archive drivers
pub mod archiver;
/// Configuration types
pub mod config;
/// Feed crawler state machine
pub mod crawler;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Per-source consecutive-failure tracking
pub mod error_budget;
/// Article content extraction
pub mod extract;
/// Social-media feed access
pub mod feed;
/// Concurrent article fetching
pub mod fetch;
/// Balanced batch partitioning
pub mod partition;
/// Short-link redirect resolution
pub mod resolver;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use archiver::{Collaborators, NewsArchiver, ResolvedSources};
pub use config::{
    ArchiveConfig, Config, CrawlConfig, DateRange, EmptyBodyPolicy, GraphApiConfig, HttpConfig,
    PersistenceConfig, RetryConfig, SourceConfig,
};
pub use crawler::{Crawl, FeedCrawler};
pub use db::{Database, PendingQuery};
pub use error::{DatabaseError, Error, ExtractionError, FeedError, ResolveError, Result};
pub use error_budget::ErrorBudget;
pub use extract::{ContentExtractor, ExtractedContent, HtmlExtractor};
pub use feed::{Cursor, FeedApi, FeedPage, FeedPost, GraphFeedApi};
pub use fetch::{
    AcceptAll, FetchGroup, FetchOrchestrator, FetchSettings, LinkFilter, SelfPublishedFilter,
    SourceFetchGroup,
};
pub use partition::{FetchBatch, Partitioner, partition};
pub use resolver::{HttpRedirectResolver, UrlResolver, base_domain};
pub use types::{
    ArchiveReport, ArticleRecord, CrawlReport, DoneReason, ErrorEntry, Event, PostRecord, Source,
    SourceCrawlSummary, SourceId,
};

/// Helper function to run the archiver with graceful signal handling.
///
/// Waits for Ctrl+C (or SIGTERM on Unix) and then calls the archiver's `shutdown()`
/// method, so a crawl or archive job running on a clone of the archiver stops at its next
/// source or batch boundary.
///
/// # Example
///
/// ```no_run
/// use news_archives::{Config, NewsArchiver, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let archiver = NewsArchiver::new(Config::default()).await?;
///
///     let worker = archiver.clone();
///     let job = tokio::spawn(async move { worker.archive_pending().await });
///
///     // Run with automatic signal handling
///     run_with_shutdown(&archiver).await?;
///     let report = job.await??;
///     println!("interrupted: {}", report.interrupted);
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(archiver: &NewsArchiver) -> Result<()> {
    shutdown_on(archiver, wait_for_signal()).await
}

/// Shut `archiver` down once `trigger` completes
///
/// [`run_with_shutdown`] uses process signals as the trigger; embedders with their own
/// stop condition (a channel, a deadline) can pass that instead.
pub async fn shutdown_on<F>(archiver: &NewsArchiver, trigger: F) -> Result<()>
where
    F: std::future::Future<Output = ()>,
{
    trigger.await;
    archiver.shutdown().await
}

async fn wait_for_signal() {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C signal"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}
