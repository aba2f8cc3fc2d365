//! Crawl and archive drivers.
//!
//! [`NewsArchiver`] owns the database, the configuration and the three network
//! collaborators (feed API, redirect resolver, content extractor). It runs two kinds of
//! job, both sequential at the top level:
//!
//! - [`crawl_all_sources`](NewsArchiver::crawl_all_sources): crawl every configured source
//!   in turn, appending new post records as they are produced.
//! - [`archive_pending`](NewsArchiver::archive_pending): partition the pending pool into
//!   balanced batches and fetch each batch's articles concurrently.
//!
//! Progress is broadcast as [`Event`]s; [`shutdown`](NewsArchiver::shutdown) stops either
//! job at its next source or batch boundary.
//!
//! ## Submodules
//!
//! - [`crawl`] — Source lookup and the crawl driver
//! - [`archive`] — The archive driver and self-published filter assembly
//! - [`lifecycle`] — Shutdown coordination

use crate::config::Config;
use crate::db::Database;
use crate::extract::{ContentExtractor, HtmlExtractor};
use crate::feed::{FeedApi, GraphFeedApi};
use crate::resolver::{HttpRedirectResolver, UrlResolver};
use crate::types::Event;
use crate::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

mod archive;
mod crawl;
mod lifecycle;

pub use crawl::ResolvedSources;

/// Network collaborators used by the drivers
#[derive(Clone)]
pub struct Collaborators {
    /// Social-media feed access
    pub feed: Arc<dyn FeedApi>,
    /// Short-link redirect resolution
    pub resolver: Arc<dyn UrlResolver>,
    /// Article content extraction
    pub extractor: Arc<dyn ContentExtractor>,
}

impl Collaborators {
    /// Production collaborators built from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            feed: Arc::new(GraphFeedApi::new(config.graph_api.clone(), &config.http)?),
            resolver: Arc::new(HttpRedirectResolver::new(&config.http)?),
            extractor: Arc::new(HtmlExtractor::new(&config.http)?),
        })
    }
}

/// Crawls page feeds and archives the articles they link to
#[derive(Clone)]
pub struct NewsArchiver {
    /// Database instance for persistence
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing)
    config: Arc<Config>,
    feed: Arc<dyn FeedApi>,
    resolver: Arc<dyn UrlResolver>,
    extractor: Arc<dyn ContentExtractor>,
    /// Cancelled once shutdown is requested
    shutdown: CancellationToken,
}

impl NewsArchiver {
    /// Create a new NewsArchiver instance
    ///
    /// Validates the configuration, opens (and migrates) the database at
    /// `persistence.database_path`, and builds the Graph API, redirect and HTML
    /// collaborators.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let collaborators = Collaborators::from_config(&config)?;
        let db = Database::new(&config.persistence.database_path).await?;
        Self::with_collaborators(config, db, collaborators)
    }

    /// Create a NewsArchiver over an open database and custom collaborators
    pub fn with_collaborators(
        config: Config,
        db: Database,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            feed: collaborators.feed,
            resolver: collaborators.resolver,
            extractor: collaborators.extractor,
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribe to crawl and archive events
    ///
    /// Each subscriber receives every event emitted after it subscribed. Lagging
    /// subscribers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration the archiver was created with
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn emit_event(&self, event: Event) {
        // No subscribers is not an error
        let _ = self.event_tx.send(event);
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
