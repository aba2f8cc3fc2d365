use crate::archiver::{Collaborators, NewsArchiver};
use crate::config::{Config, SourceConfig};
use crate::db::Database;
use crate::error::{ExtractionError, FeedError, ResolveError};
use crate::extract::{ContentExtractor, ExtractedContent};
use crate::feed::{Cursor, FeedApi, FeedPage, FeedPost};
use crate::resolver::UrlResolver;
use crate::types::{Event, SourceId};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::NamedTempFile;


/// Feed with pages keyed by `(source, cursor)`; anything unscripted is a server error
#[derive(Default)]
struct FakeFeed {
    pages: HashMap<(String, Option<String>), FeedPage>,
    names: HashMap<String, String>,
    websites: HashMap<String, String>,
}

impl FakeFeed {
    fn page(mut self, source: &str, cursor: Option<&str>, posts: Vec<FeedPost>, next: Option<&str>) -> Self {
        self.pages.insert(
            (source.to_string(), cursor.map(str::to_string)),
            FeedPage {
                posts,
                next_cursor: next.map(Cursor::new),
            },
        );
        self
    }

    fn named(mut self, name: &str, id: &str) -> Self {
        self.names.insert(name.to_string(), id.to_string());
        self
    }

    fn website(mut self, id: &str, website: &str) -> Self {
        self.websites.insert(id.to_string(), website.to_string());
        self
    }
}

#[async_trait]
impl FeedApi for FakeFeed {
    async fn fetch_page(
        &self,
        source: &SourceId,
        cursor: Option<&Cursor>,
    ) -> Result<FeedPage, FeedError> {
        let key = (source.to_string(), cursor.map(|c| c.as_str().to_string()));
        self.pages.get(&key).cloned().ok_or(FeedError::Api {
            status: 500,
            message: "unknown error".into(),
        })
    }

    async fn lookup_source(&self, name: &str) -> Result<SourceId, FeedError> {
        self.names
            .get(name)
            .map(|id| SourceId::new(id.clone()))
            .ok_or_else(|| FeedError::PageNotFound(name.to_string()))
    }

    async fn source_website(&self, source: &SourceId) -> Result<Option<String>, FeedError> {
        Ok(self.websites.get(source.as_str()).cloned())
    }
}

/// Resolves `http://short/<x>` to `https://<x>`; everything else fails to connect
struct FakeResolver;

#[async_trait]
impl UrlResolver for FakeResolver {
    async fn resolve_url(&self, url: &str) -> Result<String, ResolveError> {
        url.strip_prefix("http://short/")
            .map(|rest| format!("https://{rest}"))
            .ok_or_else(|| ResolveError::Connection {
                url: url.to_string(),
                reason: "connection refused".into(),
            })
    }
}

/// Extractor with a body per URL; unknown URLs are 404s
#[derive(Default)]
struct FakeExtractor {
    bodies: HashMap<String, String>,
}

impl FakeExtractor {
    fn body(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl ContentExtractor for FakeExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedContent, ExtractionError> {
        let body = self
            .bodies
            .get(url)
            .ok_or(ExtractionError::Http { status: 404 })?;
        Ok(ExtractedContent {
            title: format!("Title of {url}"),
            authors: vec!["Jane Roe".into()],
            body_text: body.clone(),
        })
    }
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn link_post(id: &str, target: &str, created: DateTime<Utc>) -> FeedPost {
    FeedPost {
        id: id.into(),
        link: Some(format!("http://short/{target}")),
        created_time: created,
        post_type: Some("link".into()),
        share_count: Some(3),
    }
}

fn source(name: &str, id: &str) -> SourceConfig {
    SourceConfig {
        id: Some(id.to_string()),
        ..SourceConfig::named(name)
    }
}

async fn setup(
    config: Config,
    feed: FakeFeed,
    extractor: FakeExtractor,
) -> (NewsArchiver, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    let collaborators = Collaborators {
        feed: Arc::new(feed),
        resolver: Arc::new(FakeResolver),
        extractor: Arc::new(extractor),
    };
    let archiver = NewsArchiver::with_collaborators(config, db, collaborators).unwrap();
    (archiver, temp_file)
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut seen = vec![];
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
