//! Scripted in-memory collaborators

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use news_archives::{
    Collaborators, Config, ContentExtractor, Cursor, Database, ExtractedContent, ExtractionError,
    FeedApi, FeedError, FeedPage, FeedPost, NewsArchiver, ResolveError, SourceId, UrlResolver,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::{Notify, Semaphore};

type PageKey = (String, Option<String>);

/// Feed answering `(source, cursor)` requests from a script
///
/// Each key holds a queue of answers; the last answer repeats once the others are used
/// up. Unscripted requests fail with a 500.
#[derive(Default)]
pub struct ScriptedFeed {
    answers: Mutex<HashMap<PageKey, VecDeque<Result<FeedPage, FeedError>>>>,
    requests: Mutex<Vec<PageKey>>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a page for `source` at `cursor`
    pub fn page(self, source: &str, cursor: Option<&str>, posts: Vec<FeedPost>, next: Option<&str>) -> Self {
        self.answer(
            source,
            cursor,
            Ok(FeedPage {
                posts,
                next_cursor: next.map(Cursor::new),
            }),
        )
    }

    /// Script a failure for `source` at `cursor`
    pub fn failure(self, source: &str, cursor: Option<&str>) -> Self {
        self.answer(
            source,
            cursor,
            Err(FeedError::Api {
                status: 500,
                message: "An unknown error has occurred.".into(),
            }),
        )
    }

    fn answer(self, source: &str, cursor: Option<&str>, answer: Result<FeedPage, FeedError>) -> Self {
        self.answers
            .lock()
            .unwrap()
            .entry((source.to_string(), cursor.map(str::to_string)))
            .or_default()
            .push_back(answer);
        self
    }

    /// Every `(source, cursor)` requested so far, in order
    pub fn requests(&self) -> Vec<PageKey> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedApi for ScriptedFeed {
    async fn fetch_page(
        &self,
        source: &SourceId,
        cursor: Option<&Cursor>,
    ) -> Result<FeedPage, FeedError> {
        let key = (source.to_string(), cursor.map(|c| c.as_str().to_string()));
        self.requests.lock().unwrap().push(key.clone());

        let mut answers = self.answers.lock().unwrap();
        match answers.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => Err(FeedError::Api {
                status: 500,
                message: "unscripted request".into(),
            }),
        }
    }
}

/// Resolver with canned redirect targets; unknown links have no redirects
#[derive(Default)]
pub struct MapResolver {
    answers: HashMap<String, Result<String, ResolveError>>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirect(mut self, link: &str, target: &str) -> Self {
        self.answers.insert(link.to_string(), Ok(target.to_string()));
        self
    }

    pub fn unreachable(mut self, link: &str) -> Self {
        self.answers.insert(
            link.to_string(),
            Err(ResolveError::Connection {
                url: link.to_string(),
                reason: "connection refused".into(),
            }),
        );
        self
    }
}

#[async_trait]
impl UrlResolver for MapResolver {
    async fn resolve_url(&self, url: &str) -> Result<String, ResolveError> {
        self.answers
            .get(url)
            .cloned()
            .unwrap_or_else(|| Ok(url.to_string()))
    }
}

/// Extractor with a body per URL; unknown URLs are 404s
///
/// An optional gate holds every extraction until the test releases it.
#[derive(Default)]
pub struct MapExtractor {
    bodies: HashMap<String, String>,
    gate: Option<Gate>,
}

/// Lets a test observe the first extraction and decide when extractions finish
#[derive(Clone)]
pub struct Gate {
    pub started: Arc<Notify>,
    pub open: Arc<Semaphore>,
}

impl Gate {
    pub fn closed() -> Self {
        Self {
            started: Arc::new(Notify::new()),
            open: Arc::new(Semaphore::new(0)),
        }
    }

    pub fn release(&self) {
        self.open.add_permits(1024);
    }
}

impl MapExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl ContentExtractor for MapExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedContent, ExtractionError> {
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            let _permit = gate.open.acquire().await.unwrap();
        }

        let body = self
            .bodies
            .get(url)
            .ok_or(ExtractionError::Http { status: 404 })?;
        Ok(ExtractedContent {
            title: format!("Headline for {url}"),
            authors: vec!["Staff Reporter".into()],
            body_text: body.clone(),
        })
    }
}

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

pub fn link_post(id: &str, link: &str, created: DateTime<Utc>) -> FeedPost {
    FeedPost {
        id: id.into(),
        link: Some(link.into()),
        created_time: created,
        post_type: Some("link".into()),
        share_count: None,
    }
}

pub fn status_post(id: &str, created: DateTime<Utc>) -> FeedPost {
    FeedPost {
        id: id.into(),
        link: None,
        created_time: created,
        post_type: Some("status".into()),
        share_count: None,
    }
}

/// Archiver over a fresh database in a temporary directory
pub async fn archiver_with(
    mut config: Config,
    feed: Arc<ScriptedFeed>,
    resolver: MapResolver,
    extractor: MapExtractor,
) -> (NewsArchiver, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    config.persistence.database_path = temp_dir.path().join("archive.db");

    let db = Database::new(&config.persistence.database_path).await.unwrap();
    let collaborators = Collaborators {
        feed,
        resolver: Arc::new(resolver),
        extractor: Arc::new(extractor),
    };
    let archiver = NewsArchiver::with_collaborators(config, db, collaborators).unwrap();
    (archiver, temp_dir)
}
