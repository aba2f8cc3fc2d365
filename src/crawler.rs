//! Feed crawler for one source.
//!
//! A [`Crawl`] is a pull-based producer: every call to [`Crawl::next_record`] advances the
//! pagination state machine just far enough to yield the next post record, so a caller can
//! persist records while pagination is still in progress.
//!
//! ```text
//! Fetching --page--> Filtering --page drained--> Advancing --next cursor--> Fetching
//!    |  ^                                            |
//!    +--+ API failure (same cursor)                  +--> Done(exhausted | date boundary)
//!    |
//!    +--> Done(error limit exceeded)
//! ```
//!
//! Termination: every failed fetch increments the source's consecutive-failure count, so
//! the Fetching self-loop is bounded by the error budget. Advancing only moves to a cursor
//! that has not been fetched before, so a cycling upstream ends as exhausted.

use crate::error_budget::ErrorBudget;
use crate::feed::{Cursor, FeedApi, FeedPost};
use crate::resolver::{UrlResolver, base_domain};
use crate::types::{DoneReason, PostRecord, Source};
use chrono::{DateTime, NaiveDate, Utc};
use futures::Stream;
use std::collections::{HashSet, VecDeque};

/// Builds per-source crawls that share collaborators and an error budget
pub struct FeedCrawler<'a> {
    api: &'a dyn FeedApi,
    resolver: &'a dyn UrlResolver,
    budget: &'a ErrorBudget,
    through_date: Option<NaiveDate>,
}

impl<'a> FeedCrawler<'a> {
    /// Create a crawler with no lower date bound
    pub fn new(api: &'a dyn FeedApi, resolver: &'a dyn UrlResolver, budget: &'a ErrorBudget) -> Self {
        Self {
            api,
            resolver,
            budget,
            through_date: None,
        }
    }

    /// Stop paginating once the last link post seen is older than `date`
    pub fn through_date(mut self, date: Option<NaiveDate>) -> Self {
        self.through_date = date;
        self
    }

    /// Start crawling `source` from the first page of its feed
    pub fn crawl(&self, source: Source) -> Crawl<'a> {
        Crawl {
            api: self.api,
            resolver: self.resolver,
            budget: self.budget,
            through_date: self.through_date,
            source,
            state: State::Fetching,
            cursor: None,
            visited: HashSet::new(),
            page: VecDeque::new(),
            next_cursor: None,
            last_seen: None,
            pages: 0,
            emitted: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Fetching,
    Filtering,
    Advancing,
    Done(DoneReason),
}

/// Pagination over one source's feed
pub struct Crawl<'a> {
    api: &'a dyn FeedApi,
    resolver: &'a dyn UrlResolver,
    budget: &'a ErrorBudget,
    through_date: Option<NaiveDate>,
    source: Source,
    state: State,
    cursor: Option<Cursor>,
    visited: HashSet<Cursor>,
    page: VecDeque<FeedPost>,
    next_cursor: Option<Cursor>,
    // creation time of the most recently filtered link post, carried across pages
    last_seen: Option<DateTime<Utc>>,
    pages: usize,
    emitted: usize,
}

impl<'a> Crawl<'a> {
    /// Source being crawled
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Cursor of the page currently being fetched or filtered (`None` = first page)
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// Why the crawl stopped, once it has
    pub fn outcome(&self) -> Option<DoneReason> {
        match self.state {
            State::Done(reason) => Some(reason),
            _ => None,
        }
    }

    /// Number of records yielded so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Advance pagination until the next post record is available.
    ///
    /// Returns `None` once the crawl is done; [`outcome`](Self::outcome) then says why.
    pub async fn next_record(&mut self) -> Option<PostRecord> {
        loop {
            match self.state {
                State::Done(_) => return None,
                State::Fetching => self.fetch().await,
                State::Filtering => match self.page.pop_front() {
                    Some(post) => {
                        if let Some(record) = self.filter(post).await {
                            self.emitted += 1;
                            return Some(record);
                        }
                    }
                    None => self.state = State::Advancing,
                },
                State::Advancing => self.advance(),
            }
        }
    }

    /// Drain the crawl, returning every record and the reason it stopped
    pub async fn collect(mut self) -> (Vec<PostRecord>, DoneReason) {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await {
            records.push(record);
        }
        // next_record only returns None in the Done state
        let reason = self.outcome().unwrap_or(DoneReason::Exhausted);
        (records, reason)
    }

    /// Adapt the crawl into a stream of records
    pub fn into_stream(self) -> impl Stream<Item = PostRecord> + 'a {
        futures::stream::unfold(self, |mut crawl| async move {
            let record = crawl.next_record().await?;
            Some((record, crawl))
        })
    }

    async fn fetch(&mut self) {
        let source_id = &self.source.id;
        if self.budget.is_exhausted(source_id) {
            tracing::error!(
                source = %source_id,
                name = %self.source.name,
                consecutive = self.budget.consecutive_failures(source_id),
                limit = self.budget.limit(),
                records = self.emitted,
                "Error limit exceeded, abandoning source"
            );
            self.finish(DoneReason::ErrorLimitExceeded);
            return;
        }

        match self.api.fetch_page(source_id, self.cursor.as_ref()).await {
            Ok(page) => {
                self.budget.record_success(source_id);
                self.pages += 1;
                tracing::debug!(
                    source = %source_id,
                    page = self.pages,
                    posts = page.posts.len(),
                    has_next = page.next_cursor.is_some(),
                    "Fetched feed page"
                );
                self.page = page.posts.into();
                self.next_cursor = page.next_cursor;
                self.state = State::Filtering;
            }
            Err(e) => {
                let consecutive = self.budget.record_failure(source_id, &e);
                tracing::warn!(
                    source = %source_id,
                    page = self.pages + 1,
                    consecutive,
                    error = %e,
                    "Feed page request failed, retrying same page"
                );
            }
        }
    }

    async fn filter(&mut self, post: FeedPost) -> Option<PostRecord> {
        if !post.is_link() {
            return None;
        }
        self.last_seen = Some(post.created_time);

        let source_id = &self.source.id;
        let resolved_url = match self.resolver.resolve(post.link.as_deref()).await {
            Ok(resolved) => {
                if resolved.is_some() {
                    self.budget.record_success(source_id);
                }
                resolved
            }
            Err(e) => {
                self.budget.record_failure(source_id, &e);
                tracing::warn!(
                    source = %source_id,
                    post_id = %post.id,
                    error = %e,
                    "Could not resolve post link"
                );
                None
            }
        };

        Some(PostRecord {
            source_id: source_id.clone(),
            post_id: post.id,
            page_name: self.source.name.clone(),
            link: post.link,
            base_domain: resolved_url.as_deref().and_then(base_domain),
            resolved_url,
            shares: post.share_count,
            created_time: post.created_time,
            retrieved_on: Utc::now(),
        })
    }

    fn advance(&mut self) {
        let Some(next) = self.next_cursor.take() else {
            self.finish(DoneReason::Exhausted);
            return;
        };

        if let (Some(bound), Some(last)) = (self.through_date, self.last_seen)
            && last.date_naive() < bound
        {
            self.finish(DoneReason::DateBoundaryReached);
            return;
        }

        if let Some(current) = self.cursor.take() {
            self.visited.insert(current);
        }
        if self.visited.contains(&next) {
            tracing::warn!(
                source = %self.source.id,
                pages = self.pages,
                "Feed returned an already visited cursor, treating as exhausted"
            );
            self.finish(DoneReason::Exhausted);
            return;
        }

        self.cursor = Some(next);
        self.state = State::Fetching;
    }

    fn finish(&mut self, reason: DoneReason) {
        tracing::info!(
            source = %self.source.id,
            name = %self.source.name,
            pages = self.pages,
            records = self.emitted,
            reason = %reason,
            "Finished crawling source"
        );
        self.state = State::Done(reason);
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FeedError, ResolveError};
    use crate::feed::FeedPage;
    use crate::types::SourceId;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use futures::StreamExt;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Feed that replays a fixed script, then fails forever
    struct ScriptedFeed {
        script: Mutex<VecDeque<Result<FeedPage, FeedError>>>,
        requested: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedFeed {
        fn new(script: Vec<Result<FeedPage, FeedError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requested: Mutex::new(vec![]),
            }
        }

        fn requested(&self) -> Vec<Option<String>> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedApi for ScriptedFeed {
        async fn fetch_page(
            &self,
            _source: &SourceId,
            cursor: Option<&Cursor>,
        ) -> Result<FeedPage, FeedError> {
            self.requested
                .lock()
                .unwrap()
                .push(cursor.map(|c| c.as_str().to_string()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FeedError::Transport("script exhausted".into())))
        }
    }

    /// Resolver with canned answers; unknown links resolve to themselves
    #[derive(Default)]
    struct MapResolver {
        answers: HashMap<String, Result<String, ResolveError>>,
    }

    impl MapResolver {
        fn with(mut self, link: &str, answer: Result<&str, ResolveError>) -> Self {
            self.answers
                .insert(link.to_string(), answer.map(str::to_string));
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

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn link_post(id: &str, link: &str, created: DateTime<Utc>) -> FeedPost {
        FeedPost {
            id: id.into(),
            link: Some(link.into()),
            created_time: created,
            post_type: Some("link".into()),
            share_count: None,
        }
    }

    fn page(posts: Vec<FeedPost>, next: Option<&str>) -> Result<FeedPage, FeedError> {
        Ok(FeedPage {
            posts,
            next_cursor: next.map(Cursor::new),
        })
    }

    fn api_error() -> Result<FeedPage, FeedError> {
        Err(FeedError::Api {
            status: 500,
            message: "unknown error".into(),
        })
    }

    fn source() -> Source {
        Source::new("page:42", "Example News")
    }

    #[tokio::test]
    async fn test_two_page_feed_yields_only_link_posts() {
        let feed = ScriptedFeed::new(vec![
            page(
                vec![link_post("p1", "http://bit.ly/x", at(2023, 6, 1))],
                Some("c2"),
            ),
            page(
                vec![FeedPost {
                    id: "p2".into(),
                    link: None,
                    created_time: at(2023, 5, 31),
                    post_type: Some("status".into()),
                    share_count: None,
                }],
                None,
            ),
        ]);
        let resolver =
            MapResolver::default().with("http://bit.ly/x", Ok("https://www.example.com/2023/06/01/story"));
        let budget = ErrorBudget::new(30);

        let (records, reason) = FeedCrawler::new(&feed, &resolver, &budget)
            .crawl(source())
            .collect()
            .await;

        assert_eq!(reason, DoneReason::Exhausted);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.post_id, "p1");
        assert_eq!(record.source_id, SourceId::from("page:42"));
        assert_eq!(record.page_name, "Example News");
        assert_eq!(record.link.as_deref(), Some("http://bit.ly/x"));
        assert_eq!(
            record.resolved_url.as_deref(),
            Some("https://www.example.com/2023/06/01/story")
        );
        assert_eq!(record.base_domain.as_deref(), Some("www.example.com"));
        assert_eq!(feed.requested(), vec![None, Some("c2".to_string())]);
    }

    #[tokio::test]
    async fn test_n_consecutive_failures_exceed_error_limit() {
        let feed = ScriptedFeed::new(vec![]);
        let resolver = MapResolver::default();
        let budget = ErrorBudget::new(5);

        let (records, reason) = FeedCrawler::new(&feed, &resolver, &budget)
            .crawl(source())
            .collect()
            .await;

        assert!(records.is_empty());
        assert_eq!(reason, DoneReason::ErrorLimitExceeded);
        assert_eq!(feed.requested().len(), 5);
        assert_eq!(budget.total_failures(&SourceId::from("page:42")), 5);
    }

    #[tokio::test]
    async fn test_failed_page_is_retried_with_same_cursor() {
        let feed = ScriptedFeed::new(vec![
            page(vec![link_post("p1", "http://a", at(2023, 6, 2))], Some("c2")),
            api_error(),
            api_error(),
            page(vec![link_post("p2", "http://b", at(2023, 6, 1))], None),
        ]);
        let resolver = MapResolver::default();
        let budget = ErrorBudget::new(30);

        let (records, reason) = FeedCrawler::new(&feed, &resolver, &budget)
            .crawl(source())
            .collect()
            .await;

        assert_eq!(reason, DoneReason::Exhausted);
        let ids: Vec<_> = records.iter().map(|r| r.post_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        assert_eq!(
            feed.requested(),
            vec![
                None,
                Some("c2".to_string()),
                Some("c2".to_string()),
                Some("c2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_alternating_failures_never_trip_budget() {
        let mut script = Vec::new();
        for i in 0..200 {
            script.push(api_error());
            let next = format!("c{}", i + 1);
            script.push(page(
                vec![link_post(&format!("p{i}"), "http://a", at(2023, 6, 1))],
                (i < 199).then_some(next.as_str()),
            ));
        }
        let feed = ScriptedFeed::new(script);
        let resolver = MapResolver::default();
        let budget = ErrorBudget::new(2);

        let (records, reason) = FeedCrawler::new(&feed, &resolver, &budget)
            .crawl(source())
            .collect()
            .await;

        assert_eq!(reason, DoneReason::Exhausted);
        assert_eq!(records.len(), 200);
    }

    #[tokio::test]
    async fn test_date_boundary_stops_pagination() {
        let feed = ScriptedFeed::new(vec![
            page(
                vec![
                    link_post("p1", "http://a", at(2023, 6, 3)),
                    link_post("p2", "http://b", at(2023, 6, 2)),
                ],
                Some("c2"),
            ),
            page(
                vec![link_post("p3", "http://c", at(2023, 5, 30))],
                Some("c3"),
            ),
            page(vec![link_post("p4", "http://d", at(2023, 5, 1))], None),
        ]);
        let resolver = MapResolver::default();
        let budget = ErrorBudget::new(30);

        let (records, reason) = FeedCrawler::new(&feed, &resolver, &budget)
            .through_date(NaiveDate::from_ymd_opt(2023, 6, 1))
            .crawl(source())
            .collect()
            .await;

        assert_eq!(reason, DoneReason::DateBoundaryReached);
        // The page that crossed the boundary is still emitted in full
        let ids: Vec<_> = records.iter().map(|r| r.post_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
        assert_eq!(feed.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_resolution_failure_keeps_record_with_null_url() {
        let feed = ScriptedFeed::new(vec![page(
            vec![
                link_post("p1", "http://ok-1", at(2023, 6, 3)),
                link_post("p2", "http://broken", at(2023, 6, 2)),
                link_post("p3", "http://ok-2", at(2023, 6, 1)),
            ],
            None,
        )]);
        let resolver = MapResolver::default().with(
            "http://broken",
            Err(ResolveError::TooManyRedirects {
                url: "http://broken".into(),
            }),
        );
        let budget = ErrorBudget::new(30);
        let id = SourceId::from("page:42");

        let (records, reason) = FeedCrawler::new(&feed, &resolver, &budget)
            .crawl(source())
            .collect()
            .await;

        assert_eq!(reason, DoneReason::Exhausted);
        assert_eq!(records.len(), 3);
        assert!(records[0].is_fetchable());
        assert_eq!(records[1].resolved_url, None);
        assert_eq!(records[1].base_domain, None);
        assert_eq!(records[1].link.as_deref(), Some("http://broken"));
        assert!(records[2].is_fetchable());
        assert_eq!(budget.total_failures(&id), 1);
        assert_eq!(budget.consecutive_failures(&id), 0);
    }

    #[tokio::test]
    async fn test_resolution_failures_count_against_budget() {
        let broken = || {
            Err(ResolveError::Connection {
                url: "http://broken".into(),
                reason: "refused".into(),
            })
        };
        let feed = ScriptedFeed::new(vec![
            page(
                vec![
                    link_post("p1", "http://broken", at(2023, 6, 2)),
                    link_post("p2", "http://broken", at(2023, 6, 1)),
                ],
                Some("c2"),
            ),
            page(vec![link_post("p3", "http://a", at(2023, 5, 1))], None),
        ]);
        let resolver = MapResolver::default().with("http://broken", broken());
        let budget = ErrorBudget::new(2);

        let (records, reason) = FeedCrawler::new(&feed, &resolver, &budget)
            .crawl(source())
            .collect()
            .await;

        assert_eq!(reason, DoneReason::ErrorLimitExceeded);
        assert_eq!(records.len(), 2, "records yielded before the trip are kept");
        assert_eq!(feed.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_revisited_cursor_ends_crawl() {
        let feed = ScriptedFeed::new(vec![
            page(vec![link_post("p1", "http://a", at(2023, 6, 3))], Some("c1")),
            page(vec![link_post("p2", "http://b", at(2023, 6, 2))], Some("c2")),
            page(vec![link_post("p3", "http://c", at(2023, 6, 1))], Some("c1")),
        ]);
        let resolver = MapResolver::default();
        let budget = ErrorBudget::new(30);

        let (records, reason) = FeedCrawler::new(&feed, &resolver, &budget)
            .crawl(source())
            .collect()
            .await;

        assert_eq!(reason, DoneReason::Exhausted);
        assert_eq!(records.len(), 3);
        assert_eq!(feed.requested().len(), 3);
    }

    #[tokio::test]
    async fn test_records_are_yielded_before_pagination_completes() {
        let feed = ScriptedFeed::new(vec![
            page(vec![link_post("p1", "http://a", at(2023, 6, 3))], Some("c2")),
            page(vec![link_post("p2", "http://b", at(2023, 6, 2))], None),
        ]);
        let resolver = MapResolver::default();
        let budget = ErrorBudget::new(30);
        let crawler = FeedCrawler::new(&feed, &resolver, &budget);
        let mut crawl = crawler.crawl(source());

        let first = crawl.next_record().await.unwrap();
        assert_eq!(first.post_id, "p1");
        assert_eq!(feed.requested().len(), 1, "second page not fetched yet");
        assert_eq!(crawl.outcome(), None);

        let rest: Vec<_> = crawl.into_stream().collect().await;
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].post_id, "p2");
    }

    #[tokio::test]
    async fn test_crawl_terminates_for_random_response_sequences() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let len = rng.gen_range(0..40);
            let script = (0..len)
                .map(|i| {
                    if rng.gen_bool(0.4) {
                        api_error()
                    } else {
                        let cursor = format!("c{}", rng.gen_range(0..8));
                        let posts = (0..rng.gen_range(0..3))
                            .map(|j| link_post(&format!("p{i}-{j}"), "http://a", at(2023, 6, 1)))
                            .collect();
                        page(posts, rng.gen_bool(0.9).then_some(cursor.as_str()))
                    }
                })
                .collect();

            let feed = ScriptedFeed::new(script);
            let resolver = MapResolver::default();
            let budget = ErrorBudget::new(3);

            let (_, reason) = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                FeedCrawler::new(&feed, &resolver, &budget)
                    .crawl(source())
                    .collect(),
            )
            .await
            .expect("crawl did not terminate");
            assert!(matches!(
                reason,
                DoneReason::Exhausted | DoneReason::ErrorLimitExceeded
            ));
        }
    }
}
