//! Page-feed API contract.
//!
//! The crawler only needs "give me the page of posts after this cursor". Authentication,
//! transport and response decoding stay behind [`FeedApi`]; [`GraphFeedApi`] is the
//! production implementation.

mod graph;

pub use graph::GraphFeedApi;

use crate::error::FeedError;
use crate::types::SourceId;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Opaque pagination token marking the position of the next page
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cursor(pub String);

impl Cursor {
    /// Create a cursor from its raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One post as returned by the feed API
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedPost {
    /// Post identifier
    pub id: String,
    /// Attached link, if any
    pub link: Option<String>,
    /// When the post was created
    pub created_time: DateTime<Utc>,
    /// Post type tag (e.g., "link", "status", "photo")
    pub post_type: Option<String>,
    /// Share count, when reported
    pub share_count: Option<i64>,
}

impl FeedPost {
    /// Whether the post is tagged as an external link
    pub fn is_link(&self) -> bool {
        self.post_type.as_deref() == Some("link")
    }
}

/// One page of a source's feed, newest posts first
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeedPage {
    /// Posts on this page
    pub posts: Vec<FeedPost>,
    /// Cursor of the following (older) page; `None` on the last page
    pub next_cursor: Option<Cursor>,
}

/// Access to a social-media page feed
#[async_trait]
pub trait FeedApi: Send + Sync {
    /// Fetch the page at `cursor` (`None` = first page) of `source`'s feed
    async fn fetch_page(
        &self,
        source: &SourceId,
        cursor: Option<&Cursor>,
    ) -> Result<FeedPage, FeedError>;

    /// Look up the stable identifier of a page by name
    async fn lookup_source(&self, name: &str) -> Result<SourceId, FeedError> {
        Err(FeedError::PageNotFound(name.to_string()))
    }

    /// Website declared by the page, if any
    async fn source_website(&self, _source: &SourceId) -> Result<Option<String>, FeedError> {
        Ok(None)
    }
}

/// Parse a feed timestamp.
///
/// Accepts `2016-10-12T14:00:00+0000` (Graph API), RFC 3339, and bare dates
/// (`2023-06-01`, read as midnight UTC).
pub fn parse_created_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
