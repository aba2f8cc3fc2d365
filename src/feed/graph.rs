//! Facebook Graph API implementation of [`FeedApi`].
//!
//! The Graph API pages `/{page-id}/posts` with a `paging.next` URL. That URL is used as
//! the cursor verbatim, so the crawler never needs to understand its query parameters.

use super::{Cursor, FeedApi, FeedPage, FeedPost, parse_created_time};
use crate::config::{GraphApiConfig, HttpConfig};
use crate::error::FeedError;
use crate::types::SourceId;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Graph error code for an invalid or expired access token
const OAUTH_INVALID_TOKEN: i64 = 190;
/// Graph error codes returned for unknown object names or ids
const UNKNOWN_OBJECT_CODES: [i64; 2] = [100, 803];

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    data: Vec<RawPost>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    created_time: Option<String>,
    #[serde(default, rename = "type")]
    post_type: Option<String>,
    #[serde(default)]
    shares: Option<Shares>,
}

#[derive(Debug, Deserialize)]
struct Shares {
    #[serde(default)]
    count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ObjectId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Website {
    #[serde(default)]
    website: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// Feed API client for the Facebook Graph API
pub struct GraphFeedApi {
    client: reqwest::Client,
    config: GraphApiConfig,
}

impl GraphFeedApi {
    /// Create a Graph API client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: GraphApiConfig, http: &HttpConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http.timeout)
            .user_agent(http.user_agent.as_str())
            .build()
            .map_err(|e| crate::Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// URL of a Graph object or edge with the access token and extra query pairs
    fn object_url(&self, path: &str, query: &[(&str, &str)]) -> Result<url::Url, FeedError> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = url::Url::parse(&format!(
            "{}/{}/{}",
            base, self.config.api_version, path
        ))
        .map_err(|e| FeedError::Transport(format!("invalid Graph API URL: {}", e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("access_token", &self.config.access_token);
        }
        Ok(url)
    }

    /// GET `url` and decode a success body, mapping Graph error envelopes
    async fn get_json<T: DeserializeOwned>(&self, url: url::Url) -> Result<T, FeedError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(graph_error(status.as_u16(), &body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Classify a non-success Graph response
fn graph_error(status: u16, body: &str) -> FeedError {
    let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) else {
        return FeedError::Api {
            status,
            message: body.to_string(),
        };
    };

    match envelope.error.code {
        Some(OAUTH_INVALID_TOKEN) => FeedError::Auth(envelope.error.message),
        Some(code) if UNKNOWN_OBJECT_CODES.contains(&code) && status == 404 => {
            FeedError::PageNotFound(envelope.error.message)
        }
        Some(code)
            if UNKNOWN_OBJECT_CODES.contains(&code)
                && envelope.error.message.contains("does not exist") =>
        {
            FeedError::PageNotFound(envelope.error.message)
        }
        _ => FeedError::Api {
            status,
            message: envelope.error.message,
        },
    }
}

impl From<RawPost> for Option<FeedPost> {
    fn from(raw: RawPost) -> Self {
        let Some(created_time) = raw.created_time.as_deref().and_then(parse_created_time) else {
            tracing::warn!(post_id = %raw.id, created_time = ?raw.created_time, "Skipping post without a usable created_time");
            return None;
        };

        Some(FeedPost {
            id: raw.id,
            link: raw.link,
            created_time,
            post_type: raw.post_type,
            share_count: raw.shares.and_then(|s| s.count),
        })
    }
}

#[async_trait]
impl FeedApi for GraphFeedApi {
    async fn fetch_page(
        &self,
        source: &SourceId,
        cursor: Option<&Cursor>,
    ) -> Result<FeedPage, FeedError> {
        let url = match cursor {
            Some(cursor) => url::Url::parse(cursor.as_str())
                .map_err(|e| FeedError::Parse(format!("invalid paging cursor: {}", e)))?,
            None => {
                let limit = self.config.page_limit.to_string();
                self.object_url(
                    &format!("{}/posts", source),
                    &[("fields", self.config.fields.as_str()), ("limit", &limit)],
                )?
            }
        };

        let response: PostsResponse = self.get_json(url).await?;
        let posts = response
            .data
            .into_iter()
            .filter_map(Option::<FeedPost>::from)
            .collect();
        let next_cursor = response.paging.and_then(|p| p.next).map(Cursor::new);

        Ok(FeedPage { posts, next_cursor })
    }

    async fn lookup_source(&self, name: &str) -> Result<SourceId, FeedError> {
        let url = self.object_url(name, &[("fields", "id")])?;
        let object: ObjectId = self.get_json(url).await?;
        Ok(SourceId::new(object.id))
    }

    async fn source_website(&self, source: &SourceId) -> Result<Option<String>, FeedError> {
        let url = self.object_url(source.as_str(), &[("fields", "website")])?;
        let website: Website = self.get_json(url).await?;
        Ok(website.website.filter(|w| !w.trim().is_empty()))
    }
}
