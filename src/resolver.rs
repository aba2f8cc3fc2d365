//! Redirect resolution for shortened post links.
//!
//! Posts usually carry a shortener link (`bit.ly`, `ow.ly`, ...). The resolver follows the
//! redirect chain with header-only requests and reports the final URL. It never retries:
//! the crawler charges failures against the source's error budget instead.

use crate::config::HttpConfig;
use crate::error::ResolveError;
use async_trait::async_trait;

/// Resolves a possibly-shortened URL to its canonical form
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Follow redirects for `url` and return the final URL
    async fn resolve_url(&self, url: &str) -> Result<String, ResolveError>;

    /// Resolve an optional link. An absent link resolves to `None` without any request.
    async fn resolve(&self, url: Option<&str>) -> Result<Option<String>, ResolveError> {
        match url {
            Some(url) if !url.trim().is_empty() => self.resolve_url(url).await.map(Some),
            _ => Ok(None),
        }
    }
}

/// [`UrlResolver`] backed by HEAD requests with a bounded redirect policy
pub struct HttpRedirectResolver {
    client: reqwest::Client,
}

impl HttpRedirectResolver {
    /// Create a resolver from the shared HTTP settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &HttpConfig) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| crate::Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl UrlResolver for HttpRedirectResolver {
    async fn resolve_url(&self, url: &str) -> Result<String, ResolveError> {
        let parsed = url::Url::parse(url.trim()).map_err(|e| ResolveError::Encoding {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let response = self
            .client
            .head(parsed)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let resolved = response.url().to_string();
        tracing::trace!(url, resolved = %resolved, "Resolved link");
        Ok(resolved)
    }
}

/// Map a reqwest failure onto the resolution failure causes
fn classify(url: &str, err: reqwest::Error) -> ResolveError {
    if err.is_redirect() {
        ResolveError::TooManyRedirects {
            url: url.to_string(),
        }
    } else if err.is_builder() || err.is_decode() {
        ResolveError::Encoding {
            url: url.to_string(),
            reason: err.to_string(),
        }
    } else {
        ResolveError::Connection {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Host part of a URL (`https://www.example.com/a/b` -> `www.example.com`)
pub fn base_domain(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .host_str()
        .map(|host| host.to_ascii_lowercase())
}
