//! Article content extraction.
//!
//! [`ContentExtractor`] is the collaborator contract used by the fetch orchestrator.
//! [`HtmlExtractor`] is a lightweight implementation that downloads the page and pulls the
//! title, authors and paragraph text out of the parsed document.

use crate::config::HttpConfig;
use crate::error::ExtractionError;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

/// Content extracted from one article URL
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedContent {
    /// Article title (empty when none was found)
    pub title: String,
    /// Article authors, in document order, without duplicates
    pub authors: Vec<String>,
    /// Body text, paragraphs separated by blank lines (may be empty)
    pub body_text: String,
}

/// Downloads an article and extracts its content
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Extract the article at `url`.
    ///
    /// An empty `body_text` is not an error here; the caller's empty-body policy decides.
    async fn extract(&self, url: &str) -> Result<ExtractedContent, ExtractionError>;
}

/// HTML article extractor built on a DOM parse
pub struct HtmlExtractor {
    client: reqwest::Client,
    selectors: Selectors,
}

struct Selectors {
    article: Selector,
    paragraph: Selector,
    title: Selector,
    meta: Selector,
}

impl Selectors {
    fn compile() -> crate::Result<Self> {
        let parse = |css: &str| {
            Selector::parse(css).map_err(|e| {
                crate::Error::Other(format!("Failed to compile selector {:?}: {:?}", css, e))
            })
        };

        Ok(Self {
            article: parse("article")?,
            paragraph: parse("p")?,
            title: parse("title")?,
            meta: parse("meta[content]")?,
        })
    }
}

impl HtmlExtractor {
    /// Create an extractor from the shared HTTP settings
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
        let selectors = Selectors::compile()?;

        Ok(Self { client, selectors })
    }

    /// Extract content from an already downloaded HTML document
    ///
    /// Character references are decoded by the parser, so titles, bylines and body text
    /// come out as plain Unicode text.
    pub fn parse(&self, html: &str) -> ExtractedContent {
        let s = &self.selectors;
        let document = Html::parse_document(html);

        let meta_content = |keys: &[&str]| -> Vec<String> {
            document
                .select(&s.meta)
                .filter(|meta| {
                    let meta = meta.value();
                    meta.attr("property")
                        .or_else(|| meta.attr("name"))
                        .is_some_and(|k| keys.iter().any(|key| k.eq_ignore_ascii_case(key)))
                })
                .filter_map(|meta| meta.value().attr("content"))
                .map(collapse_whitespace)
                .filter(|c| !c.is_empty())
                .collect()
        };

        let title = meta_content(&["og:title"][..])
            .into_iter()
            .next()
            .or_else(|| {
                document
                    .select(&s.title)
                    .next()
                    .map(|title| element_text(&title))
            })
            .unwrap_or_default();

        let mut authors: Vec<String> = Vec::new();
        for author in meta_content(&["author", "article:author"][..]) {
            // Bylines are sometimes profile URLs rather than names
            if author.starts_with("http://") || author.starts_with("https://") {
                continue;
            }
            if !authors.contains(&author) {
                authors.push(author);
            }
        }

        let paragraphs: Vec<String> = match document.select(&s.article).next() {
            Some(article) => article
                .select(&s.paragraph)
                .map(|p| element_text(&p))
                .collect(),
            None => document
                .select(&s.paragraph)
                .map(|p| element_text(&p))
                .collect(),
        };
        let body_text = paragraphs
            .into_iter()
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        ExtractedContent {
            title,
            authors,
            body_text,
        }
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl ContentExtractor for HtmlExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedContent, ExtractionError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::Http {
                status: status.as_u16(),
            });
        }

        let html = response.text().await?;
        let content = self.parse(&html);
        tracing::trace!(
            url,
            title = %content.title,
            authors = content.authors.len(),
            body_len = content.body_text.len(),
            "Extracted article"
        );
        Ok(content)
    }
}
