//! Concurrent article fetching for one batch.
//!
//! Every source in a [`FetchBatch`] becomes a [`SourceFetchGroup`] that extracts its records
//! with at most `concurrency` calls in flight. All groups run at once and
//! [`FetchOrchestrator::run`] returns only after every group has finished, so at most one
//! batch of articles is ever buffered before persistence.

use crate::config::{EmptyBodyPolicy, RetryConfig};
use crate::error::ExtractionError;
use crate::extract::ContentExtractor;
use crate::partition::FetchBatch;
use crate::resolver::base_domain;
use crate::retry::with_retry;
use crate::types::{ArticleRecord, PostRecord, SourceId};
use async_trait::async_trait;
use futures::StreamExt;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};

/// A set of post records that can be fetched as a unit
#[async_trait]
pub trait FetchGroup: Send + Sync {
    /// Records this group is responsible for
    fn assigned_records(&self) -> &[PostRecord];

    /// Extract every assigned record with up to `concurrency` calls in flight.
    ///
    /// Failed, filtered and empty records are left out of the result; the group itself
    /// never fails.
    async fn fetch_all(&self, concurrency: usize) -> Vec<ArticleRecord>;
}

/// Decides whether a record's link is worth archiving
pub trait LinkFilter: Send + Sync {
    /// Whether `record` should be fetched
    fn accepts(&self, record: &PostRecord) -> bool;
}

/// Filter that accepts every record
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl LinkFilter for AcceptAll {
    fn accepts(&self, _record: &PostRecord) -> bool {
        true
    }
}

/// Accepts only links published under the source's own domains.
///
/// Domains compare case-insensitively and ignore a leading `www.`. Sources with no known
/// domains are not filtered.
#[derive(Clone, Debug, Default)]
pub struct SelfPublishedFilter {
    domains: HashMap<SourceId, HashSet<String>>,
}

impl SelfPublishedFilter {
    /// Create a filter with no known domains
    pub fn new() -> Self {
        Self::default()
    }

    /// Register domains (bare hosts or full URLs) for `source`
    pub fn add_domains<I, S>(&mut self, source: &SourceId, domains: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let known = self.domains.entry(source.clone()).or_default();
        known.extend(domains.into_iter().filter_map(|d| normalize_domain(d.as_ref())));
    }

    /// Register the most frequent domain from `(domain, count)` history for `source`
    pub fn add_most_common(&mut self, source: &SourceId, counts: &[(String, i64)]) {
        if let Some((domain, _)) = counts.iter().max_by_key(|(_, count)| *count) {
            self.add_domains(source, [domain]);
        }
    }

    /// Domains known for `source`
    pub fn domains(&self, source: &SourceId) -> Option<&HashSet<String>> {
        self.domains.get(source)
    }
}

impl LinkFilter for SelfPublishedFilter {
    fn accepts(&self, record: &PostRecord) -> bool {
        let Some(known) = self.domains.get(&record.source_id).filter(|d| !d.is_empty()) else {
            return true;
        };
        record
            .base_domain
            .as_deref()
            .and_then(normalize_domain)
            .is_some_and(|domain| known.contains(&domain))
    }
}

/// Lowercased host without a leading `www.`; accepts bare hosts and URLs
fn normalize_domain(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let host = if raw.contains("://") {
        base_domain(raw)?
    } else {
        raw.trim_end_matches('/').to_ascii_lowercase()
    };
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Extraction settings shared by every group of a run
#[derive(Clone, Debug, Default)]
pub struct FetchSettings {
    /// Handling of extractions with empty body text
    pub empty_body_policy: EmptyBodyPolicy,
    /// Backoff for transient extraction failures
    pub retry: RetryConfig,
}

/// The records of one source within a batch
pub struct SourceFetchGroup<'a> {
    source_id: SourceId,
    records: Vec<PostRecord>,
    extractor: &'a dyn ContentExtractor,
    filter: &'a dyn LinkFilter,
    settings: &'a FetchSettings,
}

impl<'a> SourceFetchGroup<'a> {
    /// Create a group for `source_id`'s records
    pub fn new(
        source_id: SourceId,
        records: Vec<PostRecord>,
        extractor: &'a dyn ContentExtractor,
        filter: &'a dyn LinkFilter,
        settings: &'a FetchSettings,
    ) -> Self {
        Self {
            source_id,
            records,
            extractor,
            filter,
            settings,
        }
    }

    /// Source the group belongs to
    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    async fn fetch_one(&self, record: &PostRecord) -> Option<ArticleRecord> {
        let url = record.resolved_url.as_deref()?;
        let extractor = self.extractor;
        let policy = self.settings.empty_body_policy;

        let result = with_retry(&self.settings.retry, || async move {
            let content = extractor.extract(url).await?;
            if policy == EmptyBodyPolicy::Retry && content.body_text.trim().is_empty() {
                return Err(ExtractionError::EmptyBody);
            }
            Ok(content)
        })
        .await;

        match result {
            Ok(content) if content.body_text.trim().is_empty() => {
                tracing::debug!(
                    source = %self.source_id,
                    post_id = %record.post_id,
                    url,
                    "Dropping article with empty body text"
                );
                None
            }
            Ok(content) => Some(ArticleRecord {
                post_id: record.post_id.clone(),
                source_id: record.source_id.clone(),
                url: url.to_string(),
                base_domain: base_domain(url).or_else(|| record.base_domain.clone()),
                title: content.title,
                authors: content.authors,
                body_text: content.body_text,
                post_created_time: record.created_time,
                retrieved_on: chrono::Utc::now(),
            }),
            Err(e) => {
                tracing::warn!(
                    source = %self.source_id,
                    post_id = %record.post_id,
                    url,
                    error = %e,
                    "Article extraction failed"
                );
                None
            }
        }
    }
}

#[async_trait]
impl FetchGroup for SourceFetchGroup<'_> {
    fn assigned_records(&self) -> &[PostRecord] {
        &self.records
    }

    async fn fetch_all(&self, concurrency: usize) -> Vec<ArticleRecord> {
        let eligible: Vec<&PostRecord> = self
            .records
            .iter()
            .filter(|r| r.is_fetchable() && self.filter.accepts(r))
            .collect();
        tracing::debug!(
            source = %self.source_id,
            assigned = self.records.len(),
            eligible = eligible.len(),
            concurrency,
            "Fetching source group"
        );

        // buffered keeps pagination order in the output
        let pending: Vec<_> = eligible
            .into_iter()
            .map(|record| self.fetch_one(record))
            .collect();
        futures::stream::iter(pending)
            .buffered(concurrency.max(1))
            .filter_map(futures::future::ready)
            .collect()
            .await
    }
}

/// Run every group to completion, concatenating their articles in group order
pub async fn fetch_groups<G: FetchGroup>(groups: &[G], concurrency: usize) -> Vec<ArticleRecord> {
    join_all(groups.iter().map(|group| group.fetch_all(concurrency)))
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// Fans a batch out into per-source groups and joins them
pub struct FetchOrchestrator<'a> {
    extractor: &'a dyn ContentExtractor,
    filter: &'a dyn LinkFilter,
    settings: FetchSettings,
}

impl<'a> FetchOrchestrator<'a> {
    /// Create an orchestrator that accepts every link
    pub fn new(extractor: &'a dyn ContentExtractor, settings: FetchSettings) -> Self {
        Self {
            extractor,
            filter: &AcceptAll,
            settings,
        }
    }

    /// Only fetch records accepted by `filter`
    pub fn with_filter(mut self, filter: &'a dyn LinkFilter) -> Self {
        self.filter = filter;
        self
    }

    /// One fetch group per source in `batch`
    pub fn groups(&self, batch: FetchBatch) -> Vec<SourceFetchGroup<'_>> {
        batch
            .into_iter()
            .map(|(source_id, records)| {
                SourceFetchGroup::new(
                    source_id,
                    records,
                    self.extractor,
                    self.filter,
                    &self.settings,
                )
            })
            .collect()
    }

    /// Extract every record of `batch`, returning once all source groups are done
    pub async fn run(&self, batch: FetchBatch, concurrency: usize) -> Vec<ArticleRecord> {
        let records = batch.len();
        let groups = self.groups(batch);
        let articles = fetch_groups(&groups, concurrency).await;

        tracing::info!(
            sources = groups.len(),
            records,
            articles = articles.len(),
            "Batch extraction complete"
        );
        articles
    }
}
