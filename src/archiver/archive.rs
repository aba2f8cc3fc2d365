//! The archive driver.

use crate::db::PendingQuery;
use crate::error::Result;
use crate::fetch::{AcceptAll, FetchOrchestrator, FetchSettings, LinkFilter, SelfPublishedFilter};
use crate::partition::partition;
use crate::types::{ArchiveReport, Event, Source, SourceId};

use super::{NewsArchiver, ResolvedSources};

impl NewsArchiver {
    /// Fetch and store the article of every pending post
    ///
    /// The pending pool (resolved posts with no article yet, restricted to the configured
    /// sources and `archive.retrieved_between`) is split into balanced batches of about
    /// `archive.chunk_size` records. Batches run one after another; within a batch every
    /// source is fetched concurrently with up to `archive.threads_per_source` extractions
    /// in flight, and the batch's articles are appended once all sources are done.
    ///
    /// A shutdown request stops the run before the next batch and marks the report
    /// `interrupted`.
    pub async fn archive_pending(&self) -> Result<ArchiveReport> {
        self.ensure_accepting()?;

        let archive = &self.config.archive;
        let mut report = ArchiveReport::default();

        let (query, sources) = if self.config.sources.is_empty() {
            (PendingQuery::all(), None)
        } else {
            let ResolvedSources { sources, .. } = self.resolve_sources().await;
            if sources.is_empty() {
                tracing::warn!("No configured source could be resolved, nothing to archive");
                return Ok(report);
            }
            (
                PendingQuery::for_sources(sources.iter().map(|s| s.id.clone())),
                Some(sources),
            )
        };

        let pending = self
            .db
            .list_pending_posts(&query.retrieved_between(archive.retrieved_between))
            .await?;

        let filter: Box<dyn LinkFilter> = if archive.self_published_only {
            let sources = sources.unwrap_or_else(|| {
                pending
                    .keys()
                    .map(|id| Source::new(id.clone(), id.as_str()))
                    .collect()
            });
            Box::new(self.self_published_filter(&sources).await?)
        } else {
            Box::new(AcceptAll)
        };

        let settings = FetchSettings {
            empty_body_policy: archive.empty_body_policy,
            retry: self.config.retry.clone(),
        };
        let orchestrator =
            FetchOrchestrator::new(self.extractor.as_ref(), settings).with_filter(&*filter);

        let batches = partition(pending, archive.chunk_size);
        tracing::info!(
            pending = batches.remaining(),
            per_source = batches.per_source(),
            "Starting archive run"
        );

        for (index, batch) in batches.enumerate() {
            if self.is_shutting_down() {
                tracing::info!("Shutdown requested, stopping archive run before next batch");
                report.interrupted = true;
                break;
            }

            let records = batch.len();
            tracing::info!(
                batch = index,
                records,
                sources = batch.source_count(),
                oldest = ?batch.oldest(),
                newest = ?batch.newest(),
                "Archiving batch"
            );
            self.emit_event(Event::BatchStarted {
                index,
                records,
                sources: batch.source_count(),
                oldest: batch.oldest(),
                newest: batch.newest(),
            });

            let articles = orchestrator.run(batch, archive.threads_per_source).await;
            let written = self.db.append_article_records(&articles).await? as usize;

            report.batches += 1;
            report.attempted += records;
            report.archived += written;
            report.dropped += records.saturating_sub(articles.len());

            self.emit_event(Event::BatchArchived {
                index,
                articles: written,
            });
        }

        tracing::info!(
            batches = report.batches,
            attempted = report.attempted,
            archived = report.archived,
            dropped = report.dropped,
            interrupted = report.interrupted,
            "Archive run finished"
        );
        self.emit_event(Event::ArchiveFinished {
            batches: report.batches,
            articles: report.archived,
        });

        Ok(report)
    }

    /// Domains each source publishes under
    ///
    /// Configured base URLs win; otherwise the page's declared website, and failing that
    /// the most common base domain among the source's stored posts.
    pub async fn self_published_filter(&self, sources: &[Source]) -> Result<SelfPublishedFilter> {
        let mut filter = SelfPublishedFilter::new();

        for source in sources {
            if !source.base_urls.is_empty() {
                filter.add_domains(&source.id, &source.base_urls);
                continue;
            }

            if let Some(website) = self.declared_website(&source.id).await {
                filter.add_domains(&source.id, [website]);
                continue;
            }

            let counts = self.db.base_domain_counts(&source.id).await?;
            filter.add_most_common(&source.id, &counts);
        }

        Ok(filter)
    }

    async fn declared_website(&self, source: &SourceId) -> Option<String> {
        match self.feed.source_website(source).await {
            Ok(website) => website.filter(|w| !w.trim().is_empty()),
            Err(e) => {
                tracing::debug!(source = %source, error = %e, "Could not look up page website");
                None
            }
        }
    }
}
