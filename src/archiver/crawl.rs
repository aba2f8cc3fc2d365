//! Source lookup and the crawl driver.

use crate::crawler::FeedCrawler;
use crate::error::Result;
use crate::error_budget::ErrorBudget;
use crate::types::{CrawlReport, DoneReason, Event, PostRecord, Source, SourceCrawlSummary, SourceId};

use super::NewsArchiver;

/// Configured sources split into those that resolved and those that did not
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedSources {
    /// Sources ready to crawl, in configuration order
    pub sources: Vec<Source>,
    /// Page names the feed API did not recognize
    pub unknown: Vec<String>,
}

impl NewsArchiver {
    /// Resolve every configured source to its stable identifier
    ///
    /// Sources configured with an `id` are used as-is. The rest are looked up by name;
    /// a page the feed API does not recognize is logged and left out of the run.
    pub async fn resolve_sources(&self) -> ResolvedSources {
        let mut resolved = ResolvedSources::default();

        for configured in &self.config.sources {
            let id = match &configured.id {
                Some(id) => SourceId::new(id.clone()),
                None => match self.feed.lookup_source(&configured.name).await {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(
                            page = %configured.name,
                            error = %e,
                            "Page not found, removing it from the run"
                        );
                        resolved.unknown.push(configured.name.clone());
                        continue;
                    }
                },
            };

            resolved.sources.push(Source {
                id,
                name: configured.name.clone(),
                base_urls: configured.base_urls.clone(),
            });
        }

        resolved
    }

    /// Crawl every configured source in turn
    ///
    /// Each source's records are appended to the database every `crawl.persist_every`
    /// records and once more when its crawl ends; post identifiers already stored are
    /// skipped, so replaying a crawl writes nothing new. The error budget is shared by the
    /// whole run, and each source's failures are appended to the durable error log once
    /// its crawl ends.
    ///
    /// A shutdown request stops the run before the next source and marks the report
    /// `interrupted`.
    pub async fn crawl_all_sources(&self) -> Result<CrawlReport> {
        self.ensure_accepting()?;

        let ResolvedSources { sources, unknown } = self.resolve_sources().await;
        let budget = ErrorBudget::new(self.config.crawl.error_limit);
        let mut report = CrawlReport {
            unknown_pages: unknown,
            ..Default::default()
        };

        tracing::info!(sources = sources.len(), "Starting crawl");

        for source in sources {
            if self.is_shutting_down() {
                tracing::info!("Shutdown requested, stopping crawl before next source");
                report.interrupted = true;
                break;
            }

            let summary = self.crawl_source(&budget, source).await.inspect_err(|e| {
                tracing::error!(error = %e, "Failed to persist crawl results");
            })?;
            report.sources.push(summary);
        }

        for summary in report.truncated() {
            tracing::error!(
                source = %summary.source_id,
                name = %summary.name,
                errors = summary.errors,
                "Crawl truncated after too many consecutive failures"
            );
        }

        tracing::info!(
            sources = report.sources.len(),
            saved = report.total_saved(),
            interrupted = report.interrupted,
            "Crawl finished"
        );

        Ok(report)
    }

    /// Crawl one source to completion, persisting records as they arrive
    async fn crawl_source(&self, budget: &ErrorBudget, source: Source) -> Result<SourceCrawlSummary> {
        let source_id = source.id.clone();
        let name = source.name.clone();

        tracing::info!(source = %source_id, name = %name, "Crawling source");
        self.emit_event(Event::CrawlStarted {
            source_id: source_id.clone(),
            name: name.clone(),
        });

        let mut known = self.db.known_post_ids(&source_id).await?;
        let persist_every = self.config.crawl.persist_every.max(1);

        let crawler = FeedCrawler::new(self.feed.as_ref(), self.resolver.as_ref(), budget)
            .through_date(self.config.crawl.through_date);
        let mut crawl = crawler.crawl(source);

        let mut buffer: Vec<PostRecord> = Vec::with_capacity(persist_every);
        let mut saved = 0;
        while let Some(record) = crawl.next_record().await {
            if !known.insert(record.post_id.clone()) {
                continue;
            }
            buffer.push(record);
            if buffer.len() >= persist_every {
                saved += self.persist_records(&source_id, &mut buffer).await?;
            }
        }
        saved += self.persist_records(&source_id, &mut buffer).await?;

        let records = crawl.emitted();
        let reason = crawl.outcome().unwrap_or(DoneReason::Exhausted);

        let entries = budget.entries(&source_id);
        self.db.append_error_entries(&entries).await?;

        tracing::info!(
            source = %source_id,
            records,
            saved,
            errors = entries.len(),
            reason = %reason,
            "Source crawl finished"
        );
        self.emit_event(Event::CrawlFinished {
            source_id: source_id.clone(),
            reason,
            records,
        });

        Ok(SourceCrawlSummary {
            source_id,
            name,
            records,
            saved,
            errors: entries.len(),
            reason,
        })
    }

    /// Append and clear `buffer`, returning the number of rows written
    async fn persist_records(&self, source_id: &SourceId, buffer: &mut Vec<PostRecord>) -> Result<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let oldest = buffer.iter().map(|r| r.created_time).min();
        let written = self.db.append_post_records(&buffer[..]).await? as usize;
        buffer.clear();

        tracing::debug!(source = %source_id, written, oldest = ?oldest, "Appended post records");
        self.emit_event(Event::RecordsSaved {
            source_id: source_id.clone(),
            count: written,
            oldest,
        });

        Ok(written)
    }
}
