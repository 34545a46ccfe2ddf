use crate::models::RunSummary;
use crate::source::ListingSource;

/// Events emitted during a crawl for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    RunStarted {
        source: ListingSource,
        scope: &'a str,
    },
    RegionStarted {
        area: &'a str,
        index: usize,
        total: usize,
    },
    ConstraintSkipped {
        selector_id: &'a str,
        error: &'a str,
    },
    PageExtracted {
        page: u32,
        elements: usize,
        inserted: u64,
        skipped: u64,
        failures: usize,
    },
    EndOfResults {
        page: u32,
        reason: &'a str,
    },
    RunCompleted {
        summary: &'a RunSummary,
    },
    RunFailed {
        error: &'a str,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::RunStarted { source, scope } => {
                tracing::info!(%source, %scope, "Crawl started");
            }
            CrawlEvent::RegionStarted { area, index, total } => {
                tracing::info!(%area, %index, %total, "Crawling area");
            }
            CrawlEvent::ConstraintSkipped { selector_id, error } => {
                tracing::warn!(%selector_id, %error, "Search constraint not applied");
            }
            CrawlEvent::PageExtracted {
                page,
                elements,
                inserted,
                skipped,
                failures,
            } => {
                tracing::info!(%page, %elements, %inserted, %skipped, %failures, "Page processed");
            }
            CrawlEvent::EndOfResults { page, reason } => {
                tracing::info!(%page, %reason, "End of results");
            }
            CrawlEvent::RunCompleted { summary } => {
                tracing::info!(
                    source = %summary.source,
                    pages = summary.pages,
                    inserted = summary.inserted,
                    skipped = summary.skipped,
                    "Crawl completed"
                );
            }
            CrawlEvent::RunFailed { error } => {
                tracing::error!(%error, "Crawl failed");
            }
        }
    }
}
