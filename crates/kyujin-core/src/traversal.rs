//! Per-run page traversal: search, extract each result page, paginate.

use std::time::Duration;

use serde::Serialize;

use crate::error::AppError;
use crate::gate::{PersistOutcome, PersistenceGate};
use crate::models::ClassifiedListing;
use crate::reporter::{CrawlEvent, CrawlReporter};
use crate::source::{ListingSource, SearchPlan, SearchQuery};
use crate::traits::{
    BrowserSession, ExtractorFactory, ListingExtractor, ListingStore, PageControl,
    SessionLauncher,
};

const DEFAULT_PAGE_DELAY_MS: u64 = 3000;

/// Traversal tuning.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Settle time after every navigation the traversal triggers.
    pub page_delay: Duration,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
        }
    }
}

impl TraversalConfig {
    /// Reads `KYUJIN_PAGE_DELAY_MS` (default 3000).
    pub fn from_env() -> Result<Self, AppError> {
        let page_delay_ms = match std::env::var("KYUJIN_PAGE_DELAY_MS") {
            Ok(v) => v.parse::<u64>().map_err(|_| {
                AppError::ConfigError(format!("KYUJIN_PAGE_DELAY_MS must be an integer, got {v:?}"))
            })?,
            Err(_) => DEFAULT_PAGE_DELAY_MS,
        };
        Ok(Self {
            page_delay: Duration::from_millis(page_delay_ms),
        })
    }
}

/// Where a traversal currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Init,
    Searching,
    /// 1-based result page about to be extracted.
    ExtractingPage(u32),
    /// Looking for the control that leads past this page.
    Paginating(u32),
    Done,
    Failed,
}

impl TraversalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TraversalState::Done | TraversalState::Failed)
    }
}

/// Counts accumulated over one traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraversalSummary {
    pub pages: u32,
    pub inserted: u64,
    pub skipped: u64,
    /// Drafts dropped for lacking a mandatory title.
    pub dropped: u64,
    /// Elements that failed to parse.
    pub failures: u64,
}

impl TraversalSummary {
    pub fn absorb(&mut self, other: &TraversalSummary) {
        self.pages += other.pages;
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.dropped += other.dropped;
        self.failures += other.failures;
    }
}

/// A traversal that ended in `Failed`, with the totals reached before the failure.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct TraversalFailure {
    pub partial: TraversalSummary,
    pub error: AppError,
}

impl From<AppError> for TraversalFailure {
    fn from(error: AppError) -> Self {
        Self {
            partial: TraversalSummary::default(),
            error,
        }
    }
}

/// Drives one browser session through a search and its result pages.
pub struct TraversalController<L, EF, S>
where
    L: SessionLauncher,
    EF: ExtractorFactory,
    S: ListingStore,
{
    launcher: L,
    extractors: EF,
    gate: PersistenceGate<S>,
    config: TraversalConfig,
}

impl<L, EF, S> TraversalController<L, EF, S>
where
    L: SessionLauncher,
    EF: ExtractorFactory,
    S: ListingStore,
{
    pub fn new(launcher: L, extractors: EF, store: S, config: TraversalConfig) -> Self {
        Self {
            launcher,
            extractors,
            gate: PersistenceGate::new(store),
            config,
        }
    }

    /// Run one traversal to completion. The session is closed on every exit path.
    ///
    /// On failure the error carries whatever was persisted before it.
    pub async fn run<R: CrawlReporter>(
        &self,
        source: ListingSource,
        query: &SearchQuery,
        max_pages: u32,
        force: bool,
        reporter: &R,
    ) -> Result<TraversalSummary, TraversalFailure> {
        let extractor = self.extractors.create(source)?;
        let plan = source.plan(query)?;

        let session = self.launcher.launch().await?;
        let mut summary = TraversalSummary::default();
        let result = self
            .drive(&session, &extractor, &plan, max_pages, force, &mut summary, reporter)
            .await;
        session.close().await;

        match result {
            Ok(()) => Ok(summary),
            Err(error) => Err(TraversalFailure {
                partial: summary,
                error,
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive<B, X, R>(
        &self,
        session: &B,
        extractor: &X,
        plan: &SearchPlan,
        max_pages: u32,
        force: bool,
        summary: &mut TraversalSummary,
        reporter: &R,
    ) -> Result<(), AppError>
    where
        B: BrowserSession,
        X: ListingExtractor,
        R: CrawlReporter,
    {
        let mut state = TraversalState::Init;

        while !state.is_terminal() {
            let step = match state {
                TraversalState::Init => self.open(session, plan).await,
                TraversalState::Searching => self
                    .search(session, plan, reporter)
                    .await
                    .map(|()| {
                        if max_pages == 0 {
                            TraversalState::Done
                        } else {
                            TraversalState::ExtractingPage(1)
                        }
                    }),
                TraversalState::ExtractingPage(page) => {
                    self.extract_page(session, extractor, page, max_pages, force, summary, reporter)
                        .await
                }
                TraversalState::Paginating(page) => {
                    self.paginate(session, plan, page, reporter).await
                }
                TraversalState::Done | TraversalState::Failed => break,
            };

            match step {
                Ok(next) => {
                    tracing::debug!(from = ?state, to = ?next, "Traversal transition");
                    state = next;
                }
                Err(e) => {
                    tracing::debug!(from = ?state, to = ?TraversalState::Failed, error = %e, "Traversal transition");
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    async fn open<B: BrowserSession>(
        &self,
        session: &B,
        plan: &SearchPlan,
    ) -> Result<TraversalState, AppError> {
        session.navigate(&plan.entry_url).await?;
        self.settle(session).await?;
        Ok(TraversalState::Searching)
    }

    /// Constraint failures degrade to an unfiltered search; a missing or
    /// broken submit control is fatal.
    async fn search<B, R>(&self, session: &B, plan: &SearchPlan, reporter: &R) -> Result<(), AppError>
    where
        B: BrowserSession,
        R: CrawlReporter,
    {
        for constraint in &plan.constraints {
            if let Err(e) = session
                .apply_constraint(&constraint.selector_id, &constraint.value)
                .await
            {
                reporter.report(CrawlEvent::ConstraintSkipped {
                    selector_id: &constraint.selector_id,
                    error: &e.to_string(),
                });
            }
        }

        if let Some(submit) = &plan.submit {
            let control = session.find_control(submit).await?.ok_or_else(|| {
                AppError::BrowserError(format!("Search control not found ({submit})"))
            })?;
            session.trigger_navigation(control).await?;
            self.settle(session).await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn extract_page<B, X, R>(
        &self,
        session: &B,
        extractor: &X,
        page: u32,
        max_pages: u32,
        force: bool,
        summary: &mut TraversalSummary,
        reporter: &R,
    ) -> Result<TraversalState, AppError>
    where
        B: BrowserSession,
        X: ListingExtractor,
        R: CrawlReporter,
    {
        let html = session.current_markup().await?;
        let extraction = extractor.extract_page(&html);

        if extraction.element_count == 0 {
            reporter.report(CrawlEvent::EndOfResults {
                page,
                reason: "no listing elements",
            });
            return Ok(TraversalState::Done);
        }

        summary.pages = page;
        summary.failures += extraction.failures as u64;

        // Totals grow per listing so a store failure mid-page leaves them accurate.
        let requires_title = extractor.source().requires_title();
        let (mut inserted, mut skipped) = (0u64, 0u64);
        for draft in extraction.drafts {
            if requires_title && !draft.has_title() {
                summary.dropped += 1;
                continue;
            }
            let listing = ClassifiedListing::from_draft(draft);
            match self.gate.persist(&listing, force).await? {
                PersistOutcome::Inserted(_) => {
                    inserted += 1;
                    summary.inserted += 1;
                }
                PersistOutcome::SkippedDuplicate => {
                    skipped += 1;
                    summary.skipped += 1;
                }
            }
        }

        reporter.report(CrawlEvent::PageExtracted {
            page,
            elements: extraction.element_count,
            inserted,
            skipped,
            failures: extraction.failures,
        });

        if page >= max_pages {
            reporter.report(CrawlEvent::EndOfResults {
                page,
                reason: "page limit reached",
            });
            return Ok(TraversalState::Done);
        }
        Ok(TraversalState::Paginating(page))
    }

    /// Try each next-page strategy in order. The first control found decides:
    /// disabled means the results are exhausted, enabled means click it. A
    /// failed click falls through to the next strategy.
    async fn paginate<B, R>(
        &self,
        session: &B,
        plan: &SearchPlan,
        page: u32,
        reporter: &R,
    ) -> Result<TraversalState, AppError>
    where
        B: BrowserSession,
        R: CrawlReporter,
    {
        for strategy in plan.next_page {
            let control = match session.find_control(strategy).await {
                Ok(Some(control)) => control,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(%strategy, error = %e, "Next-page lookup failed");
                    continue;
                }
            };

            if !control.is_enabled() {
                reporter.report(CrawlEvent::EndOfResults {
                    page,
                    reason: "next-page control disabled",
                });
                return Ok(TraversalState::Done);
            }

            if let Err(e) = session.trigger_navigation(control).await {
                tracing::debug!(%strategy, error = %e, "Next-page click failed");
                continue;
            }

            self.settle(session).await?;
            return Ok(TraversalState::ExtractingPage(page + 1));
        }

        reporter.report(CrawlEvent::EndOfResults {
            page,
            reason: "no usable next-page control",
        });
        Ok(TraversalState::Done)
    }

    async fn settle<B: BrowserSession>(&self, session: &B) -> Result<(), AppError> {
        session.wait_until_ready().await?;
        if !self.config.page_delay.is_zero() {
            tokio::time::sleep(self.config.page_delay).await;
        }
        Ok(())
    }
}
