//! Single-flight crawl execution on a dedicated background worker.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{CrawlRun, RunSummary};
use crate::reporter::{CrawlEvent, CrawlReporter};
use crate::source::{ListingSource, SearchQuery};
use crate::traits::{ExtractorFactory, ListingStore, SessionLauncher};
use crate::traversal::{TraversalController, TraversalSummary};

/// What a crawl run covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrawlScope {
    /// One search.
    Single(SearchQuery),
    /// One search per area, run sequentially.
    Region {
        region: String,
        areas: Vec<String>,
        keyword: Option<String>,
    },
}

impl CrawlScope {
    pub fn describe(&self) -> String {
        match self {
            CrawlScope::Single(query) => query.describe(),
            CrawlScope::Region {
                region, keyword, ..
            } => match keyword {
                Some(keyword) => format!("region {region} / {keyword}"),
                None => format!("region {region}"),
            },
        }
    }
}

/// Parameters of a start request, whether manual or scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest {
    pub source: ListingSource,
    pub scope: CrawlScope,
    pub max_pages: u32,
    pub force: bool,
}

/// Owner of the process-wide [`CrawlRun`] state.
///
/// Every change replaces the whole value in one step, so readers never see
/// a half-updated run.
#[derive(Debug, Clone)]
pub struct CrawlContext {
    state: Arc<watch::Sender<CrawlRun>>,
}

impl Default for CrawlContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CrawlRun::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Mark a run as started if none is active. Returns the state it replaced,
    /// or `None` (with nothing changed) when a run is already active.
    pub fn try_begin(&self) -> Option<CrawlRun> {
        let mut previous = None;
        self.state.send_if_modified(|run| {
            if run.is_running {
                return false;
            }
            previous = Some(run.clone());
            run.is_running = true;
            run.last_error = None;
            true
        });
        previous
    }

    /// Record a finished run and mark the context idle.
    pub fn finish(&self, summary: RunSummary) {
        self.state.send_modify(|run| {
            run.is_running = false;
            run.last_error = summary.error.clone();
            run.last_result = Some(summary);
        });
    }

    pub fn restore(&self, run: CrawlRun) {
        self.state.send_replace(run);
    }

    pub fn snapshot(&self) -> CrawlRun {
        self.state.borrow().clone()
    }

    /// Resolves once no run is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|run| !run.is_running).await;
    }
}

/// Handle for starting crawls and reading their status.
///
/// Runs execute one at a time on a worker task created by [`CrawlOrchestrator::spawn`].
#[derive(Clone)]
pub struct CrawlOrchestrator {
    context: CrawlContext,
    queue: mpsc::Sender<CrawlRequest>,
}

impl CrawlOrchestrator {
    /// Start the worker task. It stops when `cancel` fires, between runs.
    pub fn spawn<L, EF, S, R>(
        controller: TraversalController<L, EF, S>,
        reporter: R,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>)
    where
        L: SessionLauncher + 'static,
        EF: ExtractorFactory + 'static,
        S: ListingStore + 'static,
        R: CrawlReporter + 'static,
    {
        let context = CrawlContext::new();
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(worker_loop(
            Arc::new(controller),
            Arc::new(reporter),
            context.clone(),
            rx,
            cancel,
        ));
        (
            Self {
                context,
                queue: tx,
            },
            handle,
        )
    }

    /// Accept a run, or reject it with [`AppError::AlreadyRunning`] leaving the
    /// status untouched. Returns as soon as the run is queued.
    pub fn start(&self, request: CrawlRequest) -> Result<(), AppError> {
        let Some(previous) = self.context.try_begin() else {
            tracing::info!(source = %request.source, "Crawl start rejected, run in progress");
            return Err(AppError::AlreadyRunning);
        };

        match self.queue.try_send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.context.restore(previous);
                Err(AppError::AlreadyRunning)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.context.restore(previous);
                Err(AppError::Generic("Crawl worker is not running".into()))
            }
        }
    }

    pub fn status(&self) -> CrawlRun {
        self.context.snapshot()
    }

    pub async fn wait_idle(&self) {
        self.context.wait_idle().await;
    }
}

async fn worker_loop<L, EF, S, R>(
    controller: Arc<TraversalController<L, EF, S>>,
    reporter: Arc<R>,
    context: CrawlContext,
    mut rx: mpsc::Receiver<CrawlRequest>,
    cancel: CancellationToken,
) where
    L: SessionLauncher + 'static,
    EF: ExtractorFactory + 'static,
    S: ListingStore + 'static,
    R: CrawlReporter + 'static,
{
    tracing::debug!("Crawl worker started");

    loop {
        let request = tokio::select! {
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
            () = cancel.cancelled() => break,
        };

        let summary = run_isolated(&controller, &reporter, request).await;
        context.finish(summary);
    }

    // Anything accepted but never started still has to leave the running state.
    rx.close();
    while let Ok(request) = rx.try_recv() {
        let outcome = RunOutcome::failed("Crawl worker stopped before the run started".into());
        context.finish(outcome.into_summary(&request));
    }

    tracing::debug!("Crawl worker stopped");
}

/// Execute one request on its own task so a panic inside traversal still
/// produces a failed summary.
async fn run_isolated<L, EF, S, R>(
    controller: &Arc<TraversalController<L, EF, S>>,
    reporter: &Arc<R>,
    request: CrawlRequest,
) -> RunSummary
where
    L: SessionLauncher + 'static,
    EF: ExtractorFactory + 'static,
    S: ListingStore + 'static,
    R: CrawlReporter + 'static,
{
    reporter.report(CrawlEvent::RunStarted {
        source: request.source,
        scope: &request.scope.describe(),
    });

    let task = {
        let controller = Arc::clone(controller);
        let reporter = Arc::clone(reporter);
        let request = request.clone();
        tokio::spawn(async move { execute(&controller, &request, reporter.as_ref()).await })
    };

    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => RunOutcome::failed(format!("Crawl task aborted: {e}")),
    };

    let summary = outcome.into_summary(&request);
    match &summary.error {
        Some(error) => reporter.report(CrawlEvent::RunFailed { error }),
        None => reporter.report(CrawlEvent::RunCompleted { summary: &summary }),
    }
    summary
}

struct RunOutcome {
    totals: TraversalSummary,
    regions_completed: Option<u32>,
    error: Option<String>,
}

impl RunOutcome {
    fn failed(error: String) -> Self {
        Self {
            totals: TraversalSummary::default(),
            regions_completed: None,
            error: Some(error),
        }
    }

    fn into_summary(self, request: &CrawlRequest) -> RunSummary {
        RunSummary {
            success: self.error.is_none(),
            source: request.source,
            scope: request.scope.describe(),
            max_pages: request.max_pages,
            force: request.force,
            pages: self.totals.pages,
            inserted: self.totals.inserted,
            skipped: self.totals.skipped,
            regions_completed: self.regions_completed,
            error: self.error,
            finished_at: Utc::now(),
        }
    }
}

async fn execute<L, EF, S, R>(
    controller: &TraversalController<L, EF, S>,
    request: &CrawlRequest,
    reporter: &R,
) -> RunOutcome
where
    L: SessionLauncher,
    EF: ExtractorFactory,
    S: ListingStore,
    R: CrawlReporter,
{
    match &request.scope {
        CrawlScope::Single(query) => {
            match controller
                .run(request.source, query, request.max_pages, request.force, reporter)
                .await
            {
                Ok(totals) => RunOutcome {
                    totals,
                    regions_completed: None,
                    error: None,
                },
                Err(e) => RunOutcome {
                    totals: e.partial,
                    regions_completed: None,
                    error: Some(e.error.to_string()),
                },
            }
        }
        CrawlScope::Region { areas, keyword, .. } => {
            let mut totals = TraversalSummary::default();
            let mut completed = 0u32;

            for (i, area) in areas.iter().enumerate() {
                reporter.report(CrawlEvent::RegionStarted {
                    area,
                    index: i + 1,
                    total: areas.len(),
                });

                let query = SearchQuery::new(Some(area.clone()), keyword.clone());
                match controller
                    .run(request.source, &query, request.max_pages, request.force, reporter)
                    .await
                {
                    Ok(summary) => {
                        totals.absorb(&summary);
                        completed += 1;
                    }
                    Err(e) => {
                        totals.absorb(&e.partial);
                        return RunOutcome {
                            totals,
                            regions_completed: Some(completed),
                            error: Some(format!("{area}: {}", e.error)),
                        };
                    }
                }
            }

            RunOutcome {
                totals,
                regions_completed: Some(completed),
                error: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::{MockExtractorFactory, MockLauncher, MockReporter, MockStore};
    use crate::traversal::TraversalConfig;

    fn spawn(
        launcher: &MockLauncher,
        store: &MockStore,
        reporter: &MockReporter,
    ) -> (CrawlOrchestrator, JoinHandle<()>, CancellationToken) {
        let controller = TraversalController::new(
            launcher.clone(),
            MockExtractorFactory::new(),
            store.clone(),
            TraversalConfig {
                page_delay: Duration::ZERO,
            },
        );
        let cancel = CancellationToken::new();
        let (orchestrator, handle) =
            CrawlOrchestrator::spawn(controller, reporter.clone(), cancel.clone());
        (orchestrator, handle, cancel)
    }

    fn single(keyword: &str) -> CrawlRequest {
        CrawlRequest {
            source: ListingSource::Hellowork,
            scope: CrawlScope::Single(SearchQuery::new(None, Some(keyword.into()))),
            max_pages: 5,
            force: false,
        }
    }

    fn region(areas: &[&str]) -> CrawlRequest {
        CrawlRequest {
            source: ListingSource::Hellowork,
            scope: CrawlScope::Region {
                region: "kansai".into(),
                areas: areas.iter().map(|a| a.to_string()).collect(),
                keyword: None,
            },
            max_pages: 5,
            force: true,
        }
    }

    #[test]
    fn test_try_begin_is_single_flight() {
        let context = CrawlContext::new();
        assert!(context.try_begin().is_some());
        let before = context.snapshot();
        assert!(context.try_begin().is_none());
        assert_eq!(context.snapshot(), before);
    }

    #[tokio::test]
    async fn test_run_completes_and_records_summary() {
        let launcher = MockLauncher::with_pages(vec!["事務\tA社\t月給 200,000円".into()]);
        let store = MockStore::new();
        let reporter = MockReporter::new();
        let (orchestrator, _handle, _cancel) = spawn(&launcher, &store, &reporter);

        orchestrator.start(single("事務")).unwrap();
        orchestrator.wait_idle().await;

        let status = orchestrator.status();
        assert!(!status.is_running);
        assert!(status.last_error.is_none());
        let result = status.last_result.unwrap();
        assert!(result.success);
        assert_eq!(result.inserted, 1);
        assert_eq!(result.pages, 1);
        assert_eq!(reporter.count("RunCompleted"), 1);
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected_without_side_effects() {
        let (launcher, release) = MockLauncher::with_pages(vec!["a\tx".into()]).gated();
        let store = MockStore::new();
        let (orchestrator, _handle, _cancel) = spawn(&launcher, &store, &MockReporter::new());

        orchestrator.start(single("first")).unwrap();
        let running = orchestrator.status();
        assert!(running.is_running);

        let err = orchestrator.start(single("second")).unwrap_err();
        assert!(matches!(err, AppError::AlreadyRunning));
        assert_eq!(orchestrator.status(), running);

        release.notify_one();
        orchestrator.wait_idle().await;
        assert_eq!(store.count(), 1);
        assert_eq!(launcher.launches(), 1);

        // Idle again, so a new run is accepted.
        orchestrator.start(single("third")).unwrap();
        release.notify_one();
        orchestrator.wait_idle().await;
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_cleared_on_next_start() {
        let launcher = MockLauncher::with_pages(vec!["a\tx".into()]).failing_launch(1);
        let store = MockStore::new();
        let (orchestrator, _handle, _cancel) = spawn(&launcher, &store, &MockReporter::new());

        orchestrator.start(single("k")).unwrap();
        orchestrator.wait_idle().await;
        let status = orchestrator.status();
        assert!(!status.is_running);
        assert!(status.last_error.as_deref().unwrap().contains("mock launch failure"));
        assert!(!status.last_result.unwrap().success);

        orchestrator.start(single("k")).unwrap();
        orchestrator.wait_idle().await;
        let status = orchestrator.status();
        assert!(status.last_error.is_none());
        assert!(status.last_result.unwrap().success);
    }

    #[tokio::test]
    async fn test_panic_in_traversal_still_finishes_run() {
        let launcher = MockLauncher::with_pages(vec![]).panicking();
        let store = MockStore::new();
        let (orchestrator, _handle, _cancel) = spawn(&launcher, &store, &MockReporter::new());

        orchestrator.start(single("k")).unwrap();
        orchestrator.wait_idle().await;

        let status = orchestrator.status();
        assert!(!status.is_running);
        assert!(status.last_error.unwrap().contains("aborted"));
    }

    #[tokio::test]
    async fn test_region_fan_out_runs_each_area() {
        let launcher = MockLauncher::with_pages(vec!["a\tx".into()]);
        let store = MockStore::new();
        let reporter = MockReporter::new();
        let (orchestrator, _handle, _cancel) = spawn(&launcher, &store, &reporter);

        orchestrator
            .start(region(&["京都府", "大阪府", "兵庫県"]))
            .unwrap();
        orchestrator.wait_idle().await;

        let result = orchestrator.status().last_result.unwrap();
        assert!(result.success);
        assert_eq!(result.regions_completed, Some(3));
        assert_eq!(result.inserted, 3);
        assert_eq!(launcher.launches(), 3);
        assert_eq!(launcher.closes(), 3);
        assert_eq!(reporter.count("RegionStarted"), 3);

        let log = launcher.log.lock().unwrap();
        let codes: Vec<&str> = log
            .constraints
            .iter()
            .map(|(_, code)| code.as_str())
            .collect();
        assert_eq!(codes, vec!["26", "27", "28"]);
    }

    #[tokio::test]
    async fn test_region_failure_aborts_remaining_areas() {
        let launcher = MockLauncher::with_pages(vec!["a\tx".into()]).failing_launch(2);
        let store = MockStore::new();
        let (orchestrator, _handle, _cancel) = spawn(&launcher, &store, &MockReporter::new());

        orchestrator
            .start(region(&["京都府", "大阪府", "兵庫県"]))
            .unwrap();
        orchestrator.wait_idle().await;

        let status = orchestrator.status();
        let result = status.last_result.unwrap();
        assert!(!result.success);
        assert_eq!(result.regions_completed, Some(1));
        assert!(status.last_error.unwrap().starts_with("大阪府: "));
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_failed_run_keeps_partial_totals() {
        let launcher = MockLauncher::with_pages(vec![
            "a\tx\t月給 200,000円".into(),
            "b\tx\t月給 200,000円".into(),
        ])
        .failing_markup_on_page(2);
        let store = MockStore::new();
        let (orchestrator, _handle, _cancel) = spawn(&launcher, &store, &MockReporter::new());

        orchestrator.start(single("k")).unwrap();
        orchestrator.wait_idle().await;

        let status = orchestrator.status();
        assert!(status.last_error.is_some());
        let result = status.last_result.unwrap();
        assert!(!result.success);
        assert_eq!(result.pages, 1);
        assert_eq!(result.inserted, 1);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_region_failure_counts_failing_area_partial_totals() {
        let launcher = MockLauncher::with_pages(vec![
            "a\tx\t月給 200,000円".into(),
            "b\tx\t月給 200,000円".into(),
        ])
        .failing_markup_on_page(2);
        let store = MockStore::new();
        let (orchestrator, _handle, _cancel) = spawn(&launcher, &store, &MockReporter::new());

        orchestrator.start(region(&["京都府", "大阪府"])).unwrap();
        orchestrator.wait_idle().await;

        let status = orchestrator.status();
        let result = status.last_result.unwrap();
        assert!(!result.success);
        assert_eq!(result.regions_completed, Some(0));
        assert_eq!(result.inserted, 1);
        assert!(status.last_error.unwrap().starts_with("京都府: "));
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_start_after_worker_stopped_fails_and_restores_status() {
        let launcher = MockLauncher::with_pages(vec![]);
        let store = MockStore::new();
        let (orchestrator, handle, cancel) = spawn(&launcher, &store, &MockReporter::new());

        cancel.cancel();
        handle.await.unwrap();

        let before = orchestrator.status();
        let err = orchestrator.start(single("k")).unwrap_err();
        assert!(matches!(err, AppError::Generic(_)));
        assert_eq!(orchestrator.status(), before);
    }
}
