//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ClassifiedListing, ListingDraft, ListingFilter, PersistedListing};
use crate::reporter::{CrawlEvent, CrawlReporter};
use crate::source::{ControlStrategy, ListingSource};
use crate::traits::{
    BrowserSession, ExtractorFactory, ListingExtractor, ListingStore, PageControl, PageExtraction,
    SessionLauncher,
};
use crate::wage;

// ---------------------------------------------------------------------------
// MockLauncher / MockSession
// ---------------------------------------------------------------------------

/// Calls recorded across every session a [`MockLauncher`] produced.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub launches: usize,
    pub navigations: Vec<String>,
    pub constraints: Vec<(String, String)>,
    pub lookups: Vec<ControlStrategy>,
    pub clicks: usize,
    pub closes: usize,
}

/// Scripted browser behaviour shared by all sessions of one launcher.
#[derive(Debug, Clone)]
struct Script {
    /// Markup of each result page, page 1 first.
    pages: Vec<String>,
    next_enabled: bool,
    /// Only this next-page strategy index matches; `None` means the first one.
    next_strategy: Option<usize>,
    /// A next-page strategy index that finds a disabled control.
    disabled_strategy: Option<usize>,
    fail_constraints: bool,
    missing_submit: bool,
    /// 1-based launch number that fails.
    fail_launch: Option<usize>,
    /// 1-based page whose markup read fails.
    fail_markup_page: Option<usize>,
    panic_on_launch: bool,
}

/// Mock launcher that hands out sessions replaying a fixed set of pages.
#[derive(Clone)]
pub struct MockLauncher {
    script: Script,
    pub log: Arc<Mutex<SessionLog>>,
    release: Option<Arc<Notify>>,
}

impl MockLauncher {
    pub fn with_pages(pages: Vec<String>) -> Self {
        Self {
            script: Script {
                pages,
                next_enabled: true,
                next_strategy: None,
                disabled_strategy: None,
                fail_constraints: false,
                missing_submit: false,
                fail_launch: None,
                fail_markup_page: None,
                panic_on_launch: false,
            },
            log: Arc::new(Mutex::new(SessionLog::default())),
            release: None,
        }
    }

    /// The next-page control is found but reports itself disabled.
    pub fn next_disabled(mut self) -> Self {
        self.script.next_enabled = false;
        self
    }

    /// Only the strategy at `index` in the source's list finds the next control.
    pub fn next_found_by(mut self, index: usize) -> Self {
        self.script.next_strategy = Some(index);
        self
    }

    /// The strategy at `index` finds a disabled control, alongside whichever
    /// strategy finds the enabled one.
    pub fn disabled_next_at(mut self, index: usize) -> Self {
        self.script.disabled_strategy = Some(index);
        self
    }

    pub fn failing_constraints(mut self) -> Self {
        self.script.fail_constraints = true;
        self
    }

    pub fn without_submit(mut self) -> Self {
        self.script.missing_submit = true;
        self
    }

    pub fn failing_launch(mut self, launch: usize) -> Self {
        self.script.fail_launch = Some(launch);
        self
    }

    pub fn failing_markup_on_page(mut self, page: usize) -> Self {
        self.script.fail_markup_page = Some(page);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.script.panic_on_launch = true;
        self
    }

    /// Every launch waits for a permit on the returned handle before succeeding.
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let notify = Arc::new(Notify::new());
        self.release = Some(Arc::clone(&notify));
        (self, notify)
    }

    pub fn closes(&self) -> usize {
        self.log.lock().unwrap().closes
    }

    pub fn launches(&self) -> usize {
        self.log.lock().unwrap().launches
    }
}

impl SessionLauncher for MockLauncher {
    type Session = MockSession;

    async fn launch(&self) -> Result<MockSession, AppError> {
        if let Some(release) = &self.release {
            release.notified().await;
        }
        if self.script.panic_on_launch {
            panic!("mock browser crashed");
        }

        let launch = {
            let mut log = self.log.lock().unwrap();
            log.launches += 1;
            log.launches
        };
        if self.script.fail_launch == Some(launch) {
            return Err(AppError::BrowserError("mock launch failure".into()));
        }

        Ok(MockSession {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            page: Arc::new(Mutex::new(0)),
        })
    }
}

/// Which kind of control a [`MockSession`] handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockControlKind {
    Submit,
    Next,
}

#[derive(Debug)]
pub struct MockControl {
    pub kind: MockControlKind,
    pub enabled: bool,
}

impl PageControl for MockControl {
    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

pub struct MockSession {
    script: Script,
    log: Arc<Mutex<SessionLog>>,
    /// 0-based index into `script.pages`.
    page: Arc<Mutex<usize>>,
}

impl BrowserSession for MockSession {
    type Control = MockControl;

    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        Ok(())
    }

    async fn apply_constraint(&self, selector_id: &str, value: &str) -> Result<(), AppError> {
        if self.script.fail_constraints {
            return Err(AppError::BrowserError(format!(
                "element #{selector_id} not found"
            )));
        }
        self.log
            .lock()
            .unwrap()
            .constraints
            .push((selector_id.to_string(), value.to_string()));
        Ok(())
    }

    async fn wait_until_ready(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn current_markup(&self) -> Result<String, AppError> {
        let page = *self.page.lock().unwrap();
        if self.script.fail_markup_page == Some(page + 1) {
            return Err(AppError::Timeout(30));
        }
        Ok(self.script.pages.get(page).cloned().unwrap_or_default())
    }

    async fn find_control(
        &self,
        strategy: &ControlStrategy,
    ) -> Result<Option<MockControl>, AppError> {
        self.log.lock().unwrap().lookups.push(*strategy);

        if *strategy == ControlStrategy::Css("#ID_searchBtn") {
            return Ok((!self.script.missing_submit).then_some(MockControl {
                kind: MockControlKind::Submit,
                enabled: true,
            }));
        }

        let page = *self.page.lock().unwrap();
        if page + 1 >= self.script.pages.len() {
            return Ok(None);
        }

        let found_at = |index: usize| {
            [ListingSource::Hellowork, ListingSource::Indeed]
                .iter()
                .any(|s| s.next_page_strategies().get(index) == Some(strategy))
        };
        if self.script.disabled_strategy.is_some_and(found_at) {
            return Ok(Some(MockControl {
                kind: MockControlKind::Next,
                enabled: false,
            }));
        }
        let wanted = self.script.next_strategy.unwrap_or(0);
        Ok(found_at(wanted).then_some(MockControl {
            kind: MockControlKind::Next,
            enabled: self.script.next_enabled,
        }))
    }

    async fn trigger_navigation(&self, control: MockControl) -> Result<(), AppError> {
        self.log.lock().unwrap().clicks += 1;
        if control.kind == MockControlKind::Next {
            *self.page.lock().unwrap() += 1;
        }
        Ok(())
    }

    async fn close(&self) {
        self.log.lock().unwrap().closes += 1;
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor over a line format: one element per non-empty line,
/// `title<TAB>company[<TAB>wage text]`. A line starting with `!` fails to parse.
#[derive(Clone)]
pub struct MockExtractor {
    source: ListingSource,
}

impl MockExtractor {
    pub fn new(source: ListingSource) -> Self {
        Self { source }
    }
}

impl ListingExtractor for MockExtractor {
    fn source(&self) -> ListingSource {
        self.source
    }

    fn extract_page(&self, html: &str) -> PageExtraction {
        let mut page = PageExtraction::default();
        for line in html.lines().filter(|l| !l.trim().is_empty()) {
            page.element_count += 1;
            if line.starts_with('!') {
                page.failures += 1;
                continue;
            }

            let mut fields = line.split('\t');
            let title = fields.next().unwrap_or_default();
            let company = fields.next().unwrap_or_default();
            let wage_text = fields.next().unwrap_or_default();

            let draft = ListingDraft {
                company: company.to_string(),
                ..ListingDraft::new(self.source, title)
            }
            .with_compensation(wage::normalize(wage_text, line));
            page.drafts.push(draft);
        }
        page
    }
}

/// Mock factory that creates a [`MockExtractor`] for any source.
#[derive(Clone)]
pub struct MockExtractorFactory {
    create_error: Arc<Mutex<Option<AppError>>>,
}

impl MockExtractorFactory {
    pub fn new() -> Self {
        Self {
            create_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_create_error(error: AppError) -> Self {
        Self {
            create_error: Arc::new(Mutex::new(Some(error))),
        }
    }
}

impl Default for MockExtractorFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorFactory for MockExtractorFactory {
    type Extractor = MockExtractor;

    fn create(&self, source: ListingSource) -> Result<MockExtractor, AppError> {
        let mut err = self.create_error.lock().unwrap();
        if let Some(e) = err.take() {
            return Err(e);
        }
        Ok(MockExtractor::new(source))
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

/// Mock store backed by an in-memory Vec, newest last.
#[derive(Clone)]
pub struct MockStore {
    pub listings: Arc<Mutex<Vec<PersistedListing>>>,
    /// When set, every call fails with a database error carrying this message.
    error: Option<String>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            listings: Arc::new(Mutex::new(Vec::new())),
            error: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            listings: Arc::new(Mutex::new(Vec::new())),
            error: Some(message.to_string()),
        }
    }

    pub fn count(&self) -> usize {
        self.listings.lock().unwrap().len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.listings
            .lock()
            .unwrap()
            .iter()
            .map(|l| l.title.clone())
            .collect()
    }

    fn check(&self) -> Result<(), AppError> {
        match &self.error {
            Some(message) => Err(AppError::DatabaseError(message.clone())),
            None => Ok(()),
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingStore for MockStore {
    async fn exists(&self, title: &str, company: &str) -> Result<bool, AppError> {
        self.check()?;
        Ok(self
            .listings
            .lock()
            .unwrap()
            .iter()
            .any(|l| l.title == title && l.company == company))
    }

    async fn insert(&self, listing: &ClassifiedListing) -> Result<Uuid, AppError> {
        self.check()?;
        let id = Uuid::new_v4();
        self.listings
            .lock()
            .unwrap()
            .push(PersistedListing::from_classified(listing, id, Utc::now()));
        Ok(id)
    }

    async fn query_all(&self, filter: &ListingFilter) -> Result<Vec<PersistedListing>, AppError> {
        self.check()?;
        let listings = self.listings.lock().unwrap();
        Ok(listings
            .iter()
            .rev()
            .filter(|l| filter.matches(l))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Reporter that records the debug form of every event.
#[derive(Clone, Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded events whose debug form starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

impl CrawlReporter for MockReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}
