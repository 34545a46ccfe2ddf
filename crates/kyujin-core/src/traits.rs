use std::future::Future;

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ClassifiedListing, ListingDraft, ListingFilter, PersistedListing};
use crate::source::{ControlStrategy, ListingSource};

/// Acquires an exclusive browser session for one crawl run.
pub trait SessionLauncher: Send + Sync + Clone {
    type Session: BrowserSession;

    fn launch(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// An interactive element found on the current page.
pub trait PageControl: Send {
    fn is_enabled(&self) -> bool;
}

/// A live, single-tab browser the traversal drives.
///
/// Not shared between runs. `close` must be safe to call more than once.
pub trait BrowserSession: Send + Sync {
    type Control: PageControl;

    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Set the value of the form element with id `selector_id`.
    fn apply_constraint(
        &self,
        selector_id: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Wait for the page to finish rendering, bounded by the session's timeout.
    fn wait_until_ready(&self) -> impl Future<Output = Result<(), AppError>> + Send;

    fn current_markup(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Look up a control. `Ok(None)` means the strategy matched nothing.
    fn find_control(
        &self,
        strategy: &ControlStrategy,
    ) -> impl Future<Output = Result<Option<Self::Control>, AppError>> + Send;

    fn trigger_navigation(
        &self,
        control: Self::Control,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Drafts read from one result page.
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    /// Listing elements located on the page, parsed or not.
    pub element_count: usize,
    /// Successfully parsed drafts, in document order.
    pub drafts: Vec<ListingDraft>,
    /// Elements that failed to parse.
    pub failures: usize,
}

/// Turns a result page's markup into drafts for one source.
pub trait ListingExtractor: Send + Sync + Clone {
    fn source(&self) -> ListingSource;

    fn extract_page(&self, html: &str) -> PageExtraction;
}

/// Selects the extractor for a source at traversal start.
pub trait ExtractorFactory: Send + Sync + Clone {
    type Extractor: ListingExtractor;

    fn create(&self, source: ListingSource) -> Result<Self::Extractor, AppError>;
}

/// Append-only listing storage.
pub trait ListingStore: Send + Sync + Clone {
    /// Whether a listing with exactly this title and company is stored.
    fn exists(
        &self,
        title: &str,
        company: &str,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Insert a listing atomically. Returns the generated UUID.
    fn insert(
        &self,
        listing: &ClassifiedListing,
    ) -> impl Future<Output = Result<Uuid, AppError>> + Send;

    /// Matching listings, newest first.
    fn query_all(
        &self,
        filter: &ListingFilter,
    ) -> impl Future<Output = Result<Vec<PersistedListing>, AppError>> + Send;
}

/// A no-op ListingStore for dry runs.
#[derive(Debug, Clone)]
pub struct NullStore;

impl ListingStore for NullStore {
    async fn exists(&self, _title: &str, _company: &str) -> Result<bool, AppError> {
        Ok(false)
    }

    async fn insert(&self, _listing: &ClassifiedListing) -> Result<Uuid, AppError> {
        Ok(Uuid::nil())
    }

    async fn query_all(&self, _filter: &ListingFilter) -> Result<Vec<PersistedListing>, AppError> {
        Ok(vec![])
    }
}
