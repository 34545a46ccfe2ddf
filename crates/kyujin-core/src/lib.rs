pub mod error;
pub mod gate;
pub mod industry;
pub mod models;
pub mod orchestrator;
pub mod region;
pub mod reporter;
pub mod schedule;
pub mod source;
pub mod traits;
pub mod traversal;
pub mod wage;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::AppError;
pub use gate::{PersistOutcome, PersistenceGate};
pub use industry::{Industry, classify};
pub use models::{
    ClassifiedListing, CrawlRun, IndustryStat, ListingDraft, ListingFilter, ListingStats,
    PersistedListing, PrefectureStat, RunSummary,
};
pub use orchestrator::{CrawlContext, CrawlOrchestrator, CrawlRequest, CrawlScope};
pub use reporter::{CrawlEvent, CrawlReporter, TracingCrawlReporter};
pub use schedule::{Schedule, ScheduleFile, Scheduler};
pub use source::{ControlStrategy, ListingSource, SearchPlan, SearchQuery};
pub use traits::{
    BrowserSession, ExtractorFactory, ListingExtractor, ListingStore, NullStore, PageControl,
    PageExtraction, SessionLauncher,
};
pub use traversal::{TraversalConfig, TraversalController, TraversalFailure, TraversalSummary};
pub use wage::{Compensation, PayPeriod};
