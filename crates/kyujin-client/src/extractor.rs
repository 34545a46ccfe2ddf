use kyujin_core::error::AppError;
use kyujin_core::source::ListingSource;
use kyujin_core::traits::{ExtractorFactory, ListingExtractor, PageExtraction};

use crate::hellowork::HelloWorkExtractor;
use crate::indeed::IndeedExtractor;

/// The extractor for one listing source, chosen at traversal start.
#[derive(Debug, Clone)]
pub enum SourceExtractor {
    HelloWork(HelloWorkExtractor),
    Indeed(IndeedExtractor),
}

impl ListingExtractor for SourceExtractor {
    fn source(&self) -> ListingSource {
        match self {
            SourceExtractor::HelloWork(x) => x.source(),
            SourceExtractor::Indeed(x) => x.source(),
        }
    }

    fn extract_page(&self, html: &str) -> PageExtraction {
        match self {
            SourceExtractor::HelloWork(x) => x.extract_page(html),
            SourceExtractor::Indeed(x) => x.extract_page(html),
        }
    }
}

/// Factory mapping each [`ListingSource`] to its extractor.
#[derive(Debug, Clone, Default)]
pub struct SourceExtractors;

impl ExtractorFactory for SourceExtractors {
    type Extractor = SourceExtractor;

    fn create(&self, source: ListingSource) -> Result<SourceExtractor, AppError> {
        Ok(match source {
            ListingSource::Hellowork => SourceExtractor::HelloWork(HelloWorkExtractor::new()?),
            ListingSource::Indeed => SourceExtractor::Indeed(IndeedExtractor::new()?),
        })
    }
}
