pub mod dom;
pub mod extractor;
pub mod hellowork;
pub mod indeed;

#[cfg(feature = "browser")]
pub mod browser_session;

#[cfg(feature = "browser")]
pub use browser_session::{ChromeConfig, ChromeLauncher, ChromeSession};
pub use extractor::{SourceExtractor, SourceExtractors};
pub use hellowork::HelloWorkExtractor;
pub use indeed::IndeedExtractor;
