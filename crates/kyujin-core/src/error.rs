use thiserror::Error;

/// Application-wide error types for kyujin.
#[derive(Error, Debug)]
pub enum AppError {
    /// The browser session failed to launch, navigate, or interact with a page.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// A bounded wait inside the browser session expired.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// A single listing element could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A crawl run is already active.
    #[error("A crawl run is already in progress")]
    AlreadyRunning,

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error must abort the whole crawl run.
    ///
    /// Element-level parse failures are logged and skipped instead.
    pub fn is_run_level(&self) -> bool {
        !matches!(self, AppError::ParseError(_))
    }
}
