//! Error types for sync operations

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote API reported a failure
    #[error("API error: {0}")]
    Api(String),

    /// Remote data contradicts itself
    #[error("Inconsistent history: {0}")]
    InconsistentHistory(String),

    /// Operation cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Retry policy gave up
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Operation name
        operation: String,
        /// Attempts made
        attempts: u32,
        /// Last observed failure
        last_error: String,
    },

    /// Driver task is no longer running
    #[error("Sync stopped")]
    Stopped,

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<tonhub_storage::Error> for Error {
    fn from(e: tonhub_storage::Error) -> Self {
        Error::Storage(format!("{}", e))
    }
}

impl From<tonhub_params::Error> for Error {
    fn from(e: tonhub_params::Error) -> Self {
        Error::Config(format!("{}", e))
    }
}
