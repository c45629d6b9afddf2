//! Error types for the bookmark preview

use thiserror::Error;

/// Result type alias for preview operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving years, fetching fragments or serving the page
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to build an HTTP client or bind the server
    #[error("Initialization failed: {0}")]
    InitializationError(String),

    /// Request to an external service failed (transport error or non-2xx status)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The date-conversion service answered with an unexpected shape
    #[error("Date conversion failed: {0}")]
    ConversionError(String),

    /// A control value could not be applied
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Preview server failure
    #[error("Server error: {0}")]
    ServerError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::NetworkError(err.to_string())
    }
}
