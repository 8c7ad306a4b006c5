//! Error types for the precache library.

use thiserror::Error;

/// Errors that can occur while installing or serving cached assets.
#[derive(Error, Debug)]
pub enum Error {
    /// A resource could not be fetched during installation.
    #[error("failed to pre-cache {resource}: {source}")]
    Install {
        /// Resource identifier that failed.
        resource: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A resource answered with a non-success status during installation.
    #[error("pre-cache request for {resource} returned status {status}")]
    BadStatus {
        /// Resource identifier that failed.
        resource: String,
        /// HTTP status code received.
        status: u16,
    },

    /// Network transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The cache store itself could not be used.
    #[error("Cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// I/O error during store or config operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored entry could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded or saved.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wraps `self` as the cause of a failed install of `resource`.
    #[must_use]
    pub fn for_resource(self, resource: &str) -> Self {
        match self {
            // Already names the resource.
            e @ Self::BadStatus { .. } => e,
            other => Self::Install {
                resource: resource.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// A specialized `Result` type for precache operations.
pub type Result<T> = std::result::Result<T, Error>;
