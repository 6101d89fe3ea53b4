//! Reload client errors

use thiserror::Error;

/// Errors that can occur when signalling the reload endpoint
#[derive(Debug, Error)]
pub enum ReloadError {
    /// HTTP request/response error not covered by a more specific variant
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint could not be reached (connection refused, DNS failure, ...)
    #[error("Reload endpoint unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete within the client timeout
    #[error("Reload request timed out: {0}")]
    Timeout(String),

    /// The configured endpoint is not a valid URL
    #[error("Invalid reload endpoint: {0}")]
    InvalidEndpoint(String),
}
