//! Error types for the ADT CTS client.

use thiserror::Error;

/// Result type alias using the ADT error type.
pub type Result<T> = std::result::Result<T, AdtError>;

/// Main error type for the ADT CTS client.
#[derive(Error, Debug)]
pub enum AdtError {
    /// Malformed object URI or transport number, rejected before any network call
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The service returned a fatal-severity message for a transport check
    #[error("{0}")]
    ServiceRejected(String),

    /// An element the response schema requires was absent
    #[error("Element not found in response: {0}")]
    NotFound(String),

    /// The service answered with a non-2xx status
    #[error("Request failed with status {status}: {body}")]
    Transport { status: u16, body: String },

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
