use thiserror::Error;

/// Errors raised while synchronizing the pricing catalog or validating usage
///
/// Only `InvalidUsage` ever reaches a cost calculation caller. Everything else
/// is absorbed by the synchronizer, which keeps serving the last good snapshot.
#[derive(Debug, Error)]
pub enum PricingError {
    /// Catalog source answered with a non-success status
    #[error("Source unavailable ({url}): {message}")]
    SourceUnavailable {
        url: String,
        message: String,
        status: Option<u16>,
    },
    /// HTTP request error (preserves reqwest::Error for retry classification)
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    /// Fetched document does not hash to the published checksum
    #[error("Integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    /// Document (or checksum file) could not be parsed at all
    #[error("Malformed catalog: {0}")]
    MalformedCatalog(String),
    /// Usage record rejected at the calculator boundary
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
    /// Local cache or local source file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// Synchronizer was stopped while the operation was pending
    #[error("Synchronizer stopped")]
    Stopped,
}

impl PricingError {
    /// Short machine-readable name, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::Http(_) => "http_request_error",
            Self::IntegrityMismatch { .. } => "integrity_mismatch",
            Self::MalformedCatalog(_) => "malformed_catalog",
            Self::InvalidUsage(_) => "invalid_usage",
            Self::Io(_) => "io_error",
            Self::ConfigError(_) => "config_error",
            Self::Stopped => "stopped",
        }
    }
}
