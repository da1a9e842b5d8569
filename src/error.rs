//! Error types shared across the import pipeline.
//!
//! [`ImportError`] covers the conditions that abort a whole run. Row-level and
//! folder-level failures never surface as `ImportError`; they are recorded in
//! the run's results or logged as warnings.

use thiserror::Error;

/// Failure talking to the content repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{path} returned HTTP {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("CSRF token response did not contain a token")]
    EmptyToken,

    #[error("cannot build a request URL for {path}: {reason}")]
    InvalidUrl { path: String, reason: String },
}

/// Run-level fatal conditions. Any of these stops the import before (or
/// instead of) processing rows.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to obtain CSRF token: {0}")]
    MissingCredential(#[source] RepositoryError),

    #[error("Invalid Google Spreadsheet URL: {0}")]
    InvalidSpreadsheetUrl(String),

    #[error("Unsupported source file: {0} (expected .csv, .xlsx or .xlsm)")]
    UnsupportedFile(String),

    #[error("Failed to load {url}: HTTP {status}. {hint}")]
    SourceStatus {
        url: String,
        status: u16,
        hint: String,
    },

    #[error("Failed to fetch {url}: {reason}")]
    SourceUnreachable { url: String, reason: String },

    #[error("Failed to read {path}: {source}")]
    LocalFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse sheet data: {0}")]
    Parse(String),

    #[error("No data found in spreadsheet")]
    NoData,
}

impl ImportError {
    /// Whether the failure was caused by the caller's input rather than an
    /// upstream service.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSpreadsheetUrl(_) | Self::UnsupportedFile(_) | Self::LocalFile { .. }
        )
    }
}
