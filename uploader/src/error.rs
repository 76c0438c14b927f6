//! Error types for the session uploader.
//!
//! - [`UploadError`] - a single file transfer failed
//! - [`BatchError`] - a batch stopped at a given task
//! - [`SessionError`] - session lookup failed
//! - [`DownloadError`] - file download failed
//! - [`ImageUploadError`] - CDN image upload failed
//! - [`ConfigError`] - environment configuration is invalid
//! - [`ViewError`] - top-level error surfaced by the upload view
//!
//! Conversion into [`ViewError`] is automatic via `From` implementations,
//! so `?` works across the layers.

use thiserror::Error;

use crate::coordinator::BatchReport;
use crate::types::UploadReceipt;

// =============================================================================
// Upload Errors
// =============================================================================

/// Errors from a single file transfer.
///
/// Messages are kept as strings so the error can be cloned into
/// batch reports and view state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadError {
    /// The request never reached the server or got no response.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Nothing to upload.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Progress cannot be computed without a total byte count.
    #[error("Unknown or empty file size for '{0}'")]
    UnknownSize(String),

    /// The request exceeded the configured timeout.
    #[error("Upload timed out")]
    Timeout,

    /// The upload was cancelled by the caller.
    #[error("Upload cancelled")]
    Cancelled,

    /// The server answered 2xx with a body we could not read.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// Local file could not be read.
    #[error("Failed to read file: {0}")]
    Io(String),
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UploadError::Timeout
        } else if let Some(status) = err.status() {
            UploadError::Server {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            UploadError::InvalidResponse(err.to_string())
        } else {
            UploadError::Network(err.to_string())
        }
    }
}

// =============================================================================
// Batch Errors
// =============================================================================

/// A batch aborted at task `index`.
///
/// Produced by sequential runs and by rejected or cancelled-before-start
/// batches. Tasks before `index` were uploaded and stay on the server;
/// their receipts are carried here so the caller can report the partial
/// result. Concurrent runs report through [`BatchReport`] instead.
#[derive(Debug, Clone, Error)]
#[error("Task {index} failed after {uploaded} upload(s): {source}")]
pub struct BatchError {
    /// Index of the failing task, or of the first task not started
    /// when the batch was rejected or cancelled.
    pub index: usize,
    /// Number of tasks uploaded before the failure.
    pub uploaded: usize,
    /// Receipts of the uploaded tasks, in input order.
    pub receipts: Vec<UploadReceipt>,
    /// Underlying failure.
    #[source]
    pub source: UploadError,
}

impl BatchError {
    /// A batch rejected before any transfer started.
    pub fn rejected(source: UploadError) -> Self {
        Self {
            index: 0,
            uploaded: 0,
            receipts: Vec::new(),
            source,
        }
    }

    /// True when the batch stopped because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.source == UploadError::Cancelled
    }
}

// =============================================================================
// Session / Download Errors
// =============================================================================

/// Errors from the session service.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Session does not exist.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The server answered with a non-2xx status.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The body was not a session.
    #[error("Invalid session response: {0}")]
    InvalidResponse(String),
}

/// Errors while downloading a stored file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// The server answered with a non-2xx status.
    #[error("Server error ({status}) for file {file_id}")]
    Server { status: u16, file_id: String },

    /// Failed to write the file locally.
    #[error("Failed to save file: {0}")]
    IoError(#[from] std::io::Error),
}

// =============================================================================
// Image Upload Errors
// =============================================================================

/// Errors from the CDN image upload.
#[derive(Debug, Error)]
pub enum ImageUploadError {
    /// CDN cloud name or preset not configured.
    #[error("Missing CDN configuration: {0}")]
    NotConfigured(String),

    /// Failed to read the image.
    #[error("Failed to read image: {0}")]
    IoError(#[from] std::io::Error),

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// The CDN rejected the upload.
    #[error("CDN error: {0}")]
    Rejected(String),

    /// The CDN accepted the upload but returned no URL.
    #[error("CDN response has no secure_url")]
    MissingUrl,
}

// =============================================================================
// Config Errors
// =============================================================================

/// Invalid environment configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Variable set to an unparsable value.
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: String, value: String },

    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

// =============================================================================
// View Errors (top-level)
// =============================================================================

/// Errors surfaced by [`crate::view::SessionUploadView`].
#[derive(Debug, Error)]
pub enum ViewError {
    /// Upload tab value is neither "recordings" nor "files".
    #[error("Unknown upload tab: {0}")]
    UnknownTab(String),

    /// Action not allowed in the current state.
    #[error("{0}")]
    NotAllowed(String),

    /// Submit with nothing selected.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upload batch failed.
    #[error("Upload failed: {0}")]
    Batch(#[from] BatchError),

    /// Concurrent batch where some tasks failed; outcomes per task index.
    #[error(
        "{} of {} upload(s) failed",
        .0.failures().len(),
        .0.outcomes.len()
    )]
    Partial(BatchReport),

    /// Session refresh failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for single transfers.
pub type UploadResult<T> = Result<T, UploadError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type for view operations.
pub type ViewResult<T> = Result<T, ViewError>;
