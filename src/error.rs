//! Error types for stickerpack-dl
//!
//! This module provides the error taxonomy for the pack pipeline:
//! - Run-level errors surfaced to the caller ([`Error`])
//! - Acquisition failures (manifest rejected, fetch exhausted) ([`AcquisitionError`])
//! - Single-request network failures classified for retry ([`FetchError`])
//! - Delivery channel failures ([`DeliveryError`])
//! - Machine-readable error codes for embedding applications

use thiserror::Error;

/// Result type alias for stickerpack-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stickerpack-dl
///
/// Each variant maps to one outcome of a pipeline run. Per-item conversion
/// failures ([`Error::ToolInvocation`]) are normally caught and logged inside the
/// conversion stage and only reach the caller when a converter is used directly.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed pack reference (link or name)
    #[error("invalid pack reference: {0}")]
    InvalidIdentifier(String),

    /// Manifest resolution or asset download failed
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    /// Required external tools are not installed
    #[error("external tools not installed: {}", tools.join(", "))]
    ToolMissing {
        /// Names of the missing binaries
        tools: Vec<String>,
    },

    /// An external tool (or the in-process encoder) failed on one item
    #[error("conversion of {item} with {tool} failed: {reason}")]
    ToolInvocation {
        /// File name of the item being converted
        item: String,
        /// Tool that failed (binary name, or "image" for in-process encoding)
        tool: String,
        /// Underlying error text (exit status, stderr tail, ...)
        reason: String,
    },

    /// Conversion produced no usable items
    #[error("no convertible items in pack {identifier}")]
    EmptyResult {
        /// Pack identifier
        identifier: String,
    },

    /// Delivery channel rejected a send
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    /// Another run for the same identifier is still in flight
    #[error("a run for pack {0} is already in progress")]
    RunInProgress(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "group_size")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Archive writing error
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Acquisition stage failures
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The provider reported that the pack cannot be resolved
    #[error("pack {identifier} could not be resolved: {reason}")]
    InvalidPack {
        /// Pack identifier
        identifier: String,
        /// Provider-supplied description
        reason: String,
    },

    /// Manifest request failed after all retries
    #[error("manifest request for {identifier} failed: {source}")]
    Manifest {
        /// Pack identifier
        identifier: String,
        /// Last fetch error
        #[source]
        source: FetchError,
    },

    /// Item fetch failed after all retries
    #[error("item {index} could not be downloaded: {source}")]
    Fetch {
        /// Manifest index of the item
        index: usize,
        /// Last fetch error
        #[source]
        source: FetchError,
    },
}

/// Single-request network failure
#[derive(Debug, Error)]
pub enum FetchError {
    /// Server answered with a transient status (429, 500, 502, 503, 504)
    #[error("{url} answered with transient status {status}")]
    TransientStatus {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Transport-level error (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// URL could not be built
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Response body did not match the expected shape
    #[error("malformed response from {url}: {reason}")]
    Malformed {
        /// Requested URL
        url: String,
        /// What was wrong
        reason: String,
    },
}

/// Delivery channel failures
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Channel rejected the payload or the request
    #[error("channel rejected {what}: {reason}")]
    Rejected {
        /// What was being sent (file name or "notice")
        what: String,
        /// Channel-supplied description
        reason: String,
    },

    /// Transport-level error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl FetchError {
    /// HTTP statuses that are retried
    pub const TRANSIENT_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

    /// Whether an HTTP status belongs to the transient set
    #[must_use]
    pub fn is_transient_status(status: u16) -> bool {
        Self::TRANSIENT_STATUSES.contains(&status)
    }
}

impl Error {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidIdentifier(_) => "invalid_identifier",
            Error::Acquisition(e) => match e {
                AcquisitionError::InvalidPack { .. } => "invalid_pack",
                AcquisitionError::Manifest { .. } => "manifest_failed",
                AcquisitionError::Fetch { .. } => "fetch_failed",
            },
            Error::ToolMissing { .. } => "tool_missing",
            Error::ToolInvocation { .. } => "tool_invocation_failed",
            Error::EmptyResult { .. } => "empty_result",
            Error::Delivery(_) => "delivery_failed",
            Error::RunInProgress(_) => "run_in_progress",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Image(_) => "image_error",
            Error::Archive(_) => "archive_error",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }

    /// Single status line shown to the requester when a run ends with this error
    pub fn user_message(&self) -> String {
        match self {
            Error::EmptyResult { .. } => {
                "⚠️ No file in this pack could be converted.".to_string()
            }
            Error::ToolMissing { .. } | Error::InvalidIdentifier(_) | Error::RunInProgress(_) => {
                format!("❌ {}", self)
            }
            _ => format!("❌ Something went wrong: {}", self),
        }
    }

    /// Build a per-item conversion error
    pub(crate) fn tool_invocation(
        item: &std::path::Path,
        tool: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Error::ToolInvocation {
            item: item_name(item),
            tool: tool.into(),
            reason: reason.to_string(),
        }
    }
}

fn item_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
