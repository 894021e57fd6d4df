//! Error taxonomy for the document transfer protocol.

use thiserror::Error;

/// Errors raised by collect/restore calls and envelope handling.
///
/// Per-document restore failures are not errors at this level; they
/// accumulate in a `TransferResult` so one bad document never aborts a
/// batch.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Transport-level failure or non-2xx response. Fatal to the current
    /// call, not retried.
    #[error("network error: {0}")]
    Network(String),

    /// Response or file is missing required fields.
    #[error("format error: {0}")]
    Format(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
