//! Error types for the oa-bulkfix crate.
//!
//! Only unrecoverable setup failures surface as [`BulkfixError`] from the
//! presentation surface. Per-directive and per-element failures are collected
//! into batch summaries instead of being raised.

use std::path::PathBuf;

/// Bulkfix-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum BulkfixError {
    /// The document root could not be obtained; no progress is possible.
    #[error("document unavailable: {0}")]
    DocumentUnavailable(#[from] DocumentError),

    /// The operation is not allowed from the engine's current phase.
    #[error("operation `{requested}` not allowed while engine is {phase}")]
    InvalidPhase { requested: String, phase: String },

    /// Stored backup or progress record could not be decoded.
    #[error("corrupt store record `{key}`: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Key-value store failure.
    #[error("store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error with context.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures raised by the host document collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// The document has no readable root container.
    #[error("document root is missing or unreadable")]
    MissingRoot,

    /// No leaf element exists at the given traversal index.
    #[error("no element at index {0}")]
    NoSuchElement(usize),

    /// The node does not support text access.
    #[error("{kind} node does not support text access")]
    Unsupported { kind: String },
}

/// Failures raised by a semantic ranking backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RankError {
    /// The backend answered with a non-success HTTP status.
    #[error("ranking backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("ranking backend unreachable: {0}")]
    Transport(String),

    /// The backend answered but the reply could not be interpreted.
    #[error("malformed ranking reply: {0}")]
    Malformed(String),
}

/// Convenience result type for oa-bulkfix operations.
pub type BulkfixResult<T> = Result<T, BulkfixError>;
