//! Error types for the mirror engine.
//!
//! Per-item transfer errors are classified as transient (retried up to the
//! attempt ceiling) or terminal (recorded as failed, never retried). They are
//! caught at the worker boundary and turned into task outcomes; only
//! [`EngineError`] variants abort a run.

use thiserror::Error;

/// Errors raised while transferring a single item.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("network error: {0}")]
    Network(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("size mismatch: expected {expected} bytes, observed {observed}")]
    SizeMismatch { expected: u64, observed: u64 },

    #[error("checksum mismatch: expected {expected}, observed {observed}")]
    ChecksumMismatch { expected: String, observed: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Whether this error is worth another attempt.
    ///
    /// Validation mismatches count as transient: a corrupted single attempt is
    /// far more likely than a genuinely divergent source. Local spool I/O
    /// failures are likewise retried.
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Network(_)
            | TransferError::Timeout(_)
            | TransferError::RateLimited(_)
            | TransferError::SizeMismatch { .. }
            | TransferError::ChecksumMismatch { .. }
            | TransferError::Io(_) => true,
            TransferError::PermissionDenied(_)
            | TransferError::NotFound(_)
            | TransferError::QuotaExceeded(_) => false,
        }
    }

    /// Short stable name for reports and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::Network(_) => "network",
            TransferError::Timeout(_) => "timeout",
            TransferError::RateLimited(_) => "rate_limited",
            TransferError::PermissionDenied(_) => "permission_denied",
            TransferError::NotFound(_) => "not_found",
            TransferError::QuotaExceeded(_) => "quota_exceeded",
            TransferError::SizeMismatch { .. } => "size_mismatch",
            TransferError::ChecksumMismatch { .. } => "checksum_mismatch",
            TransferError::Io(_) => "io",
        }
    }
}

/// Errors that abort the run entirely.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The persisted ledger is unreadable or corrupt. Never auto-repaired:
    /// silently discarding history would cause a full-cost re-transfer.
    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The source folder id is missing, inaccessible, or not a folder.
    #[error("source error: {0}")]
    Source(String),

    /// The source tree could not be enumerated or mirrored at the destination.
    #[error("walk error: {0}")]
    Walk(String),
}
