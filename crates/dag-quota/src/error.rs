//! Error types for dag-quota.
//!
//! Every failure is strongly typed. Per-event failures are isolated by the
//! filter and logged; admission failures are surfaced to the caller.

use crate::identity::WriterIdentity;

/// Quota accounting error types covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("Unknown writer: {0}")]
    UnknownWriter(WriterIdentity),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error(
        "Storage quota reached for {owner}: used {used} out of {quota} bytes, rejecting write of size {requested}"
    )]
    QuotaExceeded {
        owner: String,
        used: i64,
        quota: i64,
        requested: i64,
    },

    #[error("Malformed writer data for {writer}: {reason}")]
    MalformedStructuralRecord {
        writer: WriterIdentity,
        reason: String,
    },

    #[error("Usage snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuotaError {
    /// True for failures that the next event for the same writer may heal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::MalformedStructuralRecord { .. }
        )
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, QuotaError>;
