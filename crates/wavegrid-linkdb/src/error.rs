//! Error types for the Link Database.

use thiserror::Error;

/// Result type alias for Link Database operations.
pub type LinkDbResult<T> = Result<T, LinkDbError>;

/// Errors that can occur during Link Database operations.
#[derive(Debug, Error)]
pub enum LinkDbError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no contiguous spectrum block: {0}")]
    NoSpectrum(String),

    #[error("path infeasible: {0}")]
    PathInfeasible(String),

    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("interfaces unavailable: {0}")]
    InterfaceUnavailable(String),
}

impl LinkDbError {
    /// Whether this is a storage-layer failure rather than a domain outcome.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            LinkDbError::Open(_)
                | LinkDbError::Transaction(_)
                | LinkDbError::Table(_)
                | LinkDbError::Read(_)
                | LinkDbError::Write(_)
                | LinkDbError::Serialize(_)
                | LinkDbError::Deserialize(_)
        )
    }
}
