//! Error types for the Slice Manager.

use thiserror::Error;

use wavegrid_linkdb::client::ClientError;

/// Result type alias for Slice Manager operations.
pub type SliceResult<T> = Result<T, SliceError>;

/// Errors that can occur during vOp lifecycle operations.
#[derive(Debug, Error)]
pub enum SliceError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("vop {0} is already active")]
    AlreadyActive(String),

    #[error("vop not found: {0}")]
    NotFound(String),

    #[error("interfaces unavailable: {0}")]
    InterfaceUnavailable(String),

    #[error("topic provisioning failed: {0}")]
    Topics(String),

    #[error("controller deployment failed: {0}")]
    Deploy(String),

    #[error("link database error: {0}")]
    LinkDb(#[from] ClientError),
}
