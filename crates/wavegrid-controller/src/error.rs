//! Error types for the controller.

use thiserror::Error;

use wave_core::ConnectionStatus;
use wavegrid_linkdb::client::ClientError;

use crate::connection::ConnectionEvent;

/// Result type alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors surfaced by the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("connection not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("path infeasible: {0}")]
    PathInfeasible(String),

    #[error("invalid transition: {from:?} on {event:?}")]
    InvalidTransition {
        from: ConnectionStatus,
        event: ConnectionEvent,
    },

    #[error("link database error: {0}")]
    LinkDb(#[from] ClientError),

    #[error("control loop unavailable")]
    ChannelClosed,
}
