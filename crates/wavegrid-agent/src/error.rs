//! Error types for the agent.

use thiserror::Error;

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors surfaced by the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transceiver absent on {0}")]
    TransceiverAbsent(String),

    #[error("hardware fault on {interface}: {detail}")]
    Hardware { interface: String, detail: String },

    #[error("interface not configured: {0}")]
    NotConfigured(String),
}
