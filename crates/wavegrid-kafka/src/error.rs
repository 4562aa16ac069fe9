//! Error types for the Kafka plumbing.

use thiserror::Error;

/// Result type alias for Kafka operations.
pub type KafkaResult<T> = Result<T, KafkaError>;

/// Errors surfaced by the Kafka layer.
#[derive(Debug, Error)]
pub enum KafkaError {
    #[error("kafka client configuration error: {0}")]
    Config(String),

    #[error("kafka broker error: {0}")]
    Broker(String),

    #[error("topic admin error on {topic}: {detail}")]
    Admin { topic: String, detail: String },

    #[error("publish to {topic} failed: {detail}")]
    Publish { topic: String, detail: String },

    #[error("serialization error: {0}")]
    Serialize(String),
}
