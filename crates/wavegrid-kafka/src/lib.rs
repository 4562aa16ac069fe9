//! wavegrid-kafka — rdkafka plumbing shared by the WaveGrid services.
//!
//! Three concerns live here:
//!
//! - **Topic admin** — create the per-vOp topic triple with the right
//!   cleanup policy (compact for health, time-based for config/monitoring).
//! - **Publishing** — a JSON producer (acks=all) plus pump tasks that
//!   drain bounded mpsc channels onto topics, keyed by connection id so
//!   per-connection ordering holds within a partition.
//! - **Consuming** — pump tasks that subscribe a `StreamConsumer`
//!   (`auto.offset.reset=latest`), decode payloads into the typed wire
//!   enums at the boundary, and forward them over bounded channels.
//!   Malformed command payloads are forwarded as `MalformedCommand` so
//!   the agent can ack `status=error, reason=schema`; malformed monitoring
//!   payloads are logged and skipped.
//!
//! Services never touch rdkafka types directly; they speak channels.

pub mod admin;
pub mod consumer;
pub mod error;
pub mod producer;

pub use admin::{vop_topic_specs, TopicAdmin, TopicSpec};
pub use consumer::{spawn_command_consumer, spawn_event_consumer};
pub use error::{KafkaError, KafkaResult};
pub use producer::{spawn_command_pump, spawn_event_pump, JsonProducer};
