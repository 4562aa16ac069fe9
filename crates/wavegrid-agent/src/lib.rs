//! wavegrid-agent — the per-switch SONiC agent.
//!
//! Consumes its tenant's `config_<vop>` topic, filters commands by
//! `target_pop`, applies CMIS configuration through the [`Transceiver`]
//! capability, publishes acks and periodic telemetry on
//! `monitoring_<vop>`, and heartbeats on `health_<vop>`.
//!
//! Duplicate command deliveries are recognized through a bounded LRU of
//! processed command ids; the stored ack is re-emitted and the hardware
//! is touched exactly once. Hardware access is serialized per interface.
//!
//! The agent is broker-agnostic: it reads decoded commands from a channel
//! and writes events to channels. The daemon wires those channels to the
//! Kafka pumps.

pub mod dedup;
pub mod error;
pub mod executor;
pub mod runner;
pub mod telemetry;
pub mod transceiver;

pub use error::{AgentError, AgentResult};
pub use executor::{AgentConfig, CommandExecutor};
pub use runner::run_agent;
pub use telemetry::TelemetrySessions;
pub use transceiver::{InterfaceLocks, MockTransceiver, Transceiver};
