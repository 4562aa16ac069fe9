//! wavegrid-controller — the per-vOp SDN controller.
//!
//! One controller instance runs per virtual operator. It computes paths
//! over the LinkDB topology, drives the connection state machine
//! (`PLANNED → SETUP_PENDING → ACTIVE ↔ DEGRADED → RECONFIG_PENDING`),
//! publishes commands on `config_<vop>`, consumes acks and telemetry from
//! `monitoring_<vop>` (and heartbeats from `health_<vop>`), and closes
//! the loop: persistent QoT degradation triggers an autonomous
//! `reconfigConnection` with stepped, clamped tx-power.
//!
//! # Concurrency model
//!
//! All mutable state lives in one owner task (the control loop). The REST
//! handlers and the Kafka pumps talk to it over bounded channels; nothing
//! is shared behind locks. A slow endpoint only delays its own
//! connection's pending command, never unrelated connections.

pub mod connection;
pub mod control;
pub mod error;
pub mod path;
pub mod qot;
pub mod registry;
pub mod service;

pub use connection::{ConnectionEvent, ConnectionManager, PendingAction};
pub use control::{ConnectionRequest, ControlHandle, Controller, ControllerConfig, ControlRequest};
pub use error::{ControllerError, ControllerResult};
pub use qot::{AdjustMode, QotConfig, QotDecision, QotState};
pub use registry::{AgentInfo, AgentRegistry};
