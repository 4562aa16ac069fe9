//! wavegrid-slice — the Slice Manager.
//!
//! Activates and deactivates virtual operators: validates the requested
//! interface assignments against LinkDB, reserves them atomically,
//! provisions the per-vOp Kafka topic triple, stores the tenant record,
//! and triggers the controller deployment hook. Any failure after the
//! reservation step rolls the reservation back before returning.

pub mod error;
pub mod orchestrator;
pub mod service;

pub use error::{SliceError, SliceResult};
pub use orchestrator::{
    ControllerDeployer, KafkaTopicProvisioner, NoopDeployer, SliceOrchestrator, TopicProvisioner,
    VopActivationRequest,
};
