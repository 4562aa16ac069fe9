//! wave-core — shared domain types for the WaveGrid control plane.
//!
//! Everything that crosses a service boundary lives here: the topology
//! model (POPs, routers, interfaces, optical links, spectrum slots), the
//! tenant model (virtual operators and their Kafka topic triple), the
//! connection model with its lifecycle states, and the Kafka wire schemas
//! (commands tagged by `action`, monitoring events tagged by `type`).
//!
//! All types are plain serde structs/enums so they can be JSON-serialized
//! both onto Kafka topics and into the LinkDB's redb value columns.

pub mod api;
pub mod capacity;
pub mod connection;
pub mod message;
pub mod topology;

pub use capacity::{required_slots, Modulation, SLOT_WIDTH_GHZ};
pub use connection::*;
pub use message::*;
pub use topology::*;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Current Unix epoch as a float (sub-second precision, telemetry timestamps).
pub fn epoch_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
