//! End-to-end connection model and lifecycle states.

use serde::{Deserialize, Serialize};

use crate::capacity::Modulation;
use crate::topology::{slot_center_frequency_thz, ConnectionId, LinkId, PopId, VopId};

/// Lifecycle status of an end-to-end optical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Idle,
    Planned,
    SetupPending,
    Active,
    Degraded,
    ReconfigPending,
    Teardown,
    Deleted,
    Failed,
}

impl ConnectionStatus {
    /// States in which the connection holds spectrum on its path.
    pub fn holds_spectrum(self) -> bool {
        matches!(
            self,
            ConnectionStatus::Planned
                | ConnectionStatus::SetupPending
                | ConnectionStatus::Active
                | ConnectionStatus::Degraded
                | ConnectionStatus::ReconfigPending
                | ConnectionStatus::Teardown
        )
    }
}

/// Per-endpoint transceiver configuration, as carried in commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    pub pop_id: PopId,
    pub node_id: String,
    /// Interface name, e.g. `Ethernet48`.
    pub port_id: String,
    /// Center frequency in THz.
    pub frequency: f64,
    /// Commanded transmit power in dBm.
    pub tx_power_level: f64,
}

/// One link of a computed path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathSegment {
    pub link_id: LinkId,
    pub pop_a: PopId,
    pub pop_b: PopId,
    pub distance_km: f64,
}

/// A contiguous slot range, identical on every link of the path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotRange {
    pub start: usize,
    pub count: usize,
}

impl SlotRange {
    /// Slot indices covered by this range.
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        self.start..self.start + self.count
    }

    pub fn end(&self) -> usize {
        self.start + self.count
    }

    /// Center frequency of the range on a grid of `total` slots.
    pub fn center_frequency_thz(&self, total: usize) -> f64 {
        let lo = slot_center_frequency_thz(self.start, total);
        let hi = slot_center_frequency_thz(self.end() - 1, total);
        (lo + hi) / 2.0
    }

    pub fn overlaps(&self, other: &SlotRange) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

/// Durable record of an end-to-end connection (persisted in LinkDB).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub virtual_operator: VopId,
    pub source_pop: PopId,
    pub destination_pop: PopId,
    /// Endpoint configs; `tx_power_level` tracks the last commanded value.
    pub endpoints: Vec<EndpointConfig>,
    pub path: Vec<PathSegment>,
    pub slots: Option<SlotRange>,
    pub bandwidth_gbps: f64,
    pub modulation: Modulation,
    pub status: ConnectionStatus,
    pub estimated_osnr_db: Option<f64>,
    pub reconfig_count: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Connection {
    /// Total path length in km.
    pub fn path_km(&self) -> f64 {
        self.path.iter().map(|s| s.distance_km).sum()
    }

    /// Link ids along the path, in order.
    pub fn path_links(&self) -> Vec<LinkId> {
        self.path.iter().map(|s| s.link_id.clone()).collect()
    }
}
