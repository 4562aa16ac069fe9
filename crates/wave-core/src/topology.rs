//! Physical topology and tenant types.
//!
//! These types represent the durable state owned by the Link Database:
//! POPs, routers, optical interfaces, links with their spectrum slot grid,
//! and the virtual-operator registry. Composite keys follow the pattern
//! `{pop}/{router}/{interface}` for prefix scans.

use serde::{Deserialize, Serialize};

/// Unique identifier for a Point of Presence.
pub type PopId = String;

/// Unique identifier for a router within a POP.
pub type RouterId = String;

/// Unique identifier for an optical link.
pub type LinkId = String;

/// Unique identifier for a virtual operator (tenant).
pub type VopId = String;

/// Unique identifier for an end-to-end connection.
pub type ConnectionId = String;

/// Number of spectrum slots on a freshly created link (C-band, 12.5 GHz grid).
pub const DEFAULT_TOTAL_SLOTS: usize = 96;

/// Grid anchor: the center of the slot grid sits at 193.1 THz.
pub const GRID_CENTER_THZ: f64 = 193.1;

// ── POPs, routers, interfaces ─────────────────────────────────────

/// Point of Presence — a site hosting IPoWDM routers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pop {
    pub pop_id: PopId,
    pub name: String,
    /// Geographic location, "lat,lon".
    pub location: String,
    /// Owning physical operator.
    pub operator: String,
    pub created_at: u64,
}

/// IPoWDM router at a POP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Router {
    pub router_id: RouterId,
    pub pop_id: PopId,
    pub model: String,
    pub created_at: u64,
}

/// Router interface carrying a coherent pluggable transceiver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interface {
    /// e.g. `Ethernet48`.
    pub interface_id: String,
    pub router_id: RouterId,
    pub pop_id: PopId,
    pub port_num: u32,
    /// Reserving virtual operator, if any.
    pub owner: Option<VopId>,
    pub admin_up: bool,
    pub oper_up: bool,
    pub transceiver_present: bool,
}

impl Interface {
    /// Composite key for the interfaces table.
    pub fn table_key(&self) -> String {
        format!("{}/{}/{}", self.pop_id, self.router_id, self.interface_id)
    }
}

/// Address of one interface, as used in reservation requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct InterfaceRef {
    pub pop_id: PopId,
    pub router_id: RouterId,
    pub interface_id: String,
}

impl InterfaceRef {
    pub fn table_key(&self) -> String {
        format!("{}/{}/{}", self.pop_id, self.router_id, self.interface_id)
    }
}

// ── Links and spectrum slots ──────────────────────────────────────

/// Occupancy state of one spectrum slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Free,
    Reserved,
    Active,
}

/// One fixed-width frequency bin on an optical link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub state: SlotState,
    /// Connection holding this slot when reserved/active.
    pub owner: Option<ConnectionId>,
    pub virtual_operator: Option<VopId>,
}

impl Slot {
    pub fn free() -> Self {
        Slot {
            state: SlotState::Free,
            owner: None,
            virtual_operator: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == SlotState::Free
    }
}

/// Physical optical link between two POPs with its spectrum slot grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpticalLink {
    pub link_id: LinkId,
    pub pop_a: PopId,
    pub pop_b: PopId,
    pub distance_km: f64,
    pub fiber_type: String,
    pub slots: Vec<Slot>,
    pub created_at: u64,
}

impl OpticalLink {
    /// Create a link with an all-free slot grid.
    pub fn new(
        link_id: impl Into<LinkId>,
        pop_a: impl Into<PopId>,
        pop_b: impl Into<PopId>,
        distance_km: f64,
        total_slots: usize,
        created_at: u64,
    ) -> Self {
        OpticalLink {
            link_id: link_id.into(),
            pop_a: pop_a.into(),
            pop_b: pop_b.into(),
            distance_km,
            fiber_type: "SMF".to_string(),
            slots: vec![Slot::free(); total_slots],
            created_at,
        }
    }

    /// True for each slot index that is free on this link.
    pub fn free_mask(&self) -> Vec<bool> {
        self.slots.iter().map(Slot::is_free).collect()
    }

    /// Center frequency of slot `index` in THz (12.5 GHz grid around 193.1).
    pub fn center_frequency_thz(&self, index: usize) -> f64 {
        slot_center_frequency_thz(index, self.slots.len())
    }

    /// Whether this link touches the given POP.
    pub fn touches(&self, pop: &str) -> bool {
        self.pop_a == pop || self.pop_b == pop
    }

    /// The far end of the link as seen from `pop`.
    pub fn peer_of(&self, pop: &str) -> Option<&str> {
        if self.pop_a == pop {
            Some(&self.pop_b)
        } else if self.pop_b == pop {
            Some(&self.pop_a)
        } else {
            None
        }
    }
}

/// Center frequency of slot `index` on a grid of `total` 12.5 GHz slots.
pub fn slot_center_frequency_thz(index: usize, total: usize) -> f64 {
    let offset = index as f64 - total as f64 / 2.0;
    GRID_CENTER_THZ + offset * 0.0125
}

// ── Virtual operators ─────────────────────────────────────────────

/// Lifecycle status of a virtual operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VopStatus {
    Requested,
    Active,
    Deactivating,
    Deleted,
}

/// The per-tenant Kafka topic triple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VopTopics {
    pub config: String,
    pub monitoring: String,
    pub health: String,
}

impl VopTopics {
    /// Derive the topic triple from a vOp id.
    pub fn for_vop(vop_id: &str) -> Self {
        VopTopics {
            config: format!("config_{vop_id}"),
            monitoring: format!("monitoring_{vop_id}"),
            health: format!("health_{vop_id}"),
        }
    }
}

/// A tenant slice: dedicated topics plus reserved interfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualOperator {
    pub vop_id: VopId,
    pub tenant_name: String,
    pub description: Option<String>,
    pub status: VopStatus,
    pub topics: VopTopics,
    pub interfaces: Vec<InterfaceRef>,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Topology snapshot ─────────────────────────────────────────────

/// Complete topology snapshot as served by `GET /api/topology`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Topology {
    pub pops: Vec<Pop>,
    pub routers: Vec<Router>,
    pub interfaces: Vec<Interface>,
    pub links: Vec<OpticalLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_starts_all_free() {
        let link = OpticalLink::new("link-pop1-pop2", "pop1", "pop2", 100.5, 96, 1000);
        assert_eq!(link.slots.len(), 96);
        assert!(link.free_mask().iter().all(|f| *f));
    }

    #[test]
    fn slot_grid_is_centered_on_anchor() {
        // Slot total/2 sits exactly on the anchor.
        let f = slot_center_frequency_thz(48, 96);
        assert!((f - GRID_CENTER_THZ).abs() < 1e-9);
        // One slot lower is 12.5 GHz down.
        let f = slot_center_frequency_thz(47, 96);
        assert!((f - (GRID_CENTER_THZ - 0.0125)).abs() < 1e-9);
    }

    #[test]
    fn link_peer_lookup() {
        let link = OpticalLink::new("l1", "pop1", "pop2", 50.0, 8, 0);
        assert_eq!(link.peer_of("pop1"), Some("pop2"));
        assert_eq!(link.peer_of("pop2"), Some("pop1"));
        assert_eq!(link.peer_of("pop3"), None);
        assert!(link.touches("pop1"));
        assert!(!link.touches("pop3"));
    }

    #[test]
    fn topic_triple_from_vop_id() {
        let topics = VopTopics::for_vop("vOp2");
        assert_eq!(topics.config, "config_vOp2");
        assert_eq!(topics.monitoring, "monitoring_vOp2");
        assert_eq!(topics.health, "health_vOp2");
    }
}
