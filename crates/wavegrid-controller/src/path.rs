//! Path computation over the LinkDB topology snapshot.
//!
//! Dijkstra weighted by link distance, slot demand from the fixed
//! capacity table, and a length-based OSNR estimate (25 dB at 100 km,
//! scaling inversely).

use wave_core::{required_slots, Modulation, PathSegment, Topology};
use wavegrid_linkdb::graph;

use crate::error::{ControllerError, ControllerResult};

/// A fully planned path: segments, slot demand, OSNR estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPath {
    pub segments: Vec<PathSegment>,
    pub required_slots: usize,
    pub estimated_osnr_db: Option<f64>,
    /// Slot grid size of the path's links (for frequency mapping).
    pub total_slots: usize,
}

impl PlannedPath {
    pub fn link_ids(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.link_id.clone()).collect()
    }

    pub fn total_km(&self) -> f64 {
        self.segments.iter().map(|s| s.distance_km).sum()
    }
}

/// Estimated OSNR for a path length (simplified inverse-length model).
pub fn estimate_osnr_db(total_km: f64) -> Option<f64> {
    if total_km > 0.0 {
        Some((25.0 * 100.0 / total_km * 100.0).round() / 100.0)
    } else {
        None
    }
}

/// Compute the complete path for a demand.
pub fn plan(
    topology: &Topology,
    src: &str,
    dst: &str,
    bandwidth_gbps: f64,
    modulation: Modulation,
) -> ControllerResult<PlannedPath> {
    if src == dst {
        return Err(ControllerError::Validation(
            "source and destination POP must differ".to_string(),
        ));
    }
    if !topology.pops.iter().any(|p| p.pop_id == src) {
        return Err(ControllerError::PathInfeasible(format!("unknown POP {src}")));
    }
    if !topology.pops.iter().any(|p| p.pop_id == dst) {
        return Err(ControllerError::PathInfeasible(format!("unknown POP {dst}")));
    }

    let computed = graph::shortest_path(&topology.links, src, dst)
        .ok_or_else(|| ControllerError::PathInfeasible(format!("no path {src} -> {dst}")))?;

    let mut segments = Vec::with_capacity(computed.links.len());
    let mut total_slots = 0;
    for link_id in &computed.links {
        let link = topology
            .links
            .iter()
            .find(|l| &l.link_id == link_id)
            .ok_or_else(|| ControllerError::PathInfeasible(format!("unknown link {link_id}")))?;
        if total_slots == 0 {
            total_slots = link.slots.len();
        }
        segments.push(PathSegment {
            link_id: link.link_id.clone(),
            pop_a: link.pop_a.clone(),
            pop_b: link.pop_b.clone(),
            distance_km: link.distance_km,
        });
    }

    let total_km: f64 = segments.iter().map(|s| s.distance_km).sum();
    Ok(PlannedPath {
        segments,
        required_slots: required_slots(bandwidth_gbps, modulation),
        estimated_osnr_db: estimate_osnr_db(total_km),
        total_slots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wave_core::{epoch_secs, OpticalLink, Pop};

    fn topology() -> Topology {
        let now = epoch_secs();
        let pop = |id: &str| Pop {
            pop_id: id.to_string(),
            name: id.to_uppercase(),
            location: "0,0".to_string(),
            operator: "telco".to_string(),
            created_at: now,
        };
        Topology {
            pops: vec![pop("pop1"), pop("pop2"), pop("pop3")],
            routers: vec![],
            interfaces: vec![],
            links: vec![
                OpticalLink::new("link-pop1-pop2", "pop1", "pop2", 100.0, 96, now),
                OpticalLink::new("link-pop2-pop3", "pop2", "pop3", 150.0, 96, now),
            ],
        }
    }

    #[test]
    fn plans_single_hop_400g() {
        let planned = plan(&topology(), "pop1", "pop2", 400.0, Modulation::Dp16Qam).unwrap();
        assert_eq!(planned.link_ids(), vec!["link-pop1-pop2"]);
        assert_eq!(planned.required_slots, 8);
        assert_eq!(planned.total_slots, 96);
        // 100 km → 25 dB estimate.
        assert!((planned.estimated_osnr_db.unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn plans_two_hop_path_with_summed_length() {
        let planned = plan(&topology(), "pop1", "pop3", 100.0, Modulation::Dp16Qam).unwrap();
        assert_eq!(planned.segments.len(), 2);
        assert!((planned.total_km() - 250.0).abs() < 1e-9);
        // 250 km → 10 dB estimate.
        assert!((planned.estimated_osnr_db.unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_pop_is_infeasible() {
        let err = plan(&topology(), "pop1", "atlantis", 100.0, Modulation::Dp16Qam).unwrap_err();
        assert!(matches!(err, ControllerError::PathInfeasible(_)));
    }

    #[test]
    fn same_pop_is_a_validation_error() {
        let err = plan(&topology(), "pop1", "pop1", 100.0, Modulation::Dp16Qam).unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));
    }

    #[test]
    fn disconnected_pop_is_infeasible() {
        let mut topo = topology();
        topo.links.clear();
        let err = plan(&topo, "pop1", "pop2", 100.0, Modulation::Dp16Qam).unwrap_err();
        assert!(matches!(err, ControllerError::PathInfeasible(_)));
    }
}
