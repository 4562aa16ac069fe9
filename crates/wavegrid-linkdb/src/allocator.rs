//! First-fit spectrum allocation.
//!
//! Given a candidate path and a required contiguous slot count, intersect
//! the free-masks of every link on the path and take the lowest-indexed
//! contiguous block. The scan and the multi-link slot transition run in a
//! single redb write transaction, so concurrent allocations serialize and
//! can never produce overlapping ranges.

use redb::ReadableTable;
use tracing::{debug, info};

use wave_core::{LinkId, OpticalLink, SlotRange, SlotState};

use crate::error::{LinkDbError, LinkDbResult};
use crate::store::{map_err, LinkDb};
use crate::tables::LINKS;

/// Lowest index `i` such that `i..i+required` is free in every mask.
///
/// Masks of unequal length intersect up to the shortest. Ties are broken
/// by lowest index, so allocation is deterministic.
pub fn first_fit(masks: &[Vec<bool>], required: usize) -> Option<usize> {
    if masks.is_empty() || required == 0 {
        return None;
    }
    let total = masks.iter().map(Vec::len).min().unwrap_or(0);
    if total < required {
        return None;
    }

    let mut run = 0usize;
    for i in 0..total {
        if masks.iter().all(|m| m[i]) {
            run += 1;
            if run == required {
                return Some(i + 1 - required);
            }
        } else {
            run = 0;
        }
    }
    None
}

/// Per-link utilization summary.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct LinkUtilization {
    pub link_id: LinkId,
    pub total_slots: usize,
    pub occupied_slots: usize,
    pub available_slots: usize,
    pub utilization_pct: f64,
}

impl LinkDb {
    /// Allocate `required` contiguous slots on every link of `path` for a
    /// connection, first-fit.
    ///
    /// The returned range is identical on all links (spectrum continuity).
    /// Fails with [`LinkDbError::PathInfeasible`] when the path is empty or
    /// names an unknown link, and [`LinkDbError::NoSpectrum`] when no
    /// common contiguous block exists.
    pub fn allocate(
        &self,
        connection_id: &str,
        virtual_operator: &str,
        path: &[LinkId],
        required: usize,
    ) -> LinkDbResult<SlotRange> {
        if path.is_empty() {
            return Err(LinkDbError::PathInfeasible("empty path".to_string()));
        }
        if required == 0 {
            return Err(LinkDbError::NoSpectrum("zero slots requested".to_string()));
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let range;
        {
            let mut table = txn.open_table(LINKS).map_err(map_err!(Table))?;

            let mut links: Vec<OpticalLink> = Vec::with_capacity(path.len());
            for link_id in path {
                let guard = table
                    .get(link_id.as_str())
                    .map_err(map_err!(Read))?
                    .ok_or_else(|| {
                        LinkDbError::PathInfeasible(format!("unknown link {link_id}"))
                    })?;
                links.push(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?);
            }

            let masks: Vec<Vec<bool>> = links.iter().map(OpticalLink::free_mask).collect();
            let start = first_fit(&masks, required).ok_or_else(|| {
                LinkDbError::NoSpectrum(format!(
                    "no contiguous block of {required} slots across {} link(s)",
                    path.len()
                ))
            })?;
            range = SlotRange {
                start,
                count: required,
            };

            for link in &mut links {
                for i in range.indices() {
                    let slot = &mut link.slots[i];
                    slot.state = SlotState::Reserved;
                    slot.owner = Some(connection_id.to_string());
                    slot.virtual_operator = Some(virtual_operator.to_string());
                }
                let bytes = serde_json::to_vec(link).map_err(map_err!(Serialize))?;
                table
                    .insert(link.link_id.as_str(), bytes.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit()
            .map_err(|e| LinkDbError::Conflict(e.to_string()))?;

        info!(
            connection = connection_id,
            start = range.start,
            count = range.count,
            links = path.len(),
            "spectrum allocated"
        );
        Ok(range)
    }

    /// Release every slot held by a connection back to `Free`.
    ///
    /// Returns the number of slots released across all links.
    pub fn release(&self, connection_id: &str) -> LinkDbResult<u32> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut released = 0;
        {
            let mut table = txn.open_table(LINKS).map_err(map_err!(Table))?;
            let links: Vec<OpticalLink> = {
                let mut all = Vec::new();
                for entry in table.iter().map_err(map_err!(Read))? {
                    let (_, value) = entry.map_err(map_err!(Read))?;
                    all.push(
                        serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?,
                    );
                }
                all
            };
            for mut link in links {
                let mut touched = false;
                for slot in &mut link.slots {
                    if slot.owner.as_deref() == Some(connection_id) {
                        *slot = wave_core::Slot::free();
                        touched = true;
                        released += 1;
                    }
                }
                if touched {
                    let bytes = serde_json::to_vec(&link).map_err(map_err!(Serialize))?;
                    table
                        .insert(link.link_id.as_str(), bytes.as_slice())
                        .map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(connection = connection_id, released, "spectrum released");
        Ok(released)
    }

    /// Utilization statistics for one link.
    pub fn utilization(&self, link_id: &str) -> LinkDbResult<LinkUtilization> {
        let link = self
            .get_link(link_id)?
            .ok_or_else(|| LinkDbError::NotFound(format!("link {link_id}")))?;
        let total = link.slots.len();
        let occupied = link.slots.iter().filter(|s| !s.is_free()).count();
        let pct = if total > 0 {
            occupied as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Ok(LinkUtilization {
            link_id: link.link_id,
            total_slots: total,
            occupied_slots: occupied,
            available_slots: total - occupied,
            utilization_pct: (pct * 100.0).round() / 100.0,
        })
    }
}
