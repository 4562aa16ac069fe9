//! Shortest-path computation over the optical topology.
//!
//! Dijkstra weighted by link distance, plus a k-shortest variant that
//! derives loop-free alternatives by removing one link of the best path at
//! a time. Used by the LinkDB path endpoint and by the controller's path
//! computer.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use wave_core::{LinkId, OpticalLink};

/// A computed path: ordered link ids plus total distance.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedPath {
    pub links: Vec<LinkId>,
    pub distance_km: f64,
}

#[derive(PartialEq)]
struct QueueEntry {
    dist: f64,
    pop: String,
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on distance; BinaryHeap is a max-heap, so reverse.
        other
            .dist
            .partial_cmp(&self.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.pop.cmp(&self.pop))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra over `links`, weighted by `distance_km`.
///
/// Returns the ordered link list, or `None` when `dst` is unreachable.
/// `src == dst` yields an empty path.
pub fn shortest_path(links: &[OpticalLink], src: &str, dst: &str) -> Option<ComputedPath> {
    shortest_path_avoiding(links, src, dst, &HashSet::new())
}

fn shortest_path_avoiding(
    links: &[OpticalLink],
    src: &str,
    dst: &str,
    excluded: &HashSet<&str>,
) -> Option<ComputedPath> {
    if src == dst {
        return Some(ComputedPath {
            links: Vec::new(),
            distance_km: 0.0,
        });
    }

    // Adjacency: pop → [(neighbor, link_id, distance)].
    let mut adjacency: HashMap<&str, Vec<(&str, &str, f64)>> = HashMap::new();
    for link in links {
        if excluded.contains(link.link_id.as_str()) {
            continue;
        }
        adjacency.entry(&link.pop_a).or_default().push((
            &link.pop_b,
            &link.link_id,
            link.distance_km,
        ));
        adjacency.entry(&link.pop_b).or_default().push((
            &link.pop_a,
            &link.link_id,
            link.distance_km,
        ));
    }

    let mut dist: HashMap<String, f64> = HashMap::new();
    // pop → (previous pop, via link)
    let mut prev: HashMap<String, (String, String)> = HashMap::new();
    let mut heap = BinaryHeap::new();

    dist.insert(src.to_string(), 0.0);
    heap.push(QueueEntry {
        dist: 0.0,
        pop: src.to_string(),
    });

    while let Some(QueueEntry { dist: d, pop }) = heap.pop() {
        if pop == dst {
            break;
        }
        if d > *dist.get(&pop).unwrap_or(&f64::INFINITY) {
            continue;
        }
        let Some(neighbors) = adjacency.get(pop.as_str()) else {
            continue;
        };
        for &(neighbor, link_id, weight) in neighbors {
            let next = d + weight;
            if next < *dist.get(neighbor).unwrap_or(&f64::INFINITY) {
                dist.insert(neighbor.to_string(), next);
                prev.insert(neighbor.to_string(), (pop.clone(), link_id.to_string()));
                heap.push(QueueEntry {
                    dist: next,
                    pop: neighbor.to_string(),
                });
            }
        }
    }

    let total = *dist.get(dst)?;
    let mut path = Vec::new();
    let mut current = dst.to_string();
    while current != src {
        let (parent, link_id) = prev.get(&current)?;
        path.push(link_id.clone());
        current = parent.clone();
    }
    path.reverse();
    Some(ComputedPath {
        links: path,
        distance_km: total,
    })
}

/// Up to `k` loop-free paths, best first.
///
/// The best path plus single-link-removal deviations, ranked by distance
/// then hop count, deduplicated.
pub fn k_shortest(links: &[OpticalLink], src: &str, dst: &str, k: usize) -> Vec<ComputedPath> {
    let Some(best) = shortest_path(links, src, dst) else {
        return Vec::new();
    };

    let mut candidates = vec![best.clone()];
    for removed in &best.links {
        let mut excluded = HashSet::new();
        excluded.insert(removed.as_str());
        if let Some(alt) = shortest_path_avoiding(links, src, dst, &excluded) {
            if !candidates.iter().any(|c| c.links == alt.links) {
                candidates.push(alt);
            }
        }
    }

    candidates.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.links.len().cmp(&b.links.len()))
    });
    candidates.truncate(k.max(1));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: &str, a: &str, b: &str, km: f64) -> OpticalLink {
        OpticalLink::new(id, a, b, km, 8, 0)
    }

    fn triangle() -> Vec<OpticalLink> {
        // pop1 — pop2 (100), pop2 — pop3 (150), pop1 — pop3 (400, detour)
        vec![
            link("l12", "pop1", "pop2", 100.0),
            link("l23", "pop2", "pop3", 150.0),
            link("l13", "pop1", "pop3", 400.0),
        ]
    }

    #[test]
    fn direct_link_is_shortest() {
        let links = triangle();
        let path = shortest_path(&links, "pop1", "pop2").unwrap();
        assert_eq!(path.links, vec!["l12"]);
        assert!((path.distance_km - 100.0).abs() < 1e-9);
    }

    #[test]
    fn two_hop_beats_long_direct() {
        let links = triangle();
        // pop1→pop3 via pop2 is 250 km, direct is 400 km.
        let path = shortest_path(&links, "pop1", "pop3").unwrap();
        assert_eq!(path.links, vec!["l12", "l23"]);
        assert!((path.distance_km - 250.0).abs() < 1e-9);
    }

    #[test]
    fn unreachable_returns_none() {
        let links = vec![link("l12", "pop1", "pop2", 100.0)];
        assert!(shortest_path(&links, "pop1", "pop9").is_none());
    }

    #[test]
    fn same_pop_is_empty_path() {
        let links = triangle();
        let path = shortest_path(&links, "pop1", "pop1").unwrap();
        assert!(path.links.is_empty());
        assert_eq!(path.distance_km, 0.0);
    }

    #[test]
    fn k_shortest_returns_alternatives_in_order() {
        let links = triangle();
        let paths = k_shortest(&links, "pop1", "pop3", 3);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].links, vec!["l12", "l23"]);
        assert_eq!(paths[1].links, vec!["l13"]);
    }

    #[test]
    fn k_shortest_empty_when_disconnected() {
        let links = vec![link("l12", "pop1", "pop2", 100.0)];
        assert!(k_shortest(&links, "pop1", "pop9", 3).is_empty());
    }
}
