use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

use crate::protocol::link_state::LinkStateRecord;
use crate::protocol::routing_table::RoutingTable;
use crate::types::{Address, Entry, RouteEntry};

/// Distance of a destination with no known path
pub const INFINITY: u32 = u32::MAX;

#[derive(Debug, PartialEq, Eq)]
struct State {
    dist: u32,
    node: Address,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap; equal distances pop lowest address first
        other
            .dist
            .cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest paths from `origin`.
///
/// `local` holds the direct link costs, `snapshot` the advertisements of
/// every known router. Records that are no longer valid at `now` are ignored.
pub fn compute(
    origin: Address,
    local: &[Entry],
    snapshot: &[LinkStateRecord],
    now: Instant,
) -> RoutingTable {
    let adverts: HashMap<Address, &[Entry]> = snapshot
        .iter()
        .filter(|r| r.is_valid_at(now))
        .map(|r| (r.origin, r.vector.as_slice()))
        .collect();

    let mut table = RoutingTable::new();
    let mut heap = BinaryHeap::new();

    let mut root = RouteEntry::new(origin, None, 0);
    root.set_final();
    table.add_route(root);

    for entry in local.iter().filter(|e| e.dest != origin) {
        table.add_route(RouteEntry::new(entry.dest, Some(entry.dest), entry.dist));
        heap.push(State {
            dist: entry.dist,
            node: entry.dest,
        });
    }

    // An empty heap means no pending entry can still be reached or improved
    while let Some(State { dist, node }) = heap.pop() {
        let next_hop = match table.get_mut(node) {
            Some(selected) if !selected.is_final() && selected.dist() == dist => {
                selected.set_final();
                selected.next_hop
            }
            _ => continue,
        };

        let Some(vector) = adverts.get(&node) else {
            continue;
        };

        for hop in vector.iter() {
            let candidate = dist.saturating_add(hop.dist);
            if candidate == INFINITY {
                continue;
            }
            let current = table.get(hop.dest).map_or(INFINITY, RouteEntry::dist);
            let is_final = table.get(hop.dest).is_some_and(RouteEntry::is_final);

            if !is_final && candidate < current {
                table.add_route(RouteEntry::new(hop.dest, next_hop, candidate));
                heap.push(State {
                    dist: candidate,
                    node: hop.dest,
                });
            }
        }
    }

    table
}
