use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::Address;

/// Result of an accepted `NeighbourTable::add`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// New neighbour, a HELLO was sent to it
    Added,
    /// Existing entry replaced
    Replaced,
}

/// Result of an accepted `NeighbourTable::update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    /// The requested distance equals the current one
    Unchanged,
}

/// How a ROUTE advertisement was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Stored; `changed` tells whether the vector differs from the previous valid one
    Accepted { changed: bool },
    /// Older or duplicate sequence number for a live record
    Stale,
    /// Our own advertisement came back
    Loopback,
}

/// Why a DATA packet was not forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NoRoute,
    UnknownNextHop(Address),
    SendFailed,
    PathTooLong,
}

/// Where a DATA packet ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOutcome {
    Delivered,
    Forwarded { next_hop: Address },
    Dropped(DropReason),
}

/// Which side of the network changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Local,
    Remote,
}

/// Packet and computation counters
#[derive(Debug, Default)]
pub struct Counters {
    pub hello_sent: AtomicU64,
    pub bye_sent: AtomicU64,
    pub route_sent: AtomicU64,
    pub route_local: AtomicU64,
    pub route_received: AtomicU64,
    pub data_sent: AtomicU64,
    pub data_delivered: AtomicU64,
    pub dropped: AtomicU64,
    pub dijkstra_runs: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub hello_sent: u64,
    pub bye_sent: u64,
    pub route_sent: u64,
    pub route_local: u64,
    pub route_received: u64,
    pub data_sent: u64,
    pub data_delivered: u64,
    pub dropped: u64,
    pub dijkstra_runs: u64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            hello_sent: self.hello_sent.load(Ordering::Relaxed),
            bye_sent: self.bye_sent.load(Ordering::Relaxed),
            route_sent: self.route_sent.load(Ordering::Relaxed),
            route_local: self.route_local.load(Ordering::Relaxed),
            route_received: self.route_received.load(Ordering::Relaxed),
            data_sent: self.data_sent.load(Ordering::Relaxed),
            data_delivered: self.data_delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            dijkstra_runs: self.dijkstra_runs.load(Ordering::Relaxed),
        }
    }
}
