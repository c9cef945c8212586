//! Display refresh collaborator.
//!
//! The engine pushes neighbour rows, routing rows and delivered DATA packets
//! here. The default implementation writes them to the log.

use log::{debug, info};
use serde::Serialize;
use std::net::IpAddr;

use crate::protocol::messages::DataPacket;
use crate::types::{Address, Entry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeighbourRow {
    pub name: Address,
    pub ip: IpAddr,
    pub port: u16,
    pub dist: u32,
    pub vector_valid: bool,
    pub vector: Option<Vec<Entry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRow {
    pub dest: Address,
    pub next_hop: Option<Address>,
    pub dist: u32,
}

pub trait DisplaySink: Send + Sync {
    fn refresh_neighbours(&self, rows: &[NeighbourRow]);

    fn refresh_routes(&self, rows: &[RouteRow]);

    fn data_delivered(&self, packet: &DataPacket);
}

/// Writes every refresh to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn refresh_neighbours(&self, rows: &[NeighbourRow]) {
        debug!("Neighbour table ({} entries)", rows.len());
        for row in rows {
            debug!(
                "  {} {}:{} dist={} vector={}",
                row.name,
                row.ip,
                row.port,
                row.dist,
                if row.vector_valid { "valid" } else { "-" }
            );
        }
    }

    fn refresh_routes(&self, rows: &[RouteRow]) {
        debug!("Routing table ({} entries)", rows.len());
        for row in rows {
            match row.next_hop {
                Some(hop) => debug!("  {} via {} dist={}", row.dest, hop, row.dist),
                None => debug!("  {} local dist={}", row.dest, row.dist),
            }
        }
    }

    fn data_delivered(&self, packet: &DataPacket) {
        info!(
            "DATA from {} to {} (seq {}): \"{}\" path {}",
            packet.sender,
            packet.dest,
            packet.seq,
            packet.message_text(),
            packet.path_text()
        );
    }
}
