use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use crate::types::{Address, Entry};

/// Adjacency to a directly connected router.
#[derive(Debug, Clone)]
pub struct Neighbour {
    pub name: Address,
    pub ip: IpAddr,
    pub port: u16,
    pub dist: u32,
    last_vector: Option<Vec<Entry>>,
    received_at: Option<Instant>,
    ttl: Duration,
}

impl Neighbour {
    pub fn new(name: Address, ip: IpAddr, port: u16, dist: u32) -> Self {
        Self {
            name,
            ip,
            port,
            dist,
            last_vector: None,
            received_at: None,
            ttl: Duration::ZERO,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn is_bound_to(&self, ip: IpAddr, port: u16) -> bool {
        self.ip == ip && self.port == port
    }

    /// Store the last link vector advertised by this neighbour
    pub fn update_vector(&mut self, vec: Vec<Entry>, ttl: Duration, now: Instant) {
        self.last_vector = Some(vec);
        self.received_at = Some(now);
        self.ttl = ttl;
    }

    pub fn vector_valid_at(&self, now: Instant) -> bool {
        match (&self.last_vector, self.received_at) {
            (Some(_), Some(at)) => now.saturating_duration_since(at) <= self.ttl,
            _ => false,
        }
    }

    pub fn vector_valid(&self) -> bool {
        self.vector_valid_at(Instant::now())
    }

    /// The last vector, if it has not expired
    pub fn vector(&self) -> Option<&[Entry]> {
        if self.vector_valid() {
            self.last_vector.as_deref()
        } else {
            None
        }
    }
}
