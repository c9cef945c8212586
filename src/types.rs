use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DecodeError, ValidationError};

/// Largest distance accepted on a link or inside a ROUTE vector
pub const MAX_DISTANCE: u32 = 100;

/// Largest number of entries carried by one ROUTE packet
pub const MAX_ENTRY_VEC_LEN: usize = 30;

/// Seconds added to the announce period to build the TTL of sent ROUTE packets
pub const TTL_ADD: u64 = 10;

/// Largest payload carried by one DATA packet
pub const MAX_MESSAGE_LEN: usize = 255;

/// Router address: a single uppercase ASCII letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct Address(u8);

impl Address {
    pub fn new(c: char) -> Result<Self, ValidationError> {
        if c.is_ascii_uppercase() {
            Ok(Self(c as u8))
        } else {
            Err(ValidationError::InvalidAddress(c))
        }
    }

    /// Decode the 16-bit wire form (a UTF-16 code unit)
    pub fn from_wire(raw: u16) -> Result<Self, DecodeError> {
        match u8::try_from(raw) {
            Ok(b) if b.is_ascii_uppercase() => Ok(Self(b)),
            _ => Err(DecodeError::InvalidAddress(raw)),
        }
    }

    pub fn to_wire(self) -> u16 {
        self.0 as u16
    }

    pub fn as_char(self) -> char {
        self.0 as char
    }

    pub fn as_byte(self) -> u8 {
        self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Self(b'A')
    }
}

impl TryFrom<char> for Address {
    type Error = ValidationError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        Self::new(c)
    }
}

impl From<Address> for char {
    fn from(addr: Address) -> char {
        addr.as_char()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One element of a link vector: destination and distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub dest: Address,
    pub dist: u32,
}

impl Entry {
    pub fn new(dest: Address, dist: u32) -> Self {
        Self { dest, dist }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} , {})", self.dest, self.dist)
    }
}

/// Fails when two entries of `vec` share a destination.
pub fn check_unique_dests(vec: &[Entry]) -> Result<(), ValidationError> {
    let mut seen = [false; 26];
    for entry in vec {
        let slot = (entry.dest.as_byte() - b'A') as usize;
        if seen[slot] {
            return Err(ValidationError::DuplicateDestination(entry.dest));
        }
        seen[slot] = true;
    }
    Ok(())
}

/// Order-insensitive equality of two link vectors.
pub fn same_vector(a: &[Entry], b: &[Entry]) -> bool {
    a.len() == b.len() && a.iter().all(|e| b.contains(e))
}

/// Routing table row: an [`Entry`] plus the next hop and the Dijkstra "final" mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    pub entry: Entry,
    pub next_hop: Option<Address>,
    finalized: bool,
}

impl RouteEntry {
    pub fn new(dest: Address, next_hop: Option<Address>, dist: u32) -> Self {
        Self {
            entry: Entry::new(dest, dist),
            next_hop,
            finalized: false,
        }
    }

    pub fn dest(&self) -> Address {
        self.entry.dest
    }

    pub fn dist(&self) -> u32 {
        self.entry.dist
    }

    pub fn set_final(&mut self) {
        self.finalized = true;
    }

    pub fn is_final(&self) -> bool {
        self.finalized
    }

    /// Same destination, distance and next hop; the final mark is ignored.
    pub fn same_route(&self, other: &RouteEntry) -> bool {
        self.entry == other.entry && self.next_hop == other.next_hop
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.next_hop {
            Some(hop) => write!(f, "(dest={},dist={}, next_hop={})", self.dest(), self.dist(), hop),
            None => write!(f, "(dest={},dist={}, next_hop=-)", self.dest(), self.dist()),
        }
    }
}

/// Local name plus the anycast aliases that also terminate DATA delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    name: Address,
    anycast: Vec<Address>,
}

impl LocalIdentity {
    pub fn new(name: Address, anycast: Vec<Address>) -> Self {
        Self { name, anycast }
    }

    pub fn name(&self) -> Address {
        self.name
    }

    pub fn is_local_name(&self, addr: Address) -> bool {
        addr == self.name
    }

    pub fn is_local_group(&self, addr: Address) -> bool {
        self.anycast.contains(&addr)
    }

    pub fn is_local(&self, addr: Address) -> bool {
        self.is_local_name(addr) || self.is_local_group(addr)
    }
}
