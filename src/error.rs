//! Error types for the router
//!
//! Three families, matching how the engine reacts to them:
//! - [`DecodeError`]: a received packet is malformed; it is dropped and logged.
//! - [`ValidationError`]: a request is refused; no state changes.
//! - [`TransportError`]: socket I/O failed; logged, receive loops keep going.

use thiserror::Error;

use crate::types::Address;

/// Main error type for router operations
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Router is not running")]
    NotRunning,

    #[error("Router is already running")]
    AlreadyRunning,
}

/// Malformed wire data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet too short: need {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("empty packet")]
    Empty,

    #[error("unknown packet code {0}")]
    UnknownCode(u8),

    #[error("invalid address 0x{0:04x}")]
    InvalidAddress(u16),

    #[error("invalid distance {0}")]
    InvalidDistance(i32),

    #[error("invalid TTL {0}")]
    InvalidTtl(i16),

    #[error("invalid list length {0}")]
    InvalidCount(i16),

    #[error("message too long ({0}>255)")]
    MessageTooLong(i16),

    #[error("path length too long ({len}>{max})")]
    PathTooLong { len: usize, max: usize },

    #[error("unexpected packet code {0} on multicast channel")]
    NotMulticast(u8),
}

/// Refused requests
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid address '{0}'")]
    InvalidAddress(char),

    #[error("neighbour list is full ({0} entries)")]
    TableFull(usize),

    #[error("name {0} equals the local name")]
    LocalName(Address),

    #[error("duplicated IP and port, already bound to {0}")]
    DuplicateBinding(Address),

    #[error("invalid distance ({0})")]
    InvalidDistance(u32),

    #[error("invalid IP address '{0}'")]
    InvalidIp(String),

    #[error("inexistent neighbour")]
    UnknownNeighbour,

    #[error("name {given} does not match {bound}, previously associated with IP/port")]
    NameMismatch { given: Address, bound: Address },

    #[error("duplicated destination '{0}' in vector")]
    DuplicateDestination(Address),

    #[error("invalid vector length {0}")]
    InvalidVectorLength(usize),

    #[error("message too long ({0}>255)")]
    MessageTooLong(usize),

    #[error("path too long ({len}>{max})")]
    PathTooLong { len: usize, max: usize },
}

/// Socket level failures
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("send to {addr} failed: {source}")]
    Send {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("multicast group operation failed: {0}")]
    Multicast(#[source] std::io::Error),

    #[error("multicast channel not available")]
    NoMulticast,
}

pub type Result<T> = std::result::Result<T, RouterError>;
