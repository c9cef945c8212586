pub mod algorithms;
pub mod config;
pub mod control_server;
pub mod display;
pub mod error;
pub mod network;
pub mod protocol;
pub mod types;

pub use config::{FloodingMode, RouterConfig};
pub use display::{DisplaySink, LogDisplay};
pub use error::{DecodeError, RouterError, TransportError, ValidationError};
pub use protocol::{Router, RoutingEngine, RoutingTable};
pub use types::{Address, Entry, LocalIdentity, RouteEntry};
