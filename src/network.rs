pub mod transport;

pub use transport::{bind_multicast, bind_unicast, leave_multicast, Transport, UdpTransport};
