use async_trait::async_trait;
use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;

use crate::error::TransportError;

/// Largest datagram the receive loops accept
pub const MAX_DATAGRAM: usize = 8096;

/// Outbound half of the socket layer. Datagrams are fire-and-forget.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_unicast(&self, data: &[u8], addr: SocketAddr) -> Result<(), TransportError>;

    async fn send_multicast(&self, data: &[u8]) -> Result<(), TransportError>;
}

/// UDP transport sharing the unicast receive socket for every send.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    group: Option<SocketAddrV4>,
}

impl UdpTransport {
    pub fn new(socket: Arc<UdpSocket>, group: Option<SocketAddrV4>) -> Self {
        Self { socket, group }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_unicast(&self, data: &[u8], addr: SocketAddr) -> Result<(), TransportError> {
        self.socket
            .send_to(data, addr)
            .await
            .map_err(|source| TransportError::Send { addr, source })?;
        debug!("sent {} bytes to {}", data.len(), addr);
        Ok(())
    }

    async fn send_multicast(&self, data: &[u8]) -> Result<(), TransportError> {
        let group = self.group.ok_or(TransportError::NoMulticast)?;
        let addr = SocketAddr::V4(group);
        self.socket
            .send_to(data, addr)
            .await
            .map_err(|source| TransportError::Send { addr, source })?;
        debug!("sent {} bytes to group {}", data.len(), group);
        Ok(())
    }
}

/// Bind the unicast socket on every interface.
pub async fn bind_unicast(port: u16) -> Result<UdpSocket, TransportError> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
        .await
        .map_err(TransportError::Bind)?;
    socket
        .set_multicast_loop_v4(true)
        .map_err(TransportError::Multicast)?;
    Ok(socket)
}

/// Bind a receive socket on the group port and join the group on the default interface.
///
/// Address and port reuse let several routers on one host share the group.
/// Must be called from inside a tokio runtime.
pub fn bind_multicast(group: SocketAddrV4) -> Result<UdpSocket, TransportError> {
    if !group.ip().is_multicast() {
        return Err(TransportError::Multicast(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a multicast address", group.ip()),
        )));
    }

    let socket =
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(TransportError::Bind)?;
    socket.set_reuse_address(true).map_err(TransportError::Bind)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(TransportError::Bind)?;
    socket.set_nonblocking(true).map_err(TransportError::Bind)?;
    socket
        .bind(&SockAddr::from(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            group.port(),
        )))
        .map_err(TransportError::Bind)?;
    socket
        .join_multicast_v4(group.ip(), &Ipv4Addr::UNSPECIFIED)
        .map_err(TransportError::Multicast)?;

    UdpSocket::from_std(socket.into()).map_err(TransportError::Bind)
}

pub fn leave_multicast(socket: &UdpSocket, group: SocketAddrV4) -> Result<(), TransportError> {
    socket
        .leave_multicast_v4(*group.ip(), Ipv4Addr::UNSPECIFIED)
        .map_err(TransportError::Multicast)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tokio::sync::Mutex;

    /// Where a recorded datagram went
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Unicast(SocketAddr, Vec<u8>),
        Multicast(Vec<u8>),
    }

    /// Transport that keeps every datagram in memory
    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<Sent>>,
    }

    impl RecordingTransport {
        pub async fn take(&self) -> Vec<Sent> {
            std::mem::take(&mut *self.sent.lock().await)
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_unicast(&self, data: &[u8], addr: SocketAddr) -> Result<(), TransportError> {
            self.sent.lock().await.push(Sent::Unicast(addr, data.to_vec()));
            Ok(())
        }

        async fn send_multicast(&self, data: &[u8]) -> Result<(), TransportError> {
            self.sent.lock().await.push(Sent::Multicast(data.to_vec()));
            Ok(())
        }
    }
}
