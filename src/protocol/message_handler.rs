use log::{debug, warn};
use std::net::SocketAddr;

use super::engine::RoutingEngine;
use super::messages::{Packet, PKT_ROUTE};
use crate::error::DecodeError;

/// Decode a datagram from the unicast socket and dispatch it.
pub async fn handle_unicast(engine: &RoutingEngine, data: &[u8], from: SocketAddr) {
    let packet = match Packet::decode(data, engine.settings().max_path_len) {
        Ok(packet) => packet,
        Err(e) => {
            warn!("Dropped malformed packet from {}: {}", from, e);
            engine.count_dropped();
            return;
        }
    };
    debug!("{} received from {} ({})", packet.name(), packet.sender(), from);

    match packet {
        Packet::Hello(hello) => {
            if let Err(e) = engine.on_hello(hello, from).await {
                warn!("HELLO from {} ({}) refused: {}", hello.sender, from, e);
                engine.count_dropped();
            }
        }
        Packet::Bye(bye) => {
            if let Err(e) = engine.on_bye(bye).await {
                debug!("BYE from {} ignored: {}", bye.sender, e);
            }
        }
        Packet::Route(route) => {
            let origin = route.origin;
            if let Err(e) = engine.on_receive_route(route, Some(from), false).await {
                warn!("ROUTE from {} dropped: {}", origin, e);
            }
        }
        Packet::Data(data) => {
            engine.on_receive_data(data).await;
        }
    }
}

/// Decode a datagram from the multicast group. Only ROUTE floods are accepted.
pub async fn handle_multicast(engine: &RoutingEngine, data: &[u8], from: SocketAddr) {
    if let Some(&code) = data.first() {
        if code != PKT_ROUTE {
            warn!(
                "Dropped multicast packet from {}: {}",
                from,
                DecodeError::NotMulticast(code)
            );
            engine.count_dropped();
            return;
        }
    }

    match Packet::decode(data, engine.settings().max_path_len) {
        Ok(Packet::Route(route)) => {
            let origin = route.origin;
            if let Err(e) = engine.on_receive_route(route, Some(from), true).await {
                warn!("ROUTE from {} dropped: {}", origin, e);
            }
        }
        Ok(other) => {
            warn!("Dropped multicast {} from {}", other.name(), from);
            engine.count_dropped();
        }
        Err(e) => {
            warn!("Dropped malformed multicast packet from {}: {}", from, e);
            engine.count_dropped();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::display::LogDisplay;
    use crate::network::transport::test_support::RecordingTransport;
    use crate::protocol::engine::EngineSettings;
    use crate::protocol::messages::{HelloPacket, RoutePacket};
    use crate::types::{Address, Entry};
    use std::sync::Arc;

    fn addr(c: char) -> Address {
        Address::new(c).unwrap()
    }

    fn engine() -> RoutingEngine {
        RoutingEngine::new(
            EngineSettings::from(&RouterConfig::default()),
            Arc::new(RecordingTransport::default()),
            Arc::new(LogDisplay),
        )
    }

    fn route_bytes() -> Vec<u8> {
        Packet::Route(RoutePacket {
            origin: addr('B'),
            ttl: 20,
            seq: 1,
            entries: vec![Entry::new(addr('C'), 1)],
        })
        .encode()
        .unwrap()
        .to_vec()
    }

    #[tokio::test]
    async fn test_malformed_packet_ignored() {
        let engine = engine();
        let from: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        handle_unicast(&engine, &[9, 0, 0], from).await;
        handle_unicast(&engine, &route_bytes()[..5], from).await;
        handle_multicast(&engine, &route_bytes()[..5], from).await;
        assert!(engine.link_state().is_empty().await);
        assert_eq!(engine.counters().dropped, 3);
    }

    #[tokio::test]
    async fn test_refused_hello_counted_as_dropped() {
        let engine = engine();
        let from: SocketAddr = "127.0.0.1:7000".parse().unwrap();

        // HELLO claiming the local name
        let hello = Packet::Hello(HelloPacket {
            sender: engine.local_name(),
            dist: 2,
        })
        .encode()
        .unwrap();
        handle_unicast(&engine, &hello, from).await;
        assert!(engine.neighbours().is_empty().await);
        assert_eq!(engine.counters().dropped, 1);
    }

    #[tokio::test]
    async fn test_unicast_dispatch() {
        let engine = engine();
        let from: SocketAddr = "127.0.0.1:7000".parse().unwrap();

        let hello = Packet::Hello(HelloPacket {
            sender: addr('B'),
            dist: 2,
        })
        .encode()
        .unwrap();
        handle_unicast(&engine, &hello, from).await;
        assert!(engine.neighbours().get(addr('B')).await.is_some());

        handle_unicast(&engine, &route_bytes(), from).await;
        assert!(engine.link_state().is_valid(addr('B')).await);
    }

    #[tokio::test]
    async fn test_multicast_accepts_only_route() {
        let engine = engine();
        let from: SocketAddr = "127.0.0.1:7000".parse().unwrap();

        let hello = Packet::Hello(HelloPacket {
            sender: addr('B'),
            dist: 2,
        })
        .encode()
        .unwrap();
        handle_multicast(&engine, &hello, from).await;
        assert!(engine.neighbours().is_empty().await);
        assert_eq!(engine.counters().dropped, 1);

        handle_multicast(&engine, &route_bytes(), from).await;
        assert!(engine.link_state().is_valid(addr('B')).await);
    }
}
