//! In-memory network for driving several engines without sockets.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use letter_router::config::{FloodingMode, RouterConfig};
use letter_router::display::{DisplaySink, NeighbourRow, RouteRow};
use letter_router::error::TransportError;
use letter_router::network::Transport;
use letter_router::protocol::message_handler;
use letter_router::protocol::messages::DataPacket;
use letter_router::protocol::{EngineSettings, RoutingEngine};
use letter_router::Address;

#[derive(Debug, Clone)]
pub struct Datagram {
    pub from: SocketAddr,
    /// `None` for the multicast group
    pub to: Option<SocketAddr>,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
pub struct Wire {
    queue: Mutex<VecDeque<Datagram>>,
}

pub struct NodeTransport {
    addr: SocketAddr,
    wire: Arc<Wire>,
}

#[async_trait]
impl Transport for NodeTransport {
    async fn send_unicast(&self, data: &[u8], addr: SocketAddr) -> Result<(), TransportError> {
        self.wire.queue.lock().await.push_back(Datagram {
            from: self.addr,
            to: Some(addr),
            bytes: data.to_vec(),
        });
        Ok(())
    }

    async fn send_multicast(&self, data: &[u8]) -> Result<(), TransportError> {
        self.wire.queue.lock().await.push_back(Datagram {
            from: self.addr,
            to: None,
            bytes: data.to_vec(),
        });
        Ok(())
    }
}

/// Keeps every delivered DATA packet
#[derive(Default)]
pub struct RecordingDisplay {
    pub delivered: std::sync::Mutex<Vec<DataPacket>>,
}

impl RecordingDisplay {
    pub fn delivered(&self) -> Vec<DataPacket> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl DisplaySink for RecordingDisplay {
    fn refresh_neighbours(&self, _rows: &[NeighbourRow]) {}

    fn refresh_routes(&self, _rows: &[RouteRow]) {}

    fn data_delivered(&self, packet: &DataPacket) {
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push(packet.clone());
        }
    }
}

pub struct Node {
    pub addr: SocketAddr,
    pub engine: Arc<RoutingEngine>,
    pub display: Arc<RecordingDisplay>,
}

pub struct Net {
    wire: Arc<Wire>,
    flooding: FloodingMode,
    nodes: Vec<Node>,
}

pub fn addr(c: char) -> Address {
    Address::new(c).unwrap()
}

impl Net {
    pub fn new(flooding: FloodingMode) -> Self {
        Self {
            wire: Arc::new(Wire::default()),
            flooding,
            nodes: Vec::new(),
        }
    }

    /// Add a router listening on 127.0.0.1:(20000 + letter index)
    pub fn add_node(&mut self, name: char) -> Arc<RoutingEngine> {
        let config = RouterConfig {
            name: addr(name),
            flooding: self.flooding,
            ..RouterConfig::default()
        };
        let socket: SocketAddr = format!("127.0.0.1:{}", Self::port(name)).parse().unwrap();
        let display = Arc::new(RecordingDisplay::default());
        let engine = Arc::new(RoutingEngine::new(
            EngineSettings::from(&config),
            Arc::new(NodeTransport {
                addr: socket,
                wire: self.wire.clone(),
            }),
            display.clone(),
        ));
        self.nodes.push(Node {
            addr: socket,
            engine: engine.clone(),
            display,
        });
        engine
    }

    pub fn port(name: char) -> u16 {
        20000 + (name as u16 - 'A' as u16)
    }

    pub fn node(&self, name: char) -> &Node {
        self.nodes
            .iter()
            .find(|n| n.engine.local_name() == addr(name))
            .unwrap()
    }

    /// Connect two routers; the HELLO exchange registers the reverse direction.
    pub async fn link(&self, a: char, b: char, dist: u32) {
        self.node(a)
            .engine
            .add_neighbour(b, "127.0.0.1", Self::port(b), dist)
            .await
            .unwrap();
        self.pump().await;
    }

    pub async fn pending(&self) -> usize {
        self.wire.queue.lock().await.len()
    }

    pub async fn take(&self) -> Vec<Datagram> {
        self.wire.queue.lock().await.drain(..).collect()
    }

    /// Deliver queued datagrams, including those they trigger, until the wire is idle.
    pub async fn pump(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.wire.queue.lock().await.pop_front();
            let Some(datagram) = next else {
                return delivered;
            };
            delivered += 1;

            match datagram.to {
                Some(to) => {
                    if let Some(node) = self.nodes.iter().find(|n| n.addr == to) {
                        let engine = &node.engine;
                        message_handler::handle_unicast(engine, &datagram.bytes, datagram.from)
                            .await;
                    }
                }
                None => {
                    for node in &self.nodes {
                        message_handler::handle_multicast(
                            &node.engine,
                            &datagram.bytes,
                            datagram.from,
                        )
                        .await;
                    }
                }
            }
        }
    }

    /// Every router announces once, then every router recomputes.
    pub async fn converge(&self) {
        for node in &self.nodes {
            node.engine.announce().await.unwrap();
            self.pump().await;
        }
        for node in &self.nodes {
            node.engine.recompute().await;
        }
    }
}
