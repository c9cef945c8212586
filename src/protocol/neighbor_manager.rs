use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::messages::{ByePacket, HelloPacket, Packet};
use super::neighbor::Neighbour;
use super::types::{AddOutcome, Counters, UpdateOutcome};
use crate::display::NeighbourRow;
use crate::error::ValidationError;
use crate::network::Transport;
use crate::types::{Address, Entry, MAX_DISTANCE};

/// Registry of direct neighbours.
///
/// Every read and write goes through one lock. Packets are sent after the
/// lock is released.
pub struct NeighbourTable {
    local: Address,
    capacity: usize,
    transport: Arc<dyn Transport>,
    counters: Arc<Counters>,
    neighbours: Mutex<BTreeMap<Address, Neighbour>>,
}

fn check_distance(dist: u32) -> Result<(), ValidationError> {
    if dist == 0 || dist > MAX_DISTANCE {
        return Err(ValidationError::InvalidDistance(dist));
    }
    Ok(())
}

fn parse_ip(ip: &str) -> Result<IpAddr, ValidationError> {
    ip.trim()
        .parse()
        .map_err(|_| ValidationError::InvalidIp(ip.to_string()))
}

impl NeighbourTable {
    pub fn new(
        local: Address,
        capacity: usize,
        transport: Arc<dyn Transport>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            local,
            capacity,
            transport,
            counters,
            neighbours: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn len(&self) -> usize {
        self.neighbours.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.neighbours.lock().await.is_empty()
    }

    pub async fn add(
        &self,
        name: Address,
        ip: &str,
        port: u16,
        dist: u32,
    ) -> Result<AddOutcome, ValidationError> {
        let ip = parse_ip(ip)?;
        self.add_addr(name, ip, port, dist).await
    }

    /// Insert or replace a neighbour. A new neighbour is greeted with a HELLO.
    pub async fn add_addr(
        &self,
        name: Address,
        ip: IpAddr,
        port: u16,
        dist: u32,
    ) -> Result<AddOutcome, ValidationError> {
        if name == self.local {
            return Err(ValidationError::LocalName(name));
        }
        check_distance(dist)?;

        let mut neighbours = self.neighbours.lock().await;

        if let Some(bound) = neighbours
            .values()
            .find(|n| n.is_bound_to(ip, port) && n.name != name)
        {
            return Err(ValidationError::DuplicateBinding(bound.name));
        }

        match neighbours.get_mut(&name) {
            Some(existing) => {
                existing.ip = ip;
                existing.port = port;
                existing.dist = dist;
                debug!("Neighbour {} replaced: {}:{} dist {}", name, ip, port, dist);
                Ok(AddOutcome::Replaced)
            }
            None => {
                if neighbours.len() >= self.capacity {
                    return Err(ValidationError::TableFull(self.capacity));
                }
                let neighbour = Neighbour::new(name, ip, port, dist);
                let addr = neighbour.socket_addr();
                neighbours.insert(name, neighbour);
                drop(neighbours);

                info!("Neighbour {} added: {} dist {}", name, addr, dist);
                self.send_hello(addr, dist).await;
                Ok(AddOutcome::Added)
            }
        }
    }

    /// Change the distance of the neighbour bound to (ip, port).
    pub async fn update(
        &self,
        name: Address,
        ip: &str,
        port: u16,
        dist: u32,
    ) -> Result<UpdateOutcome, ValidationError> {
        let ip = parse_ip(ip)?;
        check_distance(dist)?;

        let mut neighbours = self.neighbours.lock().await;
        let neighbour = neighbours
            .values_mut()
            .find(|n| n.is_bound_to(ip, port))
            .ok_or(ValidationError::UnknownNeighbour)?;

        if neighbour.name != name {
            return Err(ValidationError::NameMismatch {
                given: name,
                bound: neighbour.name,
            });
        }
        if neighbour.dist == dist {
            return Ok(UpdateOutcome::Unchanged);
        }

        neighbour.dist = dist;
        let addr = neighbour.socket_addr();
        drop(neighbours);

        info!("Neighbour {} updated: dist {}", name, dist);
        // The peer applies the new cost through its HELLO handling
        self.send_hello(addr, dist).await;
        Ok(UpdateOutcome::Updated)
    }

    pub async fn remove(&self, name: Address, notify: bool) -> Result<(), ValidationError> {
        let removed = self
            .neighbours
            .lock()
            .await
            .remove(&name)
            .ok_or(ValidationError::UnknownNeighbour)?;

        info!("Neighbour {} removed", name);
        if notify {
            self.send_bye(removed.socket_addr()).await;
        }
        Ok(())
    }

    /// Say BYE to every neighbour and empty the table.
    pub async fn clear_bye(&self) {
        let drained: Vec<Neighbour> = {
            let mut neighbours = self.neighbours.lock().await;
            std::mem::take(&mut *neighbours).into_values().collect()
        };
        for neighbour in &drained {
            self.send_bye(neighbour.socket_addr()).await;
        }
        if !drained.is_empty() {
            info!("Neighbour table cleared ({} BYE sent)", drained.len());
        }
    }

    pub async fn locate(&self, ip: IpAddr, port: u16) -> Option<Address> {
        self.neighbours
            .lock()
            .await
            .values()
            .find(|n| n.is_bound_to(ip, port))
            .map(|n| n.name)
    }

    pub async fn get(&self, name: Address) -> Option<Neighbour> {
        self.neighbours.lock().await.get(&name).cloned()
    }

    pub async fn socket_addr(&self, name: Address) -> Option<SocketAddr> {
        self.neighbours
            .lock()
            .await
            .get(&name)
            .map(Neighbour::socket_addr)
    }

    /// Direct link costs, optionally led by `(local, 0)`.
    ///
    /// Addresses are parsed when a neighbour is added, so every stored
    /// neighbour is usable.
    pub async fn local_vector(&self, include_self: bool) -> Vec<Entry> {
        let neighbours = self.neighbours.lock().await;
        let mut vec = Vec::with_capacity(neighbours.len() + 1);
        if include_self {
            vec.push(Entry::new(self.local, 0));
        }
        vec.extend(neighbours.values().map(|n| Entry::new(n.name, n.dist)));
        vec
    }

    /// Store the vector advertised by `origin` if it is a direct neighbour.
    pub async fn update_vector(&self, origin: Address, vec: &[Entry], ttl: Duration) -> bool {
        match self.neighbours.lock().await.get_mut(&origin) {
            Some(neighbour) => {
                neighbour.update_vector(vec.to_vec(), ttl, Instant::now());
                true
            }
            None => false,
        }
    }

    pub async fn rows(&self) -> Vec<NeighbourRow> {
        let now = Instant::now();
        self.neighbours
            .lock()
            .await
            .values()
            .map(|n| NeighbourRow {
                name: n.name,
                ip: n.ip,
                port: n.port,
                dist: n.dist,
                vector_valid: n.vector_valid_at(now),
                vector: n.vector().map(<[Entry]>::to_vec),
            })
            .collect()
    }

    /// Unicast `data` to every neighbour but `exclude`. Returns the number of successful sends.
    pub async fn send_to_all_except(&self, data: &[u8], exclude: Option<Address>) -> usize {
        let targets: Vec<(Address, SocketAddr)> = self
            .neighbours
            .lock()
            .await
            .values()
            .filter(|n| Some(n.name) != exclude)
            .map(|n| (n.name, n.socket_addr()))
            .collect();

        let mut sent = 0;
        for (name, addr) in targets {
            match self.transport.send_unicast(data, addr).await {
                Ok(()) => sent += 1,
                Err(e) => warn!("Failed to send to neighbour {}: {}", name, e),
            }
        }
        sent
    }

    async fn send_hello(&self, addr: SocketAddr, dist: u32) {
        let packet = Packet::Hello(HelloPacket {
            sender: self.local,
            dist,
        });
        if self.send_packet(&packet, addr).await {
            Counters::bump(&self.counters.hello_sent);
        }
    }

    async fn send_bye(&self, addr: SocketAddr) {
        let packet = Packet::Bye(ByePacket { sender: self.local });
        if self.send_packet(&packet, addr).await {
            Counters::bump(&self.counters.bye_sent);
        }
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) -> bool {
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode {}: {}", packet.name(), e);
                return false;
            }
        };
        match self.transport.send_unicast(&bytes, addr).await {
            Ok(()) => {
                debug!("{} sent to {}", packet.name(), addr);
                true
            }
            Err(e) => {
                warn!("Failed to send {} to {}: {}", packet.name(), addr, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::transport::test_support::{RecordingTransport, Sent};
    use crate::protocol::messages::PKT_BYE;

    fn addr(c: char) -> Address {
        Address::new(c).unwrap()
    }

    fn table(capacity: usize) -> (NeighbourTable, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let table = NeighbourTable::new(
            addr('A'),
            capacity,
            transport.clone(),
            Arc::new(Counters::default()),
        );
        (table, transport)
    }

    #[tokio::test]
    async fn test_add_sends_hello_once() {
        let (table, transport) = table(4);

        let outcome = table.add(addr('B'), "127.0.0.1", 5001, 3).await.unwrap();
        assert_eq!(outcome, AddOutcome::Added);

        let sent = transport.take().await;
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Sent::Unicast(to, bytes) => {
                assert_eq!(to.port(), 5001);
                let packet = Packet::decode(bytes, 26).unwrap();
                assert_eq!(
                    packet,
                    Packet::Hello(HelloPacket {
                        sender: addr('A'),
                        dist: 3
                    })
                );
            }
            other => panic!("unexpected send {:?}", other),
        }

        let outcome = table.add(addr('B'), "127.0.0.1", 5001, 4).await.unwrap();
        assert_eq!(outcome, AddOutcome::Replaced);
        assert!(transport.take().await.is_empty());
        assert_eq!(table.get(addr('B')).await.unwrap().dist, 4);
    }

    #[tokio::test]
    async fn test_add_rejections() {
        let (table, _) = table(1);

        assert_eq!(
            table.add(addr('A'), "127.0.0.1", 5001, 1).await,
            Err(ValidationError::LocalName(addr('A')))
        );
        assert_eq!(
            table.add(addr('B'), "127.0.0.1", 5001, 0).await,
            Err(ValidationError::InvalidDistance(0))
        );
        assert_eq!(
            table.add(addr('B'), "127.0.0.1", 5001, MAX_DISTANCE + 1).await,
            Err(ValidationError::InvalidDistance(MAX_DISTANCE + 1))
        );
        assert!(matches!(
            table.add(addr('B'), "not-an-ip", 5001, 1).await,
            Err(ValidationError::InvalidIp(_))
        ));

        table.add(addr('B'), "127.0.0.1", 5001, 1).await.unwrap();
        assert_eq!(
            table.add(addr('C'), "127.0.0.1", 5001, 1).await,
            Err(ValidationError::DuplicateBinding(addr('B')))
        );
        assert_eq!(
            table.add(addr('C'), "127.0.0.1", 5002, 1).await,
            Err(ValidationError::TableFull(1))
        );
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_update_by_binding() {
        let (table, transport) = table(4);
        table.add(addr('B'), "127.0.0.1", 5001, 3).await.unwrap();
        transport.take().await;

        assert_eq!(
            table.update(addr('B'), "127.0.0.1", 5001, 3).await,
            Ok(UpdateOutcome::Unchanged)
        );
        assert_eq!(
            table.update(addr('C'), "127.0.0.1", 5001, 5).await,
            Err(ValidationError::NameMismatch {
                given: addr('C'),
                bound: addr('B')
            })
        );
        assert_eq!(
            table.update(addr('B'), "127.0.0.1", 5009, 5).await,
            Err(ValidationError::UnknownNeighbour)
        );
        assert_eq!(
            table.update(addr('B'), "127.0.0.1", 5001, 5).await,
            Ok(UpdateOutcome::Updated)
        );
        assert_eq!(table.get(addr('B')).await.unwrap().dist, 5);
        assert_eq!(transport.take().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear_send_bye() {
        let (table, transport) = table(4);
        table.add(addr('B'), "127.0.0.1", 5001, 1).await.unwrap();
        table.add(addr('C'), "127.0.0.1", 5002, 1).await.unwrap();
        transport.take().await;

        table.remove(addr('B'), false).await.unwrap();
        assert!(transport.take().await.is_empty());
        assert_eq!(
            table.remove(addr('B'), true).await,
            Err(ValidationError::UnknownNeighbour)
        );

        table.clear_bye().await;
        let sent = transport.take().await;
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], Sent::Unicast(_, b) if b[0] == PKT_BYE));
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_local_vector() {
        let (table, _) = table(4);
        table.add(addr('C'), "127.0.0.1", 5002, 4).await.unwrap();
        table.add(addr('B'), "127.0.0.1", 5001, 1).await.unwrap();

        assert_eq!(
            table.local_vector(false).await,
            vec![Entry::new(addr('B'), 1), Entry::new(addr('C'), 4)]
        );
        assert_eq!(table.local_vector(true).await[0], Entry::new(addr('A'), 0));
        assert_eq!(
            table.locate("127.0.0.1".parse().unwrap(), 5002).await,
            Some(addr('C'))
        );
    }

    #[tokio::test]
    async fn test_send_to_all_except() {
        let (table, transport) = table(4);
        table.add(addr('B'), "127.0.0.1", 5001, 1).await.unwrap();
        table.add(addr('C'), "127.0.0.1", 5002, 1).await.unwrap();
        transport.take().await;

        assert_eq!(table.send_to_all_except(b"x", Some(addr('B'))).await, 1);
        let sent = transport.take().await;
        assert!(matches!(&sent[0], Sent::Unicast(to, _) if to.port() == 5002));
    }
}
