use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::Instant;

use super::link_state::{LinkStateRecord, LinkStateStore};
use super::messages::{ByePacket, DataPacket, HelloPacket, Packet, RoutePacket};
use super::neighbor_manager::NeighbourTable;
use super::routing_table::RoutingTable;
use super::types::{
    AddOutcome, ChangeKind, Counters, CountersSnapshot, DataOutcome, DropReason, RouteOutcome,
    UpdateOutcome,
};
use crate::algorithms::dijkstra;
use crate::config::{FloodingMode, RouterConfig};
use crate::display::DisplaySink;
use crate::error::{RouterError, ValidationError};
use crate::network::Transport;
use crate::types::{Address, Entry, LocalIdentity, MAX_ENTRY_VEC_LEN, MAX_MESSAGE_LEN, TTL_ADD};

/// Engine parameters taken from [`RouterConfig`]
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub identity: LocalIdentity,
    pub announce_period: Duration,
    pub min_interval: Duration,
    pub send_if_changes: bool,
    pub flooding: FloodingMode,
    pub capacity: usize,
    pub max_path_len: usize,
}

impl From<&RouterConfig> for EngineSettings {
    fn from(config: &RouterConfig) -> Self {
        Self {
            identity: config.identity(),
            announce_period: config.announce_period(),
            min_interval: config.min_interval(),
            send_if_changes: config.send_if_changes,
            flooding: config.flooding,
            capacity: config.capacity,
            max_path_len: config.max_path_len,
        }
    }
}

/// Deadline of the next announcement after a change event observed at `now`.
///
/// Fires at once when `min_interval` has elapsed since the last send,
/// otherwise at `last_send + min_interval`, never later than `deadline`.
pub fn change_deadline(
    now: Instant,
    last_send: Option<Instant>,
    min_interval: Duration,
    deadline: Instant,
) -> Instant {
    match last_send {
        Some(last) if now < last + min_interval => deadline.min(last + min_interval),
        _ => now,
    }
}

/// Link-state routing engine: announces, recomputes and forwards.
pub struct RoutingEngine {
    settings: EngineSettings,
    transport: Arc<dyn Transport>,
    display: Arc<dyn DisplaySink>,
    counters: Arc<Counters>,
    neighbours: NeighbourTable,
    link_state: LinkStateStore,
    table_tx: watch::Sender<Arc<RoutingTable>>,
    route_seq: AtomicU32,
    data_seq: AtomicU32,
    last_sending: Mutex<Option<Instant>>,
    changes: Notify,
}

impl RoutingEngine {
    pub fn new(
        settings: EngineSettings,
        transport: Arc<dyn Transport>,
        display: Arc<dyn DisplaySink>,
    ) -> Self {
        let counters = Arc::new(Counters::default());
        let neighbours = NeighbourTable::new(
            settings.identity.name(),
            settings.capacity,
            transport.clone(),
            counters.clone(),
        );
        let (table_tx, _) = watch::channel(Arc::new(RoutingTable::new()));

        Self {
            settings,
            transport,
            display,
            counters,
            neighbours,
            link_state: LinkStateStore::new(),
            table_tx,
            route_seq: AtomicU32::new(0),
            data_seq: AtomicU32::new(0),
            last_sending: Mutex::new(None),
            changes: Notify::new(),
        }
    }

    pub fn local_name(&self) -> Address {
        self.settings.identity.name()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn neighbours(&self) -> &NeighbourTable {
        &self.neighbours
    }

    pub fn link_state(&self) -> &LinkStateStore {
        &self.link_state
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    /// Count a packet discarded before it reached the engine
    pub fn count_dropped(&self) {
        Counters::bump(&self.counters.dropped);
    }

    /// The routing table currently used for forwarding
    pub fn routing_table(&self) -> Arc<RoutingTable> {
        self.table_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<RoutingTable>> {
        self.table_tx.subscribe()
    }

    pub async fn last_sending(&self) -> Option<Instant> {
        *self.last_sending.lock().await
    }

    /// Resolves once a change has been signalled since the last wait
    pub async fn changed(&self) {
        self.changes.notified().await;
    }

    /// Flood the local link vector. Returns whether a ROUTE left the node.
    pub async fn announce(&self) -> Result<bool, RouterError> {
        let mut vector = self.neighbours.local_vector(false).await;
        if vector.is_empty() {
            debug!("No neighbours, nothing to announce");
            return Ok(false);
        }
        vector.truncate(MAX_ENTRY_VEC_LEN);

        let seq = self.route_seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let ttl = (self.settings.announce_period.as_secs() + TTL_ADD).min(i16::MAX as u64) as u16;
        let packet = Packet::Route(RoutePacket {
            origin: self.local_name(),
            ttl,
            seq,
            entries: vector,
        });
        let bytes = packet.encode()?;

        match self.settings.flooding {
            FloodingMode::Multicast => self.transport.send_multicast(&bytes).await?,
            FloodingMode::Unicast => {
                self.neighbours.send_to_all_except(&bytes, None).await;
            }
        }

        *self.last_sending.lock().await = Some(Instant::now());
        Counters::bump(&self.counters.route_sent);
        debug!("ROUTE seq {} announced ({})", seq, self.settings.flooding);
        Ok(true)
    }

    /// Rebuild the routing table from the local vector and the link-state store, then publish it.
    pub async fn recompute(&self) -> Arc<RoutingTable> {
        let local = self.neighbours.local_vector(false).await;
        let snapshot: Vec<LinkStateRecord> = self.link_state.snapshot().await;
        let table = Arc::new(dijkstra::compute(
            self.local_name(),
            &local,
            &snapshot,
            std::time::Instant::now(),
        ));
        Counters::bump(&self.counters.dijkstra_runs);

        let previous = self.table_tx.send_replace(table.clone());
        if !previous.same_routes(&table) {
            info!("Routing table updated ({} routes)", table.len());
        }
        self.display.refresh_routes(&table.rows());
        table
    }

    /// One announce + recompute cycle
    pub async fn run_cycle(&self) {
        if let Err(e) = self.announce().await {
            warn!("Failed to announce: {}", e);
        }
        self.recompute().await;
    }

    /// Signal a change of the neighbour table (`Local`) or of remote link state.
    pub fn network_changed(&self, kind: ChangeKind) {
        debug!("Network changed ({:?})", kind);
        if self.settings.send_if_changes {
            self.changes.notify_one();
        }
    }

    pub async fn on_receive_route(
        &self,
        packet: RoutePacket,
        from: Option<SocketAddr>,
        via_multicast: bool,
    ) -> Result<RouteOutcome, RouterError> {
        Counters::bump(&self.counters.route_received);

        if packet.origin == self.local_name() {
            Counters::bump(&self.counters.route_local);
            return Ok(RouteOutcome::Loopback);
        }
        if packet.entries.is_empty() || packet.entries.len() > MAX_ENTRY_VEC_LEN {
            Counters::bump(&self.counters.dropped);
            return Err(ValidationError::InvalidVectorLength(packet.entries.len()).into());
        }

        let ttl = Duration::from_secs(packet.ttl as u64);
        let outcome = match self
            .link_state
            .record(packet.origin, packet.entries.clone(), packet.seq, ttl)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                Counters::bump(&self.counters.dropped);
                return Err(e.into());
            }
        };

        let RouteOutcome::Accepted { changed } = outcome else {
            return Ok(outcome);
        };

        debug!(
            "ROUTE from {} seq {} accepted: {}",
            packet.origin,
            packet.seq,
            format_vector(&packet.entries)
        );
        self.neighbours
            .update_vector(packet.origin, &packet.entries, ttl)
            .await;

        if self.settings.flooding == FloodingMode::Unicast && !via_multicast {
            self.reflood(packet, from).await;
        }
        if changed {
            self.network_changed(ChangeKind::Remote);
        }
        Ok(outcome)
    }

    /// Relay an accepted ROUTE to every neighbour except the one it came from.
    ///
    /// The TTL field is both the hop budget and the record lifetime in seconds,
    /// so each relay also shortens the lifetime stored downstream by one second.
    async fn reflood(&self, mut packet: RoutePacket, from: Option<SocketAddr>) {
        if packet.ttl <= 1 {
            debug!("ROUTE from {} not relayed: TTL exhausted", packet.origin);
            return;
        }
        packet.ttl -= 1;

        let exclude = match from {
            Some(addr) => self.neighbours.locate(addr.ip(), addr.port()).await,
            None => None,
        };
        let origin = packet.origin;
        match Packet::Route(packet).encode() {
            Ok(bytes) => {
                let sent = self.neighbours.send_to_all_except(&bytes, exclude).await;
                debug!("ROUTE from {} relayed to {} neighbours", origin, sent);
            }
            Err(e) => warn!("Failed to encode relayed ROUTE: {}", e),
        }
    }

    /// Send a DATA packet on behalf of `sender`.
    ///
    /// The local name is appended to `path`. A packet for the local name or an
    /// anycast alias is delivered here and never leaves the node.
    pub async fn send_data(
        &self,
        sender: char,
        seq: u32,
        dest: char,
        message: &[u8],
        path: &[Address],
    ) -> Result<DataOutcome, ValidationError> {
        let sender = Address::new(sender)?;
        let dest = Address::new(dest)?;
        if message.len() > MAX_MESSAGE_LEN {
            return Err(ValidationError::MessageTooLong(message.len()));
        }

        let packet = DataPacket {
            sender,
            seq,
            dest,
            message: message.to_vec(),
            path: path.to_vec(),
        };
        Ok(self.route_data(packet).await)
    }

    /// Send `text` from the local name with the next DATA sequence number.
    pub async fn send_message(
        &self,
        dest: char,
        text: &str,
    ) -> Result<DataOutcome, ValidationError> {
        let seq = self.data_seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        self.send_data(self.local_name().as_char(), seq, dest, text.as_bytes(), &[])
            .await
    }

    pub async fn on_receive_data(&self, packet: DataPacket) -> DataOutcome {
        self.route_data(packet).await
    }

    async fn route_data(&self, mut packet: DataPacket) -> DataOutcome {
        packet.path.push(self.local_name());

        if self.settings.identity.is_local(packet.dest) {
            Counters::bump(&self.counters.data_delivered);
            info!(
                "DATA {} from {} delivered: \"{}\"",
                packet.seq,
                packet.sender,
                packet.message_text()
            );
            self.display.data_delivered(&packet);
            return DataOutcome::Delivered;
        }

        match self.forward(&packet).await {
            Ok(next_hop) => {
                Counters::bump(&self.counters.data_sent);
                debug!(
                    "DATA {} from {} to {} forwarded via {}",
                    packet.seq, packet.sender, packet.dest, next_hop
                );
                DataOutcome::Forwarded { next_hop }
            }
            Err(reason) => {
                Counters::bump(&self.counters.dropped);
                warn!(
                    "DATA {} from {} to {} dropped: {:?}",
                    packet.seq, packet.sender, packet.dest, reason
                );
                DataOutcome::Dropped(reason)
            }
        }
    }

    async fn forward(&self, packet: &DataPacket) -> Result<Address, DropReason> {
        if packet.path.len() > self.settings.max_path_len {
            return Err(DropReason::PathTooLong);
        }

        let next_hop = self
            .routing_table()
            .next_hop(packet.dest)
            .ok_or(DropReason::NoRoute)?;
        let addr = self
            .neighbours
            .socket_addr(next_hop)
            .await
            .ok_or(DropReason::UnknownNextHop(next_hop))?;

        let bytes = Packet::Data(packet.clone())
            .encode()
            .map_err(|_| DropReason::PathTooLong)?;
        self.transport.send_unicast(&bytes, addr).await.map_err(|e| {
            warn!("Failed to send DATA to {}: {}", next_hop, e);
            DropReason::SendFailed
        })?;
        Ok(next_hop)
    }

    /// A HELLO registers (or refreshes) its sender at the datagram's source address.
    pub async fn on_hello(
        &self,
        hello: HelloPacket,
        from: SocketAddr,
    ) -> Result<AddOutcome, ValidationError> {
        let outcome = self
            .neighbours
            .add_addr(hello.sender, from.ip(), from.port(), hello.dist)
            .await?;
        self.neighbours_changed().await;
        Ok(outcome)
    }

    /// A BYE removes its sender without answering.
    pub async fn on_bye(&self, bye: ByePacket) -> Result<(), ValidationError> {
        self.neighbours.remove(bye.sender, false).await?;
        self.neighbours_changed().await;
        Ok(())
    }

    pub async fn add_neighbour(
        &self,
        name: char,
        ip: &str,
        port: u16,
        dist: u32,
    ) -> Result<AddOutcome, ValidationError> {
        let outcome = self
            .neighbours
            .add(Address::new(name)?, ip, port, dist)
            .await?;
        self.neighbours_changed().await;
        Ok(outcome)
    }

    pub async fn update_neighbour(
        &self,
        name: char,
        ip: &str,
        port: u16,
        dist: u32,
    ) -> Result<UpdateOutcome, ValidationError> {
        let outcome = self
            .neighbours
            .update(Address::new(name)?, ip, port, dist)
            .await?;
        if outcome == UpdateOutcome::Updated {
            self.neighbours_changed().await;
        }
        Ok(outcome)
    }

    pub async fn remove_neighbour(&self, name: char, notify: bool) -> Result<(), ValidationError> {
        self.neighbours.remove(Address::new(name)?, notify).await?;
        self.neighbours_changed().await;
        Ok(())
    }

    async fn neighbours_changed(&self) {
        self.display.refresh_neighbours(&self.neighbours.rows().await);
        self.network_changed(ChangeKind::Local);
    }

    /// Say BYE to every neighbour, forget link state and publish an empty routing table.
    pub async fn stop(&self) {
        self.neighbours.clear_bye().await;
        self.link_state.clear().await;
        self.display.refresh_neighbours(&[]);
        self.table_tx.send_replace(Arc::new(RoutingTable::new()));
        self.display.refresh_routes(&[]);
    }
}

fn format_vector(vec: &[Entry]) -> String {
    vec.iter().map(Entry::to_string).collect::<Vec<_>>().join(" ")
}
