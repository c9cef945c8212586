pub mod engine;
pub mod link_state;
pub mod message_handler;
pub mod messages;
pub mod neighbor;
pub mod neighbor_manager;
pub mod routing_table;
pub mod task_manager;
pub mod types;

pub use engine::{EngineSettings, RoutingEngine};
pub use link_state::{LinkStateRecord, LinkStateStore};
pub use messages::Packet;
pub use neighbor::Neighbour;
pub use neighbor_manager::NeighbourTable;
pub use routing_table::RoutingTable;
pub use types::*;

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::{FloodingMode, RouterConfig};
use crate::display::DisplaySink;
use crate::error::{Result, RouterError};
use crate::network::{bind_unicast, UdpTransport};

/// A running router: the engine plus its receive daemons and announce timer.
pub struct Router {
    config: RouterConfig,
    engine: Arc<RoutingEngine>,
    socket: Arc<UdpSocket>,
    is_running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Router {
    /// Bind the unicast socket and build the engine. Nothing runs until [`Router::start`].
    pub async fn bind(config: RouterConfig, display: Arc<dyn DisplaySink>) -> Result<Self> {
        let socket = Arc::new(bind_unicast(config.unicast_port).await?);
        let group = match config.flooding {
            FloodingMode::Multicast => Some(config.multicast_addr()),
            FloodingMode::Unicast => None,
        };
        let transport = Arc::new(UdpTransport::new(socket.clone(), group));
        let engine = Arc::new(RoutingEngine::new(
            EngineSettings::from(&config),
            transport,
            display,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            engine,
            socket,
            is_running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task_handles: Mutex::new(Vec::new()),
        })
    }

    pub async fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(RouterError::AlreadyRunning);
        }
        info!(
            "Starting router {} on port {} ({} flooding)",
            self.config.name, self.config.unicast_port, self.config.flooding
        );

        if let Err(e) = task_manager::start_tasks(self).await {
            self.is_running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        for n in &self.config.neighbours {
            if let Err(e) = self
                .engine
                .add_neighbour(n.name.as_char(), &n.ip, n.port, n.dist)
                .await
            {
                warn!("Static neighbour {} refused: {}", n.name, e);
            }
        }
        Ok(())
    }

    /// Stop the daemons and the timer, say BYE to every neighbour and clear the routing table.
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Err(RouterError::NotRunning);
        }
        info!("Stopping router {}", self.config.name);

        // No receivers only means no task is left to stop
        let _ = self.shutdown_tx.send(());
        task_manager::stop_tasks(self).await;
        self.engine.stop().await;
        Ok(())
    }

    pub fn get_config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn get_engine(&self) -> &Arc<RoutingEngine> {
        &self.engine
    }

    pub fn get_socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }

    pub fn is_running(&self) -> &Arc<AtomicBool> {
        &self.is_running
    }

    pub fn get_shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn get_task_handles(&self) -> &Mutex<Vec<JoinHandle<()>>> {
        &self.task_handles
    }
}
