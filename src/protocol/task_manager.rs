use log::{debug, error, info, warn};
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::engine::{change_deadline, RoutingEngine};
use super::message_handler;
use super::Router;
use crate::config::FloodingMode;
use crate::error::RouterError;
use crate::network::transport::{bind_multicast, leave_multicast, MAX_DATAGRAM};

pub async fn start_tasks(router: &Router) -> Result<(), RouterError> {
    let mut handles_guard = router.get_task_handles().lock().await;

    for handle in handles_guard.drain(..) {
        handle.abort();
    }

    let shutdown_rx = router.get_shutdown_tx().subscribe();

    // Join the group first so a failure leaves nothing running
    let multicast = match router.get_config().flooding {
        FloodingMode::Multicast => {
            let group = router.get_config().multicast_addr();
            let socket = bind_multicast(group)?;
            info!("Joined multicast group {}", group);
            Some((socket, group))
        }
        FloodingMode::Unicast => None,
    };

    handles_guard.push(start_unicast_task(router, shutdown_rx.resubscribe()));

    if let Some((socket, group)) = multicast {
        handles_guard.push(start_multicast_task(
            router,
            socket,
            group,
            shutdown_rx.resubscribe(),
        ));
    }

    handles_guard.push(start_announce_task(router, shutdown_rx));

    info!("All router tasks started");
    Ok(())
}

/// Wait for every task to wind down, aborting the ones that do not stop in time.
pub async fn stop_tasks(router: &Router) {
    let handles: Vec<JoinHandle<()>> =
        router.get_task_handles().lock().await.drain(..).collect();

    for mut handle in handles {
        if tokio::time::timeout(Duration::from_secs(1), &mut handle)
            .await
            .is_err()
        {
            handle.abort();
        }
    }
    debug!("All router tasks stopped");
}

fn start_unicast_task(
    router: &Router,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let engine = router.get_engine().clone();
    let socket = router.get_socket().clone();
    let is_running = router.is_running().clone();

    tokio::spawn(async move {
        unicast_task(engine, socket, is_running, &mut shutdown_rx).await;
    })
}

fn start_multicast_task(
    router: &Router,
    socket: UdpSocket,
    group: SocketAddrV4,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let engine = router.get_engine().clone();
    let is_running = router.is_running().clone();

    tokio::spawn(async move {
        multicast_task(engine, socket, group, is_running, &mut shutdown_rx).await;
    })
}

fn start_announce_task(
    router: &Router,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let engine = router.get_engine().clone();
    let is_running = router.is_running().clone();

    tokio::spawn(async move {
        announce_task(engine, is_running, &mut shutdown_rx).await;
    })
}

async fn unicast_task(
    engine: Arc<RoutingEngine>,
    socket: Arc<UdpSocket>,
    is_running: Arc<AtomicBool>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Unicast daemon shutting down");
                break;
            }
            result = socket.recv_from(&mut buffer) => {
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                match result {
                    Ok((len, addr)) => {
                        debug!("Unicast socket received {} bytes from {}", len, addr);
                        message_handler::handle_unicast(&engine, &buffer[..len], addr).await;
                    }
                    Err(e) => {
                        error!("Unicast socket failed to receive: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

async fn multicast_task(
    engine: Arc<RoutingEngine>,
    socket: UdpSocket,
    group: SocketAddrV4,
    is_running: Arc<AtomicBool>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Multicast daemon shutting down");
                break;
            }
            result = socket.recv_from(&mut buffer) => {
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                match result {
                    Ok((len, addr)) => {
                        debug!("Multicast socket received {} bytes from {}", len, addr);
                        message_handler::handle_multicast(&engine, &buffer[..len], addr).await;
                    }
                    Err(e) => {
                        error!("Multicast socket failed to receive: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }

    match leave_multicast(&socket, group) {
        Ok(()) => info!("Left multicast group {}", group),
        Err(e) => warn!("Failed to leave multicast group {}: {}", group, e),
    }
}

/// Periodic announce/recompute cycle with change-triggered early firing.
///
/// The first cycle runs one full period after start. A change moves the
/// deadline earlier, but never before `last_send + min_interval`.
async fn announce_task(
    engine: Arc<RoutingEngine>,
    is_running: Arc<AtomicBool>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    let period = engine.settings().announce_period;
    let min_interval = engine.settings().min_interval;
    let mut deadline = Instant::now() + period;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Announce task shutting down");
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                engine.run_cycle().await;
                deadline = Instant::now() + period;
            }
            _ = engine.changed() => {
                let last_send = engine.last_sending().await;
                deadline = change_deadline(Instant::now(), last_send, min_interval, deadline);
                debug!(
                    "Change detected, next announcement in {:?}",
                    deadline.saturating_duration_since(Instant::now())
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::display::LogDisplay;
    use crate::network::transport::test_support::{RecordingTransport, Sent};
    use crate::protocol::engine::EngineSettings;
    use crate::protocol::messages::PKT_ROUTE;
    use crate::protocol::types::ChangeKind;

    const PERIOD: Duration = Duration::from_secs(2);
    const MIN_INTERVAL: Duration = Duration::from_millis(600);
    const TICK: Duration = Duration::from_millis(1);

    async fn routes_sent(transport: &RecordingTransport) -> usize {
        transport
            .take()
            .await
            .iter()
            .filter(|s| matches!(s, Sent::Multicast(b) if b.first() == Some(&PKT_ROUTE)))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_task_timing() {
        let config = RouterConfig {
            announce_period: PERIOD.as_secs(),
            min_interval_ms: MIN_INTERVAL.as_millis() as u64,
            ..RouterConfig::default()
        };
        let transport = Arc::new(RecordingTransport::default());
        let engine = Arc::new(RoutingEngine::new(
            EngineSettings::from(&config),
            transport.clone(),
            Arc::new(LogDisplay),
        ));
        engine.add_neighbour('B', "127.0.0.1", 5001, 1).await.unwrap();
        // consume the change raised by the add
        engine.changed().await;
        transport.take().await;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let is_running = Arc::new(AtomicBool::new(true));
        let start = Instant::now();
        let handle = tokio::spawn({
            let engine = engine.clone();
            async move { announce_task(engine, is_running, &mut shutdown_rx).await }
        });

        // First cycle waits a full period
        tokio::time::sleep_until(start + PERIOD - TICK).await;
        assert_eq!(routes_sent(&transport).await, 0);
        tokio::time::sleep_until(start + PERIOD + TICK).await;
        assert_eq!(routes_sent(&transport).await, 1);
        let last = engine.last_sending().await.unwrap();
        assert!(last >= start + PERIOD && last < start + PERIOD + TICK);

        // A change 200ms after a send waits out the minimum interval
        tokio::time::sleep_until(last + Duration::from_millis(200)).await;
        engine.network_changed(ChangeKind::Local);
        tokio::time::sleep_until(last + MIN_INTERVAL - TICK).await;
        assert_eq!(routes_sent(&transport).await, 0);
        tokio::time::sleep_until(last + MIN_INTERVAL + TICK).await;
        assert_eq!(routes_sent(&transport).await, 1);
        let next = engine.last_sending().await.unwrap();
        assert!(next >= last + MIN_INTERVAL && next < last + MIN_INTERVAL + TICK);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
