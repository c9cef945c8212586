use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::protocol::{DataOutcome, RoutingEngine, UpdateOutcome};

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlCommand {
    pub command: String,
    pub args: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NeighbourArgs {
    name: char,
    ip: String,
    port: u16,
    dist: u32,
}

#[derive(Debug, Deserialize)]
struct RemoveArgs {
    name: char,
    #[serde(default = "default_notify")]
    notify: bool,
}

fn default_notify() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SendArgs {
    dest: char,
    message: String,
}

#[derive(Debug, Serialize)]
struct LinkStateInfo {
    origin: char,
    seq: u32,
    ttl_secs: u64,
    age_ms: u128,
    valid: bool,
    vector: Vec<crate::types::Entry>,
}

impl ControlResponse {
    fn ok(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Line-oriented JSON control interface bound to localhost.
pub struct ControlServer {
    port: u16,
    engine: Arc<RoutingEngine>,
    is_running: Arc<AtomicBool>,
}

impl ControlServer {
    pub fn new(port: u16, engine: Arc<RoutingEngine>, is_running: Arc<AtomicBool>) -> Self {
        Self {
            port,
            engine,
            is_running,
        }
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let bind_addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Control server listening on {}", bind_addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Control connection from {}", addr);
                    let engine = self.engine.clone();
                    let is_running = self.is_running.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, engine, is_running).await {
                            error!("Error handling control client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept control connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(
        mut stream: TcpStream,
        engine: Arc<RoutingEngine>,
        is_running: Arc<AtomicBool>,
    ) -> anyhow::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            if buf_reader.read_line(&mut line).await? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<ControlCommand>(trimmed) {
                Ok(command) => Self::process_command(command, &engine, &is_running).await,
                Err(e) => ControlResponse::fail(format!("Invalid JSON command: {}", e)),
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(format!("{}\n", response_json).as_bytes()).await?;
            writer.flush().await?;
        }

        Ok(())
    }

    pub async fn process_command(
        command: ControlCommand,
        engine: &RoutingEngine,
        is_running: &AtomicBool,
    ) -> ControlResponse {
        match command.command.as_str() {
            "status" => Self::get_status(engine, is_running).await,
            "neighbours" => Self::get_neighbours(engine).await,
            "routes" => Self::get_routes(engine),
            "link_state" => Self::get_link_state(engine).await,
            "stats" => Self::get_stats(engine),
            "add_neighbour" => Self::add_neighbour(command.args, engine).await,
            "update_neighbour" => Self::update_neighbour(command.args, engine).await,
            "del_neighbour" => Self::del_neighbour(command.args, engine).await,
            "send" => Self::send(command.args, engine).await,
            "help" => Self::get_help(),
            _ => ControlResponse::fail(format!("Unknown command: {}", command.command)),
        }
    }

    fn parse_args<T: for<'de> Deserialize<'de>>(
        args: Option<serde_json::Value>,
    ) -> Result<T, ControlResponse> {
        let args = args.ok_or_else(|| ControlResponse::fail("Missing args"))?;
        serde_json::from_value(args)
            .map_err(|e| ControlResponse::fail(format!("Invalid args: {}", e)))
    }

    async fn get_status(engine: &RoutingEngine, is_running: &AtomicBool) -> ControlResponse {
        let settings = engine.settings();
        ControlResponse::ok(
            "Status retrieved",
            Some(serde_json::json!({
                "name": engine.local_name(),
                "is_running": is_running.load(Ordering::Relaxed),
                "flooding": settings.flooding,
                "announce_period_secs": settings.announce_period.as_secs(),
                "neighbours": engine.neighbours().len().await,
                "capacity": engine.neighbours().capacity(),
                "link_state_records": engine.link_state().len().await,
                "routes": engine.routing_table().len(),
                "time": chrono::Local::now().to_rfc3339(),
            })),
        )
    }

    async fn get_neighbours(engine: &RoutingEngine) -> ControlResponse {
        let rows = engine.neighbours().rows().await;
        ControlResponse::ok(
            format!("Found {} neighbours", rows.len()),
            serde_json::to_value(rows).ok(),
        )
    }

    fn get_routes(engine: &RoutingEngine) -> ControlResponse {
        let rows = engine.routing_table().rows();
        ControlResponse::ok(
            format!("Retrieved {} routes", rows.len()),
            serde_json::to_value(rows).ok(),
        )
    }

    async fn get_link_state(engine: &RoutingEngine) -> ControlResponse {
        let records: Vec<LinkStateInfo> = engine
            .link_state()
            .snapshot()
            .await
            .into_iter()
            .map(|r| LinkStateInfo {
                origin: r.origin.as_char(),
                seq: r.seq,
                ttl_secs: r.ttl.as_secs(),
                age_ms: r.received_at.elapsed().as_millis(),
                valid: r.is_valid(),
                vector: r.vector,
            })
            .collect();
        ControlResponse::ok(
            format!("Retrieved {} link-state records", records.len()),
            serde_json::to_value(records).ok(),
        )
    }

    fn get_stats(engine: &RoutingEngine) -> ControlResponse {
        ControlResponse::ok("Counters retrieved", serde_json::to_value(engine.counters()).ok())
    }

    async fn add_neighbour(
        args: Option<serde_json::Value>,
        engine: &RoutingEngine,
    ) -> ControlResponse {
        let args: NeighbourArgs = match Self::parse_args(args) {
            Ok(args) => args,
            Err(response) => return response,
        };
        match engine
            .add_neighbour(args.name, &args.ip, args.port, args.dist)
            .await
        {
            Ok(outcome) => {
                ControlResponse::ok(format!("Neighbour {} {:?}", args.name, outcome), None)
            }
            Err(e) => ControlResponse::fail(format!("Failed to add neighbour: {}", e)),
        }
    }

    async fn update_neighbour(
        args: Option<serde_json::Value>,
        engine: &RoutingEngine,
    ) -> ControlResponse {
        let args: NeighbourArgs = match Self::parse_args(args) {
            Ok(args) => args,
            Err(response) => return response,
        };
        match engine
            .update_neighbour(args.name, &args.ip, args.port, args.dist)
            .await
        {
            Ok(UpdateOutcome::Updated) => {
                ControlResponse::ok(format!("Neighbour {} updated", args.name), None)
            }
            Ok(UpdateOutcome::Unchanged) => {
                ControlResponse::fail(format!("Neighbour {}: no change", args.name))
            }
            Err(e) => ControlResponse::fail(format!("Failed to update neighbour: {}", e)),
        }
    }

    async fn del_neighbour(
        args: Option<serde_json::Value>,
        engine: &RoutingEngine,
    ) -> ControlResponse {
        let args: RemoveArgs = match Self::parse_args(args) {
            Ok(args) => args,
            Err(response) => return response,
        };
        match engine.remove_neighbour(args.name, args.notify).await {
            Ok(()) => ControlResponse::ok(format!("Neighbour {} removed", args.name), None),
            Err(e) => ControlResponse::fail(format!("Failed to remove neighbour: {}", e)),
        }
    }

    async fn send(args: Option<serde_json::Value>, engine: &RoutingEngine) -> ControlResponse {
        let args: SendArgs = match Self::parse_args(args) {
            Ok(args) => args,
            Err(response) => return response,
        };
        match engine.send_message(args.dest, &args.message).await {
            Ok(DataOutcome::Delivered) => ControlResponse::ok("Delivered locally", None),
            Ok(DataOutcome::Forwarded { next_hop }) => {
                ControlResponse::ok(format!("Sent via {}", next_hop), None)
            }
            Ok(DataOutcome::Dropped(reason)) => {
                ControlResponse::fail(format!("Dropped: {:?}", reason))
            }
            Err(e) => ControlResponse::fail(format!("Failed to send: {}", e)),
        }
    }

    fn get_help() -> ControlResponse {
        let commands = vec![
            ("status", "Get router status"),
            ("neighbours", "List neighbours"),
            ("routes", "Get current routing table"),
            ("link_state", "List stored link-state records"),
            ("stats", "Get packet counters"),
            ("add_neighbour", "Add a neighbour {name, ip, port, dist}"),
            ("update_neighbour", "Change a neighbour distance {name, ip, port, dist}"),
            ("del_neighbour", "Remove a neighbour {name, notify}"),
            ("send", "Send a message {dest, message}"),
            ("help", "Show this help message"),
        ];

        ControlResponse::ok("Available commands", serde_json::to_value(commands).ok())
    }
}
