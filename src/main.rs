use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder;

use letter_router::config::{FloodingMode, RouterConfig, StaticNeighbour};
use letter_router::control_server::ControlServer;
use letter_router::{Address, LogDisplay, Router};

#[derive(Parser)]
#[command(name = "letter-router", about = "Link-state router for single-letter addressed nodes")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Local router name (one uppercase letter)
    #[arg(short, long)]
    name: Option<char>,

    /// Unicast UDP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Anycast alias also delivered locally; may be repeated
    #[arg(long)]
    anycast: Vec<char>,

    #[arg(long)]
    multicast_group: Option<Ipv4Addr>,

    #[arg(long)]
    multicast_port: Option<u16>,

    /// Seconds between announcements
    #[arg(long)]
    period: Option<u64>,

    /// Minimum milliseconds between two announcements
    #[arg(long)]
    min_interval: Option<u64>,

    /// Only announce periodically, not on changes
    #[arg(long)]
    no_send_if_changes: bool,

    #[arg(long)]
    flooding: Option<FloodingMode>,

    /// Neighbour as NAME:IP:PORT:DIST; may be repeated
    #[arg(long = "neighbour")]
    neighbours: Vec<StaticNeighbour>,

    /// TCP port of the JSON control interface on 127.0.0.1
    #[arg(long)]
    control_port: Option<u16>,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    save_config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<(RouterConfig, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => RouterConfig::load(path)?,
            None => RouterConfig::default(),
        };

        if let Some(name) = self.name {
            config.name = Address::new(name)?;
        }
        if let Some(port) = self.port {
            config.unicast_port = port;
        }
        for alias in self.anycast {
            config.anycast.push(Address::new(alias)?);
        }
        if let Some(group) = self.multicast_group {
            config.multicast_group = group;
        }
        if let Some(port) = self.multicast_port {
            config.multicast_port = port;
        }
        if let Some(period) = self.period {
            config.announce_period = period;
        }
        if let Some(ms) = self.min_interval {
            config.min_interval_ms = ms;
        }
        if self.no_send_if_changes {
            config.send_if_changes = false;
        }
        if let Some(flooding) = self.flooding {
            config.flooding = flooding;
        }
        config.neighbours.extend(self.neighbours);
        if self.control_port.is_some() {
            config.control_port = self.control_port;
        }

        config.validate().context("invalid configuration")?;
        Ok((config, self.save_config))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config, save_path) = Cli::parse().into_config()?;
    if let Some(path) = save_path {
        config.save(&path)?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        let router = Arc::new(Router::bind(config.clone(), Arc::new(LogDisplay)).await?);
        router.start().await?;
        info!("Router {} running", config.name);

        if let Some(port) = config.control_port {
            let server = ControlServer::new(
                port,
                router.get_engine().clone(),
                router.is_running().clone(),
            );
            tokio::spawn(async move {
                if let Err(e) = server.start().await {
                    error!("Control server stopped: {}", e);
                }
            });
        }

        tokio::signal::ctrl_c().await?;
        info!("Received SIGINT, shutting down");
        router.stop().await?;
        Ok::<(), anyhow::Error>(())
    })
}
