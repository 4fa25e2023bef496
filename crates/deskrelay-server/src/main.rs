//! Deskrelay server
//!
//! Binds the session API and the per-session VNC bridge, rebuilds the
//! registry from the container runtime on startup, and serves until
//! interrupted. Sessions themselves live in the external runtime; nothing is
//! persisted here.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deskrelay_api::{ApiServer, ApiServerConfig};
use deskrelay_control::SessionManager;
use deskrelay_ports::{BandRange, PortAllocator};
use deskrelay_registry::SessionRegistry;
use deskrelay_runtime::{DockerRuntime, ScriptLauncher};

/// Session registry and VNC protocol bridge for container-hosted desktops
#[derive(Parser, Debug)]
#[command(name = "deskrelay")]
#[command(about = "Serve browser-reachable VNC sessions backed by containers", long_about = None)]
#[command(version)]
struct ServerArgs {
    /// API/bridge bind address
    #[arg(long, env = "DESKRELAY_API_ADDR", default_value = "127.0.0.1:8123")]
    api_addr: String,

    /// Container image identifying session containers
    #[arg(long, env = "DESKRELAY_IMAGE", default_value = "chrome-gui")]
    image: String,

    /// Launch script invoked as `<script> <debug_port> <vnc_port> <display>`
    #[arg(
        long,
        env = "DESKRELAY_LAUNCH_SCRIPT",
        default_value = "./run-chrome-gui.sh"
    )]
    launch_script: String,

    /// Host the bridge dials to reach session VNC ports
    #[arg(long, env = "DESKRELAY_UPSTREAM_HOST", default_value = "127.0.0.1")]
    upstream_host: String,

    /// DevTools debug port band (format: "9222-9421")
    #[arg(long, default_value = "9222-9421")]
    debug_ports: String,

    /// VNC protocol port band (format: "5900-6099")
    #[arg(long, default_value = "5900-6099")]
    vnc_ports: String,

    /// X display number band (format: "99-199")
    #[arg(long, default_value = "99-199")]
    displays: String,

    /// Seconds to wait for a new session's VNC server to report ready
    #[arg(long, default_value = "15")]
    ready_timeout_secs: u64,

    /// Disable permissive CORS on the API
    #[arg(long)]
    no_cors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();

    init_logging(&args.log_level)?;

    info!("starting deskrelay");
    info!("API endpoint: {}", args.api_addr);
    info!("session image: {}", args.image);
    info!("launch script: {}", args.launch_script);

    let debug_band = parse_port_range(&args.debug_ports)?;
    let vnc_band = parse_port_range(&args.vnc_ports)?;
    let display_band = parse_port_range(&args.displays)?;
    info!(
        "port bands: debug {}-{}, vnc {}-{}, display {}-{}",
        debug_band.start,
        debug_band.end,
        vnc_band.start,
        vnc_band.end,
        display_band.start,
        display_band.end
    );

    let registry = SessionRegistry::new();
    let allocator = Arc::new(PortAllocator::new(debug_band, vnc_band, display_band));
    let runtime = Arc::new(DockerRuntime::new(args.image.clone()));
    let launcher = Arc::new(ScriptLauncher::new(args.launch_script.clone()));

    let manager = Arc::new(
        SessionManager::new(registry, allocator, runtime, launcher)
            .with_ready_timeout(Duration::from_secs(args.ready_timeout_secs)),
    );

    // Rebuild the registry from whatever is already running; a failed query
    // here is not fatal, discovery is retried on demand
    match manager.discover().await {
        Ok(outcome) => {
            info!(
                sessions = outcome.sessions.len(),
                conflicts = outcome.conflicts.len(),
                "adopted existing sessions"
            );
        }
        Err(err) => warn!(%err, "startup discovery failed, starting with an empty registry"),
    }

    let bind_addr: SocketAddr = args.api_addr.parse()?;
    let api_server = ApiServer::new(
        ApiServerConfig {
            bind_addr,
            enable_cors: !args.no_cors,
        },
        manager,
        args.upstream_host.clone(),
    );

    let api_handle = tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server error: {}", e);
        }
    });

    info!("Press Ctrl+C to stop");

    match signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received, stopping"),
        Err(err) => error!("error listening for shutdown signal: {}", err),
    }

    api_handle.abort();
    info!("deskrelay stopped");

    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn parse_port_range(range_str: &str) -> Result<BandRange> {
    let parts: Vec<&str> = range_str.split('-').collect();
    if parts.len() != 2 {
        return Err(anyhow::anyhow!(
            "Invalid port range format. Expected: START-END (e.g., 5900-6099)"
        ));
    }

    let start: u16 = parts[0]
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid start port: {}", parts[0]))?;
    let end: u16 = parts[1]
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid end port: {}", parts[1]))?;

    if start > end {
        return Err(anyhow::anyhow!("Start port must not exceed end port"));
    }

    Ok(BandRange::new(start, end))
}
