use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::json;
use tracing::{error, info, warn};

mod config;

use interlock_core::kinds::{KindRegistry, KIND_EVENT, KIND_STATUS};
use interlock_mesh::{HandlerResult, MeshSocket, PeerEvent};

use crate::config::NodeConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Override the node name from the config
    #[arg(long)]
    name: Option<String>,
    /// Override the UDP port from the config
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let filter = std::env::var("INTERLOCK_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        if !path.exists() {
            warn!(
                "config file {} not found, continuing with defaults",
                path.display()
            );
        }
    }
    let config_path = cli.config.as_deref().filter(|p| p.exists());
    let node_config = match NodeConfig::load(config_path) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to load config: {err}");
            std::process::exit(1);
        }
    };

    let mut mesh_config = match node_config.into_mesh_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("invalid config: {err}");
            std::process::exit(1);
        }
    };
    if let Some(name) = cli.name {
        mesh_config.name = name;
    }
    if let Some(port) = cli.port {
        let host = mesh_config
            .bind
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        mesh_config.bind = format!("{host}:{port}");
    }

    let socket = match MeshSocket::bind(mesh_config).await {
        Ok(socket) => socket,
        Err(err) => {
            error!("failed to start mesh socket: {err}");
            std::process::exit(1);
        }
    };
    match socket.local_addr() {
        Ok(addr) => info!("node `{}` listening on {addr}", socket.name()),
        Err(err) => warn!("local address unavailable: {err}"),
    }

    let registry = Arc::new(KindRegistry::with_well_known());
    register_handlers(&socket, Arc::clone(&registry));

    let mut events = socket.peer_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(PeerEvent::Discovered { name, addr }) => {
                    info!("peer `{name}` discovered at {addr}");
                }
                Ok(PeerEvent::Active { name }) => {
                    info!("peer `{name}` is active");
                }
                Ok(PeerEvent::Inactive { name }) => {
                    warn!("peer `{name}` went inactive");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("peer event stream lagged, skipped {skipped} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to wait for shutdown signal: {err}");
    }
    info!("shutting down");
    socket
        .emit(KIND_STATUS, json!({"state": "stopping"}), None)
        .await;
    let stats = socket.stats();
    socket.stop().await;
    info!(
        "final stats: received={} sent={} dropped_decode={} dropped_admission={} send_errors={} handler_errors={}",
        stats.received,
        stats.sent,
        stats.dropped_decode,
        stats.dropped_admission,
        stats.send_errors,
        stats.handler_errors,
    );
}

/// Logging handlers for the well-known signal kinds plus a catch-all for
/// everything unregistered.
fn register_handlers(socket: &MeshSocket, registry: Arc<KindRegistry>) {
    let log_registry = Arc::clone(&registry);
    socket.on_signal(
        KIND_EVENT,
        Arc::new(move |signal, meta| {
            info!(
                "{} from `{}` at {}: {}",
                log_registry
                    .canonical_name(signal.kind)
                    .unwrap_or("event"),
                signal.sender,
                meta.remote_addr,
                signal.payload,
            );
            HandlerResult::Ok(())
        }),
    );
    socket.on_signal(
        KIND_STATUS,
        Arc::new(|signal, meta| {
            info!(
                "status from `{}` at {}: {}",
                signal.sender, meta.remote_addr, signal.payload
            );
            HandlerResult::Ok(())
        }),
    );
    socket.set_default_handler(Arc::new(move |signal, meta| {
        let name = registry
            .canonical_name(signal.kind)
            .map(str::to_string)
            .unwrap_or_else(|| format!("0x{:02x}", signal.kind));
        info!(
            "unhandled signal `{name}` from `{}` at {}",
            signal.sender, meta.remote_addr
        );
        HandlerResult::Ok(())
    }));
}
