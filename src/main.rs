//! Entrypoint: CLI parsing, config loading, and the two-phase component
//! wiring described in `spec.md` §9 ("Cyclic construction").
//!
//! Wiring order, matching the dependency order in `spec.md` §2:
//!   1. `EndpointMonitor` (needs nothing but config + backend addresses).
//!   2. `Sentinel` (needs a reference to the monitor); its hooks are then
//!      registered onto that same monitor.
//!   3. `SyncManager` (needs a reference to the sentinel) last.

mod config;
mod endpoint_monitor;
mod error;
mod http;
mod metrics;
mod model;
mod monitor;
mod sentinel;
mod server;
mod sync_manager;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Configuration;
use endpoint_monitor::{EndpointMonitor, EndpointMonitorConfig};
use sentinel::Sentinel;
use server::AppState;
use sync_manager::SyncManager;

/// Pairwise sentinel service: watches a set of backend endpoints, elects one
/// as master, and keeps that decision consistent with a peer sentinel.
#[derive(Debug, Parser)]
#[command(name = "sentinel")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "SENTINEL_CONFIG", default_value = "sentinel.toml")]
    config: PathBuf,

    /// Override `Configuration.ip` loaded from the config file.
    #[arg(long, env = "SENTINEL_IP")]
    ip: Option<String>,

    /// Override `Configuration.port` loaded from the config file.
    #[arg(long, env = "SENTINEL_PORT")]
    port: Option<u16>,

    /// Override `Configuration.log_level` loaded from the config file.
    #[arg(long, env = "SENTINEL_LOG_LEVEL")]
    log_level: Option<String>,
}

fn init_tracing(log_level: &str) {
    let filter = std::env::var("SENTINEL_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| log_level.to_string());
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut cfg = match Configuration::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration from {}: {err}", cli.config.display());
            std::process::exit(1);
        }
    };

    // CLI flags override the config file, not vice versa.
    if let Some(ip) = cli.ip {
        cfg.ip = ip;
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if let Some(log_level) = cli.log_level {
        cfg.log_level = log_level;
    }

    if let Err(err) = cfg.validate() {
        eprintln!("invalid configuration: {err}");
        std::process::exit(1);
    }

    init_tracing(&cfg.log_level);
    info!(self_addr = %cfg.self_addr(), backends = ?cfg.backends, "sentinel starting up");

    let Some(peer_addr) = cfg.peer_addr().map(str::to_string) else {
        error!("configuration validated but no peer sentinel found in cluster");
        std::process::exit(1);
    };

    // --- two-phase wiring (spec.md §9) ---
    let monitor = EndpointMonitor::new(
        &cfg.backends,
        cfg.backend_proxied_port,
        EndpointMonitorConfig {
            interval: Duration::from_secs(cfg.monitor.interval),
            timeout: Duration::from_secs(cfg.monitor.timeout),
            url: cfg.monitor.url.clone(),
            failure_count: cfg.monitor.failure.count,
            recover_count: cfg.monitor.recover.count,
            check_code: cfg.monitor.check_code,
        },
    );

    // "a bounded settle period (~3x monitor interval)" -- spec.md §4.C
    let settle = Duration::from_secs(cfg.monitor.interval.saturating_mul(3).max(1));
    let sentinel = Sentinel::new(monitor, cfg.to_master.clone(), cfg.to_slave.clone(), settle);
    sentinel.install_hooks();

    let sync_manager = SyncManager::new(
        cfg.self_addr(),
        peer_addr,
        Duration::from_secs(cfg.sync.timeout),
        cfg.sync.failure.count,
        cfg.sync.recover.count,
        sentinel,
    );

    // The gossip cycle (spec.md §4.D): one `sync()` round per `sync.interval`.
    {
        let sync_manager = sync_manager.clone();
        let period = Duration::from_secs(cfg.sync.interval.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sync_manager.sync().await;
            }
        });
    }

    let app = server::routes::router(AppState { sync_manager }).layer(
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    );

    let addr = SocketAddr::new(cfg.ip.parse().unwrap_or_else(|_| [0, 0, 0, 0].into()), cfg.port);
    info!(listen = %addr, "sentinel listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%addr, error = %err, "failed to bind listen address");
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
    {
        error!(error = %err, "server exited with an error");
    }
}
