//! preheatd: the preheat monitor daemon.
//!
//! Single binary that assembles:
//! - State store (redb)
//! - Auth registry + HTTP client
//! - Provider registry (Dragonfly)
//! - Preheat monitor (health sweeps, progress tracking)
//! - REST API
//!
//! # Usage
//!
//! ```text
//! preheatd run --config /etc/preheat/preheatd.toml --port 8090
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use preheat_api::{ApiState, build_router};
use preheat_client::{AuthRegistry, HttpClient};
use preheat_monitor::Monitor;
use preheat_provider::ProviderRegistry;
use preheat_state::{InstanceStore, StateStore};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;

const DEFAULT_LOG_FILTER: &str = "info,preheatd=debug,preheat=debug";

#[derive(Parser)]
#[command(name = "preheatd", about = "Preheat monitor daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitor and the REST API until Ctrl-C.
    Run {
        /// Path to preheatd.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state (overrides the config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        #[arg(long, value_enum, default_value_t = LogFormat::Text)]
        log_format: LogFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            data_dir,
            port,
            log_format,
        } => {
            init_tracing(log_format);

            let mut daemon_config = match config {
                Some(path) => DaemonConfig::from_file(&path)?,
                None => DaemonConfig::default(),
            };
            if let Some(data_dir) = data_dir {
                daemon_config.data_dir = data_dir;
            }
            if let Some(port) = port {
                daemon_config.port = port;
            }
            run(daemon_config).await
        }
    }
}

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("preheat daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    let db_path = config.db_path();
    let store = StateStore::open(&db_path, &config.namespace)?;
    info!(path = ?db_path, namespace = %store.namespace(), "state store opened");

    let now = epoch_secs();
    for instance in config.seed_instances(now) {
        store.save(&instance)?;
        info!(instance_id = %instance.id, provider = %instance.provider, "instance seeded");
    }

    let auth = Arc::new(AuthRegistry::with_defaults());
    let client = HttpClient::new(&config.client_config()?, auth)?;
    let providers = Arc::new(ProviderRegistry::with_defaults(client));
    info!(providers = ?providers.providers(), "provider registry initialized");

    let monitor = Monitor::new(
        config.monitor_config()?,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        providers,
    )?;
    monitor.resume_pending()?;

    // ── Start background tasks ─────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = monitor.start(shutdown_rx)?;

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState {
        monitor,
        instances: Arc::new(store.clone()),
        histories: Arc::new(store),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    tasks.join().await;

    info!("preheat daemon stopped");
    Ok(())
}
