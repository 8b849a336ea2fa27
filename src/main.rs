//! tls-reconciler daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──▶ registry ──┐
//!        │                     ▼
//!   (watcher)            ┌────────────┐   render   ┌─────────┐
//!        └──────────────▶│ reconciler │──────────▶ │  nginx  │ validate + reload
//!   SIGHUP ─────────────▶│  (passes)  │            └─────────┘
//!   renewal timer ──────▶│            │──issue/renew──▶ certbot ──▶ cert store
//!                        └────────────┘◀────────inspect────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use tls_reconciler::config::load_config;
use tls_reconciler::config::watcher::ConfigWatcher;
use tls_reconciler::lifecycle::{build_reconciler, signals, Shutdown};
use tls_reconciler::observability::{logging, metrics};
use tls_reconciler::orchestrator::{Scheduler, Trigger};

#[derive(Parser)]
#[command(name = "tls-reconciler")]
#[command(about = "Bootstraps and renews TLS certificates for an nginx front proxy", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "TLS_RECONCILER_CONFIG", default_value = "/etc/tls-reconciler/config.toml")]
    config: PathBuf,

    /// Run a single bootstrap pass and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // A broken config is fatal before anything is touched.
    let config = load_config(&cli.config)?;

    logging::init(&config.observability)?;
    tracing::info!(config = %cli.config.display(), "tls-reconciler v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        domains = config.domains.len(),
        store = %config.store.root,
        proxy_config = %config.proxy.config_path,
        renewal_interval_secs = config.renewal.interval_secs,
        renew_before_days = config.renewal.renew_before_days,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let reconciler = Arc::new(build_reconciler(&cli.config, &config));

    let first = reconciler.bootstrap().await;
    if cli.once {
        let report = first?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    if first.is_err() {
        tracing::warn!("Initial bootstrap failed, retrying on the next trigger");
    }

    let shutdown = Arc::new(Shutdown::new());
    let shutdown_rx = shutdown.subscribe();
    let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

    // Forward valid registry edits to the scheduler.
    let (watcher, mut domain_rx) = ConfigWatcher::new(&cli.config);
    let _watcher = match watcher.run() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
            None
        }
    };
    let forward_tx = trigger_tx.clone();
    tokio::spawn(async move {
        while let Some(domains) = domain_rx.recv().await {
            if forward_tx.send(Trigger::DomainsChanged(domains)).is_err() {
                break;
            }
        }
    });

    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if let Err(e) = signals::listen(trigger_tx, signal_shutdown).await {
            tracing::error!(error = %e, "Signal handling failed");
        }
    });

    let scheduler = Scheduler::new(
        Arc::clone(&reconciler),
        Duration::from_secs(config.renewal.interval_secs),
    );
    scheduler.run(trigger_rx, shutdown_rx).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
