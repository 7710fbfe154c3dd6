//! Fleetpulse collector daemon.
//!
//! Binds the heartbeat socket, wires the receiver to the reconciler and
//! the statistics sink, and runs until interrupted. SIGHUP re-reads the
//! config file and rotates the heartbeat key without a restart.

mod config;
mod sinks;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use pulse_network::{HealthSink, ReceiverConfig, StatsSink, UdpStatusReceiver};
use pulse_protocol::{KeySource, SharedKey};
use pulse_state::{
    ComputeDriver, HealthReconciler, LivenessRepository, LivenessTracker, MemoryStore,
    TopologyRepository,
};

use crate::config::CollectorConfig;
use crate::sinks::{LogStatsSink, ReconcilerSink};

#[derive(Parser, Debug)]
#[command(
    name = "pulse-collector",
    about = "Heartbeat collector for a distributed load-balancer fleet",
    version
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CollectorConfig::load(path)?,
        None => CollectorConfig::default(),
    };

    let keys = Arc::new(SharedKey::new(config.heartbeat_key.clone().into_bytes()));
    let store = Arc::new(MemoryStore::new());
    let reconciler = HealthReconciler::new(
        Arc::clone(&store) as Arc<dyn TopologyRepository>,
        LivenessTracker::new(Arc::clone(&store) as Arc<dyn LivenessRepository>),
        Arc::clone(&store) as Arc<dyn ComputeDriver>,
        Duration::from_secs(config.heartbeat_interval_secs),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let receiver_config = ReceiverConfig {
        bind: config.bind.clone(),
        recv_buffer_bytes: config.sock_rcvbuf,
        health_workers: config.health_workers,
        stats_workers: config.stats_workers,
    };
    let receiver = UdpStatusReceiver::bind(
        &receiver_config,
        Arc::clone(&keys) as Arc<dyn KeySource>,
        Arc::new(ReconcilerSink::new(reconciler)) as Arc<dyn HealthSink>,
        Arc::new(LogStatsSink) as Arc<dyn StatsSink>,
        shutdown_rx,
    )
    .await
    .context("failed to start heartbeat receiver")?;

    let loop_handle = tokio::spawn(receiver.run());

    #[cfg(unix)]
    if let Some(path) = cli.config.clone() {
        spawn_reload_handler(path, Arc::clone(&keys));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    loop_handle.await.context("receiver task failed")?;
    Ok(())
}

/// SIGHUP re-reads the config file and rotates the heartbeat key. Other
/// settings need a restart; the key is the one that must not.
#[cfg(unix)]
fn spawn_reload_handler(path: PathBuf, keys: Arc<SharedKey>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hup = match signal(SignalKind::hangup()) {
            Ok(hup) => hup,
            Err(e) => {
                tracing::warn!(error = %e, "SIGHUP handler unavailable, reload disabled");
                return;
            }
        };
        while hup.recv().await.is_some() {
            match CollectorConfig::load(&path) {
                Ok(new_config) => {
                    keys.rotate(new_config.heartbeat_key.into_bytes());
                    tracing::info!("configuration reloaded, heartbeat key rotated");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "config reload failed, keeping previous settings");
                }
            }
        }
    });
}
