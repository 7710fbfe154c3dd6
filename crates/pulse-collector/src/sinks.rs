//! Glue between the transport sink traits and the state machinery.

use std::net::SocketAddr;

use pulse_network::{HealthSink, StatsSink};
use pulse_protocol::HeartbeatMessage;
use pulse_state::{HealthReconciler, Outcome};

/// Feeds decoded heartbeats into the reconciler and contains every
/// per-heartbeat failure: the receive loop only ever sees log lines.
pub struct ReconcilerSink {
    reconciler: HealthReconciler,
}

impl ReconcilerSink {
    pub fn new(reconciler: HealthReconciler) -> Self {
        Self { reconciler }
    }
}

impl HealthSink for ReconcilerSink {
    fn reconcile(&self, heartbeat: HeartbeatMessage, source: SocketAddr) {
        match self.reconciler.reconcile(&heartbeat, source) {
            Ok(Outcome::Reconciled) => {}
            Ok(Outcome::Skipped(reason)) => {
                tracing::debug!(agent = %heartbeat.id, ?reason, "heartbeat skipped");
            }
            Err(e) => {
                tracing::error!(agent = %heartbeat.id, error = %e, "reconciliation failed");
            }
        }
    }
}

/// Statistics recording proper lives outside the collector; counters are
/// surfaced at debug level with the delta flag the downstream consumer
/// needs.
pub struct LogStatsSink;

impl StatsSink for LogStatsSink {
    fn record(&self, heartbeat: HeartbeatMessage) {
        let Some(listeners) = &heartbeat.listeners else {
            return;
        };
        for (listener_id, listener) in listeners {
            if let Some(stats) = &listener.stats {
                tracing::debug!(
                    agent = %heartbeat.id,
                    listener = %listener_id,
                    seq = ?heartbeat.seq,
                    deltas = heartbeat.stats_are_deltas(),
                    rx = stats.rx,
                    tx = stats.tx,
                    conns = stats.conns,
                    totconns = stats.totconns,
                    ereq = stats.ereq,
                    "listener statistics"
                );
            }
        }
    }
}
