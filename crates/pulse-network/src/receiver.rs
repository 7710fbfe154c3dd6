//! Inbound heartbeat receiver.
//!
//! One socket, one single-threaded receive loop. Every decoded heartbeat
//! fans out to two independent bounded pools (reconciliation and
//! statistics) so neither can stall the other or the socket. A bad packet
//! is logged and dropped; only the shutdown signal ends the loop.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::sync::watch;

use pulse_protocol::{envelope, HeartbeatMessage, KeySource, ProtocolError};

use crate::destinations::split_endpoint;
use crate::error::NetworkError;
use crate::workers::WorkerPool;

/// Largest datagram the receiver will accept. Heartbeats are compressed
/// and far smaller in practice.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Consumes decoded heartbeats for status reconciliation. Implementations
/// contain their own failures; a heartbeat that cannot be reconciled is
/// logged, never propagated to the loop.
pub trait HealthSink: Send + Sync {
    fn reconcile(&self, heartbeat: HeartbeatMessage, source: SocketAddr);
}

/// Consumes decoded heartbeats for statistics recording.
pub trait StatsSink: Send + Sync {
    fn record(&self, heartbeat: HeartbeatMessage);
}

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// `host:port` to bind; the first resolved address wins.
    pub bind: String,
    /// `SO_RCVBUF` ceiling in bytes; 0 leaves the OS default.
    pub recv_buffer_bytes: usize,
    pub health_workers: usize,
    pub stats_workers: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5555".to_string(),
            recv_buffer_bytes: 0,
            health_workers: 8,
            stats_workers: 4,
        }
    }
}

/// A single receive attempt's failure.
#[derive(Debug, Error)]
pub enum RecvError {
    /// The packet failed envelope validation and must not be processed.
    #[error(transparent)]
    Integrity(#[from] ProtocolError),
    #[error("receive failed: {0}")]
    Io(#[from] std::io::Error),
}

pub struct UdpStatusReceiver {
    socket: tokio::net::UdpSocket,
    local_addr: SocketAddr,
    keys: Arc<dyn KeySource>,
    health: Arc<dyn HealthSink>,
    stats: Arc<dyn StatsSink>,
    health_pool: WorkerPool,
    stats_pool: WorkerPool,
    shutdown: watch::Receiver<bool>,
}

impl UdpStatusReceiver {
    /// Resolve and bind the configured address. Any failure here is fatal:
    /// the collector cannot run without its socket.
    pub async fn bind(
        config: &ReceiverConfig,
        keys: Arc<dyn KeySource>,
        health: Arc<dyn HealthSink>,
        stats: Arc<dyn StatsSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, NetworkError> {
        let addr = resolve_bind_addr(&config.bind).await?;
        let socket = bind_udp(addr, config.recv_buffer_bytes)?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| NetworkError::Config(format!("query bound address: {e}")))?;
        Ok(Self {
            socket,
            local_addr,
            keys,
            health,
            stats,
            health_pool: WorkerPool::new("health", config.health_workers),
            stats_pool: WorkerPool::new("stats", config.stats_workers),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive one datagram and decode it, stamping the receive time.
    ///
    /// A [`RecvError::Integrity`] packet must not be processed further.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(HeartbeatMessage, SocketAddr), RecvError> {
        let (len, src) = self.socket.recv_from(buf).await?;
        let mut heartbeat = envelope::unwrap(&buf[..len], &self.keys.current_key())?;
        heartbeat.received_at = Some(Utc::now());
        Ok((heartbeat, src))
    }

    /// Run the receive loop until shutdown is signaled, then drain both
    /// worker pools before releasing the socket.
    pub async fn run(self) {
        tracing::info!(addr = %self.local_addr, "heartbeat receiver listening");
        let mut shutdown = self.shutdown.clone();
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = self.recv(&mut buf) => {
                    match received {
                        Ok((heartbeat, src)) => self.dispatch(heartbeat, src),
                        Err(RecvError::Integrity(e)) => {
                            tracing::warn!(error = %e, "dropping bad heartbeat packet");
                        }
                        Err(RecvError::Io(e)) => {
                            tracing::warn!(error = %e, "receive failed");
                        }
                    }
                }
            }
        }
        tracing::info!("receiver shutting down, draining worker pools");
        self.health_pool.drain().await;
        self.stats_pool.drain().await;
    }

    fn dispatch(&self, heartbeat: HeartbeatMessage, src: SocketAddr) {
        let agent_id = heartbeat.id.clone();
        tracing::debug!(agent = %agent_id, %src, "heartbeat received");

        let health = Arc::clone(&self.health);
        let for_health = heartbeat.clone();
        self.health_pool
            .dispatch(move || health.reconcile(for_health, src));

        let stats = Arc::clone(&self.stats);
        self.stats_pool.dispatch(move || stats.record(heartbeat));
    }
}

async fn resolve_bind_addr(bind: &str) -> Result<SocketAddr, NetworkError> {
    let (host, port) = split_endpoint(bind)
        .ok_or_else(|| NetworkError::Config(format!("invalid bind address '{bind}'")))?;
    let mut addrs = tokio::net::lookup_host((host.as_str(), port))
        .await
        .map_err(|e| NetworkError::Config(format!("resolve bind address '{bind}': {e}")))?;
    addrs
        .next()
        .ok_or_else(|| NetworkError::Config(format!("bind address '{bind}' resolved to nothing")))
}

/// Open, tune and bind the datagram socket, then hand it to tokio.
/// Raising `SO_RCVBUF` is advisory; bind proceeds even if the kernel
/// refuses.
fn bind_udp(addr: SocketAddr, recv_buffer_bytes: usize) -> Result<tokio::net::UdpSocket, NetworkError> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::Config(format!("open receive socket: {e}")))?;
    if recv_buffer_bytes > 0 {
        match socket.set_recv_buffer_size(recv_buffer_bytes) {
            Ok(()) => tracing::info!(bytes = recv_buffer_bytes, "receive buffer ceiling set"),
            Err(e) => tracing::warn!(
                bytes = recv_buffer_bytes,
                error = %e,
                "could not raise receive buffer"
            ),
        }
    }
    socket
        .set_nonblocking(true)
        .map_err(|e| NetworkError::Config(format!("set nonblocking: {e}")))?;
    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::Config(format!("bind {addr}: {e}")))?;
    tokio::net::UdpSocket::from_std(socket.into())
        .map_err(|e| NetworkError::Config(format!("register socket with runtime: {e}")))
}
