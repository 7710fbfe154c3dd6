//! Outbound heartbeat sender.
//!
//! One datagram per send, best effort, no retry: failover relies on
//! destination redundancy and the next scheduled heartbeat, not on any
//! individual datagram arriving.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use pulse_protocol::{envelope, HeartbeatMessage, KeySource};

use crate::destinations::{resolve_endpoints, round_robin, SharedEndpoints};
use crate::error::NetworkError;

pub struct UdpStatusSender {
    keys: Arc<dyn KeySource>,
    endpoints: SharedEndpoints,
    /// Endpoint list the current ring was resolved from; compared against
    /// the shared list on every send to pick up hot reloads.
    configured: Vec<String>,
    ring: VecDeque<SocketAddr>,
    v4: UdpSocket,
    /// Absent on hosts without IPv6; v6 destinations are then skipped.
    v6: Option<UdpSocket>,
}

impl UdpStatusSender {
    /// Open one wildcard-bound socket per address family and resolve the
    /// initial destination list.
    pub async fn new(
        endpoints: SharedEndpoints,
        keys: Arc<dyn KeySource>,
    ) -> Result<Self, NetworkError> {
        let v4 = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .map_err(|e| NetworkError::Config(format!("open IPv4 send socket: {e}")))?;
        let v6 = match UdpSocket::bind(("::", 0)).await {
            Ok(socket) => Some(socket),
            Err(e) => {
                tracing::warn!(error = %e, "IPv6 send socket unavailable, v6 destinations will be skipped");
                None
            }
        };
        let configured = endpoints.snapshot();
        let ring = resolve_endpoints(&configured).await;
        Ok(Self {
            keys,
            endpoints,
            configured,
            ring,
            v4,
            v6,
        })
    }

    /// Send one heartbeat to the next destination in the rotation.
    ///
    /// Rebuilds the destination ring first if the configured list changed
    /// since the last send. Transport errors are swallowed at debug level;
    /// they are expected while agent networks come up.
    pub async fn send(&mut self, heartbeat: &HeartbeatMessage) {
        let configured = self.endpoints.snapshot();
        if configured != self.configured {
            tracing::info!(
                count = configured.len(),
                "destination list changed, rebuilding"
            );
            self.ring = resolve_endpoints(&configured).await;
            self.configured = configured;
        }

        let Some(dest) = round_robin(&mut self.ring) else {
            tracing::error!("no destination available, heartbeat not sent");
            return;
        };

        let sealed = match envelope::wrap(heartbeat, &self.keys.current_key()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to seal heartbeat");
                return;
            }
        };

        let socket = if dest.is_ipv4() {
            Some(&self.v4)
        } else {
            self.v6.as_ref()
        };
        let Some(socket) = socket else {
            tracing::debug!(%dest, "no IPv6 socket, destination skipped");
            return;
        };
        if let Err(e) = socket.send_to(&sealed, dest).await {
            tracing::debug!(%dest, error = %e, "heartbeat send failed");
        }
    }

    /// Destinations currently in the rotation, front of the ring first.
    pub fn destinations(&self) -> Vec<SocketAddr> {
        self.ring.iter().copied().collect()
    }
}
