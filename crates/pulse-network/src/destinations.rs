//! Destination endpoints for outbound heartbeats.
//!
//! Endpoints are configured as `host:port` strings (IPv6 literals may be
//! bracketed) and resolved to socket addresses. Selection is strict
//! round-robin: pop from the front, push to the back, so every destination
//! sees exactly one send per full cycle.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

/// Reloadable list of configured endpoint strings, shared between the
/// sender and whatever reloads the configuration. The sender compares its
/// last-seen copy against this on every send.
#[derive(Clone, Default)]
pub struct SharedEndpoints {
    inner: Arc<RwLock<Vec<String>>>,
}

impl SharedEndpoints {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(endpoints)),
        }
    }

    /// Swap in a new endpoint list. Senders pick it up on their next send.
    pub fn replace(&self, endpoints: Vec<String>) {
        match self.inner.write() {
            Ok(mut guard) => *guard = endpoints,
            Err(poisoned) => *poisoned.into_inner() = endpoints,
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Split a `host:port` endpoint, unbracketing IPv6 literals.
///
/// `"[2001:db8::1]:5555"` → `("2001:db8::1", 5555)`.
pub fn split_endpoint(endpoint: &str) -> Option<(String, u16)> {
    let (host, port) = endpoint.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port))
}

/// Resolve each configured endpoint to one socket address (first answer
/// wins). Entries that fail to parse or resolve are logged and skipped so
/// one bad entry cannot take down the rest of the list.
pub async fn resolve_endpoints(endpoints: &[String]) -> VecDeque<SocketAddr> {
    let mut dests = VecDeque::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let Some((host, port)) = split_endpoint(endpoint) else {
            tracing::error!(%endpoint, "invalid endpoint in destination list");
            continue;
        };
        match tokio::net::lookup_host((host.as_str(), port)).await {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => dests.push_back(addr),
                None => tracing::warn!(%endpoint, "endpoint resolved to no addresses"),
            },
            Err(e) => tracing::warn!(%endpoint, error = %e, "failed to resolve endpoint"),
        };
    }
    dests
}

/// Rotate the ring: the front destination is returned and requeued at the
/// back. `None` only when the ring is empty.
pub fn round_robin(ring: &mut VecDeque<SocketAddr>) -> Option<SocketAddr> {
    let addr = ring.pop_front()?;
    ring.push_back(addr);
    Some(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_host() {
        assert_eq!(
            split_endpoint("collector.example.com:5555"),
            Some(("collector.example.com".to_string(), 5555))
        );
    }

    #[test]
    fn test_split_unbrackets_ipv6() {
        assert_eq!(
            split_endpoint("[2001:db8::1]:5555"),
            Some(("2001:db8::1".to_string(), 5555))
        );
    }

    #[test]
    fn test_split_rejects_garbage() {
        assert_eq!(split_endpoint("no-port-here"), None);
        assert_eq!(split_endpoint(":5555"), None);
        assert_eq!(split_endpoint("host:notaport"), None);
    }

    #[test]
    fn test_round_robin_full_cycle_restores_order() {
        let addrs: Vec<SocketAddr> = (0..4)
            .map(|i| format!("192.0.2.{}:5555", i + 1).parse().unwrap())
            .collect();
        let mut ring: VecDeque<SocketAddr> = addrs.iter().copied().collect();

        let picked: Vec<SocketAddr> = (0..addrs.len())
            .map(|_| round_robin(&mut ring).unwrap())
            .collect();
        assert_eq!(picked, addrs, "each destination gets exactly one send");
        assert_eq!(
            ring.iter().copied().collect::<Vec<_>>(),
            addrs,
            "order after a full cycle equals the original order"
        );
    }

    #[test]
    fn test_round_robin_empty_ring() {
        let mut ring = VecDeque::new();
        assert_eq!(round_robin(&mut ring), None);
    }
}
