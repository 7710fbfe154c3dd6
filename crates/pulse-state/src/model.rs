//! Persisted topology view and liveness records.
//!
//! One load balancer's tree as the reconciler sees it: fetched fresh per
//! heartbeat, compared against the reported snapshot, selectively flushed.
//! Never cached across heartbeats.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pulse_protocol::OperatingStatus;

/// Transport protocol of a listener. Only the UDP distinction changes
/// reconciler behavior (see the listener-count guard).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerProtocol {
    Tcp,
    Udp,
    Http,
    Https,
    #[serde(other)]
    Other,
}

/// One load balancer's persisted tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerRecord {
    pub id: String,
    /// Administrative state. A disabled load balancer is `OFFLINE` no
    /// matter what its children report.
    pub enabled: bool,
    /// Control-plane lifecycle state; informational to the reconciler.
    pub provisioning_status: String,
    pub operating_status: OperatingStatus,
    pub listeners: HashMap<String, ListenerRecord>,
    pub pools: HashMap<String, PoolRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerRecord {
    pub operating_status: OperatingStatus,
    pub protocol: ListenerProtocol,
    pub enabled: bool,
    pub default_pool_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolRecord {
    pub operating_status: OperatingStatus,
    /// Whether an active health monitor is attached. Without one the data
    /// plane cannot distinguish up from down, and member reports are
    /// normalized to `NO_MONITOR`.
    pub has_health_monitor: bool,
    pub members: HashMap<String, MemberRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    pub operating_status: OperatingStatus,
    pub enabled: bool,
}

/// Last-seen record for one agent. Replaced wholesale on every processed
/// heartbeat; merge semantics would let stale fields survive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLivenessRecord {
    pub agent_id: String,
    pub source_address: IpAddr,
    pub last_seen: DateTime<Utc>,
}
