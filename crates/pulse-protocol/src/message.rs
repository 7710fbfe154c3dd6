//! Heartbeat payload types for wire versions 1 through 3.
//!
//! v1 nests pools under each listener. v2 hoists pools to a top-level map
//! keyed `"poolId:listenerId"` so a pool shared by several listeners is
//! reported once per pairing; v3 keeps the v2 shape and switches the
//! statistics interpretation to deltas.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::StatusToken;

fn default_version() -> u8 {
    1
}

/// Decoded heartbeat payload from one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    /// Agent id. Always present.
    pub id: String,
    /// Wire format version, 1..=3.
    #[serde(default = "default_version")]
    pub ver: u8,
    /// Monotonic sequence number, v2+.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Reported listeners. Absent means "no change reported", not "empty".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listeners: Option<HashMap<String, ListenerReport>>,
    /// v2/v3 top-level pools, keyed `"poolId:listenerId"` on the wire.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub pools: HashMap<String, PoolReport>,
    /// Stamped by the receiver when the envelope is decoded. Never on the
    /// wire; staleness is judged against the receiver's clock only.
    #[serde(skip)]
    pub received_at: Option<DateTime<Utc>>,
}

impl HeartbeatMessage {
    /// Whether the statistics in this heartbeat are deltas since the last
    /// sequence number rather than absolute counters.
    pub fn stats_are_deltas(&self) -> bool {
        self.ver >= 3
    }

    /// All pool reports in this heartbeat, v1-nested and v2/v3-flat alike,
    /// each attributed to its listener where the wire form carries one.
    pub fn pool_reports(&self) -> Vec<PoolObservation<'_>> {
        let mut out = Vec::new();
        if let Some(listeners) = &self.listeners {
            for (listener_id, listener) in listeners {
                for (pool_id, report) in &listener.pools {
                    out.push(PoolObservation {
                        key: PoolKey {
                            pool_id: pool_id.clone(),
                            listener_id: Some(listener_id.clone()),
                        },
                        report,
                    });
                }
            }
        }
        for (raw, report) in &self.pools {
            out.push(PoolObservation {
                key: PoolKey::parse(raw),
                report,
            });
        }
        out
    }
}

/// One listener's report inside a heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerReport {
    pub status: StatusToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ListenerStats>,
    /// v1 only: pools nested under their listener.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub pools: HashMap<String, PoolReport>,
}

/// Traffic counters for one listener, wire field names per the data plane.
/// Absolute in v1/v2 heartbeats, deltas in v3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ListenerStats {
    /// Request errors.
    pub ereq: u64,
    /// Active connections.
    pub conns: u64,
    /// Total connections.
    pub totconns: u64,
    /// Bytes in.
    pub rx: u64,
    /// Bytes out.
    pub tx: u64,
}

/// One pool's report inside a heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolReport {
    pub status: StatusToken,
    #[serde(default)]
    pub members: HashMap<String, MemberReport>,
}

/// Member health: a bare token in v1, a `{status}` object in v2/v3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberReport {
    Token(StatusToken),
    Object { status: StatusToken },
}

impl MemberReport {
    pub fn status(&self) -> &StatusToken {
        match self {
            Self::Token(token) => token,
            Self::Object { status } => status,
        }
    }
}

/// Structured form of the v2/v3 wire pool key `"poolId:listenerId"`.
///
/// Parsed exactly once, here; nothing downstream splits strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub pool_id: String,
    pub listener_id: Option<String>,
}

impl PoolKey {
    /// Parse a wire key. A key without a separator is a bare pool id with
    /// no listener attribution.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((pool_id, listener_id)) => Self {
                pool_id: pool_id.to_string(),
                listener_id: Some(listener_id.to_string()),
            },
            None => Self {
                pool_id: raw.to_string(),
                listener_id: None,
            },
        }
    }

    /// The wire spelling of this key.
    pub fn wire(&self) -> String {
        match &self.listener_id {
            Some(listener_id) => format!("{}:{}", self.pool_id, listener_id),
            None => self.pool_id.clone(),
        }
    }
}

/// One pool observation from a heartbeat, in either wire form.
#[derive(Debug)]
pub struct PoolObservation<'a> {
    pub key: PoolKey,
    pub report: &'a PoolReport,
}
