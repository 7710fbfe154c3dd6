//! Agent liveness tracking.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::Utc;

use crate::model::AgentLivenessRecord;
use crate::repository::{LivenessRepository, RepositoryError};

/// Maintains the per-agent last-seen record consumed by zombie sweeps and
/// failover decisions elsewhere in the control plane.
pub struct LivenessTracker {
    repo: Arc<dyn LivenessRepository>,
}

impl LivenessTracker {
    pub fn new(repo: Arc<dyn LivenessRepository>) -> Self {
        Self { repo }
    }

    /// Overwrite the agent's last-seen record with the current time.
    /// Replace, never merge: a field from a previous record must not
    /// survive the overwrite.
    pub fn mark_seen(&self, agent_id: &str, source: IpAddr) -> Result<(), RepositoryError> {
        self.repo.replace(AgentLivenessRecord {
            agent_id: agent_id.to_string(),
            source_address: source,
            last_seen: Utc::now(),
        })
    }
}
