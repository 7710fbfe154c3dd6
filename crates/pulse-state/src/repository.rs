//! Capability seams to the persistence layer and external drivers.
//!
//! The reconciler only ever talks to these traits; production wires them
//! to the relational store and the compute service, tests and the demo
//! collector to [`crate::memory::MemoryStore`].

use thiserror::Error;

use pulse_protocol::OperatingStatus;

use crate::model::{AgentLivenessRecord, LoadBalancerRecord};

#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The entity was deleted concurrently. The caller skips it and moves
    /// on to its siblings.
    #[error("entity not found")]
    NotFound,

    /// Any other backend failure. Aborts the remaining writes for the
    /// heartbeat being processed.
    #[error("repository backend failure: {0}")]
    Backend(String),
}

/// Read and write the persisted load-balancer topology.
pub trait TopologyRepository: Send + Sync {
    /// The full tree behind the agent's load balancer, or `None` when the
    /// agent currently maps to no load balancer (zombie candidate).
    fn lb_for_agent(&self, agent_id: &str)
        -> Result<Option<LoadBalancerRecord>, RepositoryError>;

    /// The load-balancer id recorded against the agent itself, if any.
    /// Consulted when [`Self::lb_for_agent`] misses, to tell a true zombie
    /// from a transient lookup race.
    fn agent_load_balancer_id(&self, agent_id: &str)
        -> Result<Option<String>, RepositoryError>;

    fn update_load_balancer(
        &self,
        id: &str,
        status: OperatingStatus,
    ) -> Result<(), RepositoryError>;

    fn update_listener(&self, id: &str, status: OperatingStatus) -> Result<(), RepositoryError>;

    fn update_pool(&self, id: &str, status: OperatingStatus) -> Result<(), RepositoryError>;

    fn update_member(&self, id: &str, status: OperatingStatus) -> Result<(), RepositoryError>;
}

/// Stores agent liveness. Replace, never merge.
pub trait LivenessRepository: Send + Sync {
    fn replace(&self, record: AgentLivenessRecord) -> Result<(), RepositoryError>;
}

/// Deletes the compute resource behind an orphaned agent.
pub trait ComputeDriver: Send + Sync {
    fn delete_agent(&self, agent_id: &str) -> Result<(), RepositoryError>;
}
