//! Fleetpulse health state: the persisted topology view, the bottom-up
//! reconciliation state machine, and agent liveness tracking.

pub mod liveness;
pub mod memory;
pub mod model;
pub mod reconciler;
pub mod repository;

pub use liveness::LivenessTracker;
pub use memory::{FailMode, MemoryStore, StatusWrite, WriteKind};
pub use model::{
    AgentLivenessRecord, ListenerProtocol, ListenerRecord, LoadBalancerRecord, MemberRecord,
    PoolRecord,
};
pub use reconciler::{HealthReconciler, Outcome, ReconcileError, Skip};
pub use repository::{ComputeDriver, LivenessRepository, RepositoryError, TopologyRepository};
