//! In-memory topology store.
//!
//! Backs the reconciler tests and the demo collector. Every accepted
//! status update both mutates the stored record and lands in a call log,
//! so tests can assert exactly which writes a heartbeat produced.

use std::collections::HashMap;
use std::sync::Mutex;

use pulse_protocol::OperatingStatus;

use crate::model::{AgentLivenessRecord, LoadBalancerRecord};
use crate::repository::{
    ComputeDriver, LivenessRepository, RepositoryError, TopologyRepository,
};

/// Which entity level a status write targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    LoadBalancer,
    Listener,
    Pool,
    Member,
}

/// One accepted status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusWrite {
    pub kind: WriteKind,
    pub id: String,
    pub status: OperatingStatus,
}

/// Failure injected into subsequent updates of one entity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    NotFound,
    Backend,
}

#[derive(Default)]
struct MemoryState {
    load_balancers: HashMap<String, LoadBalancerRecord>,
    /// Agent registry: agent id → its recorded load-balancer id, if any.
    agents: HashMap<String, Option<String>>,
    liveness: HashMap<String, AgentLivenessRecord>,
    writes: Vec<StatusWrite>,
    deleted_agents: Vec<String>,
    fail: Option<(WriteKind, FailMode)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_load_balancer(&self, record: LoadBalancerRecord) {
        self.lock().load_balancers.insert(record.id.clone(), record);
    }

    /// Record an agent and the load balancer it fronts (`None` for an
    /// agent with no association at all).
    pub fn register_agent(&self, agent_id: &str, load_balancer_id: Option<&str>) {
        self.lock()
            .agents
            .insert(agent_id.to_string(), load_balancer_id.map(String::from));
    }

    /// Make subsequent updates of `kind` fail with `mode`.
    pub fn fail_updates(&self, kind: WriteKind, mode: FailMode) {
        self.lock().fail = Some((kind, mode));
    }

    pub fn writes(&self) -> Vec<StatusWrite> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    pub fn liveness_record(&self, agent_id: &str) -> Option<AgentLivenessRecord> {
        self.lock().liveness.get(agent_id).cloned()
    }

    pub fn deleted_agents(&self) -> Vec<String> {
        self.lock().deleted_agents.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn update(
        &self,
        kind: WriteKind,
        id: &str,
        status: OperatingStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if let Some((fail_kind, mode)) = state.fail {
            if fail_kind == kind {
                return Err(match mode {
                    FailMode::NotFound => RepositoryError::NotFound,
                    FailMode::Backend => RepositoryError::Backend("injected failure".into()),
                });
            }
        }
        let mut found = false;
        for lb in state.load_balancers.values_mut() {
            match kind {
                WriteKind::LoadBalancer => {
                    if lb.id == id {
                        lb.operating_status = status;
                        found = true;
                    }
                }
                WriteKind::Listener => {
                    if let Some(listener) = lb.listeners.get_mut(id) {
                        listener.operating_status = status;
                        found = true;
                    }
                }
                WriteKind::Pool => {
                    if let Some(pool) = lb.pools.get_mut(id) {
                        pool.operating_status = status;
                        found = true;
                    }
                }
                WriteKind::Member => {
                    for pool in lb.pools.values_mut() {
                        if let Some(member) = pool.members.get_mut(id) {
                            member.operating_status = status;
                            found = true;
                        }
                    }
                }
            }
            if found {
                break;
            }
        }
        if !found {
            return Err(RepositoryError::NotFound);
        }
        state.writes.push(StatusWrite {
            kind,
            id: id.to_string(),
            status,
        });
        Ok(())
    }
}

impl TopologyRepository for MemoryStore {
    fn lb_for_agent(
        &self,
        agent_id: &str,
    ) -> Result<Option<LoadBalancerRecord>, RepositoryError> {
        let state = self.lock();
        let Some(Some(lb_id)) = state.agents.get(agent_id) else {
            return Ok(None);
        };
        Ok(state.load_balancers.get(lb_id).cloned())
    }

    fn agent_load_balancer_id(
        &self,
        agent_id: &str,
    ) -> Result<Option<String>, RepositoryError> {
        Ok(self.lock().agents.get(agent_id).cloned().flatten())
    }

    fn update_load_balancer(
        &self,
        id: &str,
        status: OperatingStatus,
    ) -> Result<(), RepositoryError> {
        self.update(WriteKind::LoadBalancer, id, status)
    }

    fn update_listener(&self, id: &str, status: OperatingStatus) -> Result<(), RepositoryError> {
        self.update(WriteKind::Listener, id, status)
    }

    fn update_pool(&self, id: &str, status: OperatingStatus) -> Result<(), RepositoryError> {
        self.update(WriteKind::Pool, id, status)
    }

    fn update_member(&self, id: &str, status: OperatingStatus) -> Result<(), RepositoryError> {
        self.update(WriteKind::Member, id, status)
    }
}

impl LivenessRepository for MemoryStore {
    fn replace(&self, record: AgentLivenessRecord) -> Result<(), RepositoryError> {
        self.lock()
            .liveness
            .insert(record.agent_id.clone(), record);
        Ok(())
    }
}

impl ComputeDriver for MemoryStore {
    fn delete_agent(&self, agent_id: &str) -> Result<(), RepositoryError> {
        self.lock().deleted_agents.push(agent_id.to_string());
        Ok(())
    }
}
