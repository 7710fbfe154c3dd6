//! Bottom-up health reconciliation.
//!
//! One heartbeat in, the minimal set of status writes out. The persisted
//! tree is fetched fresh, compared level by level (member → pool →
//! listener → load balancer), and only transitions are written. Partial or
//! stale views never downgrade healthy objects.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use thiserror::Error;

use pulse_protocol::{HeartbeatMessage, OperatingStatus, PoolReport, StatusToken};

use crate::liveness::LivenessTracker;
use crate::model::{ListenerProtocol, ListenerRecord, LoadBalancerRecord, PoolRecord};
use crate::repository::{ComputeDriver, RepositoryError, TopologyRepository};

/// Why a heartbeat produced no status writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// The agent has no load balancer anywhere; its compute was deleted.
    Zombie,
    /// A load-balancer id is on record but the tree lookup missed.
    /// Liveness only; the next heartbeat retries.
    LookupRace,
    /// The heartbeat is older than the configured interval.
    Stale,
    /// The heartbeat carried no listener inventory at all.
    NothingReported,
    /// Reported listener count disagreed with the expected count.
    InconsistentTopology,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Statuses were examined; only changed entities were written.
    Reconciled,
    Skipped(Skip),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A repository failure other than not-found; the remaining writes for
    /// this heartbeat were abandoned.
    #[error("status writes aborted: {0}")]
    Aborted(#[from] RepositoryError),
}

pub struct HealthReconciler {
    topology: Arc<dyn TopologyRepository>,
    liveness: LivenessTracker,
    compute: Arc<dyn ComputeDriver>,
    /// Heartbeats older than this are distrusted and dropped.
    heartbeat_interval: Duration,
}

impl HealthReconciler {
    pub fn new(
        topology: Arc<dyn TopologyRepository>,
        liveness: LivenessTracker,
        compute: Arc<dyn ComputeDriver>,
        heartbeat_interval: std::time::Duration,
    ) -> Self {
        Self {
            topology,
            liveness,
            compute,
            heartbeat_interval: Duration::from_std(heartbeat_interval)
                .unwrap_or_else(|_| Duration::seconds(10)),
        }
    }

    /// Process one decoded heartbeat against the persisted topology.
    ///
    /// Every failure is contained to this heartbeat: callers log the error
    /// and move on, the receive loop never sees it.
    pub fn reconcile(
        &self,
        heartbeat: &HeartbeatMessage,
        source: SocketAddr,
    ) -> Result<Outcome, ReconcileError> {
        let agent_id = heartbeat.id.as_str();

        let Some(lb) = self.topology.lb_for_agent(agent_id)? else {
            return self.handle_missing_lb(agent_id, source);
        };

        if let Some(received_at) = heartbeat.received_at {
            let age = Utc::now().signed_duration_since(received_at);
            if age > self.heartbeat_interval {
                tracing::debug!(
                    agent = %agent_id,
                    age_secs = age.num_seconds(),
                    "discarding stale heartbeat"
                );
                return Ok(Outcome::Skipped(Skip::Stale));
            }
        }

        if lb.provisioning_status != "ACTIVE" {
            tracing::debug!(
                agent = %agent_id,
                lb = %lb.id,
                provisioning_status = %lb.provisioning_status,
                "reconciling load balancer in transitional provisioning state"
            );
        }

        // The status pass and the liveness refresh are independent: the
        // last-seen record is written however the pass went.
        let result = self.apply_status_updates(heartbeat, &lb);
        if let Err(e) = self.liveness.mark_seen(agent_id, source.ip()) {
            tracing::warn!(agent = %agent_id, error = %e, "liveness update failed");
        }
        result
    }

    /// Step 1 fallout: no tree for this agent. A recorded load-balancer id
    /// means the lookup raced a concurrent change; none at all means the
    /// agent fronts nothing and its compute resource should go.
    fn handle_missing_lb(
        &self,
        agent_id: &str,
        source: SocketAddr,
    ) -> Result<Outcome, ReconcileError> {
        match self.topology.agent_load_balancer_id(agent_id)? {
            Some(lb_id) => {
                tracing::debug!(
                    agent = %agent_id,
                    lb = %lb_id,
                    "tree lookup missed for a known load balancer, keeping agent alive"
                );
                if let Err(e) = self.liveness.mark_seen(agent_id, source.ip()) {
                    tracing::warn!(agent = %agent_id, error = %e, "liveness update failed");
                }
                Ok(Outcome::Skipped(Skip::LookupRace))
            }
            None => {
                tracing::info!(agent = %agent_id, "heartbeat from zombie agent, deleting");
                if let Err(e) = self.compute.delete_agent(agent_id) {
                    tracing::warn!(agent = %agent_id, error = %e, "zombie delete failed");
                }
                Ok(Outcome::Skipped(Skip::Zombie))
            }
        }
    }

    fn apply_status_updates(
        &self,
        heartbeat: &HeartbeatMessage,
        lb: &LoadBalancerRecord,
    ) -> Result<Outcome, ReconcileError> {
        let Some(reported_listeners) = &heartbeat.listeners else {
            tracing::debug!(agent = %heartbeat.id, "heartbeat carried no listener inventory");
            return Ok(Outcome::Skipped(Skip::NothingReported));
        };

        let expected = expected_listener_count(lb);
        if reported_listeners.len() != expected {
            tracing::warn!(
                agent = %heartbeat.id,
                lb = %lb.id,
                reported = reported_listeners.len(),
                expected,
                "listener inventory mismatch, skipping status writes"
            );
            return Ok(Outcome::Skipped(Skip::InconsistentTopology));
        }

        let mut lb_status = if lb.enabled {
            OperatingStatus::Online
        } else {
            OperatingStatus::Offline
        };

        for (listener_id, report) in reported_listeners {
            let Some(known) = lb.listeners.get(listener_id) else {
                tracing::debug!(listener = %listener_id, "reported listener not in topology, skipping");
                continue;
            };
            if !known.enabled {
                continue;
            }
            let computed = listener_status(&report.status);
            if computed == OperatingStatus::Error && lb_status == OperatingStatus::Online {
                lb_status = OperatingStatus::Degraded;
            }
            self.write_if_changed(Level::Listener, listener_id, computed, known.operating_status)?;
        }

        // Pools are deduplicated by id: a pool shared by several listeners
        // is reconciled once, on its first occurrence.
        let mut processed: HashSet<&str> = HashSet::new();
        let observations = heartbeat.pool_reports();
        for obs in &observations {
            let pool_id = obs.key.pool_id.as_str();
            if !processed.insert(pool_id) {
                continue;
            }
            let Some(known) = lb.pools.get(pool_id) else {
                tracing::debug!(pool = %pool_id, "reported pool not in topology, skipping");
                continue;
            };
            self.process_pool(pool_id, obs.report, known)?;
        }

        // A pool nothing reported has no active member behind it.
        for (pool_id, known) in &lb.pools {
            if processed.contains(pool_id.as_str()) {
                continue;
            }
            self.write_if_changed(
                Level::Pool,
                pool_id,
                OperatingStatus::Offline,
                known.operating_status,
            )?;
        }

        self.write_if_changed(Level::LoadBalancer, &lb.id, lb_status, lb.operating_status)?;
        Ok(Outcome::Reconciled)
    }

    /// Members first, then the pool itself so member errors can feed back
    /// into the pool status.
    fn process_pool(
        &self,
        pool_id: &str,
        report: &PoolReport,
        known: &PoolRecord,
    ) -> Result<(), ReconcileError> {
        let mut member_error = false;
        for (member_id, member) in &report.members {
            let Some(known_member) = known.members.get(member_id) else {
                tracing::debug!(member = %member_id, "reported member not in topology, skipping");
                continue;
            };
            let Some(computed) = member_status(member.status(), known.has_health_monitor) else {
                tracing::warn!(
                    member = %member_id,
                    token = %member.status(),
                    "unrecognized member status token, skipping"
                );
                continue;
            };
            if computed == OperatingStatus::Error {
                member_error = true;
            }
            self.write_if_changed(
                Level::Member,
                member_id,
                computed,
                known_member.operating_status,
            )?;
        }

        // Members in the persisted pool that no longer report are
        // administratively down on the data plane, unless they were never
        // monitored, in which case silence is their normal state.
        for (member_id, known_member) in &known.members {
            if report.members.contains_key(member_id) {
                continue;
            }
            if known_member.operating_status == OperatingStatus::NoMonitor {
                continue;
            }
            self.write_if_changed(
                Level::Member,
                member_id,
                OperatingStatus::Offline,
                known_member.operating_status,
            )?;
        }

        let mut computed = pool_status(&report.status);
        if computed == OperatingStatus::Online && member_error {
            computed = OperatingStatus::Degraded;
        }
        self.write_if_changed(Level::Pool, pool_id, computed, known.operating_status)
    }

    /// No-op suppression and the not-found contract live here: unchanged
    /// statuses are never written, and an entity deleted mid-pass is
    /// skipped while its siblings continue.
    fn write_if_changed(
        &self,
        level: Level,
        id: &str,
        computed: OperatingStatus,
        current: OperatingStatus,
    ) -> Result<(), ReconcileError> {
        if computed == current {
            return Ok(());
        }
        let result = match level {
            Level::LoadBalancer => self.topology.update_load_balancer(id, computed),
            Level::Listener => self.topology.update_listener(id, computed),
            Level::Pool => self.topology.update_pool(id, computed),
            Level::Member => self.topology.update_member(id, computed),
        };
        match result {
            Ok(()) => {
                tracing::info!(
                    level = level.as_str(),
                    id = %id,
                    from = %current,
                    to = %computed,
                    "status transition"
                );
                Ok(())
            }
            Err(RepositoryError::NotFound) => {
                tracing::debug!(level = level.as_str(), id = %id, "entity deleted mid-update, skipping");
                Ok(())
            }
            Err(e) => Err(ReconcileError::Aborted(e)),
        }
    }
}

#[derive(Clone, Copy)]
enum Level {
    LoadBalancer,
    Listener,
    Pool,
    Member,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Self::LoadBalancer => "load_balancer",
            Self::Listener => "listener",
            Self::Pool => "pool",
            Self::Member => "member",
        }
    }
}

/// Listener token → persisted status. An unknown code is an error state,
/// not a skip: the listener exists but is unhealthy in an unknown way.
fn listener_status(token: &StatusToken) -> OperatingStatus {
    match token {
        StatusToken::Open => OperatingStatus::Online,
        StatusToken::Full => OperatingStatus::Degraded,
        _ => OperatingStatus::Error,
    }
}

/// Pool token → persisted status, before member feedback.
fn pool_status(token: &StatusToken) -> OperatingStatus {
    match token {
        StatusToken::Up => OperatingStatus::Online,
        StatusToken::Full => OperatingStatus::Degraded,
        _ => OperatingStatus::Error,
    }
}

/// Member token → persisted status. `None` means the token is unknown and
/// the member must be skipped, never defaulted.
///
/// `MAINT` and `DRAIN` are operator intent and apply with or without a
/// health monitor; everything else is only meaningful when a monitor is
/// actually probing the member.
fn member_status(token: &StatusToken, pool_has_monitor: bool) -> Option<OperatingStatus> {
    match token {
        StatusToken::Maint => Some(OperatingStatus::Offline),
        StatusToken::Drain => Some(OperatingStatus::Draining),
        StatusToken::Up | StatusToken::Down | StatusToken::NoCheck if !pool_has_monitor => {
            Some(OperatingStatus::NoMonitor)
        }
        StatusToken::Up => Some(OperatingStatus::Online),
        StatusToken::Down => Some(OperatingStatus::Error),
        StatusToken::NoCheck => Some(OperatingStatus::NoMonitor),
        _ => None,
    }
}

/// Enabled listeners the heartbeat is expected to report. Enabled UDP
/// listeners with no usable default pool never show up in a heartbeat and
/// are excluded from the count.
fn expected_listener_count(lb: &LoadBalancerRecord) -> usize {
    lb.listeners
        .values()
        .filter(|listener| listener.enabled)
        .filter(|listener| !invisible_udp_listener(listener, lb))
        .count()
}

fn invisible_udp_listener(listener: &ListenerRecord, lb: &LoadBalancerRecord) -> bool {
    if listener.protocol != ListenerProtocol::Udp {
        return false;
    }
    let Some(pool_id) = &listener.default_pool_id else {
        return true;
    };
    let Some(pool) = lb.pools.get(pool_id) else {
        return true;
    };
    !pool.members.values().any(|member| member.enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::model::MemberRecord;

    fn token(raw: &str) -> StatusToken {
        StatusToken::from(raw.to_string())
    }

    #[test]
    fn test_listener_status_mapping() {
        assert_eq!(listener_status(&token("OPEN")), OperatingStatus::Online);
        assert_eq!(listener_status(&token("FULL")), OperatingStatus::Degraded);
        assert_eq!(listener_status(&token("bogus")), OperatingStatus::Error);
        assert_eq!(listener_status(&token("DOWN")), OperatingStatus::Error);
    }

    #[test]
    fn test_pool_status_mapping() {
        assert_eq!(pool_status(&token("UP")), OperatingStatus::Online);
        assert_eq!(pool_status(&token("FULL")), OperatingStatus::Degraded);
        assert_eq!(pool_status(&token("DOWN")), OperatingStatus::Error);
        assert_eq!(pool_status(&token("bogus")), OperatingStatus::Error);
    }

    #[test]
    fn test_member_status_with_monitor() {
        assert_eq!(
            member_status(&token("UP"), true),
            Some(OperatingStatus::Online)
        );
        assert_eq!(
            member_status(&token("DOWN"), true),
            Some(OperatingStatus::Error)
        );
        assert_eq!(
            member_status(&token("DRAIN"), true),
            Some(OperatingStatus::Draining)
        );
        assert_eq!(
            member_status(&token("MAINT"), true),
            Some(OperatingStatus::Offline)
        );
        assert_eq!(
            member_status(&token("NO_CHECK"), true),
            Some(OperatingStatus::NoMonitor)
        );
        assert_eq!(member_status(&token("bogus"), true), None);
    }

    #[test]
    fn test_member_status_without_monitor() {
        // Unmonitored members normalize to NO_MONITOR except for operator
        // intent, which always applies.
        assert_eq!(
            member_status(&token("UP"), false),
            Some(OperatingStatus::NoMonitor)
        );
        assert_eq!(
            member_status(&token("DOWN"), false),
            Some(OperatingStatus::NoMonitor)
        );
        assert_eq!(
            member_status(&token("MAINT"), false),
            Some(OperatingStatus::Offline)
        );
        assert_eq!(
            member_status(&token("DRAIN"), false),
            Some(OperatingStatus::Draining)
        );
        assert_eq!(member_status(&token("bogus"), false), None);
    }

    fn lb_with_listener(protocol: ListenerProtocol, member_enabled: bool) -> LoadBalancerRecord {
        let mut members = HashMap::new();
        members.insert(
            "member-1".to_string(),
            MemberRecord {
                operating_status: OperatingStatus::Online,
                enabled: member_enabled,
            },
        );
        let mut pools = HashMap::new();
        pools.insert(
            "pool-1".to_string(),
            PoolRecord {
                operating_status: OperatingStatus::Online,
                has_health_monitor: true,
                members,
            },
        );
        let mut listeners = HashMap::new();
        listeners.insert(
            "listener-1".to_string(),
            ListenerRecord {
                operating_status: OperatingStatus::Online,
                protocol,
                enabled: true,
                default_pool_id: Some("pool-1".to_string()),
            },
        );
        LoadBalancerRecord {
            id: "lb-1".to_string(),
            enabled: true,
            provisioning_status: "ACTIVE".to_string(),
            operating_status: OperatingStatus::Online,
            listeners,
            pools,
        }
    }

    #[test]
    fn test_expected_count_tcp_listener() {
        let lb = lb_with_listener(ListenerProtocol::Tcp, false);
        assert_eq!(expected_listener_count(&lb), 1);
    }

    #[test]
    fn test_expected_count_excludes_udp_without_enabled_members() {
        let lb = lb_with_listener(ListenerProtocol::Udp, false);
        assert_eq!(expected_listener_count(&lb), 0);
    }

    #[test]
    fn test_expected_count_keeps_udp_with_enabled_member() {
        let lb = lb_with_listener(ListenerProtocol::Udp, true);
        assert_eq!(expected_listener_count(&lb), 1);
    }

    #[test]
    fn test_expected_count_excludes_udp_without_default_pool() {
        let mut lb = lb_with_listener(ListenerProtocol::Udp, true);
        if let Some(listener) = lb.listeners.get_mut("listener-1") {
            listener.default_pool_id = None;
        }
        assert_eq!(expected_listener_count(&lb), 0);
    }
}
