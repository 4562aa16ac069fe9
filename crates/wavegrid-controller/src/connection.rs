//! The connection state machine and in-memory connection registry.
//!
//! One entry point, [`transition`], owns the whole lifecycle:
//!
//! ```text
//! IDLE → PLANNED → SETUP_PENDING → ACTIVE ↔ DEGRADED → RECONFIG_PENDING → ACTIVE
//!                        │                                     │
//!                        └─→ FAILED                            └─→ DEGRADED (nack/timeout)
//! any live state → TEARDOWN → DELETED
//! ```
//!
//! Records enter the manager at `PLANNED` and leave at `DELETED`/`FAILED`.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{info, warn};

use wave_core::{AckStatus, Connection, ConnectionStatus};

use crate::error::{ControllerError, ControllerResult};
use crate::qot::QotState;

/// Events that drive connection state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    PlanComputed,
    SetupRequested,
    SetupCompleted,
    SetupFailed,
    DegradationDetected,
    Recovered,
    ReconfigRequested,
    ReconfigCompleted,
    ReconfigFailed,
    TeardownRequested,
    TeardownCompleted,
}

/// The transition table. Anything not listed is invalid.
pub fn transition(
    from: ConnectionStatus,
    event: ConnectionEvent,
) -> ControllerResult<ConnectionStatus> {
    use ConnectionEvent as E;
    use ConnectionStatus as S;

    let next = match (from, event) {
        (S::Idle, E::PlanComputed) => S::Planned,
        (S::Planned, E::SetupRequested) => S::SetupPending,
        (S::Planned, E::TeardownRequested) => S::Teardown,
        (S::SetupPending, E::SetupCompleted) => S::Active,
        (S::SetupPending, E::SetupFailed) => S::Failed,
        (S::SetupPending, E::TeardownRequested) => S::Teardown,
        (S::Active, E::DegradationDetected) => S::Degraded,
        (S::Active, E::ReconfigRequested) => S::ReconfigPending,
        (S::Active, E::TeardownRequested) => S::Teardown,
        (S::Degraded, E::Recovered) => S::Active,
        (S::Degraded, E::ReconfigRequested) => S::ReconfigPending,
        (S::Degraded, E::TeardownRequested) => S::Teardown,
        (S::ReconfigPending, E::ReconfigCompleted) => S::Active,
        (S::ReconfigPending, E::ReconfigFailed) => S::Degraded,
        (S::ReconfigPending, E::TeardownRequested) => S::Teardown,
        (S::Failed, E::TeardownRequested) => S::Teardown,
        (S::Teardown, E::TeardownCompleted) => S::Deleted,
        (from, event) => return Err(ControllerError::InvalidTransition { from, event }),
    };
    Ok(next)
}

/// What kind of command a pending entry is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Setup,
    Reconfig,
    Teardown,
}

/// An outstanding command awaiting endpoint acks.
#[derive(Debug)]
pub struct PendingCommand {
    pub command_id: String,
    pub action: PendingAction,
    /// Number of endpoint agents expected to ack.
    pub expected_acks: usize,
    /// agent_id → ack outcome.
    pub acks: HashMap<String, AckStatus>,
    pub deadline: Instant,
}

impl PendingCommand {
    pub fn new(
        command_id: String,
        action: PendingAction,
        expected_acks: usize,
        deadline: Instant,
    ) -> Self {
        PendingCommand {
            command_id,
            action,
            expected_acks,
            acks: HashMap::new(),
            deadline,
        }
    }

    /// Record one ack; true when every expected agent has acked ok.
    pub fn record(&mut self, agent_id: &str, status: AckStatus) -> bool {
        self.acks.insert(agent_id.to_string(), status);
        self.ok_count() >= self.expected_acks
    }

    pub fn ok_count(&self) -> usize {
        self.acks.values().filter(|s| **s == AckStatus::Ok).count()
    }
}

/// One connection under management.
pub struct ManagedConnection {
    pub record: Connection,
    pub pending: Option<PendingCommand>,
    pub qot: QotState,
}

/// In-memory registry of this controller's connections.
///
/// Owned by the control loop task; nothing else touches it.
#[derive(Default)]
pub struct ConnectionManager {
    connections: HashMap<String, ManagedConnection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly planned connection.
    pub fn insert(&mut self, record: Connection) {
        info!(connection = %record.connection_id, status = ?record.status, "connection registered");
        self.connections.insert(
            record.connection_id.clone(),
            ManagedConnection {
                record,
                pending: None,
                qot: QotState::new(),
            },
        );
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn get(&self, connection_id: &str) -> Option<&ManagedConnection> {
        self.connections.get(connection_id)
    }

    pub fn get_mut(&mut self, connection_id: &str) -> Option<&mut ManagedConnection> {
        self.connections.get_mut(connection_id)
    }

    /// Remove a terminal connection (DELETED or FAILED).
    pub fn remove(&mut self, connection_id: &str) -> Option<ManagedConnection> {
        self.connections.remove(connection_id)
    }

    pub fn records(&self) -> Vec<Connection> {
        let mut records: Vec<Connection> =
            self.connections.values().map(|m| m.record.clone()).collect();
        records.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        records
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Apply an event to a connection's state machine.
    pub fn apply(
        &mut self,
        connection_id: &str,
        event: ConnectionEvent,
    ) -> ControllerResult<ConnectionStatus> {
        let managed = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| ControllerError::NotFound(connection_id.to_string()))?;
        let from = managed.record.status;
        let next = transition(from, event)?;
        managed.record.status = next;
        managed.record.updated_at = wave_core::epoch_secs();
        info!(connection = connection_id, ?from, ?next, ?event, "state transition");
        Ok(next)
    }

    /// The connection waiting on a given command id, if any.
    pub fn find_by_command(&mut self, command_id: &str) -> Option<&mut ManagedConnection> {
        self.connections.values_mut().find(|m| {
            m.pending
                .as_ref()
                .is_some_and(|p| p.command_id == command_id)
        })
    }

    /// Connection ids whose pending command passed its deadline.
    pub fn expired(&self, now: Instant) -> Vec<String> {
        self.connections
            .values()
            .filter(|m| m.pending.as_ref().is_some_and(|p| now >= p.deadline))
            .map(|m| m.record.connection_id.clone())
            .collect()
    }

    /// Counts by status, for the status endpoint.
    pub fn stats(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for managed in self.connections.values() {
            let key = format!("{:?}", managed.record.status);
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// Restore records loaded from LinkDB on controller start.
    pub fn restore(&mut self, records: Vec<Connection>) {
        for record in records {
            if matches!(
                record.status,
                ConnectionStatus::Deleted | ConnectionStatus::Failed
            ) {
                continue;
            }
            warn!(connection = %record.connection_id, status = ?record.status, "restored connection");
            self.insert(record);
        }
    }
}
