//! Command execution: filter, dedup, dispatch, ack.
//!
//! The executor is owned by a single task (the agent loop). It receives
//! decoded commands, filters by `target_pop`, recognizes duplicate
//! command ids through the bounded LRU, applies hardware changes through
//! the transceiver capability under per-interface locks, and publishes
//! acks on the monitoring channel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use wave_core::{
    epoch_secs_f64, AckStatus, AgentHealth, Command, Connection, ConnectionStatus, EndpointConfig,
    MalformedCommand, MonitoringEvent,
};

use crate::dedup::RecentCommands;
use crate::telemetry::{AgentIdentity, TelemetrySessions};
use crate::transceiver::{InterfaceLocks, Transceiver};

/// Agent configuration, built by the daemon from flags/environment.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_id: String,
    pub pop_id: String,
    pub router_id: String,
    pub virtual_operator: String,
    /// Interfaces this agent drives (capability advertisement).
    pub interfaces: Vec<String>,
    pub telemetry_interval: Duration,
    pub dedup_capacity: usize,
}

impl AgentConfig {
    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity {
            agent_id: self.agent_id.clone(),
            pop_id: self.pop_id.clone(),
            router_id: self.router_id.clone(),
        }
    }
}

/// Per-switch command executor.
pub struct CommandExecutor {
    cfg: AgentConfig,
    transceiver: Arc<dyn Transceiver>,
    locks: InterfaceLocks,
    sessions: TelemetrySessions,
    recent: RecentCommands,
    /// Interfaces configured per connection on this switch.
    active: HashMap<String, Vec<String>>,
    /// Interfaces that reported hardware faults.
    unhealthy: HashSet<String>,
    events: mpsc::Sender<MonitoringEvent>,
    started_at: Instant,
    commands_received: u64,
    commands_processed: u64,
    commands_failed: u64,
}

impl CommandExecutor {
    pub fn new(
        cfg: AgentConfig,
        transceiver: Arc<dyn Transceiver>,
        events: mpsc::Sender<MonitoringEvent>,
    ) -> Self {
        let locks = InterfaceLocks::new();
        let sessions = TelemetrySessions::new(
            cfg.identity(),
            cfg.telemetry_interval,
            transceiver.clone(),
            locks.clone(),
            events.clone(),
        );
        let dedup_capacity = cfg.dedup_capacity;
        CommandExecutor {
            cfg,
            transceiver,
            locks,
            sessions,
            recent: RecentCommands::new(dedup_capacity),
            active: HashMap::new(),
            unhealthy: HashSet::new(),
            events,
            started_at: Instant::now(),
            commands_received: 0,
            commands_processed: 0,
            commands_failed: 0,
        }
    }

    /// Restore telemetry sessions for connections this agent owns,
    /// called on agent start with the LinkDB connection records.
    pub fn restore(&mut self, connections: &[Connection]) {
        for conn in connections {
            if !matches!(
                conn.status,
                ConnectionStatus::Active | ConnectionStatus::Degraded | ConnectionStatus::ReconfigPending
            ) {
                continue;
            }
            let interfaces: Vec<String> = self
                .local_endpoints(&conn.endpoints)
                .iter()
                .map(|e| e.port_id.clone())
                .collect();
            if interfaces.is_empty() {
                continue;
            }
            info!(connection = %conn.connection_id, ?interfaces, "restoring telemetry session");
            self.sessions.start(&conn.connection_id, interfaces.clone());
            self.active.insert(conn.connection_id.clone(), interfaces);
        }
    }

    /// Process one delivery from the config topic.
    pub async fn handle(&mut self, delivery: Result<Command, MalformedCommand>) {
        self.commands_received += 1;
        let command = match delivery {
            Ok(cmd) => cmd,
            Err(malformed) => {
                self.commands_failed += 1;
                warn!(detail = %malformed.detail, "malformed command payload");
                let command_id = malformed
                    .command_id
                    .unwrap_or_else(|| "unknown".to_string());
                self.send_ack(
                    &command_id,
                    AckStatus::Error,
                    json!({"reason": "schema", "detail": malformed.detail}),
                )
                .await;
                return;
            }
        };

        // target_pop filter: not ours → ignore entirely.
        if !command.target_pop().matches(&self.cfg.pop_id) {
            debug!(
                command = command.command_id(),
                target = ?command.target_pop(),
                "command filtered by pop"
            );
            return;
        }

        // At-most-once: a known command id replays its stored ack.
        if let Some(prior) = self.recent.get(command.command_id()) {
            info!(command = command.command_id(), "duplicate command, replaying ack");
            let _ = self.events.send(prior.clone()).await;
            return;
        }

        match command {
            Command::SetupConnection {
                command_id,
                parameters,
                ..
            } => {
                self.handle_setup(&command_id, &parameters.connection_id, &parameters.endpoint_config)
                    .await;
            }
            Command::ReconfigConnection {
                command_id,
                parameters,
                ..
            } => {
                self.handle_reconfig(
                    &command_id,
                    &parameters.connection_id,
                    &parameters.endpoint_config,
                )
                .await;
            }
            Command::TeardownConnection {
                command_id,
                parameters,
                ..
            } => {
                self.handle_teardown(&command_id, &parameters.connection_id).await;
            }
            Command::HealthCheck { command_id, .. } => {
                let snapshot = self.health_snapshot();
                let details = serde_json::to_value(&snapshot).unwrap_or_default();
                let ack = self.send_ack(&command_id, AckStatus::Ok, details).await;
                self.recent.insert(command_id, ack);
                self.commands_processed += 1;
            }
        }
    }

    /// Endpoints belonging to this switch. With a single-pop target and a
    /// multi-pop endpoint list, only the local endpoints are applied.
    fn local_endpoints<'a>(&self, endpoints: &'a [EndpointConfig]) -> Vec<&'a EndpointConfig> {
        endpoints
            .iter()
            .filter(|e| e.pop_id == self.cfg.pop_id && e.node_id == self.cfg.router_id)
            .collect()
    }

    async fn handle_setup(
        &mut self,
        command_id: &str,
        connection_id: &str,
        endpoints: &[EndpointConfig],
    ) {
        let local = self.local_endpoints(endpoints);
        if local.is_empty() {
            debug!(command = command_id, "no local endpoints, ignoring setup");
            return;
        }

        let (configured, failed) = self.apply_endpoints(&local).await;

        if !configured.is_empty() {
            self.sessions.start(connection_id, configured.clone());
            self.active
                .insert(connection_id.to_string(), configured.clone());
        }

        let ack = if failed.is_empty() {
            self.commands_processed += 1;
            info!(command = command_id, connection = connection_id, ?configured, "connection set up");
            self.send_ack(
                command_id,
                AckStatus::Ok,
                json!({
                    "action": "setupConnection",
                    "connection_id": connection_id,
                    "configured_interfaces": configured,
                }),
            )
            .await
        } else {
            self.commands_failed += 1;
            warn!(command = command_id, connection = connection_id, ?failed, "setup failed");
            self.send_ack(
                command_id,
                AckStatus::Error,
                json!({
                    "reason": "hardware",
                    "action": "setupConnection",
                    "connection_id": connection_id,
                    "configured_interfaces": configured,
                    "failed_interfaces": failed,
                }),
            )
            .await
        };
        self.recent.insert(command_id.to_string(), ack);
    }

    async fn handle_reconfig(
        &mut self,
        command_id: &str,
        connection_id: &str,
        endpoints: &[EndpointConfig],
    ) {
        let local = self.local_endpoints(endpoints);
        if local.is_empty() {
            debug!(command = command_id, "no local endpoints, ignoring reconfig");
            return;
        }

        let (updated, failed) = self.apply_endpoints(&local).await;

        // The session is replaced, not stopped: the stream keeps flowing
        // with the new transceiver settings.
        if !updated.is_empty() {
            let interfaces = self
                .active
                .get(connection_id)
                .cloned()
                .unwrap_or_else(|| updated.clone());
            self.sessions.start(connection_id, interfaces);
        }

        let ack = if failed.is_empty() {
            self.commands_processed += 1;
            info!(command = command_id, connection = connection_id, ?updated, "connection reconfigured");
            self.send_ack(
                command_id,
                AckStatus::Ok,
                json!({
                    "action": "reconfigConnection",
                    "connection_id": connection_id,
                    "updated_interfaces": updated,
                }),
            )
            .await
        } else {
            self.commands_failed += 1;
            self.send_ack(
                command_id,
                AckStatus::Error,
                json!({
                    "reason": "hardware",
                    "action": "reconfigConnection",
                    "connection_id": connection_id,
                    "updated_interfaces": updated,
                    "failed_interfaces": failed,
                }),
            )
            .await
        };
        self.recent.insert(command_id.to_string(), ack);
    }

    async fn handle_teardown(&mut self, command_id: &str, connection_id: &str) {
        let Some(interfaces) = self.active.remove(connection_id) else {
            // Nothing of this connection lives on this switch.
            debug!(command = command_id, connection = connection_id, "teardown for unknown connection, ignoring");
            return;
        };

        self.sessions.stop(connection_id);
        for interface in &interfaces {
            let lock = self.locks.for_interface(interface);
            let _guard = lock.lock().await;
            if let Err(e) = self.transceiver.disable(interface).await {
                warn!(%interface, error = %e, "laser disable failed during teardown");
            }
        }

        self.commands_processed += 1;
        info!(command = command_id, connection = connection_id, ?interfaces, "connection torn down");
        let ack = self
            .send_ack(
                command_id,
                AckStatus::Ok,
                json!({
                    "action": "teardownConnection",
                    "connection_id": connection_id,
                    "disabled_interfaces": interfaces,
                }),
            )
            .await;
        self.recent.insert(command_id.to_string(), ack);
    }

    /// Configure every endpoint under its interface lock.
    ///
    /// Returns (configured, failed) interface lists. A hardware fault
    /// marks the interface unhealthy but leaves the rest of the batch
    /// running.
    async fn apply_endpoints(
        &mut self,
        endpoints: &[&EndpointConfig],
    ) -> (Vec<String>, Vec<serde_json::Value>) {
        let mut configured = Vec::new();
        let mut failed = Vec::new();
        for endpoint in endpoints {
            let interface = &endpoint.port_id;
            let lock = self.locks.for_interface(interface);
            let _guard = lock.lock().await;

            let result = match self.transceiver.presence(interface).await {
                Ok(false) => Err(crate::error::AgentError::TransceiverAbsent(
                    interface.clone(),
                )),
                Ok(true) => {
                    self.transceiver
                        .configure(interface, endpoint.frequency, endpoint.tx_power_level)
                        .await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    self.unhealthy.remove(interface);
                    configured.push(interface.clone());
                }
                Err(e) => {
                    self.unhealthy.insert(interface.clone());
                    failed.push(json!({"interface": interface, "error": e.to_string()}));
                }
            }
        }
        (configured, failed)
    }

    async fn send_ack(
        &self,
        command_id: &str,
        status: AckStatus,
        details: serde_json::Value,
    ) -> MonitoringEvent {
        let ack = MonitoringEvent::Ack {
            command_id: command_id.to_string(),
            agent_id: self.cfg.agent_id.clone(),
            status,
            details,
        };
        if self.events.send(ack.clone()).await.is_err() {
            warn!(command = command_id, "event channel closed, ack dropped");
        }
        ack
    }

    /// Current health snapshot for `health_<vop>` and healthCheck acks.
    pub fn health_snapshot(&self) -> AgentHealth {
        let status = if self.unhealthy.is_empty() {
            "healthy"
        } else {
            "degraded"
        };
        AgentHealth {
            agent_id: self.cfg.agent_id.clone(),
            pop_id: self.cfg.pop_id.clone(),
            router_id: self.cfg.router_id.clone(),
            virtual_operator: self.cfg.virtual_operator.clone(),
            status: status.to_string(),
            uptime_sec: self.started_at.elapsed().as_secs_f64(),
            commands_received: self.commands_received,
            commands_processed: self.commands_processed,
            commands_failed: self.commands_failed,
            telemetry_sessions: self.sessions.active_count(),
            interfaces: self.cfg.interfaces.clone(),
            timestamp: epoch_secs_f64(),
        }
    }

    /// Stop all telemetry sessions (graceful shutdown).
    pub fn shutdown(&mut self) {
        self.sessions.stop_all();
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }
}
