//! The control loop: one owner task for all controller state.
//!
//! REST handlers send [`ControlRequest`]s over a bounded channel; the
//! Kafka consumer pump delivers [`MonitoringEvent`]s on another; outgoing
//! commands leave through a third. A one-second tick drives command
//! timeouts and agent pruning. The loop owns the [`ConnectionManager`],
//! the [`AgentRegistry`], and the per-connection QoT state; no locks.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use wave_core::{
    epoch_secs, epoch_secs_f64, AckStatus, Command, Connection, ConnectionStatus, EndpointConfig,
    Modulation, MonitoringEvent, ReconfigParams, SetupParams, TargetPop, TeardownParams,
};
use wavegrid_linkdb::client::LinkDbClient;
use wavegrid_linkdb::service::AllocateRequest;

use crate::connection::{
    ConnectionEvent, ConnectionManager, PendingAction, PendingCommand,
};
use crate::error::{ControllerError, ControllerResult};
use crate::path;
use crate::qot::{AdjustMode, QotConfig, QotDecision};
use crate::registry::{AgentInfo, AgentRegistry};

/// Controller configuration, built by the daemon.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub virtual_operator: String,
    pub controller_id: String,
    /// Initial tx-power commanded at setup when the request names none.
    pub default_tx_power_dbm: f64,
    pub command_timeout: Duration,
    pub qot: QotConfig,
}

impl ControllerConfig {
    pub fn new(virtual_operator: impl Into<String>) -> Self {
        let virtual_operator = virtual_operator.into();
        ControllerConfig {
            controller_id: format!("controller-{virtual_operator}"),
            virtual_operator,
            default_tx_power_dbm: -2.0,
            command_timeout: Duration::from_secs(30),
            qot: QotConfig::default(),
        }
    }
}

// ── API request types ─────────────────────────────────────────────

/// One requested endpoint (frequency is assigned by the controller).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointRequest {
    pub pop_id: String,
    pub node_id: String,
    pub port_id: String,
    #[serde(default)]
    pub tx_power_level: Option<f64>,
}

/// Body of `POST /api/v1/connections`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionRequest {
    #[serde(default)]
    pub connection_id: Option<String>,
    pub source_pop: String,
    pub destination_pop: String,
    pub bandwidth_gbps: f64,
    #[serde(default)]
    pub modulation: Modulation,
    pub endpoints: Vec<EndpointRequest>,
}

/// Controller status summary for `GET /api/v1/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub virtual_operator: String,
    pub controller_id: String,
    pub connections: std::collections::HashMap<String, usize>,
    pub total_connections: usize,
    pub total_reconfigurations: u32,
    pub agents_online: usize,
    pub telemetry_ignored: u64,
}

/// Requests from the REST layer into the control loop.
pub enum ControlRequest {
    Create {
        request: ConnectionRequest,
        reply: oneshot::Sender<ControllerResult<Connection>>,
    },
    Setup {
        connection_id: String,
        reply: oneshot::Sender<ControllerResult<Connection>>,
    },
    Reconfigure {
        connection_id: String,
        reason: String,
        reply: oneshot::Sender<ControllerResult<Connection>>,
    },
    Teardown {
        connection_id: String,
        reply: oneshot::Sender<ControllerResult<Connection>>,
    },
    Get {
        connection_id: String,
        reply: oneshot::Sender<Option<Connection>>,
    },
    List {
        reply: oneshot::Sender<Vec<Connection>>,
    },
    Status {
        reply: oneshot::Sender<ControllerStatus>,
    },
    Agents {
        reply: oneshot::Sender<Vec<(AgentInfo, bool)>>,
    },
}

/// Cheap handle the REST layer uses to reach the loop.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    pub fn new(tx: mpsc::Sender<ControlRequest>) -> Self {
        ControlHandle { tx }
    }

    async fn roundtrip<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> ControllerResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| ControllerError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ControllerError::ChannelClosed)
    }

    pub async fn create(&self, request: ConnectionRequest) -> ControllerResult<Connection> {
        self.roundtrip(|reply| ControlRequest::Create { request, reply })
            .await?
    }

    pub async fn setup(&self, connection_id: String) -> ControllerResult<Connection> {
        self.roundtrip(|reply| ControlRequest::Setup {
            connection_id,
            reply,
        })
        .await?
    }

    pub async fn reconfigure(
        &self,
        connection_id: String,
        reason: String,
    ) -> ControllerResult<Connection> {
        self.roundtrip(|reply| ControlRequest::Reconfigure {
            connection_id,
            reason,
            reply,
        })
        .await?
    }

    pub async fn teardown(&self, connection_id: String) -> ControllerResult<Connection> {
        self.roundtrip(|reply| ControlRequest::Teardown {
            connection_id,
            reply,
        })
        .await?
    }

    pub async fn get(&self, connection_id: String) -> ControllerResult<Option<Connection>> {
        self.roundtrip(|reply| ControlRequest::Get {
            connection_id,
            reply,
        })
        .await
    }

    pub async fn list(&self) -> ControllerResult<Vec<Connection>> {
        self.roundtrip(|reply| ControlRequest::List { reply }).await
    }

    pub async fn status(&self) -> ControllerResult<ControllerStatus> {
        self.roundtrip(|reply| ControlRequest::Status { reply }).await
    }

    pub async fn agents(&self) -> ControllerResult<Vec<(AgentInfo, bool)>> {
        self.roundtrip(|reply| ControlRequest::Agents { reply }).await
    }
}

/// Reason payload attached to QoT-driven reconfigurations.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReconfigReason {
    pub bad_count: u32,
    pub osnr: f64,
    pub pre_fec_ber: f64,
    pub interface: String,
    pub agent_id: String,
}

// ── The controller ────────────────────────────────────────────────

/// Per-vOp controller state, owned by the control loop task.
pub struct Controller {
    cfg: ControllerConfig,
    linkdb: LinkDbClient,
    commands: mpsc::Sender<Command>,
    manager: ConnectionManager,
    registry: AgentRegistry,
    telemetry_ignored: u64,
    total_reconfigurations: u32,
}

impl Controller {
    pub fn new(
        cfg: ControllerConfig,
        linkdb: LinkDbClient,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Controller {
            cfg,
            linkdb,
            commands,
            manager: ConnectionManager::new(),
            registry: AgentRegistry::new(),
            telemetry_ignored: 0,
            total_reconfigurations: 0,
        }
    }

    /// Reload this vOp's connection records from LinkDB (controller
    /// restart: controllers are stateless, LinkDB is the durable store).
    pub async fn restore(&mut self) -> ControllerResult<usize> {
        let records = self.linkdb.list_connections().await?;
        let mine: Vec<Connection> = records
            .into_iter()
            .filter(|c| c.virtual_operator == self.cfg.virtual_operator)
            .collect();
        let count = mine.len();
        self.manager.restore(mine);
        Ok(count)
    }

    /// Run until shutdown. Consumes the controller.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<ControlRequest>,
        mut events: mpsc::Receiver<MonitoringEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let tick_period = self
            .cfg
            .command_timeout
            .div_f64(4.0)
            .clamp(Duration::from_millis(50), Duration::from_secs(1));
        let mut ticker = tokio::time::interval(tick_period);
        info!(vop = %self.cfg.virtual_operator, "control loop started");

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                _ = ticker.tick() => self.handle_tick().await,
                _ = shutdown.changed() => break,
            }
        }
        info!(vop = %self.cfg.virtual_operator, "control loop stopped");
    }

    async fn handle_request(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Create { request, reply } => {
                let _ = reply.send(self.create_connection(request).await);
            }
            ControlRequest::Setup {
                connection_id,
                reply,
            } => {
                let _ = reply.send(self.setup_connection(&connection_id).await);
            }
            ControlRequest::Reconfigure {
                connection_id,
                reason,
                reply,
            } => {
                let _ = reply.send(self.manual_reconfigure(&connection_id, reason).await);
            }
            ControlRequest::Teardown {
                connection_id,
                reply,
            } => {
                let _ = reply.send(self.teardown_connection(&connection_id).await);
            }
            ControlRequest::Get {
                connection_id,
                reply,
            } => {
                let _ = reply.send(self.manager.get(&connection_id).map(|m| m.record.clone()));
            }
            ControlRequest::List { reply } => {
                let _ = reply.send(self.manager.records());
            }
            ControlRequest::Status { reply } => {
                let now = epoch_secs_f64();
                let _ = reply.send(ControllerStatus {
                    virtual_operator: self.cfg.virtual_operator.clone(),
                    controller_id: self.cfg.controller_id.clone(),
                    connections: self.manager.stats(),
                    total_connections: self.manager.len(),
                    total_reconfigurations: self.total_reconfigurations,
                    agents_online: self.registry.online_count(now),
                    telemetry_ignored: self.telemetry_ignored,
                });
            }
            ControlRequest::Agents { reply } => {
                let now = epoch_secs_f64();
                let _ = reply.send(
                    self.registry
                        .all()
                        .into_iter()
                        .map(|a| {
                            let online = a.is_online(now);
                            (a, online)
                        })
                        .collect(),
                );
            }
        }
    }

    async fn handle_event(&mut self, event: MonitoringEvent) {
        let now = epoch_secs_f64();
        match event {
            MonitoringEvent::Health(health) => {
                self.registry.observe_health(&health, now);
            }
            MonitoringEvent::Ack {
                command_id,
                agent_id,
                status,
                details,
            } => {
                self.registry.touch(&agent_id, now);
                self.handle_ack(&command_id, &agent_id, status, details).await;
            }
            MonitoringEvent::Telemetry {
                agent_id,
                pop_id,
                data,
                ..
            } => {
                self.registry.touch(&agent_id, now);
                self.handle_telemetry(&agent_id, &pop_id, data, now).await;
            }
        }
    }

    // ── Connection lifecycle ───────────────────────────────────────

    async fn create_connection(
        &mut self,
        request: ConnectionRequest,
    ) -> ControllerResult<Connection> {
        if request.endpoints.is_empty() {
            return Err(ControllerError::Validation(
                "at least one endpoint is required".to_string(),
            ));
        }
        for endpoint in &request.endpoints {
            if endpoint.pop_id != request.source_pop && endpoint.pop_id != request.destination_pop {
                return Err(ControllerError::Validation(format!(
                    "endpoint pop {} is neither source nor destination",
                    endpoint.pop_id
                )));
            }
        }

        let connection_id = request
            .connection_id
            .clone()
            .unwrap_or_else(|| format!("conn-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));
        if self.manager.contains(&connection_id) {
            return Err(ControllerError::Conflict(format!(
                "connection {connection_id} already exists"
            )));
        }

        // Path + slot demand over the current topology.
        let topology = self.linkdb.topology().await?;
        let planned = path::plan(
            &topology,
            &request.source_pop,
            &request.destination_pop,
            request.bandwidth_gbps,
            request.modulation,
        )?;

        // First-fit spectrum along the whole path, atomically.
        let allocation = self
            .linkdb
            .allocate(&AllocateRequest {
                connection_id: connection_id.clone(),
                virtual_operator: self.cfg.virtual_operator.clone(),
                path: planned.link_ids(),
                slots_required: planned.required_slots,
            })
            .await?;
        let frequency = allocation.slots.center_frequency_thz(planned.total_slots);

        let endpoints: Vec<EndpointConfig> = request
            .endpoints
            .iter()
            .map(|e| EndpointConfig {
                pop_id: e.pop_id.clone(),
                node_id: e.node_id.clone(),
                port_id: e.port_id.clone(),
                frequency,
                tx_power_level: e.tx_power_level.unwrap_or(self.cfg.default_tx_power_dbm),
            })
            .collect();

        let now = epoch_secs();
        let mut record = Connection {
            connection_id: connection_id.clone(),
            virtual_operator: self.cfg.virtual_operator.clone(),
            source_pop: request.source_pop.clone(),
            destination_pop: request.destination_pop.clone(),
            endpoints,
            path: planned.segments.clone(),
            slots: Some(allocation.slots),
            bandwidth_gbps: request.bandwidth_gbps,
            modulation: request.modulation,
            status: ConnectionStatus::Idle,
            estimated_osnr_db: planned.estimated_osnr_db,
            reconfig_count: 0,
            created_at: now,
            updated_at: now,
        };
        record.status = crate::connection::transition(record.status, ConnectionEvent::PlanComputed)?;

        // Persist; a failed write releases the allocation (no partial
        // reservation may remain).
        if let Err(e) = self.linkdb.put_connection(&record).await {
            error!(connection = %connection_id, error = %e, "failed to persist connection, releasing slots");
            if let Err(release_err) = self.linkdb.release_spectrum(&connection_id).await {
                error!(connection = %connection_id, error = %release_err, "slot release after failed persist also failed");
            }
            return Err(e.into());
        }

        info!(
            connection = %connection_id,
            slots = ?record.slots,
            frequency_thz = frequency,
            "connection planned"
        );
        self.manager.insert(record.clone());
        Ok(record)
    }

    async fn setup_connection(&mut self, connection_id: &str) -> ControllerResult<Connection> {
        // Validate the transition before doing anything visible.
        {
            let managed = self
                .manager
                .get(connection_id)
                .ok_or_else(|| ControllerError::NotFound(connection_id.to_string()))?;
            crate::connection::transition(managed.record.status, ConnectionEvent::SetupRequested)?;
        }

        let command_id = uuid::Uuid::new_v4().to_string();
        let (command, expected) = {
            let managed = self.manager.get(connection_id).expect("checked above");
            let expected = distinct_agents(&managed.record.endpoints);
            let command = Command::SetupConnection {
                command_id: command_id.clone(),
                target_pop: TargetPop::All,
                parameters: SetupParams {
                    connection_id: connection_id.to_string(),
                    endpoint_config: managed.record.endpoints.clone(),
                },
            };
            (command, expected)
        };

        self.publish(command).await?;
        self.manager.apply(connection_id, ConnectionEvent::SetupRequested)?;
        let managed = self.manager.get_mut(connection_id).expect("checked above");
        managed.pending = Some(PendingCommand::new(
            command_id,
            PendingAction::Setup,
            expected,
            Instant::now() + self.cfg.command_timeout,
        ));

        let record = managed.record.clone();
        self.mirror_status(connection_id, record.status).await;
        Ok(record)
    }

    async fn manual_reconfigure(
        &mut self,
        connection_id: &str,
        reason: String,
    ) -> ControllerResult<Connection> {
        let endpoints = {
            let managed = self
                .manager
                .get(connection_id)
                .ok_or_else(|| ControllerError::NotFound(connection_id.to_string()))?;
            crate::connection::transition(
                managed.record.status,
                ConnectionEvent::ReconfigRequested,
            )?;
            managed.record.endpoints.clone()
        };
        let stepped: Vec<EndpointConfig> = endpoints
            .iter()
            .map(|e| EndpointConfig {
                tx_power_level: self.cfg.qot.step_tx(e.tx_power_level),
                ..e.clone()
            })
            .collect();

        self.fire_reconfig(connection_id, stepped, reason).await?;
        Ok(self
            .manager
            .get(connection_id)
            .expect("checked above")
            .record
            .clone())
    }

    /// Publish a reconfig command for the given endpoints and move the
    /// connection to `RECONFIG_PENDING`.
    async fn fire_reconfig(
        &mut self,
        connection_id: &str,
        new_endpoints: Vec<EndpointConfig>,
        reason: String,
    ) -> ControllerResult<()> {
        let command_id = uuid::Uuid::new_v4().to_string();
        let expected = distinct_agents(&new_endpoints);
        let command = Command::ReconfigConnection {
            command_id: command_id.clone(),
            target_pop: TargetPop::All,
            parameters: ReconfigParams {
                connection_id: connection_id.to_string(),
                endpoint_config: new_endpoints.clone(),
                reason,
            },
        };
        self.publish(command).await?;

        self.manager
            .apply(connection_id, ConnectionEvent::ReconfigRequested)?;
        let managed = self.manager.get_mut(connection_id).expect("caller checked");
        // Track the last commanded tx-power per endpoint.
        for new_endpoint in &new_endpoints {
            if let Some(existing) = managed
                .record
                .endpoints
                .iter_mut()
                .find(|e| e.pop_id == new_endpoint.pop_id && e.port_id == new_endpoint.port_id)
            {
                existing.tx_power_level = new_endpoint.tx_power_level;
            }
        }
        managed.record.reconfig_count += 1;
        managed.pending = Some(PendingCommand::new(
            command_id,
            PendingAction::Reconfig,
            expected,
            Instant::now() + self.cfg.command_timeout,
        ));
        self.total_reconfigurations += 1;

        if managed.record.reconfig_count >= 3 {
            warn!(
                connection = connection_id,
                count = managed.record.reconfig_count,
                "repeated reconfigurations without lasting improvement"
            );
        }

        let status = managed.record.status;
        self.mirror_status(connection_id, status).await;
        Ok(())
    }

    async fn teardown_connection(&mut self, connection_id: &str) -> ControllerResult<Connection> {
        let status = {
            let managed = self
                .manager
                .get(connection_id)
                .ok_or_else(|| ControllerError::NotFound(connection_id.to_string()))?;
            crate::connection::transition(managed.record.status, ConnectionEvent::TeardownRequested)?;
            managed.record.status
        };

        // A connection that never reached the agents tears down locally:
        // no command, no acks to wait for.
        if status == ConnectionStatus::Planned {
            self.manager.apply(connection_id, ConnectionEvent::TeardownRequested)?;
            return self.complete_teardown(connection_id).await;
        }

        let command_id = uuid::Uuid::new_v4().to_string();
        let (command, expected) = {
            let managed = self.manager.get(connection_id).expect("checked above");
            (
                Command::TeardownConnection {
                    command_id: command_id.clone(),
                    target_pop: TargetPop::All,
                    parameters: TeardownParams {
                        connection_id: connection_id.to_string(),
                    },
                },
                distinct_agents(&managed.record.endpoints),
            )
        };
        self.publish(command).await?;

        self.manager.apply(connection_id, ConnectionEvent::TeardownRequested)?;
        let managed = self.manager.get_mut(connection_id).expect("checked above");
        managed.pending = Some(PendingCommand::new(
            command_id,
            PendingAction::Teardown,
            expected,
            Instant::now() + self.cfg.command_timeout,
        ));
        let record = managed.record.clone();
        self.mirror_status(connection_id, record.status).await;
        Ok(record)
    }

    /// Finish a teardown: slots released, record deleted, entry removed.
    async fn complete_teardown(&mut self, connection_id: &str) -> ControllerResult<Connection> {
        self.manager.apply(connection_id, ConnectionEvent::TeardownCompleted)?;
        if let Err(e) = self.linkdb.delete_connection(connection_id).await {
            error!(connection = connection_id, error = %e, "linkdb teardown cleanup failed");
        }
        let managed = self.manager.remove(connection_id).expect("caller checked");
        info!(connection = connection_id, "connection deleted");
        Ok(managed.record)
    }

    // ── Ack handling ───────────────────────────────────────────────

    async fn handle_ack(
        &mut self,
        command_id: &str,
        agent_id: &str,
        status: AckStatus,
        details: serde_json::Value,
    ) {
        let Some(managed) = self.manager.find_by_command(command_id) else {
            debug!(command = command_id, agent = agent_id, "ack for unknown command");
            return;
        };
        let connection_id = managed.record.connection_id.clone();
        let action = managed.pending.as_ref().expect("found by command").action;

        if status == AckStatus::Error && action != PendingAction::Teardown {
            warn!(
                connection = %connection_id,
                command = command_id,
                agent = agent_id,
                ?details,
                "endpoint nacked command"
            );
            managed.pending = None;
            match action {
                PendingAction::Setup => self.fail_connection(&connection_id).await,
                PendingAction::Reconfig => {
                    let _ = self.manager.apply(&connection_id, ConnectionEvent::ReconfigFailed);
                    self.mirror_status(&connection_id, ConnectionStatus::Degraded).await;
                }
                PendingAction::Teardown => unreachable!("handled above"),
            }
            return;
        }

        // Teardown counts error acks toward completion: teardown converges.
        let complete = {
            let pending = managed.pending.as_mut().expect("found by command");
            let counted = if action == PendingAction::Teardown && status == AckStatus::Error {
                pending.record(agent_id, AckStatus::Ok)
            } else {
                pending.record(agent_id, status)
            };
            counted
        };
        if !complete {
            return;
        }

        let managed = self.manager.get_mut(&connection_id).expect("still present");
        managed.pending = None;
        match action {
            PendingAction::Setup => {
                if self
                    .manager
                    .apply(&connection_id, ConnectionEvent::SetupCompleted)
                    .is_ok()
                {
                    // ACTIVE in LinkDB also flips the slots to Active.
                    self.mirror_status(&connection_id, ConnectionStatus::Active).await;
                    info!(connection = %connection_id, "connection active");
                }
            }
            PendingAction::Reconfig => {
                if self
                    .manager
                    .apply(&connection_id, ConnectionEvent::ReconfigCompleted)
                    .is_ok()
                {
                    self.mirror_status(&connection_id, ConnectionStatus::Active).await;
                    info!(connection = %connection_id, "reconfiguration applied");
                }
            }
            PendingAction::Teardown => {
                let _ = self.complete_teardown(&connection_id).await;
            }
        }
    }

    /// Setup nack/timeout: slots released, record FAILED, entry removed.
    async fn fail_connection(&mut self, connection_id: &str) {
        if self
            .manager
            .apply(connection_id, ConnectionEvent::SetupFailed)
            .is_err()
        {
            return;
        }
        if let Err(e) = self.linkdb.release_spectrum(connection_id).await {
            error!(connection = connection_id, error = %e, "slot release failed");
        }
        self.mirror_status(connection_id, ConnectionStatus::Failed).await;
        self.manager.remove(connection_id);
        warn!(connection = connection_id, "connection failed");
    }

    // ── QoT ────────────────────────────────────────────────────────

    async fn handle_telemetry(
        &mut self,
        agent_id: &str,
        pop_id: &str,
        data: wave_core::TelemetryData,
        now: f64,
    ) {
        let Some(managed) = self.manager.get_mut(&data.connection_id) else {
            // Telemetry for deleted/foreign connections is ignored.
            self.telemetry_ignored += 1;
            debug!(connection = %data.connection_id, "ignoring telemetry for unknown connection");
            return;
        };

        let status = managed.record.status;
        if !matches!(status, ConnectionStatus::Active | ConnectionStatus::Degraded) {
            return;
        }
        if !self.cfg.qot.enabled {
            return;
        }

        let decision = managed.qot.observe(
            &self.cfg.qot,
            &data.fields,
            now,
            status == ConnectionStatus::Degraded,
        );
        let connection_id = data.connection_id.clone();

        match decision {
            QotDecision::Nominal => {}
            QotDecision::Recovered => {
                if self
                    .manager
                    .apply(&connection_id, ConnectionEvent::Recovered)
                    .is_ok()
                {
                    info!(connection = %connection_id, "QoT recovered");
                    self.mirror_status(&connection_id, ConnectionStatus::Active).await;
                }
            }
            QotDecision::Degraded => {
                if status == ConnectionStatus::Active
                    && self
                        .manager
                        .apply(&connection_id, ConnectionEvent::DegradationDetected)
                        .is_ok()
                {
                    warn!(
                        connection = %connection_id,
                        osnr = data.fields.osnr,
                        pre_fec_ber = data.fields.pre_fec_ber,
                        "persistent QoT degradation (holding: cooldown)"
                    );
                    self.mirror_status(&connection_id, ConnectionStatus::Degraded).await;
                }
            }
            QotDecision::Reconfigure { bad_count } => {
                if status == ConnectionStatus::Active {
                    let _ = self
                        .manager
                        .apply(&connection_id, ConnectionEvent::DegradationDetected);
                    self.mirror_status(&connection_id, ConnectionStatus::Degraded).await;
                }
                warn!(
                    connection = %connection_id,
                    bad_count,
                    osnr = data.fields.osnr,
                    pre_fec_ber = data.fields.pre_fec_ber,
                    "persistent QoT degradation, reconfiguring"
                );

                let managed = self.manager.get_mut(&connection_id).expect("present");
                let selected = select_endpoints(
                    &managed.record.endpoints,
                    self.cfg.qot.adjust_mode,
                    pop_id,
                );
                let stepped: Vec<EndpointConfig> = selected
                    .into_iter()
                    .map(|e| EndpointConfig {
                        tx_power_level: self.cfg.qot.step_tx(e.tx_power_level),
                        ..e
                    })
                    .collect();

                let reason = serde_json::to_string(&ReconfigReason {
                    bad_count,
                    osnr: data.fields.osnr,
                    pre_fec_ber: data.fields.pre_fec_ber,
                    interface: data.interface.clone(),
                    agent_id: agent_id.to_string(),
                })
                .unwrap_or_else(|_| "qot_degradation".to_string());

                if let Err(e) = self.fire_reconfig(&connection_id, stepped, reason).await {
                    error!(connection = %connection_id, error = %e, "QoT reconfiguration failed to fire");
                }
            }
        }
    }

    // ── Housekeeping ───────────────────────────────────────────────

    async fn handle_tick(&mut self) {
        let now = Instant::now();
        for connection_id in self.manager.expired(now) {
            let action = self
                .manager
                .get(&connection_id)
                .and_then(|m| m.pending.as_ref().map(|p| p.action));
            let Some(action) = action else { continue };
            warn!(connection = %connection_id, ?action, "command timed out");

            if let Some(managed) = self.manager.get_mut(&connection_id) {
                managed.pending = None;
            }
            match action {
                PendingAction::Setup => self.fail_connection(&connection_id).await,
                PendingAction::Reconfig => {
                    let _ = self.manager.apply(&connection_id, ConnectionEvent::ReconfigFailed);
                    self.mirror_status(&connection_id, ConnectionStatus::Degraded).await;
                }
                PendingAction::Teardown => {
                    // Converge regardless: release resources and forget.
                    let _ = self.complete_teardown(&connection_id).await;
                }
            }
        }
        self.registry.prune(epoch_secs_f64());
    }

    async fn publish(&self, command: Command) -> ControllerResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ControllerError::ChannelClosed)
    }

    /// Best-effort mirror of the in-memory status into LinkDB.
    async fn mirror_status(&self, connection_id: &str, status: ConnectionStatus) {
        if let Err(e) = self.linkdb.set_connection_status(connection_id, status).await {
            warn!(connection = connection_id, ?status, error = %e, "status mirror to linkdb failed");
        }
    }
}

/// Number of distinct endpoint agents (pop/router pairs).
fn distinct_agents(endpoints: &[EndpointConfig]) -> usize {
    endpoints
        .iter()
        .map(|e| (e.pop_id.as_str(), e.node_id.as_str()))
        .collect::<HashSet<_>>()
        .len()
}

/// Endpoints a QoT reconfiguration adjusts: all of them, or the one that
/// reported the degradation (falling back to the first).
fn select_endpoints(
    endpoints: &[EndpointConfig],
    mode: AdjustMode,
    reporting_pop: &str,
) -> Vec<EndpointConfig> {
    match mode {
        AdjustMode::Both => endpoints.to_vec(),
        AdjustMode::One => endpoints
            .iter()
            .find(|e| e.pop_id == reporting_pop)
            .or_else(|| endpoints.first())
            .into_iter()
            .cloned()
            .collect(),
    }
}
