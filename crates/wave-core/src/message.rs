//! Kafka wire schemas.
//!
//! Commands travel controller → agents on `config_<vop>`, tagged by
//! `action`. Monitoring events travel agents → controller on
//! `monitoring_<vop>` (acks, telemetry) and `health_<vop>` (heartbeats),
//! tagged by `type`. Payloads are parsed at the boundary and rejected on
//! mismatch; unknown actions or missing fields never reach the handlers.

use serde::{Deserialize, Serialize};

use crate::connection::EndpointConfig;
use crate::topology::{ConnectionId, PopId, RouterId, VopId};

// ── Commands (controller → agent) ─────────────────────────────────

/// Command target selector: every agent, or a single POP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TargetPop {
    All,
    Pop(PopId),
}

impl TargetPop {
    /// Whether an agent at `pop_id` should consider this command.
    pub fn matches(&self, pop_id: &str) -> bool {
        match self {
            TargetPop::All => true,
            TargetPop::Pop(p) => p == pop_id,
        }
    }
}

impl From<String> for TargetPop {
    fn from(s: String) -> Self {
        if s == "all" {
            TargetPop::All
        } else {
            TargetPop::Pop(s)
        }
    }
}

impl From<TargetPop> for String {
    fn from(t: TargetPop) -> Self {
        match t {
            TargetPop::All => "all".to_string(),
            TargetPop::Pop(p) => p,
        }
    }
}

/// Parameters of `setupConnection`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetupParams {
    pub connection_id: ConnectionId,
    pub endpoint_config: Vec<EndpointConfig>,
}

/// Parameters of `reconfigConnection`; `reason` is a serialized
/// degradation payload (`bad_count`, `osnr`, `pre_fec_ber`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconfigParams {
    pub connection_id: ConnectionId,
    pub endpoint_config: Vec<EndpointConfig>,
    pub reason: String,
}

/// Parameters of `teardownConnection`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeardownParams {
    pub connection_id: ConnectionId,
}

/// Parameters of `healthCheck` (none).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthCheckParams {}

/// A command on `config_<vop>`, tagged by `action`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action")]
pub enum Command {
    #[serde(rename = "setupConnection")]
    SetupConnection {
        command_id: String,
        target_pop: TargetPop,
        parameters: SetupParams,
    },
    #[serde(rename = "reconfigConnection")]
    ReconfigConnection {
        command_id: String,
        target_pop: TargetPop,
        parameters: ReconfigParams,
    },
    #[serde(rename = "teardownConnection")]
    TeardownConnection {
        command_id: String,
        target_pop: TargetPop,
        parameters: TeardownParams,
    },
    #[serde(rename = "healthCheck")]
    HealthCheck {
        command_id: String,
        target_pop: TargetPop,
        #[serde(default)]
        parameters: HealthCheckParams,
    },
}

impl Command {
    pub fn command_id(&self) -> &str {
        match self {
            Command::SetupConnection { command_id, .. }
            | Command::ReconfigConnection { command_id, .. }
            | Command::TeardownConnection { command_id, .. }
            | Command::HealthCheck { command_id, .. } => command_id,
        }
    }

    pub fn target_pop(&self) -> &TargetPop {
        match self {
            Command::SetupConnection { target_pop, .. }
            | Command::ReconfigConnection { target_pop, .. }
            | Command::TeardownConnection { target_pop, .. }
            | Command::HealthCheck { target_pop, .. } => target_pop,
        }
    }

    /// The connection this command is about, if any.
    pub fn connection_id(&self) -> Option<&str> {
        match self {
            Command::SetupConnection { parameters, .. } => Some(&parameters.connection_id),
            Command::ReconfigConnection { parameters, .. } => Some(&parameters.connection_id),
            Command::TeardownConnection { parameters, .. } => Some(&parameters.connection_id),
            Command::HealthCheck { .. } => None,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Command::SetupConnection { .. } => "setupConnection",
            Command::ReconfigConnection { .. } => "reconfigConnection",
            Command::TeardownConnection { .. } => "teardownConnection",
            Command::HealthCheck { .. } => "healthCheck",
        }
    }
}

// ── Monitoring events (agent → controller) ────────────────────────

/// QoT fields of one telemetry sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QotFields {
    pub rx_power: f64,
    pub tx_power: f64,
    pub osnr: f64,
    pub pre_fec_ber: f64,
}

/// Inner payload of a telemetry event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryData {
    pub connection_id: ConnectionId,
    pub interface: String,
    /// Unix epoch seconds (fractional).
    pub timestamp: f64,
    pub fields: QotFields,
}

/// Ack outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// Periodic agent health snapshot on `health_<vop>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentHealth {
    pub agent_id: String,
    pub pop_id: PopId,
    pub router_id: RouterId,
    pub virtual_operator: VopId,
    pub status: String,
    pub uptime_sec: f64,
    pub commands_received: u64,
    pub commands_processed: u64,
    pub commands_failed: u64,
    pub telemetry_sessions: usize,
    /// Capability advertisement: interfaces this agent drives.
    pub interfaces: Vec<String>,
    pub timestamp: f64,
}

/// An event on `monitoring_<vop>` / `health_<vop>`, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MonitoringEvent {
    #[serde(rename = "telemetry")]
    Telemetry {
        agent_id: String,
        pop_id: PopId,
        router_id: RouterId,
        data: TelemetryData,
    },
    #[serde(rename = "ack")]
    Ack {
        command_id: String,
        agent_id: String,
        status: AckStatus,
        #[serde(default)]
        details: serde_json::Value,
    },
    #[serde(rename = "agentHealth")]
    Health(AgentHealth),
}

impl MonitoringEvent {
    /// Partition key: connection id where one exists, agent id otherwise.
    pub fn partition_key(&self) -> &str {
        match self {
            MonitoringEvent::Telemetry { data, .. } => &data.connection_id,
            MonitoringEvent::Ack { command_id, .. } => command_id,
            MonitoringEvent::Health(h) => &h.agent_id,
        }
    }
}

// ── Boundary decoding ─────────────────────────────────────────────

/// A command payload that failed schema validation.
///
/// Carries whatever `command_id` could be salvaged from the raw JSON so
/// the agent can still ack `status=error, reason=schema`.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedCommand {
    pub command_id: Option<String>,
    pub detail: String,
}

/// Decode a `config_<vop>` payload.
pub fn decode_command(payload: &[u8]) -> Result<Command, MalformedCommand> {
    match serde_json::from_slice::<Command>(payload) {
        Ok(cmd) => Ok(cmd),
        Err(e) => {
            // Best-effort extraction of the command id for the error ack.
            let command_id = serde_json::from_slice::<serde_json::Value>(payload)
                .ok()
                .and_then(|v| v.get("command_id").and_then(|c| c.as_str()).map(String::from));
            Err(MalformedCommand {
                command_id,
                detail: e.to_string(),
            })
        }
    }
}

/// Decode a `monitoring_<vop>` / `health_<vop>` payload.
pub fn decode_event(payload: &[u8]) -> Result<MonitoringEvent, String> {
    serde_json::from_slice(payload).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_command_parses_wire_shape() {
        let raw = r#"{
            "action": "setupConnection",
            "command_id": "cmd-1",
            "target_pop": "all",
            "parameters": {
                "connection_id": "conn-1",
                "endpoint_config": [
                    {"pop_id": "pop1", "node_id": "router1", "port_id": "Ethernet48",
                     "frequency": 193.1, "tx_power_level": -2.0}
                ]
            }
        }"#;
        let cmd: Command = serde_json::from_str(raw).unwrap();
        assert_eq!(cmd.command_id(), "cmd-1");
        assert_eq!(cmd.connection_id(), Some("conn-1"));
        assert_eq!(*cmd.target_pop(), TargetPop::All);
        match cmd {
            Command::SetupConnection { parameters, .. } => {
                assert_eq!(parameters.endpoint_config.len(), 1);
                assert_eq!(parameters.endpoint_config[0].port_id, "Ethernet48");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn target_pop_roundtrip_and_match() {
        let all: TargetPop = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(all, TargetPop::All);
        assert!(all.matches("pop1"));

        let pop: TargetPop = serde_json::from_str("\"pop2\"").unwrap();
        assert_eq!(pop, TargetPop::Pop("pop2".to_string()));
        assert!(pop.matches("pop2"));
        assert!(!pop.matches("pop1"));

        assert_eq!(serde_json::to_string(&TargetPop::All).unwrap(), "\"all\"");
    }

    #[test]
    fn unknown_action_is_rejected() {
        let raw = r#"{"action": "rebootTheWorld", "command_id": "x", "target_pop": "all", "parameters": {}}"#;
        assert!(serde_json::from_str::<Command>(raw).is_err());
    }

    #[test]
    fn setup_missing_parameters_is_rejected() {
        let raw = r#"{"action": "setupConnection", "command_id": "x", "target_pop": "all"}"#;
        assert!(serde_json::from_str::<Command>(raw).is_err());
    }

    #[test]
    fn telemetry_parses_wire_shape() {
        let raw = r#"{
            "type": "telemetry",
            "agent_id": "agent-pop1-router1",
            "pop_id": "pop1",
            "router_id": "router1",
            "data": {
                "connection_id": "conn-1",
                "interface": "Ethernet48",
                "timestamp": 1700000000.5,
                "fields": {"rx_power": -12.1, "tx_power": -2.0, "osnr": 21.4, "pre_fec_ber": 1.2e-5}
            }
        }"#;
        let event: MonitoringEvent = serde_json::from_str(raw).unwrap();
        match &event {
            MonitoringEvent::Telemetry { data, .. } => {
                assert_eq!(data.connection_id, "conn-1");
                assert!((data.fields.osnr - 21.4).abs() < 1e-9);
            }
            other => panic!("wrong variant: {other:?}"),
        }
        assert_eq!(event.partition_key(), "conn-1");
    }

    #[test]
    fn ack_defaults_empty_details() {
        let raw = r#"{"type": "ack", "command_id": "cmd-1", "agent_id": "a1", "status": "ok"}"#;
        let event: MonitoringEvent = serde_json::from_str(raw).unwrap();
        match event {
            MonitoringEvent::Ack { status, details, .. } => {
                assert_eq!(status, AckStatus::Ok);
                assert!(details.is_null());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn ber_field_is_canonical() {
        // The legacy `ber` spelling is not accepted.
        let raw = r#"{"rx_power": -12.0, "tx_power": -2.0, "osnr": 20.0, "ber": 1e-5}"#;
        assert!(serde_json::from_str::<QotFields>(raw).is_err());
    }

    #[test]
    fn malformed_command_salvages_id() {
        let raw = br#"{"action":"setupConnection","command_id":"cmd-7","target_pop":"all","parameters":{}}"#;
        let err = decode_command(raw).unwrap_err();
        assert_eq!(err.command_id.as_deref(), Some("cmd-7"));
    }

    #[test]
    fn garbage_command_has_no_id() {
        let err = decode_command(b"not json at all").unwrap_err();
        assert!(err.command_id.is_none());
    }

    #[test]
    fn event_decode_rejects_unknown_type() {
        assert!(decode_event(br#"{"type":"mystery"}"#).is_err());
    }
}
