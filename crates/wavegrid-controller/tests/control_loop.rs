//! Control-loop tests: create/setup/ack, QoT-driven reconfiguration,
//! cooldown, and teardown, driven over plain channels against a real
//! (in-memory) LinkDB service.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use wave_core::{
    AckStatus, Command, ConnectionStatus, MonitoringEvent, QotFields, SlotState, TelemetryData,
};
use wavegrid_controller::control::{
    ConnectionRequest, ControlHandle, Controller, ControllerConfig, EndpointRequest,
};
use wavegrid_controller::ControllerError;
use wavegrid_linkdb::client::{LinkDbClient, RetryPolicy};
use wavegrid_linkdb::testing::spawn_service;
use wavegrid_linkdb::LinkDb;

struct Harness {
    handle: ControlHandle,
    events: mpsc::Sender<MonitoringEvent>,
    commands: mpsc::Receiver<Command>,
    db: LinkDb,
    _shutdown: watch::Sender<bool>,
}

async fn harness_with(cfg_mod: impl FnOnce(&mut ControllerConfig)) -> Harness {
    let db = LinkDb::open_in_memory().unwrap();
    db.seed_sample_topology().unwrap();
    let (base, _server) = spawn_service(db.clone()).await;
    let linkdb = LinkDbClient::new(base).with_retry(RetryPolicy::immediate());

    let mut cfg = ControllerConfig::new("vOp2");
    cfg_mod(&mut cfg);

    let (command_tx, command_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(32);
    let (request_tx, request_rx) = mpsc::channel(32);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let controller = Controller::new(cfg, linkdb, command_tx);
    tokio::spawn(controller.run(request_rx, event_rx, shutdown_rx));

    Harness {
        handle: ControlHandle::new(request_tx),
        events: event_tx,
        commands: command_rx,
        db,
        _shutdown: shutdown_tx,
    }
}

async fn harness() -> Harness {
    harness_with(|_| {}).await
}

fn request() -> ConnectionRequest {
    ConnectionRequest {
        connection_id: Some("conn-1".to_string()),
        source_pop: "pop1".to_string(),
        destination_pop: "pop2".to_string(),
        bandwidth_gbps: 400.0,
        modulation: wave_core::Modulation::Dp16Qam,
        endpoints: vec![
            EndpointRequest {
                pop_id: "pop1".to_string(),
                node_id: "router1".to_string(),
                port_id: "Ethernet48".to_string(),
                tx_power_level: None,
            },
            EndpointRequest {
                pop_id: "pop2".to_string(),
                node_id: "router1".to_string(),
                port_id: "Ethernet48".to_string(),
                tx_power_level: None,
            },
        ],
    }
}

fn ack(command_id: &str, agent_id: &str, status: AckStatus) -> MonitoringEvent {
    MonitoringEvent::Ack {
        command_id: command_id.to_string(),
        agent_id: agent_id.to_string(),
        status,
        details: serde_json::Value::Null,
    }
}

fn telemetry(connection_id: &str, pop: &str, osnr: f64) -> MonitoringEvent {
    MonitoringEvent::Telemetry {
        agent_id: format!("agent-{pop}-router1"),
        pop_id: pop.to_string(),
        router_id: "router1".to_string(),
        data: TelemetryData {
            connection_id: connection_id.to_string(),
            interface: "Ethernet48".to_string(),
            timestamp: 0.0,
            fields: QotFields {
                rx_power: -20.0,
                tx_power: -2.0,
                osnr,
                pre_fec_ber: if osnr < 18.0 { 2e-3 } else { 1e-5 },
            },
        },
    }
}

async fn next_command(commands: &mut mpsc::Receiver<Command>) -> Command {
    timeout(Duration::from_secs(2), commands.recv())
        .await
        .expect("command within 2s")
        .expect("command channel open")
}

/// Poll the handle until the connection reaches `expected` (or vanishes
/// when `expected` is None).
async fn wait_for_status(handle: &ControlHandle, id: &str, expected: Option<ConnectionStatus>) {
    for _ in 0..200 {
        let current = handle.get(id.to_string()).await.unwrap().map(|c| c.status);
        if current == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connection {id} did not reach {expected:?}");
}

/// Drive conn-1 to ACTIVE; returns the setup command id.
async fn establish(h: &mut Harness) -> String {
    let conn = h.handle.create(request()).await.unwrap();
    assert_eq!(conn.status, ConnectionStatus::Planned);

    h.handle.setup("conn-1".to_string()).await.unwrap();
    let command = next_command(&mut h.commands).await;
    let command_id = command.command_id().to_string();

    h.events
        .send(ack(&command_id, "agent-pop1-router1", AckStatus::Ok))
        .await
        .unwrap();
    h.events
        .send(ack(&command_id, "agent-pop2-router1", AckStatus::Ok))
        .await
        .unwrap();
    wait_for_status(&h.handle, "conn-1", Some(ConnectionStatus::Active)).await;
    command_id
}

#[tokio::test]
async fn setup_flow_reaches_active() {
    let mut h = harness().await;

    let conn = h.handle.create(request()).await.unwrap();
    // 400G / DP-16QAM → 8 slots, first-fit from an empty grid → [0..8).
    let slots = conn.slots.unwrap();
    assert_eq!(slots.start, 0);
    assert_eq!(slots.count, 8);
    assert_eq!(conn.path.len(), 1);
    assert_eq!(conn.path[0].link_id, "link-pop1-pop2");
    // Default tx-power on both endpoints.
    assert!(conn.endpoints.iter().all(|e| (e.tx_power_level - (-2.0)).abs() < 1e-9));

    h.handle.setup("conn-1".to_string()).await.unwrap();
    let command = next_command(&mut h.commands).await;
    match &command {
        Command::SetupConnection { parameters, .. } => {
            assert_eq!(parameters.connection_id, "conn-1");
            assert_eq!(parameters.endpoint_config.len(), 2);
        }
        other => panic!("expected setupConnection, got {other:?}"),
    }

    // One ack is not enough.
    h.events
        .send(ack(command.command_id(), "agent-pop1-router1", AckStatus::Ok))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let conn = h.handle.get("conn-1".to_string()).await.unwrap().unwrap();
    assert_eq!(conn.status, ConnectionStatus::SetupPending);

    // Second endpoint ack completes setup.
    h.events
        .send(ack(command.command_id(), "agent-pop2-router1", AckStatus::Ok))
        .await
        .unwrap();
    wait_for_status(&h.handle, "conn-1", Some(ConnectionStatus::Active)).await;

    // LinkDB mirrors ACTIVE and flips the slots.
    let link = h.db.get_link("link-pop1-pop2").unwrap().unwrap();
    assert_eq!(link.slots[0].state, SlotState::Active);
    assert_eq!(link.slots[0].owner.as_deref(), Some("conn-1"));
}

#[tokio::test]
async fn setup_nack_fails_connection_and_releases_slots() {
    let mut h = harness().await;
    h.handle.create(request()).await.unwrap();
    h.handle.setup("conn-1".to_string()).await.unwrap();
    let command = next_command(&mut h.commands).await;

    h.events
        .send(ack(command.command_id(), "agent-pop1-router1", AckStatus::Error))
        .await
        .unwrap();
    wait_for_status(&h.handle, "conn-1", None).await;

    // Slots back to free, record FAILED in the durable store.
    let link = h.db.get_link("link-pop1-pop2").unwrap().unwrap();
    assert!(link.slots.iter().all(|s| s.is_free()));
    let record = h.db.get_connection("conn-1").unwrap().unwrap();
    assert_eq!(record.status, ConnectionStatus::Failed);
}

#[tokio::test]
async fn setup_timeout_fails_connection() {
    let mut h = harness_with(|cfg| cfg.command_timeout = Duration::from_millis(200)).await;
    h.handle.create(request()).await.unwrap();
    h.handle.setup("conn-1".to_string()).await.unwrap();
    let _command = next_command(&mut h.commands).await;

    // No acks arrive; the deadline fires.
    wait_for_status(&h.handle, "conn-1", None).await;
    let link = h.db.get_link("link-pop1-pop2").unwrap().unwrap();
    assert!(link.slots.iter().all(|s| s.is_free()));
}

#[tokio::test]
async fn three_degraded_samples_trigger_one_reconfig() {
    let mut h = harness().await;
    establish(&mut h).await;

    // Three consecutive degraded samples (osnr 17 < 18).
    for _ in 0..3 {
        h.events.send(telemetry("conn-1", "pop1", 17.0)).await.unwrap();
    }

    let command = next_command(&mut h.commands).await;
    match &command {
        Command::ReconfigConnection { parameters, .. } => {
            assert_eq!(parameters.connection_id, "conn-1");
            // +1 dB on both endpoints: -2.0 → -1.0.
            assert_eq!(parameters.endpoint_config.len(), 2);
            for endpoint in &parameters.endpoint_config {
                assert!((endpoint.tx_power_level - (-1.0)).abs() < 1e-9);
            }
            // Reason payload carries the trigger context.
            let reason: serde_json::Value = serde_json::from_str(&parameters.reason).unwrap();
            assert_eq!(reason["bad_count"], 3);
            assert_eq!(reason["interface"], "Ethernet48");
        }
        other => panic!("expected reconfigConnection, got {other:?}"),
    }

    // Ack the reconfiguration: back to ACTIVE.
    h.events
        .send(ack(command.command_id(), "agent-pop1-router1", AckStatus::Ok))
        .await
        .unwrap();
    h.events
        .send(ack(command.command_id(), "agent-pop2-router1", AckStatus::Ok))
        .await
        .unwrap();
    wait_for_status(&h.handle, "conn-1", Some(ConnectionStatus::Active)).await;

    // Further degraded samples inside the 20 s cooldown must not fire a
    // second reconfiguration; the connection is just marked DEGRADED.
    for _ in 0..4 {
        h.events.send(telemetry("conn-1", "pop1", 17.0)).await.unwrap();
    }
    wait_for_status(&h.handle, "conn-1", Some(ConnectionStatus::Degraded)).await;
    assert!(
        timeout(Duration::from_millis(300), h.commands.recv())
            .await
            .is_err(),
        "no command may be issued during cooldown"
    );

    // The commanded tx-power was recorded on the connection.
    let conn = h.handle.get("conn-1".to_string()).await.unwrap().unwrap();
    assert!(conn.endpoints.iter().all(|e| (e.tx_power_level - (-1.0)).abs() < 1e-9));
    assert_eq!(conn.reconfig_count, 1);
}

#[tokio::test]
async fn clean_samples_recover_a_degraded_connection() {
    let mut h = harness().await;
    establish(&mut h).await;

    for _ in 0..3 {
        h.events.send(telemetry("conn-1", "pop1", 17.0)).await.unwrap();
    }
    let command = next_command(&mut h.commands).await;
    h.events
        .send(ack(command.command_id(), "agent-pop1-router1", AckStatus::Ok))
        .await
        .unwrap();
    h.events
        .send(ack(command.command_id(), "agent-pop2-router1", AckStatus::Ok))
        .await
        .unwrap();
    wait_for_status(&h.handle, "conn-1", Some(ConnectionStatus::Active)).await;

    // Degrade again (cooldown holds), then recover with a clean sample.
    for _ in 0..3 {
        h.events.send(telemetry("conn-1", "pop1", 17.0)).await.unwrap();
    }
    wait_for_status(&h.handle, "conn-1", Some(ConnectionStatus::Degraded)).await;
    h.events.send(telemetry("conn-1", "pop1", 22.0)).await.unwrap();
    wait_for_status(&h.handle, "conn-1", Some(ConnectionStatus::Active)).await;
}

#[tokio::test]
async fn teardown_during_degradation_cleans_up_and_ignores_late_telemetry() {
    let mut h = harness().await;
    establish(&mut h).await;

    // Mark degraded (cooldown irrelevant: reconfigure pending ack never
    // sent, so park it in DEGRADED via nack).
    for _ in 0..3 {
        h.events.send(telemetry("conn-1", "pop1", 17.0)).await.unwrap();
    }
    let reconfig = next_command(&mut h.commands).await;
    h.events
        .send(ack(reconfig.command_id(), "agent-pop1-router1", AckStatus::Error))
        .await
        .unwrap();
    wait_for_status(&h.handle, "conn-1", Some(ConnectionStatus::Degraded)).await;

    // Teardown from DEGRADED.
    h.handle.teardown("conn-1".to_string()).await.unwrap();
    let teardown = next_command(&mut h.commands).await;
    assert!(matches!(teardown, Command::TeardownConnection { .. }));
    h.events
        .send(ack(teardown.command_id(), "agent-pop1-router1", AckStatus::Ok))
        .await
        .unwrap();
    h.events
        .send(ack(teardown.command_id(), "agent-pop2-router1", AckStatus::Ok))
        .await
        .unwrap();
    wait_for_status(&h.handle, "conn-1", None).await;

    // Slots released, record deleted.
    let link = h.db.get_link("link-pop1-pop2").unwrap().unwrap();
    assert!(link.slots.iter().all(|s| s.is_free()));
    assert!(h.db.get_connection("conn-1").unwrap().is_none());

    // Late telemetry for the deleted connection is counted and dropped.
    h.events.send(telemetry("conn-1", "pop1", 17.0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = h.handle.status().await.unwrap();
    assert!(status.telemetry_ignored >= 1);
    assert!(timeout(Duration::from_millis(200), h.commands.recv()).await.is_err());
}

#[tokio::test]
async fn teardown_of_planned_connection_needs_no_agents() {
    let mut h = harness().await;
    h.handle.create(request()).await.unwrap();

    h.handle.teardown("conn-1".to_string()).await.unwrap();
    // No command was published.
    assert!(timeout(Duration::from_millis(200), h.commands.recv()).await.is_err());
    assert!(h.handle.get("conn-1".to_string()).await.unwrap().is_none());
    let link = h.db.get_link("link-pop1-pop2").unwrap().unwrap();
    assert!(link.slots.iter().all(|s| s.is_free()));
}

#[tokio::test]
async fn second_connection_gets_disjoint_spectrum() {
    let mut h = harness().await;
    establish(&mut h).await;

    let mut second = request();
    second.connection_id = Some("conn-2".to_string());
    let conn = h.handle.create(second).await.unwrap();
    let slots = conn.slots.unwrap();
    assert_eq!(slots.start, 8);
    assert_eq!(slots.count, 8);
}

#[tokio::test]
async fn create_rejects_unknown_pop() {
    let h = harness().await;
    let mut bad = request();
    bad.destination_pop = "atlantis".to_string();
    bad.endpoints[1].pop_id = "atlantis".to_string();
    let err = h.handle.create(bad).await.unwrap_err();
    assert!(matches!(err, ControllerError::PathInfeasible(_)));
}

#[tokio::test]
async fn setup_requires_planned_state() {
    let mut h = harness().await;
    establish(&mut h).await;
    // Second setup on an ACTIVE connection is an invalid transition.
    let err = h.handle.setup("conn-1".to_string()).await.unwrap_err();
    assert!(matches!(err, ControllerError::InvalidTransition { .. }));
}

#[tokio::test]
async fn agent_registry_tracks_heartbeats() {
    let h = harness().await;
    h.events
        .send(MonitoringEvent::Health(wave_core::AgentHealth {
            agent_id: "agent-pop1-router1".to_string(),
            pop_id: "pop1".to_string(),
            router_id: "router1".to_string(),
            virtual_operator: "vOp2".to_string(),
            status: "healthy".to_string(),
            uptime_sec: 5.0,
            commands_received: 0,
            commands_processed: 0,
            commands_failed: 0,
            telemetry_sessions: 0,
            interfaces: vec!["Ethernet48".to_string()],
            timestamp: 0.0,
        }))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let agents = h.handle.agents().await.unwrap();
    assert_eq!(agents.len(), 1);
    let (info, online) = &agents[0];
    assert_eq!(info.agent_id, "agent-pop1-router1");
    assert!(online);

    let status = h.handle.status().await.unwrap();
    assert_eq!(status.agents_online, 1);
}
