//! Activation flow tests against a real (in-memory) LinkDB service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use wave_core::{InterfaceRef, VirtualOperator, VopStatus, VopTopics};
use wavegrid_linkdb::client::{LinkDbClient, RetryPolicy};
use wavegrid_linkdb::testing::spawn_service;
use wavegrid_linkdb::LinkDb;
use wavegrid_slice::{
    ControllerDeployer, NoopDeployer, SliceError, SliceOrchestrator, TopicProvisioner,
    VopActivationRequest,
};
use wavegrid_slice::orchestrator::InterfaceAssignment;

/// Topic provisioner stub: records requested vOps, optionally fails.
#[derive(Default)]
struct StubProvisioner {
    provisioned: Mutex<Vec<String>>,
    fail: AtomicBool,
}

#[async_trait]
impl TopicProvisioner for StubProvisioner {
    async fn ensure_vop_topics(&self, vop_id: &str) -> Result<VopTopics, String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("broker unreachable".to_string());
        }
        self.provisioned.lock().unwrap().push(vop_id.to_string());
        Ok(VopTopics::for_vop(vop_id))
    }
}

struct Harness {
    orchestrator: SliceOrchestrator,
    provisioner: Arc<StubProvisioner>,
    db: LinkDb,
}

async fn harness() -> Harness {
    let db = LinkDb::open_in_memory().unwrap();
    db.seed_sample_topology().unwrap();
    let (base, _handle) = spawn_service(db.clone()).await;
    let client = LinkDbClient::new(base).with_retry(RetryPolicy::immediate());
    let provisioner = Arc::new(StubProvisioner::default());
    let orchestrator = SliceOrchestrator::new(client, provisioner.clone(), Arc::new(NoopDeployer));
    Harness {
        orchestrator,
        provisioner,
        db,
    }
}

fn vop2_request() -> VopActivationRequest {
    VopActivationRequest {
        vop_id: "vOp2".to_string(),
        tenant_name: "CloudProviderB".to_string(),
        description: Some("test tenant".to_string()),
        interface_assignments: vec![InterfaceAssignment {
            pop_id: "pop1".to_string(),
            router_id: "router1".to_string(),
            interfaces: vec!["Ethernet56".to_string()],
        }],
    }
}

fn ethernet56() -> InterfaceRef {
    InterfaceRef {
        pop_id: "pop1".to_string(),
        router_id: "router1".to_string(),
        interface_id: "Ethernet56".to_string(),
    }
}

#[tokio::test]
async fn activate_vop2_with_one_interface() {
    let h = harness().await;
    let vop = h.orchestrator.activate(&vop2_request()).await.unwrap();

    // Tenant record is ACTIVE with the topic triple.
    assert_eq!(vop.status, VopStatus::Active);
    assert_eq!(vop.topics.config, "config_vOp2");
    assert_eq!(vop.topics.monitoring, "monitoring_vOp2");
    assert_eq!(vop.topics.health, "health_vOp2");

    // Topics were provisioned exactly once.
    assert_eq!(*h.provisioner.provisioned.lock().unwrap(), vec!["vOp2"]);

    // Ethernet56 now belongs to vOp2.
    let iface = h.db.get_interface(&ethernet56()).unwrap().unwrap();
    assert_eq!(iface.owner.as_deref(), Some("vOp2"));

    // The record round-trips through LinkDB.
    let stored = h.db.get_vop("vOp2").unwrap().unwrap();
    assert_eq!(stored.status, VopStatus::Active);
    assert_eq!(stored.interfaces, vec![ethernet56()]);
}

#[tokio::test]
async fn bad_vop_id_is_rejected_without_side_effects() {
    let h = harness().await;
    let mut request = vop2_request();
    request.vop_id = "vOp 2!".to_string();

    let err = h.orchestrator.activate(&request).await.unwrap_err();
    assert!(matches!(err, SliceError::Validation(_)));
    assert!(h.provisioner.provisioned.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reactivating_active_vop_is_rejected() {
    let h = harness().await;
    h.orchestrator.activate(&vop2_request()).await.unwrap();

    let err = h.orchestrator.activate(&vop2_request()).await.unwrap_err();
    assert!(matches!(err, SliceError::AlreadyActive(_)));
}

#[tokio::test]
async fn unknown_interface_fails_with_named_culprits() {
    let h = harness().await;
    let mut request = vop2_request();
    request.interface_assignments[0]
        .interfaces
        .push("Ethernet99".to_string());

    let err = h.orchestrator.activate(&request).await.unwrap_err();
    match err {
        SliceError::InterfaceUnavailable(detail) => assert!(detail.contains("Ethernet99")),
        other => panic!("expected InterfaceUnavailable, got {other}"),
    }

    // Nothing was reserved.
    let iface = h.db.get_interface(&ethernet56()).unwrap().unwrap();
    assert!(iface.owner.is_none());
}

#[tokio::test]
async fn interface_owned_by_other_vop_is_unavailable() {
    let h = harness().await;
    h.db.reserve_interfaces("vOp1", &[ethernet56()]).unwrap();

    let err = h.orchestrator.activate(&vop2_request()).await.unwrap_err();
    assert!(matches!(err, SliceError::InterfaceUnavailable(_)));
}

#[tokio::test]
async fn topic_failure_rolls_back_reservations() {
    let h = harness().await;
    h.provisioner.fail.store(true, Ordering::SeqCst);

    let err = h.orchestrator.activate(&vop2_request()).await.unwrap_err();
    assert!(matches!(err, SliceError::Topics(_)));

    // Reservation was rolled back.
    let iface = h.db.get_interface(&ethernet56()).unwrap().unwrap();
    assert!(iface.owner.is_none());
    // No ACTIVE record remains.
    assert!(h
        .db
        .get_vop("vOp2")
        .unwrap()
        .map(|v| v.status != VopStatus::Active)
        .unwrap_or(true));
}

/// Deployer that always fails, to exercise the step-6 rollback.
struct FailingDeployer;

#[async_trait]
impl ControllerDeployer for FailingDeployer {
    async fn deploy(&self, _vop: &VirtualOperator) -> Result<(), String> {
        Err("no orchestrator".to_string())
    }

    async fn stop(&self, _vop_id: &str) -> Result<(), String> {
        Ok(())
    }
}

#[tokio::test]
async fn deploy_failure_rolls_back_reservations() {
    let db = LinkDb::open_in_memory().unwrap();
    db.seed_sample_topology().unwrap();
    let (base, _handle) = spawn_service(db.clone()).await;
    let client = LinkDbClient::new(base).with_retry(RetryPolicy::immediate());
    let orchestrator = SliceOrchestrator::new(
        client,
        Arc::new(StubProvisioner::default()),
        Arc::new(FailingDeployer),
    );

    let err = orchestrator.activate(&vop2_request()).await.unwrap_err();
    assert!(matches!(err, SliceError::Deploy(_)));

    let iface = db.get_interface(&ethernet56()).unwrap().unwrap();
    assert!(iface.owner.is_none());
    // The half-written record was demoted.
    let vop = db.get_vop("vOp2").unwrap().unwrap();
    assert_eq!(vop.status, VopStatus::Deleted);
}

#[tokio::test]
async fn deactivate_releases_interfaces_and_keeps_record() {
    let h = harness().await;
    h.orchestrator.activate(&vop2_request()).await.unwrap();

    let vop = h.orchestrator.deactivate("vOp2").await.unwrap();
    assert_eq!(vop.status, VopStatus::Deleted);

    let iface = h.db.get_interface(&ethernet56()).unwrap().unwrap();
    assert!(iface.owner.is_none());

    // Record survives as DELETED; topics are retained by policy.
    let stored = h.db.get_vop("vOp2").unwrap().unwrap();
    assert_eq!(stored.status, VopStatus::Deleted);
}

#[tokio::test]
async fn deactivate_unknown_vop_is_not_found() {
    let h = harness().await;
    let err = h.orchestrator.deactivate("ghost").await.unwrap_err();
    assert!(matches!(err, SliceError::NotFound(_)));
}
