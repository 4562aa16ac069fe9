//! End-to-end tests of the LinkDB REST service through the HTTP client.

use wave_core::{ConnectionStatus, InterfaceRef, SlotState};
use wavegrid_linkdb::client::{LinkDbClient, RetryPolicy};
use wavegrid_linkdb::service::AllocateRequest;
use wavegrid_linkdb::testing::spawn_service;
use wavegrid_linkdb::LinkDb;

async fn seeded_client() -> (LinkDbClient, LinkDb) {
    let db = LinkDb::open_in_memory().unwrap();
    db.seed_sample_topology().unwrap();
    let (base, _handle) = spawn_service(db.clone()).await;
    let client = LinkDbClient::new(base).with_retry(RetryPolicy::immediate());
    (client, db)
}

fn iface_ref(pop: &str, iface: &str) -> InterfaceRef {
    InterfaceRef {
        pop_id: pop.to_string(),
        router_id: "router1".to_string(),
        interface_id: iface.to_string(),
    }
}

#[tokio::test]
async fn health_reports_topology_counts() {
    let (client, _db) = seeded_client().await;
    let health = client.health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.pops, 3);
    assert_eq!(health.links, 2);
}

#[tokio::test]
async fn topology_roundtrips_over_http() {
    let (client, _db) = seeded_client().await;
    let topo = client.topology().await.unwrap();
    assert_eq!(topo.pops.len(), 3);
    assert_eq!(topo.links.len(), 2);
    assert!(topo.interfaces.iter().any(|i| i.interface_id == "Ethernet56"));
}

#[tokio::test]
async fn path_endpoint_finds_route() {
    let (client, _db) = seeded_client().await;
    let paths = client.paths("pop1", "pop3").await.unwrap();
    assert_eq!(paths[0].links, vec!["link-pop1-pop2", "link-pop2-pop3"]);
    assert_eq!(paths[0].hops, 2);
}

#[tokio::test]
async fn path_endpoint_rejects_unknown_pop() {
    let (client, _db) = seeded_client().await;
    let err = client.paths("pop1", "atlantis").await.unwrap_err();
    assert!(err.to_string().contains("path infeasible"));
}

#[tokio::test]
async fn reserve_then_release_over_http() {
    let (client, db) = seeded_client().await;
    client
        .reserve_interfaces("vOp2", &[iface_ref("pop1", "Ethernet56")])
        .await
        .unwrap();

    let iface = db.get_interface(&iface_ref("pop1", "Ethernet56")).unwrap().unwrap();
    assert_eq!(iface.owner.as_deref(), Some("vOp2"));

    assert_eq!(client.release_interfaces("vOp2").await.unwrap(), 1);
    let iface = db.get_interface(&iface_ref("pop1", "Ethernet56")).unwrap().unwrap();
    assert!(iface.owner.is_none());
}

#[tokio::test]
async fn reserve_conflict_maps_to_api_error() {
    let (client, _db) = seeded_client().await;
    client
        .reserve_interfaces("vOp1", &[iface_ref("pop1", "Ethernet48")])
        .await
        .unwrap();
    let err = client
        .reserve_interfaces("vOp2", &[iface_ref("pop1", "Ethernet48")])
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn allocate_status_and_delete_flow() {
    let (client, db) = seeded_client().await;

    // Allocate 8 slots on an empty link: first-fit picks [0..8).
    let resp = client
        .allocate(&AllocateRequest {
            connection_id: "conn-1".to_string(),
            virtual_operator: "vOp2".to_string(),
            path: vec!["link-pop1-pop2".to_string()],
            slots_required: 8,
        })
        .await
        .unwrap();
    assert_eq!(resp.slots.start, 0);
    assert_eq!(resp.slots.count, 8);

    // Frequencies endpoint shows the reservation.
    let slots = client.frequencies("link-pop1-pop2").await.unwrap();
    assert_eq!(slots[0].state, SlotState::Reserved);
    assert_eq!(slots[0].owner.as_deref(), Some("conn-1"));
    assert_eq!(slots[8].state, SlotState::Free);

    // Persist a connection record, then mark it ACTIVE: slots flip too.
    let conn = wave_core::Connection {
        connection_id: "conn-1".to_string(),
        virtual_operator: "vOp2".to_string(),
        source_pop: "pop1".to_string(),
        destination_pop: "pop2".to_string(),
        endpoints: vec![],
        path: vec![],
        slots: Some(resp.slots),
        bandwidth_gbps: 400.0,
        modulation: wave_core::Modulation::Dp16Qam,
        status: ConnectionStatus::Planned,
        estimated_osnr_db: None,
        reconfig_count: 0,
        created_at: 0,
        updated_at: 0,
    };
    client.put_connection(&conn).await.unwrap();
    client
        .set_connection_status("conn-1", ConnectionStatus::Active)
        .await
        .unwrap();
    let link = db.get_link("link-pop1-pop2").unwrap().unwrap();
    assert_eq!(link.slots[0].state, SlotState::Active);

    // DELETE releases spectrum and removes the record.
    assert!(client.delete_connection("conn-1").await.unwrap());
    let link = db.get_link("link-pop1-pop2").unwrap().unwrap();
    assert!(link.slots.iter().all(|s| s.is_free()));
    assert!(client.get_connection("conn-1").await.unwrap().is_none());
}

#[tokio::test]
async fn allocation_contention_stays_disjoint_over_http() {
    let (client, _db) = seeded_client().await;

    let mut handles = Vec::new();
    for i in 0..6 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .allocate(&AllocateRequest {
                    connection_id: format!("conn-{i}"),
                    virtual_operator: "vOp2".to_string(),
                    path: vec!["link-pop1-pop2".to_string()],
                    slots_required: 8,
                })
                .await
        }));
    }

    let mut ranges = Vec::new();
    for h in handles {
        ranges.push(h.await.unwrap().unwrap().slots);
    }
    for (i, a) in ranges.iter().enumerate() {
        for b in ranges.iter().skip(i + 1) {
            assert!(!a.overlaps(b), "overlap between {a:?} and {b:?}");
        }
    }
}

#[tokio::test]
async fn get_vop_missing_is_none() {
    let (client, _db) = seeded_client().await;
    assert!(client.get_vop("vOp9").await.unwrap().is_none());
}
