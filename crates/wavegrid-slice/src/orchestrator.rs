//! vOp activation and deactivation.
//!
//! Activation follows a strict order — validate, reserve, topics, store,
//! deploy — and every failure past the reservation step releases the
//! reservations before returning, so a failed activation leaves nothing
//! behind.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use wave_core::{
    epoch_secs, InterfaceRef, VirtualOperator, VopStatus, VopTopics,
};
use wavegrid_kafka::{vop_topic_specs, TopicAdmin};
use wavegrid_linkdb::LinkDbClient;

use crate::error::{SliceError, SliceResult};

/// Interface assignments for one router, as submitted by the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterfaceAssignment {
    pub pop_id: String,
    pub router_id: String,
    pub interfaces: Vec<String>,
}

/// Activation request body for `POST /api/v1/vops`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VopActivationRequest {
    pub vop_id: String,
    pub tenant_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub interface_assignments: Vec<InterfaceAssignment>,
}

impl VopActivationRequest {
    /// Flatten the assignments into interface references.
    pub fn interface_refs(&self) -> Vec<InterfaceRef> {
        self.interface_assignments
            .iter()
            .flat_map(|a| {
                a.interfaces.iter().map(|iface| InterfaceRef {
                    pop_id: a.pop_id.clone(),
                    router_id: a.router_id.clone(),
                    interface_id: iface.clone(),
                })
            })
            .collect()
    }
}

/// vOp ids must match `^[A-Za-z0-9_-]+$`.
pub fn valid_vop_id(vop_id: &str) -> bool {
    !vop_id.is_empty()
        && vop_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ── Seams ──────────────────────────────────────────────────────────

/// Topic provisioning seam; the production implementation talks to the
/// Kafka admin API, tests use a stub.
#[async_trait]
pub trait TopicProvisioner: Send + Sync {
    async fn ensure_vop_topics(&self, vop_id: &str) -> Result<VopTopics, String>;
}

/// Controller deployment hook. Deployment itself is external (container
/// orchestration); the default implementation is an idempotent no-op.
#[async_trait]
pub trait ControllerDeployer: Send + Sync {
    async fn deploy(&self, vop: &VirtualOperator) -> Result<(), String>;
    async fn stop(&self, vop_id: &str) -> Result<(), String>;
}

/// Default deployment hook: log and succeed.
pub struct NoopDeployer;

#[async_trait]
impl ControllerDeployer for NoopDeployer {
    async fn deploy(&self, vop: &VirtualOperator) -> Result<(), String> {
        info!(vop = %vop.vop_id, "controller deployment delegated to external orchestrator");
        Ok(())
    }

    async fn stop(&self, vop_id: &str) -> Result<(), String> {
        info!(vop = vop_id, "controller stop delegated to external orchestrator");
        Ok(())
    }
}

/// Production topic provisioner over the Kafka admin API.
pub struct KafkaTopicProvisioner {
    admin: TopicAdmin,
    partitions: i32,
    replication: i32,
}

impl KafkaTopicProvisioner {
    pub fn new(broker: &str, partitions: i32, replication: i32) -> Result<Self, String> {
        let admin = TopicAdmin::new(broker).map_err(|e| e.to_string())?;
        Ok(KafkaTopicProvisioner {
            admin,
            partitions,
            replication,
        })
    }
}

#[async_trait]
impl TopicProvisioner for KafkaTopicProvisioner {
    async fn ensure_vop_topics(&self, vop_id: &str) -> Result<VopTopics, String> {
        let specs = vop_topic_specs(vop_id, self.partitions, self.replication);
        self.admin
            .ensure_topics(&specs)
            .await
            .map_err(|e| e.to_string())?;
        Ok(VopTopics::for_vop(vop_id))
    }
}

// ── Orchestrator ───────────────────────────────────────────────────

/// Orchestrates the vOp lifecycle against LinkDB, Kafka, and the
/// deployment hook.
pub struct SliceOrchestrator {
    linkdb: LinkDbClient,
    topics: Arc<dyn TopicProvisioner>,
    deployer: Arc<dyn ControllerDeployer>,
}

impl SliceOrchestrator {
    pub fn new(
        linkdb: LinkDbClient,
        topics: Arc<dyn TopicProvisioner>,
        deployer: Arc<dyn ControllerDeployer>,
    ) -> Self {
        SliceOrchestrator {
            linkdb,
            topics,
            deployer,
        }
    }

    /// Activate a virtual operator.
    ///
    /// Order matters: 1) id + liveness validation, 2) interface
    /// verification, 3) atomic reservation, 4) topics, 5) store record,
    /// 6) deployment hook. Failures after step 3 release the reservation.
    pub async fn activate(&self, request: &VopActivationRequest) -> SliceResult<VirtualOperator> {
        let vop_id = &request.vop_id;
        if !valid_vop_id(vop_id) {
            return Err(SliceError::Validation(format!(
                "vop id {vop_id:?} must match ^[A-Za-z0-9_-]+$"
            )));
        }
        if request.interface_assignments.is_empty() {
            return Err(SliceError::Validation(
                "at least one interface assignment is required".to_string(),
            ));
        }

        // Step 1: refuse to re-activate a live vOp.
        if let Some(existing) = self.linkdb.get_vop(vop_id).await? {
            if existing.status == VopStatus::Active {
                return Err(SliceError::AlreadyActive(vop_id.clone()));
            }
        }

        // Step 2: verify every requested interface exists, is unreserved,
        // and has a transceiver. Collect all failures, not just the first.
        let refs = request.interface_refs();
        let mut failures = Vec::new();
        for assignment in &request.interface_assignments {
            let known = self
                .linkdb
                .interfaces(&assignment.pop_id, &assignment.router_id)
                .await?;
            for iface in &assignment.interfaces {
                match known.iter().find(|i| &i.interface_id == iface) {
                    None => failures.push(format!(
                        "{}/{}/{iface}: not found",
                        assignment.pop_id, assignment.router_id
                    )),
                    Some(i) if i.owner.is_some() => failures.push(format!(
                        "{}/{}/{iface}: owned by {}",
                        assignment.pop_id,
                        assignment.router_id,
                        i.owner.as_deref().unwrap_or("?")
                    )),
                    Some(i) if !i.transceiver_present => failures.push(format!(
                        "{}/{}/{iface}: no transceiver",
                        assignment.pop_id, assignment.router_id
                    )),
                    Some(_) => {}
                }
            }
        }
        if !failures.is_empty() {
            return Err(SliceError::InterfaceUnavailable(failures.join(", ")));
        }

        // Step 3: atomic reservation.
        self.linkdb
            .reserve_interfaces(vop_id, &refs)
            .await
            .map_err(|e| match e {
                e if e.is_conflict() => SliceError::InterfaceUnavailable(e.to_string()),
                e => SliceError::LinkDb(e),
            })?;

        // Steps 4-6 roll back the reservation on failure.
        match self.finish_activation(request, refs).await {
            Ok(vop) => {
                info!(vop = %vop.vop_id, tenant = %vop.tenant_name, "vop activated");
                Ok(vop)
            }
            Err(e) => {
                error!(vop = %vop_id, error = %e, "activation failed, rolling back");
                self.rollback(vop_id).await;
                Err(e)
            }
        }
    }

    async fn finish_activation(
        &self,
        request: &VopActivationRequest,
        refs: Vec<InterfaceRef>,
    ) -> SliceResult<VirtualOperator> {
        // Step 4: topics.
        let topics = self
            .topics
            .ensure_vop_topics(&request.vop_id)
            .await
            .map_err(SliceError::Topics)?;

        // Step 5: store the tenant record as ACTIVE.
        let now = epoch_secs();
        let vop = VirtualOperator {
            vop_id: request.vop_id.clone(),
            tenant_name: request.tenant_name.clone(),
            description: request.description.clone(),
            status: VopStatus::Active,
            topics,
            interfaces: refs,
            created_at: now,
            updated_at: now,
        };
        self.linkdb.put_vop(&vop).await?;

        // Step 6: deployment hook.
        self.deployer
            .deploy(&vop)
            .await
            .map_err(SliceError::Deploy)?;

        Ok(vop)
    }

    async fn rollback(&self, vop_id: &str) {
        if let Err(e) = self.linkdb.release_interfaces(vop_id).await {
            error!(vop = vop_id, error = %e, "rollback: failed to release interfaces");
        }
        // Remove any half-written record; topics are retained by policy.
        match self.linkdb.get_vop(vop_id).await {
            Ok(Some(mut vop)) => {
                vop.status = VopStatus::Deleted;
                vop.interfaces.clear();
                vop.updated_at = epoch_secs();
                if let Err(e) = self.linkdb.put_vop(&vop).await {
                    error!(vop = vop_id, error = %e, "rollback: failed to mark vop deleted");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(vop = vop_id, error = %e, "rollback: could not read vop record"),
        }
    }

    /// Deactivate a virtual operator: mark `DEACTIVATING`, stop the
    /// controller, release interfaces, mark `DELETED`. Topics are
    /// retained (operator policy).
    pub async fn deactivate(&self, vop_id: &str) -> SliceResult<VirtualOperator> {
        let mut vop = self
            .linkdb
            .get_vop(vop_id)
            .await?
            .ok_or_else(|| SliceError::NotFound(vop_id.to_string()))?;

        vop.status = VopStatus::Deactivating;
        vop.updated_at = epoch_secs();
        self.linkdb.put_vop(&vop).await?;

        if let Err(e) = self.deployer.stop(vop_id).await {
            // Interfaces must still come back; log and continue.
            warn!(vop = vop_id, error = %e, "controller stop hook failed");
        }

        let released = self.linkdb.release_interfaces(vop_id).await?;

        vop.status = VopStatus::Deleted;
        vop.interfaces.clear();
        vop.updated_at = epoch_secs();
        self.linkdb.put_vop(&vop).await?;

        info!(vop = vop_id, released, "vop deactivated");
        Ok(vop)
    }

    pub async fn get(&self, vop_id: &str) -> SliceResult<VirtualOperator> {
        self.linkdb
            .get_vop(vop_id)
            .await?
            .ok_or_else(|| SliceError::NotFound(vop_id.to_string()))
    }

    pub async fn list(&self) -> SliceResult<Vec<VirtualOperator>> {
        Ok(self.linkdb.list_vops().await?)
    }
}
