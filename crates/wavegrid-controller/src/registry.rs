//! Agent registry: liveness and capabilities learned from heartbeats.
//!
//! Agents announce themselves on `health_<vop>`; acks and telemetry also
//! refresh liveness. An agent is online if it was heard from within the
//! last 60 seconds; agents silent for 5 minutes are pruned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use wave_core::AgentHealth;

/// Seconds without a heartbeat before an agent counts as offline.
const ONLINE_WINDOW_SEC: f64 = 60.0;

/// Seconds without a heartbeat before an agent is forgotten.
const PRUNE_AFTER_SEC: f64 = 300.0;

/// What the controller knows about one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentInfo {
    pub agent_id: String,
    pub pop_id: String,
    pub router_id: String,
    pub status: String,
    pub interfaces: Vec<String>,
    pub telemetry_sessions: usize,
    pub last_heard_epoch: f64,
}

impl AgentInfo {
    pub fn is_online(&self, now_epoch: f64) -> bool {
        now_epoch - self.last_heard_epoch < ONLINE_WINDOW_SEC && self.status != "stopped"
    }
}

/// Registry of agents for one vOp.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentInfo>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest a health snapshot.
    pub fn observe_health(&mut self, health: &AgentHealth, now_epoch: f64) {
        match self.agents.get_mut(&health.agent_id) {
            Some(agent) => {
                agent.status = health.status.clone();
                agent.interfaces = health.interfaces.clone();
                agent.telemetry_sessions = health.telemetry_sessions;
                agent.last_heard_epoch = now_epoch;
                debug!(agent = %health.agent_id, status = %health.status, "heartbeat");
            }
            None => {
                info!(
                    agent = %health.agent_id,
                    pop = %health.pop_id,
                    router = %health.router_id,
                    "discovered agent"
                );
                self.agents.insert(
                    health.agent_id.clone(),
                    AgentInfo {
                        agent_id: health.agent_id.clone(),
                        pop_id: health.pop_id.clone(),
                        router_id: health.router_id.clone(),
                        status: health.status.clone(),
                        interfaces: health.interfaces.clone(),
                        telemetry_sessions: health.telemetry_sessions,
                        last_heard_epoch: now_epoch,
                    },
                );
            }
        }
    }

    /// Refresh liveness from any message carrying an agent identity
    /// (telemetry, acks).
    pub fn touch(&mut self, agent_id: &str, now_epoch: f64) {
        if let Some(agent) = self.agents.get_mut(agent_id) {
            agent.last_heard_epoch = now_epoch;
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentInfo> {
        self.agents.get(agent_id)
    }

    /// Agent serving a given POP/router, if known.
    pub fn agent_for(&self, pop_id: &str, router_id: &str) -> Option<&AgentInfo> {
        self.agents
            .values()
            .find(|a| a.pop_id == pop_id && a.router_id == router_id)
    }

    pub fn all(&self) -> Vec<AgentInfo> {
        let mut agents: Vec<AgentInfo> = self.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        agents
    }

    pub fn online_count(&self, now_epoch: f64) -> usize {
        self.agents.values().filter(|a| a.is_online(now_epoch)).count()
    }

    /// Forget agents silent for longer than the pruning window.
    pub fn prune(&mut self, now_epoch: f64) -> usize {
        let stale: Vec<String> = self
            .agents
            .values()
            .filter(|a| now_epoch - a.last_heard_epoch > PRUNE_AFTER_SEC)
            .map(|a| a.agent_id.clone())
            .collect();
        for agent_id in &stale {
            warn!(agent = %agent_id, "pruning stale agent");
            self.agents.remove(agent_id);
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(agent_id: &str, pop: &str) -> AgentHealth {
        AgentHealth {
            agent_id: agent_id.to_string(),
            pop_id: pop.to_string(),
            router_id: "router1".to_string(),
            virtual_operator: "vOp2".to_string(),
            status: "healthy".to_string(),
            uptime_sec: 10.0,
            commands_received: 0,
            commands_processed: 0,
            commands_failed: 0,
            telemetry_sessions: 1,
            interfaces: vec!["Ethernet48".to_string()],
            timestamp: 0.0,
        }
    }

    #[test]
    fn discovery_and_lookup() {
        let mut registry = AgentRegistry::new();
        registry.observe_health(&health("agent-1", "pop1"), 100.0);
        registry.observe_health(&health("agent-2", "pop2"), 100.0);

        assert_eq!(registry.all().len(), 2);
        assert_eq!(
            registry.agent_for("pop1", "router1").unwrap().agent_id,
            "agent-1"
        );
        assert!(registry.agent_for("pop9", "router1").is_none());
    }

    #[test]
    fn online_window_is_sixty_seconds() {
        let mut registry = AgentRegistry::new();
        registry.observe_health(&health("agent-1", "pop1"), 100.0);

        assert_eq!(registry.online_count(150.0), 1);
        assert_eq!(registry.online_count(161.0), 0);

        // A touch refreshes liveness.
        registry.touch("agent-1", 170.0);
        assert_eq!(registry.online_count(200.0), 1);
    }

    #[test]
    fn stopped_agents_are_offline() {
        let mut registry = AgentRegistry::new();
        let mut h = health("agent-1", "pop1");
        h.status = "stopped".to_string();
        registry.observe_health(&h, 100.0);
        assert_eq!(registry.online_count(101.0), 0);
    }

    #[test]
    fn prune_forgets_silent_agents() {
        let mut registry = AgentRegistry::new();
        registry.observe_health(&health("agent-1", "pop1"), 100.0);
        registry.observe_health(&health("agent-2", "pop2"), 350.0);

        assert_eq!(registry.prune(450.0), 1);
        assert!(registry.get("agent-1").is_none());
        assert!(registry.get("agent-2").is_some());
    }
}
