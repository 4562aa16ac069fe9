//! The agent loop: commands in, acks/telemetry/health out.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::info;

use wave_core::{Command, Connection, MalformedCommand, MonitoringEvent};

use crate::executor::CommandExecutor;

/// How often the agent heartbeats on `health_<vop>`.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Run the agent until shutdown.
///
/// One owner task: processes commands sequentially (per-connection order
/// is preserved from the topic partition), heartbeats every 30 s, and on
/// shutdown stops telemetry, then emits a final `stopped` health
/// snapshot.
pub async fn run_agent(
    mut executor: CommandExecutor,
    restore: Vec<Connection>,
    mut commands: mpsc::Receiver<Result<Command, MalformedCommand>>,
    health_events: mpsc::Sender<MonitoringEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    executor.restore(&restore);

    let mut health_ticker = tokio::time::interval(HEALTH_INTERVAL);
    info!("agent loop started");

    loop {
        tokio::select! {
            delivery = commands.recv() => {
                match delivery {
                    Some(delivery) => executor.handle(delivery).await,
                    None => break,
                }
            }
            _ = health_ticker.tick() => {
                let snapshot = executor.health_snapshot();
                let _ = health_events
                    .send(MonitoringEvent::Health(snapshot))
                    .await;
            }
            _ = shutdown.changed() => break,
        }
    }

    executor.shutdown();
    let mut final_health = executor.health_snapshot();
    final_health.status = "stopped".to_string();
    let _ = health_events.send(MonitoringEvent::Health(final_health)).await;
    info!("agent loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::AgentConfig;
    use crate::transceiver::MockTransceiver;
    use std::sync::Arc;

    #[tokio::test]
    async fn shutdown_emits_final_stopped_health() {
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, _event_rx) = mpsc::channel(8);
        let (health_tx, mut health_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let cfg = AgentConfig {
            agent_id: "a1".to_string(),
            pop_id: "pop1".to_string(),
            router_id: "router1".to_string(),
            virtual_operator: "vOp2".to_string(),
            interfaces: vec![],
            telemetry_interval: Duration::from_secs(30),
            dedup_capacity: 8,
        };
        let executor = CommandExecutor::new(cfg, Arc::new(MockTransceiver::new()), event_tx);

        let task = tokio::spawn(run_agent(executor, Vec::new(), cmd_rx, health_tx, shutdown_rx));

        // The first tick fires immediately: a healthy heartbeat.
        let first = health_rx.recv().await.unwrap();
        match first {
            MonitoringEvent::Health(h) => assert_eq!(h.status, "healthy"),
            other => panic!("expected health, got {other:?}"),
        }

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        // Final snapshot reports stopped.
        let last = {
            let mut last = None;
            while let Ok(event) = health_rx.try_recv() {
                last = Some(event);
            }
            last.expect("final health snapshot")
        };
        match last {
            MonitoringEvent::Health(h) => assert_eq!(h.status, "stopped"),
            other => panic!("expected health, got {other:?}"),
        }
    }
}
