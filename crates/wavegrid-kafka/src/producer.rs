//! JSON publishing and the producer pump tasks.

use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use wave_core::{Command, MonitoringEvent};

use crate::error::{KafkaError, KafkaResult};

/// JSON producer with `acks=all` and bounded in-flight requests, so the
/// broker acknowledges writes in order per partition.
#[derive(Clone)]
pub struct JsonProducer {
    producer: FutureProducer,
}

impl JsonProducer {
    pub fn new(broker: &str) -> KafkaResult<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .set("acks", "all")
            .set("message.timeout.ms", "30000")
            .set("max.in.flight.requests.per.connection", "1")
            .create()
            .map_err(|e| KafkaError::Config(e.to_string()))?;
        Ok(JsonProducer { producer })
    }

    /// Publish one JSON value keyed for partition affinity.
    pub async fn publish<T: Serialize>(&self, topic: &str, key: &str, value: &T) -> KafkaResult<()> {
        let payload = serde_json::to_vec(value).map_err(|e| KafkaError::Serialize(e.to_string()))?;
        let record = FutureRecord::to(topic).key(key).payload(payload.as_slice());
        self.producer
            .send(record, Timeout::After(Duration::from_secs(10)))
            .await
            .map_err(|(e, _)| KafkaError::Publish {
                topic: topic.to_string(),
                detail: e.to_string(),
            })?;
        Ok(())
    }
}

/// Drain commands from a bounded channel onto `config_<vop>`.
///
/// Messages are keyed by connection id, so all commands for one
/// connection land on one partition and arrive in order. On shutdown the
/// channel is drained before the task exits, so nothing queued is lost.
pub fn spawn_command_pump(
    producer: JsonProducer,
    topic: String,
    mut commands: mpsc::Receiver<Command>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    publish_command(&producer, &topic, &cmd).await;
                }
                _ = shutdown.changed() => {
                    // Drain whatever is still queued, then stop.
                    commands.close();
                    while let Some(cmd) = commands.recv().await {
                        publish_command(&producer, &topic, &cmd).await;
                    }
                    break;
                }
            }
        }
        info!(%topic, "command pump stopped");
    })
}

async fn publish_command(producer: &JsonProducer, topic: &str, cmd: &Command) {
    let key = cmd.connection_id().unwrap_or_else(|| cmd.command_id());
    match producer.publish(topic, key, cmd).await {
        Ok(()) => debug!(%topic, command = cmd.command_id(), action = cmd.action(), "command published"),
        Err(e) => error!(%topic, command = cmd.command_id(), error = %e, "command publish failed"),
    }
}

/// Drain monitoring events (acks, telemetry, health) onto a topic.
///
/// Same drain-on-shutdown contract as the command pump: in-flight acks
/// are flushed before the producer closes.
pub fn spawn_event_pump(
    producer: JsonProducer,
    topic: String,
    mut events: mpsc::Receiver<MonitoringEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    publish_event(&producer, &topic, &event).await;
                }
                _ = shutdown.changed() => {
                    events.close();
                    while let Some(event) = events.recv().await {
                        publish_event(&producer, &topic, &event).await;
                    }
                    break;
                }
            }
        }
        info!(%topic, "event pump stopped");
    })
}

async fn publish_event(producer: &JsonProducer, topic: &str, event: &MonitoringEvent) {
    let key = event.partition_key().to_string();
    if let Err(e) = producer.publish(topic, &key, event).await {
        error!(%topic, %key, error = %e, "event publish failed");
    }
}
