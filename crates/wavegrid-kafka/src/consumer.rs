//! Consumer pump tasks: Kafka → bounded channels.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wave_core::{decode_command, decode_event, Command, MalformedCommand, MonitoringEvent};

use crate::error::{KafkaError, KafkaResult};

fn stream_consumer(broker: &str, group_id: &str, topics: &[&str]) -> KafkaResult<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", broker)
        .set("group.id", group_id)
        .set("auto.offset.reset", "latest")
        .set("enable.auto.commit", "true")
        .set("session.timeout.ms", "30000")
        .create()
        .map_err(|e| KafkaError::Config(e.to_string()))?;
    consumer
        .subscribe(topics)
        .map_err(|e| KafkaError::Broker(e.to_string()))?;
    Ok(consumer)
}

/// Consume `config_<vop>` and forward decoded commands.
///
/// One consumer per agent: `group.id = agent_id`, offsets start at
/// `latest` on a cold group. Malformed payloads are forwarded as
/// `Err(MalformedCommand)` so the agent can publish a schema-error ack.
pub fn spawn_command_consumer(
    broker: &str,
    group_id: &str,
    topic: &str,
    commands: mpsc::Sender<Result<Command, MalformedCommand>>,
    mut shutdown: watch::Receiver<bool>,
) -> KafkaResult<JoinHandle<()>> {
    let consumer = stream_consumer(broker, group_id, &[topic])?;
    let topic = topic.to_string();
    Ok(tokio::spawn(async move {
        info!(%topic, "command consumer started");
        loop {
            tokio::select! {
                message = consumer.recv() => {
                    match message {
                        Ok(msg) => {
                            let Some(payload) = msg.payload() else { continue };
                            let decoded = decode_command(payload);
                            if commands.send(decoded).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(%topic, error = %e, "command consume error"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!(%topic, "command consumer stopped");
    }))
}

/// Consume monitoring/health topics and forward decoded events.
///
/// The controller uses a group id unique per controller instance so every
/// instance sees the full stream. Malformed payloads are logged and
/// skipped; the stream keeps flowing.
pub fn spawn_event_consumer(
    broker: &str,
    group_id: &str,
    topics: &[&str],
    events: mpsc::Sender<MonitoringEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> KafkaResult<JoinHandle<()>> {
    let consumer = stream_consumer(broker, group_id, topics)?;
    let label = topics.join(",");
    Ok(tokio::spawn(async move {
        info!(topics = %label, "event consumer started");
        loop {
            tokio::select! {
                message = consumer.recv() => {
                    match message {
                        Ok(msg) => {
                            let Some(payload) = msg.payload() else { continue };
                            match decode_event(payload) {
                                Ok(event) => {
                                    if events.send(event).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    debug!(topics = %label, error = %e, "skipping malformed event");
                                }
                            }
                        }
                        Err(e) => warn!(topics = %label, error = %e, "event consume error"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!(topics = %label, "event consumer stopped");
    }))
}
