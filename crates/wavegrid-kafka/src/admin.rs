//! Topic provisioning for vOp activation.

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::types::RDKafkaErrorCode;
use tracing::{debug, info};

use wave_core::VopTopics;

use crate::error::{KafkaError, KafkaResult};

/// Retention for config/monitoring topics: 6 hours.
const COMMAND_RETENTION_MS: &str = "21600000";

/// Specification of one topic to ensure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
    /// Extra topic configs (`cleanup.policy`, `retention.ms`, ...).
    pub config: Vec<(String, String)>,
}

/// The topic triple for one vOp.
///
/// Health is compacted (the latest heartbeat per agent is what matters);
/// config and monitoring use time-based retention.
pub fn vop_topic_specs(vop_id: &str, partitions: i32, replication: i32) -> Vec<TopicSpec> {
    let topics = VopTopics::for_vop(vop_id);
    vec![
        TopicSpec {
            name: topics.config,
            partitions,
            replication,
            config: vec![("retention.ms".to_string(), COMMAND_RETENTION_MS.to_string())],
        },
        TopicSpec {
            name: topics.monitoring,
            partitions,
            replication,
            config: vec![("retention.ms".to_string(), COMMAND_RETENTION_MS.to_string())],
        },
        TopicSpec {
            name: topics.health,
            partitions,
            replication,
            config: vec![("cleanup.policy".to_string(), "compact".to_string())],
        },
    ]
}

/// Kafka admin client for topic provisioning.
pub struct TopicAdmin {
    client: AdminClient<DefaultClientContext>,
}

impl TopicAdmin {
    pub fn new(broker: &str) -> KafkaResult<Self> {
        let client = ClientConfig::new()
            .set("bootstrap.servers", broker)
            .create()
            .map_err(|e| KafkaError::Config(e.to_string()))?;
        Ok(TopicAdmin { client })
    }

    /// Create every topic that does not exist yet.
    ///
    /// `TopicAlreadyExists` is not an error: activation is idempotent.
    pub async fn ensure_topics(&self, specs: &[TopicSpec]) -> KafkaResult<()> {
        let new_topics: Vec<NewTopic<'_>> = specs
            .iter()
            .map(|s| {
                let mut topic =
                    NewTopic::new(&s.name, s.partitions, TopicReplication::Fixed(s.replication));
                for (key, value) in &s.config {
                    topic = topic.set(key, value);
                }
                topic
            })
            .collect();

        let results = self
            .client
            .create_topics(new_topics.iter(), &AdminOptions::new())
            .await
            .map_err(|e| KafkaError::Broker(e.to_string()))?;

        for result in results {
            match result {
                Ok(name) => info!(topic = %name, "topic created"),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %name, "topic already exists");
                }
                Err((name, code)) => {
                    return Err(KafkaError::Admin {
                        topic: name,
                        detail: code.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vop_specs_cover_the_triple() {
        let specs = vop_topic_specs("vOp2", 3, 1);
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["config_vOp2", "monitoring_vOp2", "health_vOp2"]);
        assert!(specs.iter().all(|s| s.partitions == 3 && s.replication == 1));
    }

    #[test]
    fn health_topic_is_compacted() {
        let specs = vop_topic_specs("vOp1", 1, 1);
        let health = specs.iter().find(|s| s.name == "health_vOp1").unwrap();
        assert!(health
            .config
            .iter()
            .any(|(k, v)| k == "cleanup.policy" && v == "compact"));
        let config = specs.iter().find(|s| s.name == "config_vOp1").unwrap();
        assert!(config.config.iter().any(|(k, _)| k == "retention.ms"));
    }
}
