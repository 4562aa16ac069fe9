//! Agent mode: wire the executor to Kafka and the transceiver driver.

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::sync::{mpsc, watch};
use tracing::info;

use wavegrid_agent::{run_agent, AgentConfig, CommandExecutor, MockTransceiver};
use wavegrid_kafka::{spawn_command_consumer, spawn_event_pump, JsonProducer};

use crate::{connect_linkdb, DaemonError};

#[derive(Args)]
pub struct AgentArgs {
    #[arg(long, env = "KAFKA_BROKER", default_value = "localhost:9092")]
    pub kafka_broker: String,

    #[arg(long, env = "VIRTUAL_OPERATOR")]
    pub virtual_operator: String,

    /// Unique agent id; also the Kafka consumer group id.
    #[arg(long, env = "AGENT_ID")]
    pub agent_id: String,

    #[arg(long, env = "POP_ID")]
    pub pop_id: String,

    #[arg(long, env = "ROUTER_ID")]
    pub router_id: String,

    /// Comma-separated interfaces this agent drives.
    #[arg(long, env = "AGENT_INTERFACES", value_delimiter = ',')]
    pub interfaces: Vec<String>,

    /// Override the config topic (default `config_<vop>`).
    #[arg(long, env = "CONFIG_TOPIC")]
    pub config_topic: Option<String>,

    /// Override the monitoring topic (default `monitoring_<vop>`).
    #[arg(long, env = "MONITORING_TOPIC")]
    pub monitoring_topic: Option<String>,

    /// Override the health topic (default `health_<vop>`).
    #[arg(long, env = "HEALTH_TOPIC")]
    pub health_topic: Option<String>,

    #[arg(long, env = "LINKDB_HOST", default_value = "localhost")]
    pub linkdb_host: String,

    #[arg(long, env = "LINKDB_PORT", default_value = "8090")]
    pub linkdb_port: u16,

    #[arg(long, env = "TELEMETRY_INTERVAL_SEC", default_value = "3.0")]
    pub telemetry_interval_sec: f64,

    /// Use the mock transceiver driver instead of platform hardware.
    #[arg(
        long,
        env = "MOCK_HARDWARE",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub mock_hardware: bool,

    /// Size of the processed-command-id LRU.
    #[arg(long, env = "COMMAND_DEDUP_CAPACITY", default_value = "256")]
    pub dedup_capacity: usize,
}

pub async fn run(args: AgentArgs) -> Result<(), DaemonError> {
    let vop = args.virtual_operator.clone();
    info!(agent = %args.agent_id, vop = %vop, pop = %args.pop_id, "WaveGrid agent starting");

    if !args.mock_hardware {
        // The CMIS driver is provided by the switch platform build.
        return Err(DaemonError::Config(
            "this build carries only the mock transceiver driver; set MOCK_HARDWARE=true \
             or run the platform image"
                .to_string(),
        ));
    }
    if args.telemetry_interval_sec <= 0.0 {
        return Err(DaemonError::Config(
            "TELEMETRY_INTERVAL_SEC must be positive".to_string(),
        ));
    }

    let config_topic = args.config_topic.unwrap_or_else(|| format!("config_{vop}"));
    let monitoring_topic = args
        .monitoring_topic
        .unwrap_or_else(|| format!("monitoring_{vop}"));
    let health_topic = args.health_topic.unwrap_or_else(|| format!("health_{vop}"));

    // Connections this agent owned before a restart; telemetry sessions
    // for them restart immediately.
    let linkdb = connect_linkdb(&args.linkdb_host, args.linkdb_port).await?;
    let restore: Vec<wave_core::Connection> = linkdb
        .list_connections()
        .await
        .map_err(|e| DaemonError::Infra(format!("loading connections: {e}")))?
        .into_iter()
        .filter(|c| c.virtual_operator == vop)
        .collect();

    // ── Kafka plumbing ─────────────────────────────────────────────

    let producer = JsonProducer::new(&args.kafka_broker)
        .map_err(|e| DaemonError::Infra(format!("kafka producer at {}: {e}", args.kafka_broker)))?;

    let (command_tx, command_rx) = mpsc::channel(256);
    let (monitoring_tx, monitoring_rx) = mpsc::channel(1024);
    let (health_tx, health_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // One consumer per agent: group.id = agent_id, offsets from latest.
    let consumer = spawn_command_consumer(
        &args.kafka_broker,
        &args.agent_id,
        &config_topic,
        command_tx,
        shutdown_rx.clone(),
    )
    .map_err(|e| DaemonError::Infra(format!("kafka consumer at {}: {e}", args.kafka_broker)))?;

    let monitoring_pump = spawn_event_pump(
        producer.clone(),
        monitoring_topic,
        monitoring_rx,
        shutdown_rx.clone(),
    );
    let health_pump = spawn_event_pump(producer, health_topic, health_rx, shutdown_rx.clone());

    // ── Executor ───────────────────────────────────────────────────

    let cfg = AgentConfig {
        agent_id: args.agent_id,
        pop_id: args.pop_id,
        router_id: args.router_id,
        virtual_operator: vop,
        interfaces: args.interfaces,
        telemetry_interval: Duration::from_secs_f64(args.telemetry_interval_sec),
        dedup_capacity: args.dedup_capacity,
    };
    let executor = CommandExecutor::new(cfg, Arc::new(MockTransceiver::new()), monitoring_tx);

    let agent_task = tokio::spawn(run_agent(
        executor,
        restore,
        command_rx,
        health_tx,
        shutdown_rx,
    ));

    // Run until ctrl-c, then drain.
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = agent_task.await;
    let _ = monitoring_pump.await;
    let _ = health_pump.await;
    consumer.abort();
    info!("agent stopped");
    Ok(())
}
