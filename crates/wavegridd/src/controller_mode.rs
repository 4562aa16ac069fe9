//! Controller mode: wire the control loop to Kafka and serve the API.

use std::time::Duration;

use clap::Args;
use tokio::sync::{mpsc, watch};
use tracing::info;

use wavegrid_controller::control::{ControlHandle, Controller, ControllerConfig};
use wavegrid_controller::qot::{AdjustMode, QotConfig};
use wavegrid_controller::service::{build_router, ControllerState};
use wavegrid_kafka::{spawn_command_pump, spawn_event_consumer, JsonProducer};

use crate::{connect_linkdb, serve, DaemonError};

#[derive(Args)]
pub struct ControllerArgs {
    /// HTTP port.
    #[arg(long, env = "CONTROLLER_PORT", default_value = "8092")]
    pub port: u16,

    #[arg(long, env = "KAFKA_BROKER", default_value = "localhost:9092")]
    pub kafka_broker: String,

    /// The tenant this controller serves.
    #[arg(long, env = "VIRTUAL_OPERATOR")]
    pub virtual_operator: String,

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

    #[arg(long, env = "COMMAND_TIMEOUT_SEC", default_value = "30")]
    pub command_timeout_sec: u64,

    /// Initial tx-power commanded at setup (dBm).
    #[arg(long, env = "DEFAULT_TX_POWER_DBM", default_value = "-2.0", allow_hyphen_values = true)]
    pub default_tx_power_dbm: f64,

    // ── QoT loop knobs ─────────────────────────────────────────────
    #[arg(
        long,
        env = "ENABLE_QOT_MONITORING",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub enable_qot_monitoring: bool,

    #[arg(long, env = "OSNR_THRESHOLD_DB", default_value = "18.0")]
    pub osnr_threshold_db: f64,

    #[arg(long, env = "BER_THRESHOLD", default_value = "1e-3")]
    pub ber_threshold: f64,

    #[arg(long, env = "QOT_SAMPLES", default_value = "3")]
    pub qot_samples: u32,

    #[arg(long, env = "QOT_COOLDOWN_SEC", default_value = "20")]
    pub qot_cooldown_sec: u64,

    #[arg(long, env = "TX_STEP_DB", default_value = "1.0", allow_hyphen_values = true)]
    pub tx_step_db: f64,

    #[arg(long, env = "TX_MIN_DBM", default_value = "-15.0", allow_hyphen_values = true)]
    pub tx_min_dbm: f64,

    #[arg(long, env = "TX_MAX_DBM", default_value = "0.0", allow_hyphen_values = true)]
    pub tx_max_dbm: f64,

    /// Which endpoints QoT reconfigurations adjust: both | one.
    #[arg(long, env = "ADJUST_MODE", default_value = "both")]
    pub adjust_mode: String,
}

pub async fn run(args: ControllerArgs) -> Result<(), DaemonError> {
    let vop = args.virtual_operator.clone();
    info!(vop = %vop, "WaveGrid controller starting");

    let adjust_mode: AdjustMode = args.adjust_mode.parse().map_err(DaemonError::Config)?;
    if args.tx_min_dbm > args.tx_max_dbm {
        return Err(DaemonError::Config(format!(
            "TX_MIN_DBM {} exceeds TX_MAX_DBM {}",
            args.tx_min_dbm, args.tx_max_dbm
        )));
    }

    let cfg = ControllerConfig {
        controller_id: format!("controller-{vop}"),
        virtual_operator: vop.clone(),
        default_tx_power_dbm: args.default_tx_power_dbm,
        command_timeout: Duration::from_secs(args.command_timeout_sec),
        qot: QotConfig {
            enabled: args.enable_qot_monitoring,
            osnr_threshold_db: args.osnr_threshold_db,
            ber_threshold: args.ber_threshold,
            persistency_samples: args.qot_samples,
            cooldown: Duration::from_secs(args.qot_cooldown_sec),
            tx_step_db: args.tx_step_db,
            tx_min_dbm: args.tx_min_dbm,
            tx_max_dbm: args.tx_max_dbm,
            adjust_mode,
        },
    };

    let config_topic = args.config_topic.unwrap_or_else(|| format!("config_{vop}"));
    let monitoring_topic = args
        .monitoring_topic
        .unwrap_or_else(|| format!("monitoring_{vop}"));
    let health_topic = args.health_topic.unwrap_or_else(|| format!("health_{vop}"));

    let linkdb = connect_linkdb(&args.linkdb_host, args.linkdb_port).await?;

    // ── Kafka plumbing ─────────────────────────────────────────────

    let producer = JsonProducer::new(&args.kafka_broker)
        .map_err(|e| DaemonError::Infra(format!("kafka producer at {}: {e}", args.kafka_broker)))?;

    let (command_tx, command_rx) = mpsc::channel(256);
    let (event_tx, event_rx) = mpsc::channel(1024);
    let (request_tx, request_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pump = spawn_command_pump(
        producer,
        config_topic.clone(),
        command_rx,
        shutdown_rx.clone(),
    );

    // Group id unique per controller instance: every instance sees the
    // full monitoring stream from `latest` on cold start.
    let group_id = format!("controller-{vop}-{}", uuid::Uuid::new_v4().simple());
    let consumer = spawn_event_consumer(
        &args.kafka_broker,
        &group_id,
        &[monitoring_topic.as_str(), health_topic.as_str()],
        event_tx,
        shutdown_rx.clone(),
    )
    .map_err(|e| DaemonError::Infra(format!("kafka consumer at {}: {e}", args.kafka_broker)))?;

    // ── Control loop ───────────────────────────────────────────────

    let mut controller = Controller::new(cfg, linkdb.clone(), command_tx);
    let restored = controller
        .restore()
        .await
        .map_err(|e| DaemonError::Infra(format!("restoring connections: {e}")))?;
    info!(restored, "connection records restored from linkdb");

    let loop_handle = tokio::spawn(controller.run(request_rx, event_rx, shutdown_rx));

    // ── API server ─────────────────────────────────────────────────

    let state = ControllerState {
        handle: ControlHandle::new(request_tx),
        linkdb,
    };
    serve(args.port, build_router(state), shutdown_tx).await?;

    // Drain in-flight commands before exiting.
    let _ = loop_handle.await;
    let _ = pump.await;
    consumer.abort();
    info!("controller stopped");
    Ok(())
}
