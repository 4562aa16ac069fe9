//! wavegridd — the WaveGrid daemon.
//!
//! Single binary that can run any of the four control-plane services:
//!
//! - **linkdb** — topology + spectrum store with its REST API
//! - **slice-manager** — vOp activation, topic provisioning, reservations
//! - **controller** — per-vOp connection lifecycle + QoT loop
//! - **agent** — per-switch command executor + telemetry publisher
//!
//! # Usage
//!
//! ```text
//! wavegridd linkdb --port 8090 --data-dir /var/lib/wavegrid --seed
//! wavegridd slice-manager --port 8091 --kafka-broker kafka:9092
//! wavegridd controller --port 8092 --virtual-operator vOp2 --kafka-broker kafka:9092
//! wavegridd agent --virtual-operator vOp2 --agent-id agent-pop1-router1 \
//!     --pop-id pop1 --router-id router1 --interfaces Ethernet48,Ethernet56
//! ```
//!
//! Every flag falls back to its environment variable (`KAFKA_BROKER`,
//! `VIRTUAL_OPERATOR`, `LINKDB_HOST`, ...). Exit codes: 0 success,
//! 1 fatal config/validation error, 2 infrastructure unreachable.

mod agent_mode;
mod controller_mode;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use wavegrid_linkdb::client::LinkDbClient;
use wavegrid_slice::{KafkaTopicProvisioner, NoopDeployer, SliceOrchestrator};

/// A startup failure, mapped onto the process exit code.
#[derive(Debug)]
pub enum DaemonError {
    /// Bad configuration or validation: exit 1.
    Config(String),
    /// Kafka/LinkDB unreachable after retries: exit 2.
    Infra(String),
    /// Runtime failure after successful startup: exit 1.
    Runtime(String),
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::Config(msg) => write!(f, "configuration error: {msg}"),
            DaemonError::Infra(msg) => write!(f, "infrastructure unreachable: {msg}"),
            DaemonError::Runtime(msg) => write!(f, "runtime error: {msg}"),
        }
    }
}

#[derive(Parser)]
#[command(name = "wavegridd", about = "WaveGrid control-plane daemon")]
struct Cli {
    /// Log level filter (overridden by RUST_LOG).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Link Database service.
    Linkdb {
        /// HTTP port.
        #[arg(long, env = "LINKDB_PORT", default_value = "8090")]
        port: u16,

        /// Data directory for the redb store.
        #[arg(long, env = "LINKDB_DATA_DIR", default_value = "/var/lib/wavegrid")]
        data_dir: PathBuf,

        /// Seed the three-POP sample topology on first start.
        #[arg(long)]
        seed: bool,
    },

    /// Run the Slice Manager service.
    SliceManager {
        /// HTTP port.
        #[arg(long, env = "SLICE_MANAGER_PORT", default_value = "8091")]
        port: u16,

        #[arg(long, env = "KAFKA_BROKER", default_value = "localhost:9092")]
        kafka_broker: String,

        #[arg(long, env = "LINKDB_HOST", default_value = "localhost")]
        linkdb_host: String,

        #[arg(long, env = "LINKDB_PORT", default_value = "8090")]
        linkdb_port: u16,

        /// Partitions for each per-vOp topic.
        #[arg(long, env = "TOPIC_PARTITIONS", default_value = "3")]
        topic_partitions: i32,

        /// Replication factor for each per-vOp topic.
        #[arg(long, env = "TOPIC_REPLICATION", default_value = "1")]
        topic_replication: i32,
    },

    /// Run a per-vOp controller.
    Controller(controller_mode::ControllerArgs),

    /// Run a per-switch SONiC agent.
    Agent(agent_mode::AgentArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage mistakes are configuration errors (exit 1); help and
            // version output are not errors at all.
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(1),
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},wavegrid=debug", cli.log_level)
                    .parse()
                    .unwrap_or_else(|_| "info".parse().unwrap())
            }),
        )
        .init();

    let result = match cli.command {
        Command::Linkdb {
            port,
            data_dir,
            seed,
        } => run_linkdb(port, data_dir, seed).await,
        Command::SliceManager {
            port,
            kafka_broker,
            linkdb_host,
            linkdb_port,
            topic_partitions,
            topic_replication,
        } => {
            run_slice_manager(
                port,
                kafka_broker,
                linkdb_host,
                linkdb_port,
                topic_partitions,
                topic_replication,
            )
            .await
        }
        Command::Controller(args) => controller_mode::run(args).await,
        Command::Agent(args) => agent_mode::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            match e {
                DaemonError::Config(_) | DaemonError::Runtime(_) => ExitCode::from(1),
                DaemonError::Infra(_) => ExitCode::from(2),
            }
        }
    }
}

/// Serve `router` on the port with ctrl-c graceful shutdown, signalling
/// `on_shutdown` for background tasks.
pub async fn serve(
    port: u16,
    router: axum::Router,
    on_shutdown: tokio::sync::watch::Sender<bool>,
) -> Result<(), DaemonError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DaemonError::Config(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            let _ = on_shutdown.send(true);
        })
        .await
        .map_err(|e| DaemonError::Runtime(e.to_string()))
}

/// Build the LinkDB client and verify the service is reachable.
pub async fn connect_linkdb(host: &str, port: u16) -> Result<LinkDbClient, DaemonError> {
    let client = LinkDbClient::new(format!("http://{host}:{port}"));
    client
        .health()
        .await
        .map_err(|e| DaemonError::Infra(format!("linkdb at {host}:{port}: {e}")))?;
    Ok(client)
}

async fn run_linkdb(port: u16, data_dir: PathBuf, seed: bool) -> Result<(), DaemonError> {
    info!("WaveGrid Link Database starting");
    std::fs::create_dir_all(&data_dir)
        .map_err(|e| DaemonError::Config(format!("data dir {}: {e}", data_dir.display())))?;
    let db_path = data_dir.join("linkdb.redb");

    let db = wavegrid_linkdb::LinkDb::open(&db_path)
        .map_err(|e| DaemonError::Config(format!("open {}: {e}", db_path.display())))?;
    info!(path = %db_path.display(), "link database opened");

    if seed {
        let seeded = db
            .seed_sample_topology()
            .map_err(|e| DaemonError::Runtime(e.to_string()))?;
        if seeded {
            info!("sample topology seeded");
        }
    }

    let (shutdown_tx, _shutdown_rx) = tokio::sync::watch::channel(false);
    serve(port, wavegrid_linkdb::service::build_router(db), shutdown_tx).await
}

async fn run_slice_manager(
    port: u16,
    kafka_broker: String,
    linkdb_host: String,
    linkdb_port: u16,
    topic_partitions: i32,
    topic_replication: i32,
) -> Result<(), DaemonError> {
    info!("WaveGrid Slice Manager starting");
    let linkdb = connect_linkdb(&linkdb_host, linkdb_port).await?;

    let provisioner = KafkaTopicProvisioner::new(&kafka_broker, topic_partitions, topic_replication)
        .map_err(|e| DaemonError::Infra(format!("kafka admin at {kafka_broker}: {e}")))?;

    let orchestrator = Arc::new(SliceOrchestrator::new(
        linkdb,
        Arc::new(provisioner),
        Arc::new(NoopDeployer),
    ));

    let (shutdown_tx, _shutdown_rx) = tokio::sync::watch::channel(false);
    serve(
        port,
        wavegrid_slice::service::build_router(orchestrator),
        shutdown_tx,
    )
    .await
}
