//! # Weaver - Gossamer Mesh Node
//!
//! One node of a self-hosted compute mesh. Nodes bootstrap from a short
//! static address list, converge on a shared view of named clusters through
//! UDP heartbeat gossip, and route execution requests to named runtimes on
//! any discovered peer.
//!
//! ## Architecture
//! ```text
//! Console / peers → Execution Router → Runtime Registry (local)
//!                                    → Delegation Client → peer (remote)
//! Heartbeat gossip ⇄ Membership Store ← load signal ← Execution Service
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use gossamer_common::SimpleResult;
use gossamer_common::constants::DEFAULT_CONFIG_PATH;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod console;
mod exec;
mod gossip;
mod mesh;
mod runtime;

use config::NodeConfig;
use exec::{DelegationServer, ExecutionRouter, WorkerPool};
use gossip::HeartbeatService;
use mesh::Membership;
use runtime::{CommandRuntime, ExpressionRuntime, RuntimeRegistry};

/// Gossamer Weaver - mesh node daemon
#[derive(Parser, Debug)]
#[command(name = "weaver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Hostname to advertise (overrides config)
    #[arg(long, env = "NODE_HOSTNAME")]
    hostname: Option<String>,

    /// Remote execution port (overrides config)
    #[arg(long, env = "COMMUNICATION_PORT")]
    communication_port: Option<u16>,

    /// Heartbeat port (overrides config)
    #[arg(long, env = "HEARTBEAT_PORT")]
    heartbeat_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("🕸️ Starting Gossamer Weaver v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; an invalid node description is fatal before any
    // network resource is opened.
    let node_config = NodeConfig::load(&args.config, &args)?;
    info!(
        hostname = %node_config.hostname,
        web_port = node_config.web_port,
        communication_port = node_config.communication_port,
        heartbeat_port = node_config.heartbeat_port,
        clusters = ?node_config.clusters,
        "📋 Node configuration loaded"
    );

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Membership store: self joins every configured cluster, advertising
    // the runtimes this build carries.
    let runtime_names = BTreeSet::from([
        CommandRuntime::qualified_name("Program"),
        ExpressionRuntime::NAME.to_string(),
    ]);
    let membership = Arc::new(Membership::from_config(&node_config, runtime_names));

    let heartbeat = Arc::new(HeartbeatService::new(
        membership.clone(),
        node_config.heartbeat_port,
    ));

    // Out-of-band heartbeat sends requested by the CLI `join` command.
    let (join_tx, mut join_rx) = tokio::sync::mpsc::unbounded_channel::<(String, u16)>();
    tokio::spawn({
        let heartbeat = heartbeat.clone();
        async move {
            while let Some((host, port)) = join_rx.recv().await {
                let targets = HashSet::from([format!("{host}:{port}")]);
                if let Err(e) = heartbeat.send_once(&targets, true).await {
                    tracing::warn!(host = %host, port, error = %e, "Join heartbeat failed");
                }
            }
        }
    });

    let registry = Arc::new(build_registry(membership.clone(), join_tx));

    // Gossip loops: receiver, discovery sender, steady-state broadcaster.
    spawn_loop("heartbeat receiver", {
        let heartbeat = heartbeat.clone();
        let shutdown = shutdown_tx.subscribe();
        async move { heartbeat.run_receiver(shutdown).await }
    });
    spawn_loop("discovery sender", {
        let heartbeat = heartbeat.clone();
        let shutdown = shutdown_tx.subscribe();
        async move { heartbeat.run_discovery(shutdown).await }
    });
    spawn_loop("heartbeat broadcaster", {
        let heartbeat = heartbeat.clone();
        let shutdown = shutdown_tx.subscribe();
        async move { heartbeat.run_broadcaster(shutdown).await }
    });

    // Remote execution service behind the bounded worker pool.
    let pool = WorkerPool::start(&shutdown_tx);
    let server = DelegationServer::bind(
        &format!("0.0.0.0:{}", node_config.communication_port),
        registry.clone(),
        membership.clone(),
        pool,
    )
    .await?;
    spawn_loop("execution service", {
        let shutdown = shutdown_tx.subscribe();
        async move { server.run(shutdown).await }
    });

    let router = Arc::new(ExecutionRouter::new(membership.clone(), registry.clone()));
    let cli = registry
        .get(&CommandRuntime::qualified_name("Program"))
        .context("CLI runtime not registered")?;

    info!("✅ Weaver started, ready to act");

    tokio::select! {
        result = console::run(cli, router) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(());
    info!("👋 Weaver shutdown complete");

    Ok(())
}

/// Build the runtime registry: the `CLI[Program]` command handler plus the
/// expression evaluator.
fn build_registry(
    membership: Arc<Membership>,
    join_tx: tokio::sync::mpsc::UnboundedSender<(String, u16)>,
) -> RuntimeRegistry {
    let mesh = membership.clone();
    let program = CommandRuntime::new("Program", move |input| match input.command.as_str() {
        "info" => Ok(SimpleResult::new(
            0,
            serde_json::to_string(&mesh.all_clusters())?,
        )),
        "join" => {
            let host = input
                .positional_arguments
                .first()
                .context("join requires <host> <port>")?
                .clone();
            let port: u16 = input
                .positional_arguments
                .get(1)
                .context("join requires <host> <port>")?
                .parse()
                .context("join port must be a 16-bit number")?;

            join_tx
                .send((host, port))
                .context("heartbeat sender is gone")?;

            Ok(SimpleResult::new(0, "OK"))
        }
        "shutdown" => {
            info!("Shutdown requested via CLI runtime");
            std::process::exit(0);
        }
        _ => Ok(SimpleResult::new(0, "Invalid command")),
    });

    let mut registry = RuntimeRegistry::new();
    registry.register(Arc::new(program));
    registry.register(Arc::new(ExpressionRuntime::new()));

    registry
}

/// Spawn a long-running loop, logging its terminal error if it has one.
fn spawn_loop(
    name: &'static str,
    task: impl std::future::Future<Output = Result<()>> + Send + 'static,
) {
    tokio::spawn(async move {
        if let Err(e) = task.await {
            tracing::error!(task = name, error = %e, "Background task failed");
        }
    });
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
