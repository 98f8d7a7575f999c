//! Remote execution service: one newline-delimited request/response
//! exchange per TCP connection, dispatched through the worker pool.

use anyhow::{Context, Result};
use gossamer_common::{ExecutionDelegation, ExecutionResult, RemoteExecutionSummary, SimpleResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::exec::WorkerPool;
use crate::mesh::Membership;
use crate::runtime::RuntimeRegistry;

/// Connection-oriented execution server on the node's communication port.
pub struct DelegationServer {
    listener: TcpListener,
    registry: Arc<RuntimeRegistry>,
    membership: Arc<Membership>,
    pool: Arc<WorkerPool>,
}

impl DelegationServer {
    pub async fn bind(
        addr: &str,
        registry: Arc<RuntimeRegistry>,
        membership: Arc<Membership>,
        pool: Arc<WorkerPool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("Failed to bind execution service socket")?;

        Ok(Self {
            listener,
            registry,
            membership,
            pool,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Execution service socket has no local address")
    }

    /// Accept loop. Every connection becomes a pool job; after each accept
    /// the active-worker count is reported to the membership store as the
    /// node load signal.
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "⚙️ Remote execution service started");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let registry = self.registry.clone();
                            self.pool.submit(Box::pin(handle_connection(stream, peer, registry)));
                            self.membership.update_utilization(self.pool.active_jobs());
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept client connection");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("⚙️ Remote execution service shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, registry: Arc<RuntimeRegistry>) {
    if let Err(e) = serve_connection(stream, &registry).await {
        tracing::error!(peer = %peer, error = %e, "Failed to handle delegated execution");
    }
}

/// Read one non-empty request line, execute, write one summary line.
async fn serve_connection(stream: TcpStream, registry: &RuntimeRegistry) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .context("Failed to read client request")?;

        if read == 0 {
            // client went away without sending a request
            return Ok(());
        }
        if !line.trim().is_empty() {
            break;
        }
    }

    let delegation: ExecutionDelegation =
        serde_json::from_str(line.trim()).context("Malformed delegation payload")?;

    let summary = RemoteExecutionSummary {
        result: execute_delegation(registry, &delegation),
    };

    let mut response =
        serde_json::to_string(&summary).context("Failed to serialize execution summary")?;
    response.push('\n');

    write_half
        .write_all(response.as_bytes())
        .await
        .context("Failed to write execution summary")?;
    write_half
        .flush()
        .await
        .context("Failed to flush execution summary")?;

    Ok(())
}

/// Dispatch one delegation: look up the runtime, invoke `repeat_times + 1`
/// times (strictly sequential), fold into an aggregate when repeated.
fn execute_delegation(
    registry: &RuntimeRegistry,
    delegation: &ExecutionDelegation,
) -> ExecutionResult {
    let Some(runtime) = registry.get(&delegation.runtime_name) else {
        tracing::warn!(runtime = %delegation.runtime_name, "Delegation named an unknown runtime");
        return ExecutionResult::Simple(SimpleResult::new(
            2,
            format!("unknown runtime: {}", delegation.runtime_name),
        ));
    };

    let started = Instant::now();
    let result = if delegation.repeat_times == 0 {
        ExecutionResult::Simple(runtime.execute(&delegation.input))
    } else {
        let mut results = Vec::with_capacity(delegation.repeat_times as usize + 1);
        for _ in 0..=delegation.repeat_times {
            results.push(runtime.execute(&delegation.input));
        }
        ExecutionResult::aggregate(results)
    };

    tracing::info!(
        runtime = %delegation.runtime_name,
        status = result.status_code(),
        time_took_ms = started.elapsed().as_millis() as u64,
        "Requested execution finished"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::DelegationClient;
    use crate::runtime::{CommandRuntime, ExpressionRuntime};
    use gossamer_common::{ExecutionInput, NodeIdentity};
    use std::collections::BTreeSet;

    fn test_registry(membership: &Arc<Membership>) -> Arc<RuntimeRegistry> {
        let mesh = membership.clone();
        let program = CommandRuntime::new("Program", move |input| match input.command.as_str() {
            "info" => Ok(SimpleResult::new(
                0,
                serde_json::to_string(&mesh.all_clusters())?,
            )),
            _ => Ok(SimpleResult::new(0, "Invalid command")),
        });

        let mut registry = RuntimeRegistry::new();
        registry.register(Arc::new(program));
        registry.register(Arc::new(ExpressionRuntime::new()));
        Arc::new(registry)
    }

    fn test_membership() -> Arc<Membership> {
        Arc::new(Membership::new(
            NodeIdentity::new("127.0.0.1", 9301, 9302)
                .with_runtimes(BTreeSet::from(["CLI[Program]".to_string()])),
            ["prod".to_string()],
            [],
        ))
    }

    async fn start_server() -> (SocketAddr, Arc<Membership>, tokio::sync::broadcast::Sender<()>) {
        let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
        let membership = test_membership();
        let registry = test_registry(&membership);
        let pool = WorkerPool::start(&shutdown_tx);

        let server = DelegationServer::bind("127.0.0.1:0", registry, membership.clone(), pool)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { server.run(shutdown).await });

        (addr, membership, shutdown_tx)
    }

    #[tokio::test]
    async fn info_command_returns_cluster_snapshot() {
        let (addr, _membership, shutdown_tx) = start_server().await;

        let delegation = ExecutionDelegation {
            runtime_name: "CLI[Program]".to_string(),
            input: ExecutionInput::new("info"),
            repeat_times: 0,
        };

        let summary = DelegationClient::delegate(&addr.ip().to_string(), addr.port(), &delegation)
            .await
            .unwrap();

        match summary.result {
            ExecutionResult::Simple(result) => {
                assert_eq!(result.status_code, 0);
                assert!(result.output.contains("\"prod\""));
                assert!(result.output.contains("127.0.0.1"));
            }
            ExecutionResult::Aggregate(_) => panic!("expected simple result"),
        }

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn repeated_execution_aggregates_in_order() {
        let (addr, _membership, shutdown_tx) = start_server().await;

        let delegation = ExecutionDelegation {
            runtime_name: "LanguageExpression".to_string(),
            input: ExecutionInput::new("6 * 7"),
            repeat_times: 2,
        };

        let summary = DelegationClient::delegate(&addr.ip().to_string(), addr.port(), &delegation)
            .await
            .unwrap();

        match summary.result {
            ExecutionResult::Aggregate(aggregate) => {
                assert_eq!(aggregate.status_code, 0);
                assert_eq!(aggregate.sub_results.len(), 3);
                assert_eq!(aggregate.output, "42\n42\n42");
            }
            ExecutionResult::Simple(_) => panic!("expected aggregate result"),
        }

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn unknown_runtime_answers_status_two() {
        let (addr, _membership, shutdown_tx) = start_server().await;

        let delegation = ExecutionDelegation {
            runtime_name: "NoSuchRuntime".to_string(),
            input: ExecutionInput::new("anything"),
            repeat_times: 0,
        };

        let summary = DelegationClient::delegate(&addr.ip().to_string(), addr.port(), &delegation)
            .await
            .unwrap();

        assert_eq!(summary.result.status_code(), 2);
        assert_eq!(summary.result.output(), "unknown runtime: NoSuchRuntime");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn utilization_is_reported_after_accepts() {
        let (addr, membership, shutdown_tx) = start_server().await;

        let delegation = ExecutionDelegation {
            runtime_name: "LanguageExpression".to_string(),
            input: ExecutionInput::new("1 + 1"),
            repeat_times: 0,
        };
        DelegationClient::delegate(&addr.ip().to_string(), addr.port(), &delegation)
            .await
            .unwrap();

        let load = membership.utilization();
        assert!(load.jobs_in_progress <= load.job_total_capacity);

        let _ = shutdown_tx.send(());
    }
}
