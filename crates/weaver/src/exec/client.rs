//! Remote execution client: one request/response exchange per connection,
//! bounded by the delegation deadline.

use gossamer_common::constants::DELEGATION_TIMEOUT_SECS;
use gossamer_common::{ExecutionDelegation, MeshError, RemoteExecutionSummary};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub struct DelegationClient;

impl DelegationClient {
    /// Send one delegation to a peer's execution service and await the
    /// summary. Timeouts are reported distinctly from other transport
    /// failures.
    pub async fn delegate(
        hostname: &str,
        port: u16,
        delegation: &ExecutionDelegation,
    ) -> Result<RemoteExecutionSummary, MeshError> {
        tracing::info!(host = %hostname, port, runtime = %delegation.runtime_name, "Starting delegation");

        let deadline = Duration::from_secs(DELEGATION_TIMEOUT_SECS);
        match tokio::time::timeout(deadline, Self::exchange(hostname, port, delegation)).await {
            Ok(result) => result,
            Err(_) => Err(MeshError::Timeout(format!(
                "delegation to {hostname}:{port} exceeded {DELEGATION_TIMEOUT_SECS}s"
            ))),
        }
    }

    async fn exchange(
        hostname: &str,
        port: u16,
        delegation: &ExecutionDelegation,
    ) -> Result<RemoteExecutionSummary, MeshError> {
        let stream = TcpStream::connect((hostname, port))
            .await
            .map_err(|e| MeshError::Transport(format!("connect {hostname}:{port}: {e}")))?;

        let (read_half, mut write_half) = stream.into_split();

        let mut request = serde_json::to_string(delegation)
            .map_err(|e| MeshError::Protocol(format!("encode delegation: {e}")))?;
        request.push('\n');

        write_half
            .write_all(request.as_bytes())
            .await
            .map_err(|e| MeshError::Transport(format!("send to {hostname}:{port}: {e}")))?;
        write_half
            .flush()
            .await
            .map_err(|e| MeshError::Transport(format!("send to {hostname}:{port}: {e}")))?;

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| MeshError::Transport(format!("read from {hostname}:{port}: {e}")))?;

        if read == 0 {
            return Err(MeshError::Protocol(format!(
                "{hostname}:{port} closed the connection without a summary"
            )));
        }

        serde_json::from_str(line.trim())
            .map_err(|e| MeshError::Protocol(format!("decode summary from {hostname}:{port}: {e}")))
    }
}
