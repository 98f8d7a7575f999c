//! Heartbeat Gossip Protocol (UDP)
//!
//! Every node periodically advertises its identity and full cluster view to
//! its peers. Three independent loops drive convergence:
//! - discovery sender: reaches the configured bootstrap addresses until each
//!   one is discovered, then retires itself
//! - steady-state sender: broadcasts to every already-known peer
//! - receiver: merges inbound views into the membership store
//!
//! Merges are set-union, idempotent and commutative, so duplicate or
//! reordered datagrams are harmless.

use anyhow::{Context, Result};
use chrono::Utc;
use gossamer_common::constants::{
    DISCOVERY_RESEND_INTERVAL_SECS, HEARTBEAT_BUFFER_SIZE, HEARTBEAT_INTERVAL_MS,
};
use gossamer_common::Heartbeat;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::mesh::Membership;

/// Gossip service for mesh discovery and membership convergence.
pub struct HeartbeatService {
    membership: Arc<Membership>,
    bind_addr: String,
}

impl HeartbeatService {
    pub fn new(membership: Arc<Membership>, heartbeat_port: u16) -> Self {
        Self {
            membership,
            bind_addr: format!("0.0.0.0:{heartbeat_port}"),
        }
    }

    /// Snapshot self plus, optionally, the full cluster view.
    fn make_heartbeat(&self, with_clusters: bool) -> Heartbeat {
        Heartbeat {
            sender: self.membership.self_node().clone(),
            timestamp: Utc::now().timestamp_millis(),
            clusters: with_clusters.then(|| self.membership.all_clusters()),
        }
    }

    /// One heartbeat to each target. A failed send is logged and, for
    /// discovery rounds, marks the bootstrap address unreachable; it never
    /// blocks the remaining targets in the round.
    async fn send_round(
        &self,
        socket: &UdpSocket,
        targets: &HashSet<String>,
        with_clusters: bool,
        mark_failures: bool,
    ) {
        if targets.is_empty() {
            return;
        }

        let heartbeat = self.make_heartbeat(with_clusters);
        let bytes = match serde_json::to_vec(&heartbeat) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize heartbeat");
                return;
            }
        };

        for target in targets {
            if let Err(e) = socket.send_to(&bytes, target.as_str()).await {
                tracing::warn!(peer = %target, error = %e, "Failed to send heartbeat");
                if mark_failures {
                    self.membership.mark_unreachable(target);
                }
            }
        }
    }

    /// Fire a single heartbeat round from an ephemeral socket. Backs the
    /// console `join` command and the initial discovery burst.
    pub async fn send_once(&self, targets: &HashSet<String>, with_clusters: bool) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("Failed to bind heartbeat sender socket")?;

        self.send_round(&socket, targets, with_clusters, false).await;

        Ok(())
    }

    /// Run the discovery sender: an immediate round to every bootstrap
    /// address, then a resend every 5s to exactly the not-yet-discovered
    /// rest. The task cancels itself once that set is empty.
    pub async fn run_discovery(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<()> {
        let initial = self.membership.undiscovered_bootstrap();
        if initial.is_empty() {
            tracing::info!("No bootstrap addresses configured, discovery sender idle");
            return Ok(());
        }

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("Failed to bind discovery sender socket")?;

        tracing::info!(targets = ?initial, "📡 Discovery sender started");
        self.send_round(&socket, &initial, true, true).await;

        let interval = Duration::from_secs(DISCOVERY_RESEND_INTERVAL_SECS);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let rest = self.membership.undiscovered_bootstrap();
                    if rest.is_empty() {
                        tracing::info!("All bootstrap addresses discovered, discovery sender retiring");
                        break;
                    }

                    self.send_round(&socket, &rest, true, true).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("📡 Discovery sender shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Run the steady-state broadcaster: every 3s, starting immediately,
    /// send self + the full cluster snapshot to every known peer.
    pub async fn run_broadcaster(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("Failed to bind heartbeat sender socket")?;

        let mut ticker = tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));

        tracing::info!("🗣️ Heartbeat broadcaster started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let targets: HashSet<String> = self
                        .membership
                        .known_peers()
                        .iter()
                        .map(|peer| peer.heartbeat_endpoint())
                        .collect();

                    self.send_round(&socket, &targets, true, false).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("🗣️ Heartbeat broadcaster shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Run the heartbeat receiver on the node's heartbeat port.
    pub async fn run_receiver(
        &self,
        shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<()> {
        let socket = UdpSocket::bind(&self.bind_addr)
            .await
            .context("Failed to bind heartbeat receiver socket")?;

        tracing::info!(addr = %self.bind_addr, "👂 Heartbeat receiver started");

        self.run_receiver_on(socket, shutdown).await
    }

    /// Receive loop over an already-bound socket. Decode failures are logged
    /// and discarded; the loop only ends on shutdown.
    pub(crate) async fn run_receiver_on(
        &self,
        socket: UdpSocket,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut buf = vec![0u8; HEARTBEAT_BUFFER_SIZE];

        loop {
            tokio::select! {
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, addr)) => {
                            self.handle_packet(&buf[..len], addr);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Heartbeat receive error");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("👂 Heartbeat receiver shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle one inbound datagram.
    fn handle_packet(&self, data: &[u8], addr: SocketAddr) {
        let heartbeat: Heartbeat = match serde_json::from_slice(data) {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(addr = %addr, error = %e, "Invalid heartbeat payload");
                return;
            }
        };

        tracing::trace!(
            sender = %heartbeat.sender.hostname,
            timestamp = heartbeat.timestamp,
            "Received heartbeat"
        );

        self.apply_heartbeat(heartbeat);
    }

    /// Merge an inbound cluster view.
    ///
    /// Only clusters this node already knows are considered; a cluster
    /// advertised by the sender but unknown locally is not adopted. Every
    /// previously unseen member of a common cluster is merged, and its
    /// heartbeat endpoint flips the matching bootstrap address to discovered.
    pub(crate) fn apply_heartbeat(&self, heartbeat: Heartbeat) {
        let Some(clusters) = heartbeat.clusters else {
            return;
        };

        let local_names = self.membership.cluster_names();

        for cluster in clusters {
            if !local_names.contains(&cluster.name) {
                continue;
            }

            for node in cluster.nodes {
                if self.membership.has_member(&cluster.name, &node) {
                    continue;
                }

                self.membership.mark_discovered(&node.heartbeat_endpoint());
                tracing::info!(
                    node = %node.heartbeat_endpoint(),
                    cluster = %cluster.name,
                    "Node discovered in cluster"
                );
                self.membership.merge(&cluster.name, node);
            }
        }
    }
}
