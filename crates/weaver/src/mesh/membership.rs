//! The node's converging view of the mesh: self identity, named clusters,
//! bootstrap discovery state, and the local load signal.

use gossamer_common::{Cluster, NodeIdentity, NodeUtilization};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::config::NodeConfig;
use crate::mesh::{BootstrapStatus, BootstrapTracker};

/// Shared membership store, mutated concurrently by the heartbeat receiver,
/// the execution service, and router reads.
///
/// Cluster membership lives in a single keyed map `name -> member set` behind
/// one lock, so a merge is one atomic read-modify-write and every reader
/// observes either the pre- or post-merge member set. The map is also the
/// name index; snapshots are derived from it.
pub struct Membership {
    self_node: NodeIdentity,
    clusters: RwLock<HashMap<String, HashSet<NodeIdentity>>>,
    bootstrap: RwLock<BootstrapTracker>,
    utilization: RwLock<NodeUtilization>,
}

impl Membership {
    pub fn new(
        self_node: NodeIdentity,
        cluster_names: impl IntoIterator<Item = String>,
        bootstrap_addresses: impl IntoIterator<Item = String>,
    ) -> Self {
        let clusters = cluster_names
            .into_iter()
            .map(|name| (name, HashSet::from([self_node.clone()])))
            .collect();

        Self {
            self_node,
            clusters: RwLock::new(clusters),
            bootstrap: RwLock::new(BootstrapTracker::new(bootstrap_addresses)),
            utilization: RwLock::new(NodeUtilization::default()),
        }
    }

    /// Build the initial mesh view from config: self joins every configured
    /// cluster, advertising the given runtime capabilities.
    pub fn from_config(config: &NodeConfig, supported_runtimes: BTreeSet<String>) -> Self {
        let self_node = NodeIdentity::new(
            config.hostname.clone(),
            config.communication_port,
            config.heartbeat_port,
        )
        .with_runtimes(supported_runtimes);

        Self::new(
            self_node,
            config.clusters.iter().cloned(),
            config.bootstrap_addresses.iter().cloned(),
        )
    }

    pub fn self_node(&self) -> &NodeIdentity {
        &self.self_node
    }

    /// Insert `node` into the named cluster, creating the cluster when it is
    /// unknown. Idempotent and commutative; concurrent merges never lose an
    /// update.
    pub fn merge(&self, cluster_name: &str, node: NodeIdentity) {
        let mut clusters = self.clusters.write();
        clusters
            .entry(cluster_name.to_string())
            .or_default()
            .insert(node);
    }

    /// True iff `node` (by identity equality) is currently a member.
    pub fn has_member(&self, cluster_name: &str, node: &NodeIdentity) -> bool {
        self.clusters
            .read()
            .get(cluster_name)
            .is_some_and(|members| members.contains(node))
    }

    /// Consistent snapshot of every known cluster, sorted by name.
    pub fn all_clusters(&self) -> Vec<Cluster> {
        let clusters = self.clusters.read();
        let mut snapshot: Vec<Cluster> = clusters
            .iter()
            .map(|(name, members)| Cluster::new(name.clone(), members.clone()))
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));

        snapshot
    }

    /// Names of the locally known clusters.
    pub fn cluster_names(&self) -> HashSet<String> {
        self.clusters.read().keys().cloned().collect()
    }

    /// Every known peer (any cluster, deduplicated), excluding self.
    pub fn known_peers(&self) -> HashSet<NodeIdentity> {
        let clusters = self.clusters.read();
        clusters
            .values()
            .flatten()
            .filter(|node| **node != self.self_node)
            .cloned()
            .collect()
    }

    pub fn mark_discovered(&self, address: &str) {
        self.bootstrap
            .write()
            .update(address, BootstrapStatus::Discovered);
    }

    pub fn mark_unreachable(&self, address: &str) {
        self.bootstrap
            .write()
            .update(address, BootstrapStatus::Unreachable);
    }

    pub fn bootstrap_status(&self, address: &str) -> Option<BootstrapStatus> {
        self.bootstrap.read().status(address)
    }

    /// Bootstrap addresses the discovery sender must still reach.
    pub fn undiscovered_bootstrap(&self) -> HashSet<String> {
        self.bootstrap.read().undiscovered()
    }

    /// Record the execution service's active worker count.
    pub fn update_utilization(&self, jobs_in_progress: usize) {
        self.utilization.write().jobs_in_progress = jobs_in_progress;
    }

    pub fn utilization(&self) -> NodeUtilization {
        *self.utilization.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> Membership {
        Membership::new(
            NodeIdentity::new("self-node", 7001, 7002),
            ["prod".to_string()],
            ["node-b:7002".to_string()],
        )
    }

    fn node(hostname: &str) -> NodeIdentity {
        NodeIdentity::new(hostname, 8001, 8002)
    }

    #[test]
    fn self_is_member_of_configured_clusters() {
        let membership = store();
        let me = membership.self_node().clone();
        assert!(membership.has_member("prod", &me));
    }

    #[test]
    fn merge_creates_unknown_clusters() {
        let membership = store();
        membership.merge("staging", node("peer-a"));

        assert!(membership.has_member("staging", &node("peer-a")));
        assert_eq!(membership.all_clusters().len(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let membership = store();
        membership.merge("prod", node("peer-a"));
        membership.merge("prod", node("peer-a"));

        let clusters = membership.all_clusters();
        let prod = clusters.iter().find(|c| c.name == "prod").unwrap();
        assert_eq!(prod.nodes.len(), 2); // self + peer-a
    }

    #[test]
    fn merge_is_commutative() {
        let ab = store();
        ab.merge("prod", node("peer-a"));
        ab.merge("prod", node("peer-b"));

        let ba = store();
        ba.merge("prod", node("peer-b"));
        ba.merge("prod", node("peer-a"));

        let members = |m: &Membership| {
            let clusters = m.all_clusters();
            clusters
                .iter()
                .find(|c| c.name == "prod")
                .unwrap()
                .nodes
                .clone()
        };
        assert_eq!(members(&ab), members(&ba));
    }

    #[test]
    fn concurrent_merges_lose_no_updates() {
        let membership = Arc::new(store());
        let workers = 16;

        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let membership = membership.clone();
                std::thread::spawn(move || {
                    membership.merge("prod", node(&format!("peer-{i}")));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let clusters = membership.all_clusters();
        let prod = clusters.iter().find(|c| c.name == "prod").unwrap();
        assert_eq!(prod.nodes.len(), workers + 1); // every peer + self
    }

    #[test]
    fn known_peers_excludes_self_and_deduplicates() {
        let membership = store();
        membership.merge("prod", node("peer-a"));
        membership.merge("staging", node("peer-a"));
        membership.merge("staging", membership.self_node().clone());

        let peers = membership.known_peers();
        assert_eq!(peers.len(), 1);
        assert!(peers.contains(&node("peer-a")));
    }

    #[test]
    fn bootstrap_delegation() {
        let membership = store();
        assert_eq!(
            membership.undiscovered_bootstrap(),
            HashSet::from(["node-b:7002".to_string()])
        );

        membership.mark_discovered("node-b:7002");
        assert!(membership.undiscovered_bootstrap().is_empty());
        assert_eq!(
            membership.bootstrap_status("node-b:7002"),
            Some(BootstrapStatus::Discovered)
        );
    }

    #[test]
    fn utilization_is_reported() {
        let membership = store();
        membership.update_utilization(3);

        let load = membership.utilization();
        assert_eq!(load.jobs_in_progress, 3);
        assert_eq!(load.job_total_capacity, 4);
    }
}
