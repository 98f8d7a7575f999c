//! Core types shared across Gossamer mesh components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};

use crate::constants::UNKNOWN_TRIP_MS;

/// Identity of one participating node in the mesh.
///
/// Two records describing the same network endpoint are the same node:
/// equality and hashing cover only `(hostname, communication_port,
/// heartbeat_port)`. Heartbeat timestamps and capability sets carried by a
/// peer's advertisement never split an identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIdentity {
    /// DNS-label hostname (validated at config load)
    pub hostname: String,

    /// TCP port for the remote execution protocol
    pub communication_port: u16,

    /// UDP port for the heartbeat protocol
    pub heartbeat_port: u16,

    /// When a heartbeat from this node was last observed
    pub last_heartbeat: DateTime<Utc>,

    /// Last measured round trip in milliseconds, -1 when unknown
    pub last_trip: i64,

    /// Names of execution runtimes this node advertises
    #[serde(default)]
    pub supported_runtimes: BTreeSet<String>,
}

impl NodeIdentity {
    /// Create an identity observed right now, with no trip measurement.
    pub fn new(hostname: impl Into<String>, communication_port: u16, heartbeat_port: u16) -> Self {
        Self {
            hostname: hostname.into(),
            communication_port,
            heartbeat_port,
            last_heartbeat: Utc::now(),
            last_trip: UNKNOWN_TRIP_MS,
            supported_runtimes: BTreeSet::new(),
        }
    }

    pub fn with_runtimes(mut self, runtimes: BTreeSet<String>) -> Self {
        self.supported_runtimes = runtimes;
        self
    }

    /// `host:port` string of the node's heartbeat listener.
    pub fn heartbeat_endpoint(&self) -> String {
        format!("{}:{}", self.hostname, self.heartbeat_port)
    }

    /// True when this identity answers on the given execution endpoint.
    pub fn is_endpoint(&self, hostname: &str, communication_port: u16) -> bool {
        self.hostname == hostname && self.communication_port == communication_port
    }
}

impl PartialEq for NodeIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.hostname == other.hostname
            && self.communication_port == other.communication_port
            && self.heartbeat_port == other.heartbeat_port
    }
}

impl Eq for NodeIdentity {}

impl Hash for NodeIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hostname.hash(state);
        self.communication_port.hash(state);
        self.heartbeat_port.hash(state);
    }
}

/// A named group of nodes whose membership converges via gossip.
///
/// Equality and hashing cover only `name`: "the cluster named X" is a single
/// entity, and two values with the same name are interchangeable for set
/// membership even when their member sets differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    pub nodes: HashSet<NodeIdentity>,
}

impl Cluster {
    pub fn new(name: impl Into<String>, nodes: HashSet<NodeIdentity>) -> Self {
        Self {
            name: name.into(),
            nodes,
        }
    }
}

impl PartialEq for Cluster {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Cluster {}

impl Hash for Cluster {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Datagram advertised by every node: its identity plus its cluster view.
///
/// Purely best-effort; no acknowledgement exists at this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    pub sender: NodeIdentity,

    /// Milliseconds since the Unix epoch at send time
    pub timestamp: i64,

    /// Full cluster snapshot, omitted on bandwidth-conserving sends
    pub clusters: Option<Vec<Cluster>>,
}

/// Input handed to an execution runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInput {
    pub command: String,

    #[serde(default)]
    pub positional_arguments: Vec<String>,

    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl ExecutionInput {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            positional_arguments: Vec::new(),
            options: HashMap::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.positional_arguments = args;
        self
    }

    pub fn with_options(mut self, options: HashMap<String, String>) -> Self {
        self.options = options;
        self
    }
}

/// Outcome of a single runtime invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleResult {
    pub status_code: i32,
    pub output: String,
    pub completed_at: DateTime<Utc>,
}

impl SimpleResult {
    pub fn new(status_code: i32, output: impl Into<String>) -> Self {
        Self {
            status_code,
            output: output.into(),
            completed_at: Utc::now(),
        }
    }
}

/// Folded outcome of repeated invocations for one delegation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub status_code: i32,
    pub output: String,
    pub sub_results: Vec<SimpleResult>,
    pub completed_at: DateTime<Utc>,
}

/// Result of an execution request, single-shot or aggregated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutionResult {
    Simple(SimpleResult),
    Aggregate(AggregateResult),
}

impl ExecutionResult {
    /// Fold a sequence of invocation results, in invocation order.
    ///
    /// The aggregate status is the last non-zero status observed, or zero
    /// when every invocation succeeded. The aggregate output is the
    /// newline-joined concatenation of all outputs.
    pub fn aggregate(results: Vec<SimpleResult>) -> Self {
        let mut status_code = 0;
        for result in &results {
            if result.status_code != 0 {
                status_code = result.status_code;
            }
        }

        let output = results
            .iter()
            .map(|r| r.output.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self::Aggregate(AggregateResult {
            status_code,
            output,
            sub_results: results,
            completed_at: Utc::now(),
        })
    }

    pub fn status_code(&self) -> i32 {
        match self {
            Self::Simple(r) => r.status_code,
            Self::Aggregate(r) => r.status_code,
        }
    }

    pub fn output(&self) -> &str {
        match self {
            Self::Simple(r) => &r.output,
            Self::Aggregate(r) => &r.output,
        }
    }
}

/// Request line of the remote execution protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDelegation {
    pub runtime_name: String,
    pub input: ExecutionInput,

    /// Extra invocations beyond the first; 0 keeps the result simple
    #[serde(default)]
    pub repeat_times: u32,
}

/// Response line of the remote execution protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteExecutionSummary {
    pub result: ExecutionResult,
}

/// Load signal reported by the execution service after each accepted
/// connection, consumed by future admission and routing logic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUtilization {
    pub jobs_in_progress: usize,
    pub job_total_capacity: usize,
}

impl Default for NodeUtilization {
    fn default() -> Self {
        Self {
            jobs_in_progress: 0,
            job_total_capacity: crate::constants::WORKER_POOL_MAX,
        }
    }
}

/// Validate a host-name string: 1-253 characters, letters, digits, `.`, `-`.
pub fn is_valid_hostname(host: &str) -> bool {
    (1..=crate::constants::HOSTNAME_MAX_LEN).contains(&host.len())
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
}
