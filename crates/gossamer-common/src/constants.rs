//! Shared constants for Gossamer mesh components.

/// Steady-state heartbeat interval (milliseconds)
pub const HEARTBEAT_INTERVAL_MS: u64 = 3000;

/// Resend interval towards not-yet-discovered bootstrap addresses (seconds)
pub const DISCOVERY_RESEND_INTERVAL_SECS: u64 = 5;

/// Maximum heartbeat datagram payload (64 KiB)
pub const HEARTBEAT_BUFFER_SIZE: usize = 65535;

/// Deadline for one remote execution delegation (seconds)
pub const DELEGATION_TIMEOUT_SECS: u64 = 40;

/// Execution workers kept alive for the process lifetime
pub const WORKER_POOL_CORE: usize = 3;

/// Hard ceiling on concurrent execution workers
pub const WORKER_POOL_MAX: usize = 4;

/// Idle time after which an overflow worker retires (seconds)
pub const WORKER_IDLE_RETIRE_SECS: u64 = 3;

/// Default node configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/weaver.toml";

/// Longest accepted hostname
pub const HOSTNAME_MAX_LEN: usize = 253;

/// Sentinel for a round trip that has never been measured
pub const UNKNOWN_TRIP_MS: i64 = -1;
