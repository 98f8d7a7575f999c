//! Remote execution modules.
//!
//! Implements:
//! - The bounded elastic worker pool
//! - The delegation server (request/response over TCP)
//! - The delegation client and the local/remote execution router

mod client;
mod pool;
mod router;
mod service;

pub use client::DelegationClient;
pub use pool::WorkerPool;
pub use router::ExecutionRouter;
pub use service::DelegationServer;
