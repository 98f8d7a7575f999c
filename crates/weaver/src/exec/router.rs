//! Execution router: local dispatch through the runtime registry, or one
//! delegation to a remote peer. Never fails; every failure is synthesized
//! into a failure result.

use gossamer_common::{ExecutionDelegation, ExecutionInput, ExecutionResult, SimpleResult};
use std::sync::Arc;

use crate::exec::DelegationClient;
use crate::mesh::Membership;
use crate::runtime::RuntimeRegistry;

pub struct ExecutionRouter {
    membership: Arc<Membership>,
    registry: Arc<RuntimeRegistry>,
}

impl ExecutionRouter {
    pub fn new(membership: Arc<Membership>, registry: Arc<RuntimeRegistry>) -> Self {
        Self {
            membership,
            registry,
        }
    }

    /// Route one execution request. A target matching self dispatches
    /// locally and never touches a socket; any other target is delegated
    /// exactly once.
    pub async fn route(
        &self,
        target_hostname: &str,
        target_port: u16,
        runtime_name: &str,
        input: ExecutionInput,
    ) -> ExecutionResult {
        if self
            .membership
            .self_node()
            .is_endpoint(target_hostname, target_port)
        {
            return self.dispatch_local(runtime_name, &input);
        }

        let delegation = ExecutionDelegation {
            runtime_name: runtime_name.to_string(),
            input,
            repeat_times: 0,
        };

        match DelegationClient::delegate(target_hostname, target_port, &delegation).await {
            Ok(summary) => summary.result,
            Err(e) => {
                let reason = if e.is_timeout() {
                    "Failed to delegate execution, timeout"
                } else {
                    "Failed to delegate execution, unknown reason"
                };

                tracing::error!(
                    target = %format!("{target_hostname}:{target_port}"),
                    error = %e,
                    reason,
                    "Delegation failed"
                );

                ExecutionResult::Simple(SimpleResult::new(1, reason))
            }
        }
    }

    fn dispatch_local(&self, runtime_name: &str, input: &ExecutionInput) -> ExecutionResult {
        match self.registry.get(runtime_name) {
            Some(runtime) => ExecutionResult::Simple(runtime.execute(input)),
            None => {
                ExecutionResult::Simple(SimpleResult::new(1, format!("unknown runtime: {runtime_name}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ExpressionRuntime;
    use gossamer_common::NodeIdentity;

    fn router(self_host: &str, self_port: u16) -> ExecutionRouter {
        let membership = Arc::new(Membership::new(
            NodeIdentity::new(self_host, self_port, self_port + 1),
            ["prod".to_string()],
            [],
        ));

        let mut registry = RuntimeRegistry::new();
        registry.register(Arc::new(ExpressionRuntime::new()));

        ExecutionRouter::new(membership, Arc::new(registry))
    }

    #[tokio::test]
    async fn self_target_dispatches_locally_without_a_socket() {
        // No execution service is listening anywhere; a local dispatch must
        // still succeed.
        let router = router("127.0.0.1", 9401);

        let result = router
            .route(
                "127.0.0.1",
                9401,
                "LanguageExpression",
                ExecutionInput::new("2 + 2"),
            )
            .await;

        assert_eq!(result.status_code(), 0);
        assert_eq!(result.output(), "4");
    }

    #[tokio::test]
    async fn local_unknown_runtime_is_status_one() {
        let router = router("127.0.0.1", 9401);

        let result = router
            .route(
                "127.0.0.1",
                9401,
                "NoSuchRuntime",
                ExecutionInput::new("anything"),
            )
            .await;

        assert_eq!(result.status_code(), 1);
        assert_eq!(result.output(), "unknown runtime: NoSuchRuntime");
    }

    #[tokio::test]
    async fn remote_transport_failure_is_synthesized() {
        let router = router("127.0.0.1", 9401);

        // Nothing listens on the target port; the failure must come back as
        // a result, not an error.
        let result = router
            .route(
                "127.0.0.1",
                1, // connect refused
                "LanguageExpression",
                ExecutionInput::new("2 + 2"),
            )
            .await;

        assert_eq!(result.status_code(), 1);
        assert_eq!(result.output(), "Failed to delegate execution, unknown reason");
    }
}
