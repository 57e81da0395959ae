//! The runtime capability used to start and stop worker processes.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use mesh_registry::WorkerHandle;

use crate::error::RuntimeError;

/// What to launch.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSpec {
    /// Worker id; also used as the process/container name.
    pub name: String,
    pub image: String,
    /// Routing port exposed on the host.
    pub host_port: u16,
    /// Port the worker listens on inside its sandbox.
    pub container_port: u16,
    pub env: HashMap<String, String>,
}

/// Container/process runtime backing the workers.
///
/// Implementations must be safe to call concurrently. Callers bound every
/// call with [`with_timeout`].
#[async_trait]
pub trait WorkerRuntime: Send + Sync {
    /// Start a worker and return its handle once it is running.
    async fn launch(&self, spec: &WorkerSpec) -> Result<WorkerHandle, RuntimeError>;

    async fn stop(&self, handle: &WorkerHandle) -> Result<(), RuntimeError>;

    async fn remove(&self, handle: &WorkerHandle) -> Result<(), RuntimeError>;

    /// Handles of every worker this runtime manages.
    async fn list(&self) -> Result<Vec<WorkerHandle>, RuntimeError>;
}

/// Run a runtime call with an upper bound on its duration.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl std::future::Future<Output = Result<T, RuntimeError>>,
) -> Result<T, RuntimeError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RuntimeError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_timeout_passes_result_through() {
        let out = with_timeout(Duration::from_secs(1), async { Ok::<_, RuntimeError>(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_bounds_hung_calls() {
        let out = with_timeout(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, RuntimeError>(())
        })
        .await;
        assert!(matches!(out, Err(RuntimeError::Timeout(d)) if d == Duration::from_millis(50)));
    }
}
