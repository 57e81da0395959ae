//! Chaos injector. Kills one random healthy worker on demand.
//!
//! The registry is left untouched: the next health tick finds the dead
//! worker and drives remediation end to end.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{info, warn};

use mesh_registry::{Registry, WorkerHandle, WorkerRecord};

use crate::error::ChaosError;
use crate::runtime::{WorkerRuntime, with_timeout};

/// Result of one injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChaosOutcome {
    /// No healthy runtime-backed worker to destroy.
    NoTarget,
    /// The worker's process was stopped and removed.
    Destroyed { id: String, handle: WorkerHandle },
}

impl ChaosOutcome {
    pub fn describe(&self) -> String {
        match self {
            ChaosOutcome::NoTarget => "no healthy worker available to destroy".to_string(),
            ChaosOutcome::Destroyed { id, handle } => {
                format!("destroyed worker {id} (process {handle})")
            }
        }
    }
}

/// Forces random healthy workers to fail through the runtime.
pub struct ChaosInjector {
    registry: Registry,
    runtime: Arc<dyn WorkerRuntime>,
    call_timeout: Duration,
}

impl ChaosInjector {
    pub fn new(registry: Registry, runtime: Arc<dyn WorkerRuntime>, call_timeout: Duration) -> Self {
        Self {
            registry,
            runtime,
            call_timeout,
        }
    }

    /// Stop-then-remove the process of one healthy worker chosen uniformly
    /// at random.
    ///
    /// A failing `stop` is tolerated (the process may already be gone); the
    /// injection only errors when neither call succeeded.
    pub async fn inject_failure(&self) -> Result<ChaosOutcome, ChaosError> {
        let candidates = self.registry.healthy().await;
        let picked = {
            let mut rng = rand::thread_rng();
            pick_target(&candidates, &mut rng).map(|(w, h)| (w.id.clone(), h.clone()))
        };
        let Some((id, handle)) = picked else {
            info!(healthy = candidates.len(), "chaos: no target");
            return Ok(ChaosOutcome::NoTarget);
        };

        info!(worker_id = %id, %handle, "chaos: destroying worker");

        let stopped = with_timeout(self.call_timeout, self.runtime.stop(&handle)).await;
        if let Err(e) = &stopped {
            warn!(worker_id = %id, %handle, error = %e, "chaos: stop failed, removing anyway");
        }

        match with_timeout(self.call_timeout, self.runtime.remove(&handle)).await {
            Ok(()) => {}
            Err(e) if stopped.is_ok() => {
                warn!(worker_id = %id, %handle, error = %e, "chaos: remove failed after stop");
            }
            Err(e) => {
                warn!(worker_id = %id, %handle, error = %e, "chaos: worker could not be destroyed");
                return Err(ChaosError::Runtime { id, source: e });
            }
        }

        Ok(ChaosOutcome::Destroyed { id, handle })
    }
}

/// Uniform choice among healthy workers that have a runtime handle.
pub fn pick_target<'a, R: Rng + ?Sized>(
    workers: &'a [WorkerRecord],
    rng: &mut R,
) -> Option<(&'a WorkerRecord, &'a WorkerHandle)> {
    let eligible: Vec<(&WorkerRecord, &WorkerHandle)> = workers
        .iter()
        .filter(|w| w.is_healthy())
        .filter_map(|w| w.handle.as_ref().map(|h| (w, h)))
        .collect();
    eligible.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;

    use chrono::Utc;
    use mesh_registry::{HealthStatus, Registration, StatusHub};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::manager::tests::FakeRuntime;

    fn injector() -> (Registry, Arc<FakeRuntime>, ChaosInjector) {
        let registry = Registry::new(StatusHub::new(16));
        let runtime = Arc::new(FakeRuntime::default());
        let chaos = ChaosInjector::new(registry.clone(), runtime.clone(), Duration::from_secs(1));
        (registry, runtime, chaos)
    }

    async fn add_worker(registry: &Registry, id: &str, port: u16, status: HealthStatus) {
        registry
            .register(
                Registration::new(id, "127.0.0.1", port)
                    .with_handle(WorkerHandle::new(format!("ctr-{id}"))),
            )
            .await;
        registry.set_status(id, status, Utc::now()).await;
    }

    #[tokio::test]
    async fn no_healthy_workers_is_a_noop() {
        let (registry, runtime, chaos) = injector();
        add_worker(&registry, "a", 3005, HealthStatus::Unhealthy).await;
        add_worker(&registry, "b", 3006, HealthStatus::Unknown).await;

        let outcome = chaos.inject_failure().await.unwrap();

        assert_eq!(outcome, ChaosOutcome::NoTarget);
        assert!(runtime.stopped.lock().unwrap().is_empty());
        assert!(runtime.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_registry_is_a_noop() {
        let (_registry, runtime, chaos) = injector();
        assert_eq!(chaos.inject_failure().await.unwrap(), ChaosOutcome::NoTarget);
        assert!(runtime.stopped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn destroys_exactly_one_healthy_worker() {
        let (registry, runtime, chaos) = injector();
        add_worker(&registry, "a", 3005, HealthStatus::Healthy).await;
        add_worker(&registry, "b", 3006, HealthStatus::Healthy).await;
        add_worker(&registry, "c", 3007, HealthStatus::Unhealthy).await;

        let outcome = chaos.inject_failure().await.unwrap();

        let ChaosOutcome::Destroyed { id, handle } = outcome else {
            panic!("expected a destroyed worker");
        };
        assert!(id == "a" || id == "b");
        assert_eq!(*runtime.stopped.lock().unwrap(), vec![handle.clone()]);
        assert_eq!(*runtime.removed.lock().unwrap(), vec![handle]);
        // Discovery is left to the health monitor.
        assert_eq!(registry.len().await, 3);
        assert!(registry.get(&id).await.unwrap().is_healthy());
    }

    #[tokio::test]
    async fn stop_failure_is_tolerated() {
        let (registry, runtime, chaos) = injector();
        add_worker(&registry, "a", 3005, HealthStatus::Healthy).await;
        runtime.fail_stop.store(true, Ordering::SeqCst);

        let outcome = chaos.inject_failure().await.unwrap();
        assert!(matches!(outcome, ChaosOutcome::Destroyed { .. }));
    }

    #[tokio::test]
    async fn total_runtime_failure_is_an_error() {
        let (registry, runtime, chaos) = injector();
        add_worker(&registry, "a", 3005, HealthStatus::Healthy).await;
        runtime.fail_stop.store(true, Ordering::SeqCst);
        runtime.fail_remove.store(true, Ordering::SeqCst);

        let err = chaos.inject_failure().await.unwrap_err();
        assert!(matches!(err, ChaosError::Runtime { id, .. } if id == "a"));
    }

    #[test]
    fn workers_without_handle_are_never_picked() {
        let external = WorkerRecord {
            id: "external".to_string(),
            address: "10.0.0.1".to_string(),
            port: 8080,
            status: HealthStatus::Healthy,
            last_checked_at: None,
            handle: None,
        };
        let mut rng = StdRng::seed_from_u64(7);
        assert!(pick_target(&[external], &mut rng).is_none());
    }

    #[test]
    fn pick_is_roughly_uniform() {
        let workers: Vec<WorkerRecord> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, id)| WorkerRecord {
                id: id.to_string(),
                address: "127.0.0.1".to_string(),
                port: 3005 + i as u16,
                status: HealthStatus::Healthy,
                last_checked_at: None,
                handle: Some(WorkerHandle::new(*id)),
            })
            .collect();

        let mut rng = StdRng::seed_from_u64(42);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..3000 {
            let (w, handle) = pick_target(&workers, &mut rng).unwrap();
            assert_eq!(handle.as_str(), w.id);
            *counts.entry(w.id.clone()).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n > 850 && n < 1150), "{counts:?}");
    }
}
