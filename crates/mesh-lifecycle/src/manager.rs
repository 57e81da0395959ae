//! Lifecycle manager: the only producer of launched workers.
//!
//! `create_worker` allocates a routing port, launches a worker through the
//! runtime and registers it with the same `Registry::register` call that
//! self-registering workers go through. A failed launch leaves no record.
//!
//! The worker id and port are reserved together under one lock before the
//! launch and released once the worker is registered or the launch failed,
//! so two in-flight launches can never claim the same id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use mesh_core::LifecycleConfig;
use mesh_registry::{Registration, Registry, WorkerRecord};

use crate::error::LifecycleError;
use crate::ports::PortAllocator;
use crate::runtime::{WorkerRuntime, WorkerSpec, with_timeout};

/// Launches, registers and retires runtime-backed workers.
pub struct LifecycleManager {
    registry: Registry,
    runtime: Arc<dyn WorkerRuntime>,
    config: LifecycleConfig,
    slots: Mutex<Slots>,
}

/// Ports and ids held by launches that have not registered yet.
#[derive(Debug)]
struct Slots {
    ports: PortAllocator,
    pending_ids: HashSet<String>,
}

impl Slots {
    fn id_taken(&self, id: &str, records: &[WorkerRecord]) -> bool {
        self.pending_ids.contains(id) || records.iter().any(|r| r.id == id)
    }

    fn release(&mut self, id: &str, port: u16) {
        self.ports.release(port);
        self.pending_ids.remove(id);
    }
}

impl LifecycleManager {
    pub fn new(registry: Registry, runtime: Arc<dyn WorkerRuntime>, config: LifecycleConfig) -> Self {
        let ports = PortAllocator::new(config.port_range_start, config.port_range_end);
        Self {
            registry,
            runtime,
            config,
            slots: Mutex::new(Slots {
                ports,
                pending_ids: HashSet::new(),
            }),
        }
    }

    pub fn runtime(&self) -> Arc<dyn WorkerRuntime> {
        Arc::clone(&self.runtime)
    }

    pub fn call_timeout(&self) -> Duration {
        self.config.call_timeout()
    }

    /// Launch a new worker and register it.
    ///
    /// Without a suggested id the worker is named `{id_prefix}-{port}`.
    pub async fn create_worker(
        &self,
        suggested_id: Option<String>,
    ) -> Result<WorkerRecord, LifecycleError> {
        let suggested_id = suggested_id.filter(|id| !id.trim().is_empty());
        let (id, port) = self.reserve(suggested_id).await?;

        let spec = WorkerSpec {
            name: id.clone(),
            image: self.config.image.clone(),
            host_port: port,
            container_port: self.config.container_port,
            env: HashMap::from([("WORKER_ID".to_string(), id.clone())]),
        };

        let handle = match with_timeout(self.call_timeout(), self.runtime.launch(&spec)).await {
            Ok(handle) => handle,
            Err(e) => {
                self.slots.lock().await.release(&id, port);
                error!(worker_id = %id, port, error = %e, "worker launch failed");
                return Err(LifecycleError::Launch(e));
            }
        };

        let record = self
            .registry
            .register(
                Registration::new(id.clone(), self.config.worker_host.clone(), port)
                    .with_handle(handle),
            )
            .await;
        // The live record now guards both the id and the port.
        self.slots.lock().await.release(&id, port);

        info!(worker_id = %record.id, port, handle = ?record.handle, "worker launched");
        Ok(record)
    }

    /// Stop and remove the process behind a record. Best effort.
    pub async fn retire(&self, record: &WorkerRecord) {
        let Some(handle) = &record.handle else {
            return;
        };
        let limit = self.call_timeout();
        if let Err(e) = with_timeout(limit, self.runtime.stop(handle)).await {
            warn!(worker_id = %record.id, %handle, error = %e, "stop during retire failed");
        }
        if let Err(e) = with_timeout(limit, self.runtime.remove(handle)).await {
            warn!(worker_id = %record.id, %handle, error = %e, "remove during retire failed");
        }
    }

    /// Claim a worker id and a routing port for one launch.
    ///
    /// An id is free when no record carries it and no other launch holds
    /// it. A derived `{id_prefix}-{port}` id is checked the same way, so a
    /// launch never takes over an externally registered worker.
    async fn reserve(&self, suggested_id: Option<String>) -> Result<(String, u16), LifecycleError> {
        let mut slots = self.slots.lock().await;
        let records = self.registry.list().await;
        if let Some(id) = &suggested_id {
            if slots.id_taken(id, &records) {
                return Err(LifecycleError::IdInUse(id.clone()));
            }
        }

        let live: HashSet<u16> = records.iter().map(|r| r.port).collect();
        let Some(port) = slots.ports.allocate(&live) else {
            let (start, end) = slots.ports.range();
            return Err(LifecycleError::PortsExhausted { start, end });
        };

        let id = suggested_id.unwrap_or_else(|| format!("{}-{port}", self.config.id_prefix));
        if slots.id_taken(&id, &records) {
            slots.ports.release(port);
            return Err(LifecycleError::IdInUse(id));
        }
        slots.pending_ids.insert(id.clone());
        Ok((id, port))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use mesh_registry::{StatusHub, WorkerHandle};

    use crate::error::RuntimeError;

    /// Runtime that records calls and can be told to fail or stall launches.
    #[derive(Default)]
    pub(crate) struct FakeRuntime {
        pub launch_delay: StdMutex<Duration>,
        pub launched: StdMutex<Vec<WorkerSpec>>,
        pub stopped: StdMutex<Vec<WorkerHandle>>,
        pub removed: StdMutex<Vec<WorkerHandle>>,
        pub fail_launch: AtomicBool,
        pub fail_stop: AtomicBool,
        pub fail_remove: AtomicBool,
    }

    #[async_trait]
    impl WorkerRuntime for FakeRuntime {
        async fn launch(&self, spec: &WorkerSpec) -> Result<WorkerHandle, RuntimeError> {
            let delay = *self.launch_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.fail_launch.load(Ordering::SeqCst) {
                return Err(RuntimeError::Command {
                    command: "run".to_string(),
                    stderr: "image not found".to_string(),
                });
            }
            self.launched.lock().unwrap().push(spec.clone());
            Ok(WorkerHandle::new(format!("ctr-{}", spec.host_port)))
        }

        async fn stop(&self, handle: &WorkerHandle) -> Result<(), RuntimeError> {
            if self.fail_stop.load(Ordering::SeqCst) {
                return Err(RuntimeError::NotFound(handle.to_string()));
            }
            self.stopped.lock().unwrap().push(handle.clone());
            Ok(())
        }

        async fn remove(&self, handle: &WorkerHandle) -> Result<(), RuntimeError> {
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(RuntimeError::NotFound(handle.to_string()));
            }
            self.removed.lock().unwrap().push(handle.clone());
            Ok(())
        }

        async fn list(&self) -> Result<Vec<WorkerHandle>, RuntimeError> {
            Ok(Vec::new())
        }
    }

    pub(crate) fn test_config() -> LifecycleConfig {
        LifecycleConfig {
            port_range_start: 3005,
            port_range_end: 3010,
            ..LifecycleConfig::default()
        }
    }

    fn setup() -> (Registry, Arc<FakeRuntime>, LifecycleManager) {
        let registry = Registry::new(StatusHub::new(16));
        let runtime = Arc::new(FakeRuntime::default());
        let manager = LifecycleManager::new(registry.clone(), runtime.clone(), test_config());
        (registry, runtime, manager)
    }

    #[tokio::test]
    async fn create_worker_launches_and_registers() {
        let (registry, runtime, manager) = setup();

        let record = manager.create_worker(None).await.unwrap();

        assert_eq!(record.id, "worker-3005");
        assert_eq!(record.port, 3005);
        assert_eq!(record.address, "127.0.0.1");
        assert_eq!(record.handle, Some(WorkerHandle::new("ctr-3005")));
        assert!(registry.contains("worker-3005").await);

        let launched = runtime.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert_eq!(launched[0].host_port, 3005);
        assert_eq!(launched[0].container_port, 3000);
        assert_eq!(launched[0].env["WORKER_ID"], "worker-3005");
    }

    #[tokio::test]
    async fn suggested_id_is_used() {
        let (registry, _runtime, manager) = setup();
        let record = manager.create_worker(Some("watermark-a".to_string())).await.unwrap();
        assert_eq!(record.id, "watermark-a");
        assert!(registry.contains("watermark-a").await);
    }

    #[tokio::test]
    async fn blank_suggested_id_falls_back_to_derived() {
        let (_registry, _runtime, manager) = setup();
        let record = manager.create_worker(Some("  ".to_string())).await.unwrap();
        assert_eq!(record.id, "worker-3005");
    }

    #[tokio::test]
    async fn suggested_id_in_use_is_rejected() {
        let (registry, runtime, manager) = setup();
        registry.register(Registration::new("taken", "10.0.0.1", 8080)).await;

        let err = manager.create_worker(Some("taken".to_string())).await.unwrap_err();
        assert!(matches!(err, LifecycleError::IdInUse(id) if id == "taken"));
        assert!(runtime.launched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_creates_with_same_id_launch_once() {
        let (registry, runtime, manager) = setup();
        *runtime.launch_delay.lock().unwrap() = Duration::from_millis(20);
        let manager = Arc::new(manager);

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.create_worker(Some("x".to_string())).await
            }));
        }
        let mut results = Vec::new();
        for t in tasks {
            results.push(t.await.unwrap());
        }

        let created: Vec<&WorkerRecord> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(created.len(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(LifecycleError::IdInUse(id)) if id == "x"))
        );
        assert_eq!(registry.len().await, 1);

        let launched = runtime.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        assert_eq!(
            created[0].handle,
            Some(WorkerHandle::new(format!("ctr-{}", launched[0].host_port)))
        );
    }

    #[tokio::test]
    async fn derived_id_never_takes_over_an_external_worker() {
        let (registry, runtime, manager) = setup();
        registry.register(Registration::new("worker-3005", "10.0.0.9", 8080)).await;

        let err = manager.create_worker(None).await.unwrap_err();
        assert!(matches!(err, LifecycleError::IdInUse(id) if id == "worker-3005"));
        assert!(runtime.launched.lock().unwrap().is_empty());

        let external = registry.get("worker-3005").await.unwrap();
        assert_eq!(external.port, 8080);
        assert!(external.handle.is_none());

        // The rejected port was released and the counter moved on.
        let record = manager.create_worker(None).await.unwrap();
        assert_eq!(record.id, "worker-3006");
        assert_eq!(manager.slots.lock().await.ports.reserved(), 0);
    }

    #[tokio::test]
    async fn launch_failure_creates_no_record() {
        let (registry, runtime, manager) = setup();
        runtime.fail_launch.store(true, Ordering::SeqCst);

        let err = manager.create_worker(None).await.unwrap_err();
        assert!(matches!(err, LifecycleError::Launch(_)));
        assert!(registry.is_empty().await);
        let slots = manager.slots.lock().await;
        assert_eq!(slots.ports.reserved(), 0);
        assert!(slots.pending_ids.is_empty());
    }

    #[tokio::test]
    async fn ports_bound_to_live_records_are_skipped() {
        let (registry, _runtime, manager) = setup();
        registry.register(Registration::new("external", "127.0.0.1", 3005)).await;

        let record = manager.create_worker(None).await.unwrap();
        assert_eq!(record.port, 3006);
    }

    #[tokio::test]
    async fn concurrent_launches_get_distinct_ports() {
        let (registry, _runtime, manager) = setup();
        let manager = Arc::new(manager);

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move { manager.create_worker(None).await }));
        }
        let mut ports = HashSet::new();
        for t in tasks {
            ports.insert(t.await.unwrap().unwrap().port);
        }
        assert_eq!(ports.len(), 4);
        assert_eq!(registry.len().await, 4);
    }

    #[tokio::test]
    async fn exhausted_range_is_reported() {
        let registry = Registry::new(StatusHub::new(16));
        let runtime = Arc::new(FakeRuntime::default());
        let config = LifecycleConfig {
            port_range_start: 3005,
            port_range_end: 3005,
            ..LifecycleConfig::default()
        };
        let manager = LifecycleManager::new(registry, runtime, config);

        manager.create_worker(None).await.unwrap();
        let err = manager.create_worker(None).await.unwrap_err();
        assert!(matches!(err, LifecycleError::PortsExhausted { start: 3005, end: 3005 }));
    }

    #[tokio::test]
    async fn retire_stops_then_removes() {
        let (_registry, runtime, manager) = setup();
        let record = manager.create_worker(None).await.unwrap();

        manager.retire(&record).await;

        assert_eq!(*runtime.stopped.lock().unwrap(), vec![WorkerHandle::new("ctr-3005")]);
        assert_eq!(*runtime.removed.lock().unwrap(), vec![WorkerHandle::new("ctr-3005")]);
    }

    #[tokio::test]
    async fn retire_tolerates_runtime_errors_and_missing_handles() {
        let (_registry, runtime, manager) = setup();
        runtime.fail_stop.store(true, Ordering::SeqCst);
        let record = manager.create_worker(None).await.unwrap();

        manager.retire(&record).await;
        assert_eq!(runtime.removed.lock().unwrap().len(), 1);

        let external = WorkerRecord {
            handle: None,
            ..record
        };
        manager.retire(&external).await;
        assert_eq!(runtime.removed.lock().unwrap().len(), 1);
    }
}
