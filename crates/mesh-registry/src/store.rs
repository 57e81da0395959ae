//! In-memory worker table behind a single lock.
//!
//! Each operation takes the lock once, so readers never see a record
//! half-updated. Status events are built under the lock and published
//! after it is released.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::events::{StatusEvent, StatusHub};
use crate::ring::Ring;
use crate::types::*;

/// Health samples kept per worker.
pub const HISTORY_CAPACITY: usize = 50;

/// Routed requests kept per worker.
pub const REQUEST_LOG_CAPACITY: usize = 100;

/// A record plus the rings it owns.
struct WorkerEntry {
    record: WorkerRecord,
    history: Ring<HealthSample>,
    requests: Ring<RequestLogEntry>,
}

/// Thread-safe worker registry. Clones share the same table.
#[derive(Clone)]
pub struct Registry {
    workers: Arc<RwLock<BTreeMap<WorkerId, WorkerEntry>>>,
    hub: StatusHub,
    history_capacity: usize,
    request_log_capacity: usize,
}

impl Registry {
    /// Create an empty registry publishing to `hub`.
    pub fn new(hub: StatusHub) -> Self {
        Self::with_capacities(hub, HISTORY_CAPACITY, REQUEST_LOG_CAPACITY)
    }

    /// Create a registry with custom ring sizes (for testing).
    pub fn with_capacities(hub: StatusHub, history: usize, requests: usize) -> Self {
        Self {
            workers: Arc::new(RwLock::new(BTreeMap::new())),
            hub,
            history_capacity: history,
            request_log_capacity: requests,
        }
    }

    /// The fan-out hub mirroring this registry.
    pub fn hub(&self) -> &StatusHub {
        &self.hub
    }

    /// Insert a new worker or update address/port of a known one.
    ///
    /// Re-registration keeps status, history and request log. A handle is
    /// only replaced when the registration carries one.
    pub async fn register(&self, reg: Registration) -> WorkerRecord {
        let (record, snapshot) = {
            let mut workers = self.workers.write().await;
            let record = match workers.get_mut(&reg.id) {
                Some(entry) => {
                    entry.record.address = reg.address;
                    entry.record.port = reg.port;
                    if reg.handle.is_some() {
                        entry.record.handle = reg.handle;
                    }
                    debug!(worker_id = %reg.id, endpoint = %entry.record.endpoint(), "worker re-registered");
                    entry.record.clone()
                }
                None => {
                    let record = WorkerRecord {
                        id: reg.id.clone(),
                        address: reg.address,
                        port: reg.port,
                        status: HealthStatus::Unknown,
                        last_checked_at: None,
                        handle: reg.handle,
                    };
                    info!(worker_id = %record.id, endpoint = %record.endpoint(), "worker registered");
                    workers.insert(
                        reg.id,
                        WorkerEntry {
                            record: record.clone(),
                            history: Ring::new(self.history_capacity),
                            requests: Ring::new(self.request_log_capacity),
                        },
                    );
                    record
                }
            };
            (record, snapshot_of(&workers))
        };

        self.hub.publish(snapshot);
        record
    }

    /// Snapshot of every record, ordered by id.
    pub async fn list(&self) -> Vec<WorkerRecord> {
        let workers = self.workers.read().await;
        workers.values().map(|e| e.record.clone()).collect()
    }

    /// Snapshot of the records whose last known status is healthy.
    pub async fn healthy(&self) -> Vec<WorkerRecord> {
        let workers = self.workers.read().await;
        workers
            .values()
            .filter(|e| e.record.is_healthy())
            .map(|e| e.record.clone())
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<WorkerRecord> {
        let workers = self.workers.read().await;
        workers.get(id).map(|e| e.record.clone())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.workers.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }

    /// Record a probe result. No-op when `id` is gone.
    ///
    /// `last_checked_at` never moves backwards; a stale timestamp keeps the
    /// newer one. Returns the previous status when the record exists.
    pub async fn set_status(
        &self,
        id: &str,
        status: HealthStatus,
        checked_at: DateTime<Utc>,
    ) -> Option<HealthStatus> {
        let (previous, snapshot) = {
            let mut workers = self.workers.write().await;
            let entry = workers.get_mut(id)?;
            let previous = entry.record.status;
            entry.record.status = status;
            entry.record.last_checked_at = Some(match entry.record.last_checked_at {
                Some(prev) if prev > checked_at => prev,
                _ => checked_at,
            });
            let snapshot = (previous != status).then(|| snapshot_of(&workers));
            (previous, snapshot)
        };

        if let Some(snapshot) = snapshot {
            self.hub.publish(snapshot);
        }
        Some(previous)
    }

    /// Delete a record and its rings. Returns the removed record.
    pub async fn remove(&self, id: &str) -> Option<WorkerRecord> {
        let (removed, snapshot) = {
            let mut workers = self.workers.write().await;
            let removed = workers.remove(id)?;
            (removed.record, snapshot_of(&workers))
        };

        info!(worker_id = %id, "worker removed from registry");
        self.hub.publish(snapshot);
        Some(removed)
    }

    pub async fn append_history(&self, id: &str, sample: HealthSample) -> RegistryResult<()> {
        {
            let mut workers = self.workers.write().await;
            let entry = workers
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            entry.history.push(sample.clone());
        }

        self.hub.publish(StatusEvent::HistoryUpdate {
            id: id.to_string(),
            sample,
        });
        Ok(())
    }

    pub async fn append_request_log(&self, id: &str, entry: RequestLogEntry) -> RegistryResult<()> {
        {
            let mut workers = self.workers.write().await;
            let worker = workers
                .get_mut(id)
                .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
            worker.requests.push(entry.clone());
        }

        self.hub.publish(StatusEvent::RequestLogged {
            id: id.to_string(),
            entry,
        });
        Ok(())
    }

    /// Health samples of one worker, oldest first. `None` for unknown ids.
    pub async fn history(&self, id: &str) -> Option<Vec<HealthSample>> {
        let workers = self.workers.read().await;
        workers.get(id).map(|e| e.history.to_vec())
    }

    /// Request log of one worker, oldest first. `None` for unknown ids.
    pub async fn requests(&self, id: &str) -> Option<Vec<RequestLogEntry>> {
        let workers = self.workers.read().await;
        workers.get(id).map(|e| e.requests.to_vec())
    }

    /// Push the full table to observers.
    pub async fn publish_snapshot(&self) {
        let snapshot = snapshot_of(&*self.workers.read().await);
        self.hub.publish(snapshot);
    }

    /// Current table as a push-channel message.
    pub async fn snapshot_event(&self) -> StatusEvent {
        snapshot_of(&*self.workers.read().await)
    }
}

fn snapshot_of(workers: &BTreeMap<WorkerId, WorkerEntry>) -> StatusEvent {
    StatusEvent::StatusSnapshot {
        workers: workers.values().map(|e| e.record.clone()).collect(),
    }
}
