//! Locally cached view of the healthy workers.
//!
//! Rebuilt wholesale from the registry on every refresh. Readers get an
//! `Arc` of the current list, so a refresh never disturbs a routing pass
//! already iterating over the previous one.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use mesh_registry::{Registry, WorkerRecord};

/// Routing target copied out of a registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedWorker {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub url: String,
}

impl From<&WorkerRecord> for CachedWorker {
    fn from(record: &WorkerRecord) -> Self {
        Self {
            id: record.id.clone(),
            address: record.address.clone(),
            port: record.port,
            url: record.url(),
        }
    }
}

/// Healthy-worker list shared by all routing tasks.
#[derive(Default)]
pub struct WorkerCache {
    workers: RwLock<Arc<Vec<CachedWorker>>>,
}

impl WorkerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current list; stays valid across concurrent refreshes.
    pub async fn snapshot(&self) -> Arc<Vec<CachedWorker>> {
        Arc::clone(&*self.workers.read().await)
    }

    /// Replace the cache with the registry's healthy subset.
    ///
    /// Returns the number of cached workers.
    pub async fn refresh_from(&self, registry: &Registry) -> usize {
        let healthy: Vec<CachedWorker> = registry
            .healthy()
            .await
            .iter()
            .map(CachedWorker::from)
            .collect();
        let count = healthy.len();
        *self.workers.write().await = Arc::new(healthy);
        debug!(workers = count, "balancer cache refreshed");
        count
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.read().await.is_empty()
    }
}
