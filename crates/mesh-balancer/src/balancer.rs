//! The load balancer: cache refresh loop plus round-robin failover routing.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use mesh_core::BalancerConfig;
use mesh_registry::{Registry, RegistryError, RequestLogEntry};

use crate::cache::{CachedWorker, WorkerCache};
use crate::cursor::FailoverCursor;
use crate::error::{AttemptFailure, BalancerError};
use crate::forward::{WorkRequest, WorkResponse, forward};

/// Request-log kind recorded for routed work.
const WORK_KIND: &str = "process";

/// Knobs for one routing pass.
#[derive(Debug, Clone)]
pub struct RoutingOptions {
    pub refresh_interval: Duration,
    pub request_timeout: Duration,
    pub retry_backoff: Duration,
    pub work_path: String,
}

impl From<&BalancerConfig> for RoutingOptions {
    fn from(config: &BalancerConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            request_timeout: config.request_timeout(),
            retry_backoff: config.retry_backoff(),
            work_path: config.work_path.clone(),
        }
    }
}

/// Routes client work over a cached healthy set with failover.
pub struct LoadBalancer {
    registry: Registry,
    cache: WorkerCache,
    cursor: FailoverCursor,
    options: RoutingOptions,
}

impl LoadBalancer {
    pub fn new(registry: Registry, options: RoutingOptions) -> Self {
        Self {
            registry,
            cache: WorkerCache::new(),
            cursor: FailoverCursor::new(),
            options,
        }
    }

    pub fn options(&self) -> &RoutingOptions {
        &self.options
    }

    pub fn cache(&self) -> &WorkerCache {
        &self.cache
    }

    pub fn cursor_position(&self) -> usize {
        self.cursor.ticks()
    }

    /// Rebuild the cache from the registry's healthy subset.
    pub async fn refresh(&self) -> usize {
        self.cache.refresh_from(&self.registry).await
    }

    /// Refresh immediately, then on every interval until shutdown.
    pub async fn run_refresh(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.options.refresh_interval;
        info!(
            interval_secs = interval.as_secs(),
            "balancer cache refresh started"
        );
        self.refresh().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.refresh().await;
                }
                _ = shutdown.changed() => {
                    info!("balancer cache refresh shutting down");
                    break;
                }
            }
        }
    }

    /// Deliver `work` to one healthy worker.
    ///
    /// Candidates come from the shared [`FailoverCursor`], so the pass
    /// visits each cached worker at most once.
    pub async fn route(&self, work: &WorkRequest) -> Result<WorkResponse, BalancerError> {
        let workers = self.cache.snapshot().await;
        let count = workers.len();
        if count == 0 {
            debug!("no cached workers to route to");
            return Err(BalancerError::NoInstances);
        }

        let mut tried = vec![false; count];
        let mut attempts = Vec::new();

        let mut attempt = 0;
        while let Some(idx) = self.cursor.next_untried(&mut tried) {
            attempt += 1;
            let worker = &workers[idx];

            match forward(worker, &self.options.work_path, work, self.options.request_timeout).await {
                Ok(resp) => {
                    debug!(worker_id = %worker.id, attempt, "work routed");
                    self.record(worker, work, "success".to_string()).await;
                    return Ok(resp);
                }
                Err(e) => {
                    warn!(worker_id = %worker.id, url = %worker.url, error = %e, "attempt failed");
                    self.record(worker, work, format!("failed: {e}")).await;
                    attempts.push(AttemptFailure {
                        worker_id: worker.id.clone(),
                        url: worker.url.clone(),
                        reason: e.to_string(),
                    });
                    if attempt < count && !self.options.retry_backoff.is_zero() {
                        tokio::time::sleep(self.options.retry_backoff).await;
                    }
                }
            }
        }

        warn!(attempts = attempts.len(), "all cached workers failed");
        Err(BalancerError::AllFailed { attempts })
    }

    async fn record(&self, worker: &CachedWorker, work: &WorkRequest, outcome: String) {
        let entry = RequestLogEntry {
            kind: WORK_KIND.to_string(),
            payload_summary: work.summary(),
            timestamp: Utc::now(),
            outcome,
            target_url: worker.url.clone(),
        };
        // NotFound: evicted since the last refresh.
        if let Err(RegistryError::NotFound(id)) =
            self.registry.append_request_log(&worker.id, entry).await
        {
            debug!(worker_id = %id, "request log dropped for evicted worker");
        }
    }
}
