//! Health monitor: the periodic probe, classify and remediate loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use mesh_core::{HealthConfig, RemediationPolicy};
use mesh_lifecycle::LifecycleManager;
use mesh_registry::{HealthSample, HealthStatus, Registry, WorkerRecord};

use crate::checker::{ProbeOutcome, classify, http_probe};

/// Reaction to a worker classified unhealthy, fixed at construction.
#[derive(Clone)]
pub enum Remediation {
    /// Leave the record in place; routing stops using it.
    MarkOnly,
    /// Remove the record, retire its process and launch a replacement.
    EvictAndReplace(Arc<LifecycleManager>),
}

impl Remediation {
    pub fn from_policy(policy: RemediationPolicy, lifecycle: Arc<LifecycleManager>) -> Self {
        match policy {
            RemediationPolicy::MarkOnly => Remediation::MarkOnly,
            RemediationPolicy::EvictAndReplace => Remediation::EvictAndReplace(lifecycle),
        }
    }

    pub fn policy(&self) -> RemediationPolicy {
        match self {
            Remediation::MarkOnly => RemediationPolicy::MarkOnly,
            Remediation::EvictAndReplace(_) => RemediationPolicy::EvictAndReplace,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub probed: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub evicted: usize,
    pub replaced: usize,
    pub replacement_failures: usize,
}

/// State carried between ticks. Holding its lock is what makes a tick
/// exclusive.
#[derive(Default)]
struct MonitorState {
    /// Evicted workers whose replacement has not launched yet.
    owed_replacements: usize,
}

/// Probes every registered worker on an interval and heals the pool.
pub struct HealthMonitor {
    registry: Registry,
    config: HealthConfig,
    remediation: Remediation,
    state: Mutex<MonitorState>,
}

impl HealthMonitor {
    pub fn new(registry: Registry, config: HealthConfig, remediation: Remediation) -> Self {
        Self {
            registry,
            config,
            remediation,
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn policy(&self) -> RemediationPolicy {
        self.remediation.policy()
    }

    /// Replacements still owed from earlier failed launches.
    pub async fn owed_replacements(&self) -> usize {
        self.state.lock().await.owed_replacements
    }

    /// Run one full probe pass.
    ///
    /// Concurrent calls are serialized so a tick never overlaps another.
    pub async fn tick(&self) -> TickReport {
        let mut state = self.state.lock().await;
        let mut report = TickReport::default();

        let workers = self.registry.list().await;
        for (record, outcome) in self.probe_all(workers).await {
            report.probed += 1;
            let status = classify(&outcome, self.config.threshold());

            let Some(previous) = self
                .registry
                .set_status(&record.id, status, Utc::now())
                .await
            else {
                debug!(worker_id = %record.id, "worker removed during probe, skipping");
                continue;
            };

            let sample = HealthSample {
                status,
                response_time_ms: outcome.elapsed_ms(),
                timestamp: Utc::now(),
            };
            if let Err(e) = self.registry.append_history(&record.id, sample).await {
                debug!(worker_id = %record.id, error = %e, "history append skipped");
            }

            log_transition(&record, previous, status, &outcome);

            match status {
                HealthStatus::Healthy => report.healthy += 1,
                _ => {
                    report.unhealthy += 1;
                    self.remediate(&record, &mut state, &mut report).await;
                }
            }
        }

        self.settle_replacements(&mut state, &mut report).await;
        self.registry.publish_snapshot().await;

        debug!(
            probed = report.probed,
            healthy = report.healthy,
            unhealthy = report.unhealthy,
            evicted = report.evicted,
            replaced = report.replaced,
            "health tick complete"
        );
        report
    }

    /// Tick every `interval` until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.interval();
        info!(
            interval_secs = interval.as_secs(),
            policy = ?self.policy(),
            "health monitor started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("health monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Probe all workers concurrently. Order of results is irrelevant.
    async fn probe_all(&self, workers: Vec<WorkerRecord>) -> Vec<(WorkerRecord, ProbeOutcome)> {
        let timeout = self.config.timeout();
        let mut probes = JoinSet::new();
        for record in workers {
            let path = self.config.endpoint.clone();
            probes.spawn(async move {
                let outcome = http_probe(&record.address, record.port, &path, timeout).await;
                (record, outcome)
            });
        }

        let mut results = Vec::with_capacity(probes.len());
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => error!(error = %e, "probe task panicked"),
            }
        }
        results
    }

    async fn remediate(&self, record: &WorkerRecord, state: &mut MonitorState, report: &mut TickReport) {
        let Remediation::EvictAndReplace(lifecycle) = &self.remediation else {
            return;
        };

        // Only the call that actually removed the record owes a replacement,
        // so repeated unhealthy ticks cannot launch twice.
        let Some(removed) = self.registry.remove(&record.id).await else {
            return;
        };
        report.evicted += 1;
        state.owed_replacements += 1;
        info!(worker_id = %removed.id, endpoint = %removed.endpoint(), "evicted unhealthy worker");

        lifecycle.retire(&removed).await;
    }

    async fn settle_replacements(&self, state: &mut MonitorState, report: &mut TickReport) {
        let Remediation::EvictAndReplace(lifecycle) = &self.remediation else {
            return;
        };

        while state.owed_replacements > 0 {
            match lifecycle.create_worker(None).await {
                Ok(record) => {
                    state.owed_replacements -= 1;
                    report.replaced += 1;
                    info!(worker_id = %record.id, port = record.port, "replacement worker launched");
                }
                Err(e) => {
                    report.replacement_failures += 1;
                    error!(
                        error = %e,
                        owed = state.owed_replacements,
                        "replacement launch failed, retrying next tick"
                    );
                    break;
                }
            }
        }
    }
}

fn log_transition(
    record: &WorkerRecord,
    previous: HealthStatus,
    status: HealthStatus,
    outcome: &ProbeOutcome,
) {
    let elapsed_ms = outcome.elapsed_ms();
    match (previous, status) {
        (p, HealthStatus::Unhealthy) if p != HealthStatus::Unhealthy => warn!(
            worker_id = %record.id,
            from = %p,
            result = ?outcome.result,
            elapsed_ms,
            "worker marked unhealthy"
        ),
        (HealthStatus::Unhealthy, HealthStatus::Healthy) => {
            info!(worker_id = %record.id, elapsed_ms, "worker recovered")
        }
        _ => debug!(worker_id = %record.id, %status, elapsed_ms, "worker probed"),
    }
}
