//! mesh-health — health checking and self-healing for mesh workers.
//!
//! A single [`HealthMonitor`] ticks on a fixed interval. Each tick probes
//! every registered worker concurrently, classifies it, writes status and
//! a history sample back to the registry, remediates unhealthy workers
//! and finally publishes the full table on the status hub.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor::tick
//!   ├── Registry::list() snapshot
//!   ├── JoinSet of http_probe() → ProbeOutcome (result + elapsed)
//!   ├── classify(outcome, threshold) → HealthStatus
//!   ├── Registry::set_status / append_history
//!   ├── Remediation
//!   │     ├── MarkOnly: nothing, routing skips unhealthy workers
//!   │     └── EvictAndReplace: remove → retire → LifecycleManager::create_worker
//!   └── Registry::publish_snapshot()
//! ```
//!
//! # Classification
//!
//! A worker is healthy iff the probe returned 2xx within the threshold.
//! Transport errors, timeouts, non-2xx codes and slow answers are all
//! unhealthy. Probe errors never escape the monitor.

pub mod checker;
pub mod monitor;

pub use checker::{ProbeOutcome, ProbeResult, classify, http_probe};
pub use monitor::{HealthMonitor, Remediation, TickReport};
