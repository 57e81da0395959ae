//! Domain types held by the registry.
//!
//! All types serialize to camelCase JSON for the control-plane surface
//! and the push channel. snake_case aliases are accepted on input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier of a worker.
pub type WorkerId = String;

/// Health classification of a worker. Written only by the health monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        })
    }
}

/// Opaque reference to the runtime-managed process backing a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerHandle(pub String);

impl WorkerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity and routing/health state of one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecord {
    pub id: WorkerId,
    pub address: String,
    pub port: u16,
    pub status: HealthStatus,
    #[serde(alias = "last_checked_at")]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<WorkerHandle>,
}

impl WorkerRecord {
    /// `address:port` as used on the wire.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Base URL for HTTP calls to this worker.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Input of `register`: the single entry point for both self-registering
/// workers and workers launched by the lifecycle manager.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub id: WorkerId,
    pub address: String,
    pub port: u16,
    pub handle: Option<WorkerHandle>,
}

impl Registration {
    pub fn new(id: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port,
            handle: None,
        }
    }

    pub fn with_handle(mut self, handle: WorkerHandle) -> Self {
        self.handle = Some(handle);
        self
    }
}

/// One probe outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSample {
    pub status: HealthStatus,
    #[serde(alias = "response_time_ms")]
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// One routed unit of work. Audit only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    pub kind: String,
    #[serde(alias = "payload_summary")]
    pub payload_summary: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: String,
    #[serde(alias = "target_url")]
    pub target_url: String,
}
