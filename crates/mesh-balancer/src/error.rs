//! Balancer error types.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Why a single forwarded attempt failed.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("worker answered {0}")]
    BadStatus(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// One failed candidate of a routing pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptFailure {
    pub worker_id: String,
    pub url: String,
    pub reason: String,
}

/// Errors surfaced to the caller of `LoadBalancer::route`.
#[derive(Debug, Error)]
pub enum BalancerError {
    #[error("no instances available")]
    NoInstances,

    #[error("all {} instances failed", .attempts.len())]
    AllFailed { attempts: Vec<AttemptFailure> },
}
