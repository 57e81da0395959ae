//! Lifecycle error types.

use std::time::Duration;

use thiserror::Error;

/// Failures of the runtime capability itself.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn runtime command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("runtime command `{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("runtime returned no handle")]
    EmptyHandle,

    #[error("no such process: {0}")]
    NotFound(String),

    #[error("runtime call timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors surfaced by `LifecycleManager::create_worker`.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no free routing port in {start}..={end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("worker id already in use: {0}")]
    IdInUse(String),

    #[error("launch failed: {0}")]
    Launch(#[source] RuntimeError),
}

/// Errors surfaced by `ChaosInjector::inject_failure`.
#[derive(Debug, Error)]
pub enum ChaosError {
    #[error("failed to destroy worker {id}: {source}")]
    Runtime {
        id: String,
        #[source]
        source: RuntimeError,
    },
}
