//! Docker CLI runtime.
//!
//! Launches one container per worker with the routing port published on
//! the host. Containers are labelled so `list` only returns workers this
//! control plane manages.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use mesh_registry::WorkerHandle;

use crate::error::RuntimeError;
use crate::runtime::{WorkerRuntime, WorkerSpec};

/// Label attached to every container launched by the mesh.
pub const MANAGED_LABEL: &str = "mesh.managed=true";

/// [`WorkerRuntime`] backed by the local `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: String,
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Use a different CLI binary (e.g. `podman`).
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<String, RuntimeError> {
        debug!(binary = %self.binary, ?args, "running runtime command");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(RuntimeError::Command {
                command: format!("{} {}", self.binary, args.first().map_or("", String::as_str)),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments of `docker run` for a worker spec.
pub fn run_args(spec: &WorkerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--label".to_string(),
        MANAGED_LABEL.to_string(),
        "-p".to_string(),
        format!("{}:{}", spec.host_port, spec.container_port),
        "-e".to_string(),
        format!("PORT={}", spec.container_port),
    ];
    let mut env: Vec<_> = spec.env.iter().collect();
    env.sort();
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.push(spec.image.clone());
    args
}

#[async_trait]
impl WorkerRuntime for DockerRuntime {
    async fn launch(&self, spec: &WorkerSpec) -> Result<WorkerHandle, RuntimeError> {
        let stdout = self.run(&run_args(spec)).await?;
        // `docker run -d` prints the container id as its last line.
        let id = stdout.lines().last().unwrap_or_default().trim();
        if id.is_empty() {
            return Err(RuntimeError::EmptyHandle);
        }
        Ok(WorkerHandle::new(id))
    }

    async fn stop(&self, handle: &WorkerHandle) -> Result<(), RuntimeError> {
        self.run(&["stop".to_string(), handle.to_string()]).await?;
        Ok(())
    }

    async fn remove(&self, handle: &WorkerHandle) -> Result<(), RuntimeError> {
        self.run(&["rm".to_string(), "-f".to_string(), handle.to_string()])
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkerHandle>, RuntimeError> {
        let stdout = self
            .run(&[
                "ps".to_string(),
                "-q".to_string(),
                "--no-trunc".to_string(),
                "--filter".to_string(),
                format!("label={MANAGED_LABEL}"),
            ])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(WorkerHandle::new)
            .collect())
    }
}
