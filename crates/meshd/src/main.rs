//! meshd — the self-healing worker mesh daemon.
//!
//! One process hosts every control-plane subsystem:
//! - Registry + status fan-out
//! - Lifecycle manager and chaos injector (docker runtime)
//! - Health monitor (probe, classify, evict and replace)
//! - Load balancer (cache refresh, round-robin failover)
//! - Control-plane API with the SSE push channel
//!
//! # Usage
//!
//! ```text
//! meshd run --config mesh.toml
//! meshd run --control-port 6000 --balancer-port 4000 --json-logs
//! meshd default-config > mesh.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use mesh_balancer::{LoadBalancer, RoutingOptions};
use mesh_core::MeshConfig;
use mesh_health::{HealthMonitor, Remediation};
use mesh_lifecycle::{ChaosInjector, DockerRuntime, LifecycleManager, WorkerRuntime};
use mesh_registry::{Registry, StatusHub};

const DEFAULT_LOG_FILTER: &str = "info,meshd=debug,mesh=debug";

#[derive(Parser)]
#[command(name = "meshd", about = "Self-healing worker mesh daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane and the load balancer.
    Run {
        /// TOML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the control-plane listen port.
        #[arg(long)]
        control_port: Option<u16>,

        /// Override the balancer listen port.
        #[arg(long)]
        balancer_port: Option<u16>,

        /// Container CLI used to launch workers.
        #[arg(long, default_value = "docker")]
        runtime_binary: String,

        /// Emit logs as JSON lines.
        #[arg(long)]
        json_logs: bool,
    },
    /// Print the default configuration as TOML.
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            control_port,
            balancer_port,
            runtime_binary,
            json_logs,
        } => {
            init_tracing(json_logs);
            let mut config = match config {
                Some(path) => MeshConfig::from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => MeshConfig::default(),
            };
            if let Some(port) = control_port {
                config.control.listen = with_port(&config.control.listen, port)?;
            }
            if let Some(port) = balancer_port {
                config.balancer.listen = with_port(&config.balancer.listen, port)?;
            }
            run(config, runtime_binary).await
        }
        Command::DefaultConfig => {
            print!("{}", MeshConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Replace the port of a `host:port` listen address.
fn with_port(listen: &str, port: u16) -> anyhow::Result<String> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address {listen}"))?;
    Ok(SocketAddr::new(addr.ip(), port).to_string())
}

async fn run(config: MeshConfig, runtime_binary: String) -> anyhow::Result<()> {
    info!("mesh daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let registry = Registry::new(StatusHub::new(config.fanout.capacity));

    let runtime: Arc<dyn WorkerRuntime> = Arc::new(DockerRuntime::with_binary(runtime_binary));
    match runtime.list().await {
        Ok(existing) => info!(managed = existing.len(), "runtime reachable"),
        Err(e) => warn!(error = %e, "runtime not reachable; launches will fail until it is"),
    }

    let lifecycle = Arc::new(LifecycleManager::new(
        registry.clone(),
        runtime.clone(),
        config.lifecycle.clone(),
    ));
    let chaos = Arc::new(ChaosInjector::new(
        registry.clone(),
        runtime,
        config.lifecycle.call_timeout(),
    ));
    info!(image = %config.lifecycle.image, "lifecycle manager initialized");

    let remediation = Remediation::from_policy(config.health.remediation, lifecycle.clone());
    let monitor = HealthMonitor::new(registry.clone(), config.health.clone(), remediation);
    info!(policy = ?monitor.policy(), "health monitor initialized");

    let balancer = Arc::new(LoadBalancer::new(
        registry.clone(),
        RoutingOptions::from(&config.balancer),
    ));
    info!(work_path = %config.balancer.work_path, "load balancer initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!(error = %e, "failed to install Ctrl-C handler");
                // Dropping the sender would stop every loop.
                std::future::pending::<()>().await;
            }
        }
    });

    // ── Start background tasks ─────────────────────────────────

    let monitor_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { monitor.run(shutdown).await })
    };
    let refresh_handle = {
        let balancer = balancer.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { balancer.run_refresh(shutdown).await })
    };

    // ── Start HTTP servers ─────────────────────────────────────

    let control_router = mesh_api::build_router(mesh_api::ApiState {
        registry,
        lifecycle,
        chaos,
    });
    let control_listener = tokio::net::TcpListener::bind(config.control.listen.as_str())
        .await
        .with_context(|| format!("binding control plane on {}", config.control.listen))?;
    info!(addr = %config.control.listen, "control-plane API listening");

    let balancer_listener = tokio::net::TcpListener::bind(config.balancer.listen.as_str())
        .await
        .with_context(|| format!("binding balancer on {}", config.balancer.listen))?;
    info!(addr = %config.balancer.listen, "load balancer listening");

    let control_server = axum::serve(control_listener, control_router)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx.clone()));
    let balancer_server = axum::serve(balancer_listener, mesh_api::balancer_router(balancer))
        .with_graceful_shutdown(shutdown_signal(shutdown_rx));

    tokio::try_join!(
        async { control_server.await.context("control-plane server") },
        async { balancer_server.await.context("balancer server") },
    )?;

    // Wait for background tasks.
    let _ = monitor_handle.await;
    let _ = refresh_handle.await;

    info!("mesh daemon stopped");
    Ok(())
}

async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_override_keeps_host() {
        assert_eq!(with_port("0.0.0.0:6000", 7000).unwrap(), "0.0.0.0:7000");
        assert_eq!(with_port("127.0.0.1:4000", 4100).unwrap(), "127.0.0.1:4100");
    }

    #[test]
    fn port_override_rejects_bad_address() {
        assert!(with_port("localhost", 7000).is_err());
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::parse_from(["meshd", "run", "--control-port", "6100", "--json-logs"]);
        match cli.command {
            Command::Run {
                control_port,
                balancer_port,
                json_logs,
                runtime_binary,
                ..
            } => {
                assert_eq!(control_port, Some(6100));
                assert_eq!(balancer_port, None);
                assert!(json_logs);
                assert_eq!(runtime_binary, "docker");
            }
            Command::DefaultConfig => panic!("expected run"),
        }
    }
}
