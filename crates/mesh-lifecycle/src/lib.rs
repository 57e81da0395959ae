//! mesh-lifecycle — starting, stopping and deliberately killing workers.
//!
//! The container runtime is a capability behind [`WorkerRuntime`]:
//! `launch`, `stop`, `remove`, `list`. [`DockerRuntime`] drives the
//! `docker` CLI; tests plug in their own implementations.
//!
//! # Components
//!
//! - **`ports`**: monotonic routing-port allocator that skips ports held
//!   by live records or by launches still in flight
//! - **`manager`**: [`LifecycleManager`]: allocate port → launch →
//!   register through the same entry point self-registering workers use
//! - **`chaos`**: [`ChaosInjector`]: stop-then-remove one random healthy
//!   worker and let the health monitor discover it
//!
//! Every runtime call is wrapped in `tokio::time::timeout`.

pub mod chaos;
pub mod docker;
pub mod error;
pub mod manager;
pub mod ports;
pub mod runtime;

pub use chaos::{ChaosInjector, ChaosOutcome};
pub use docker::DockerRuntime;
pub use error::{ChaosError, LifecycleError, RuntimeError};
pub use manager::LifecycleManager;
pub use ports::PortAllocator;
pub use runtime::{WorkerRuntime, WorkerSpec};
