//! mesh-core — shared configuration for the self-healing worker mesh.
//!
//! The daemon reads a `mesh.toml` into [`MeshConfig`]. Every key has a
//! default, so an empty file is a valid configuration. Durations are
//! written as strings (`"30s"`, `"500ms"`, `"2m"`) and parsed with
//! [`parse_duration`].

pub mod config;
pub mod duration;

pub use config::{
    BalancerConfig, ConfigError, ControlConfig, FanoutConfig, HealthConfig, LifecycleConfig,
    MeshConfig, RemediationPolicy,
};
pub use duration::parse_duration;
