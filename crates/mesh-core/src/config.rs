//! mesh.toml configuration model.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;

/// Errors raised while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid duration for `{key}`: {value:?}")]
    InvalidDuration { key: &'static str, value: String },

    #[error("invalid port range {start}..={end}")]
    InvalidPortRange { start: u16, end: u16 },

    #[error("health.threshold ({threshold:?}) must not exceed health.timeout ({timeout:?})")]
    ThresholdAboveTimeout {
        threshold: Duration,
        timeout: Duration,
    },
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MeshConfig {
    pub control: ControlConfig,
    pub balancer: BalancerConfig,
    pub health: HealthConfig,
    pub lifecycle: LifecycleConfig,
    pub fanout: FanoutConfig,
}

/// Control-plane HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    pub listen: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:6000".to_string(),
        }
    }
}

/// Load balancer front door and failover behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BalancerConfig {
    pub listen: String,
    /// How often the healthy-worker cache is rebuilt from the registry.
    pub refresh_interval: String,
    /// Bound on a single forwarded attempt.
    pub request_timeout: String,
    /// Pause between two failover attempts of the same request.
    pub retry_backoff: String,
    /// Worker path that receives forwarded work.
    pub work_path: String,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:4000".to_string(),
            refresh_interval: "5s".to_string(),
            request_timeout: "30s".to_string(),
            retry_backoff: "0ms".to_string(),
            work_path: "/process".to_string(),
        }
    }
}

impl BalancerConfig {
    pub fn refresh_interval(&self) -> Duration {
        parse_duration(&self.refresh_interval).unwrap_or(Duration::from_secs(5))
    }

    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn retry_backoff(&self) -> Duration {
        parse_duration(&self.retry_backoff).unwrap_or(Duration::ZERO)
    }
}

/// What the health monitor does with a worker it classified unhealthy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemediationPolicy {
    /// Keep the record with `status = unhealthy`; routing skips it.
    MarkOnly,
    /// Remove the record, retire its process and launch a replacement.
    #[default]
    EvictAndReplace,
}

/// Health probing parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Tick interval of the monitor (e.g., "30s").
    pub interval: String,
    /// Transport timeout of one probe.
    pub timeout: String,
    /// Slowest response still classified healthy.
    pub threshold: String,
    /// HTTP path to probe.
    pub endpoint: String,
    pub remediation: RemediationPolicy,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: "30s".to_string(),
            timeout: "5s".to_string(),
            threshold: "2s".to_string(),
            endpoint: "/health".to_string(),
            remediation: RemediationPolicy::default(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(30))
    }

    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn threshold(&self) -> Duration {
        parse_duration(&self.threshold).unwrap_or(Duration::from_secs(2))
    }
}

/// Worker launch parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Container image launched for new workers.
    pub image: String,
    /// Address registered for launched workers.
    pub worker_host: String,
    /// Port the worker process listens on inside its container.
    pub container_port: u16,
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub id_prefix: String,
    /// Bound on every runtime capability call.
    pub call_timeout: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            image: "mesh-worker:latest".to_string(),
            worker_host: "127.0.0.1".to_string(),
            container_port: 3000,
            port_range_start: 3005,
            port_range_end: 3999,
            id_prefix: "worker".to_string(),
            call_timeout: "30s".to_string(),
        }
    }
}

impl LifecycleConfig {
    pub fn call_timeout(&self) -> Duration {
        parse_duration(&self.call_timeout).unwrap_or(Duration::from_secs(30))
    }
}

/// Push channel buffering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FanoutConfig {
    pub capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl MeshConfig {
    /// Read and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MeshConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject durations that do not parse and inconsistent limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations: [(&'static str, &str); 7] = [
            ("balancer.refresh_interval", &self.balancer.refresh_interval),
            ("balancer.request_timeout", &self.balancer.request_timeout),
            ("balancer.retry_backoff", &self.balancer.retry_backoff),
            ("health.interval", &self.health.interval),
            ("health.timeout", &self.health.timeout),
            ("health.threshold", &self.health.threshold),
            ("lifecycle.call_timeout", &self.lifecycle.call_timeout),
        ];
        for (key, value) in durations {
            if parse_duration(value).is_none() {
                return Err(ConfigError::InvalidDuration {
                    key,
                    value: value.to_string(),
                });
            }
        }

        let lc = &self.lifecycle;
        if lc.port_range_start == 0 || lc.port_range_start > lc.port_range_end {
            return Err(ConfigError::InvalidPortRange {
                start: lc.port_range_start,
                end: lc.port_range_end,
            });
        }

        let (threshold, timeout) = (self.health.threshold(), self.health.timeout());
        if threshold > timeout {
            return Err(ConfigError::ThresholdAboveTimeout { threshold, timeout });
        }
        Ok(())
    }
}
