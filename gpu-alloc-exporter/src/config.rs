//! Configuration module for the GPU allocation exporter
//!
//! Handles loading and validating configuration from YAML files and environment variables.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Metrics endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Port to expose metrics on
    #[serde(default = "default_metrics_port")]
    pub port: u16,

    /// Address to bind the metrics listener to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Path for metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
            bind_address: default_bind_address(),
            path: default_metrics_path(),
        }
    }
}

/// Docker runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Docker control socket
    #[serde(default = "default_docker_socket")]
    pub socket: String,

    /// Timeout for Docker API requests
    #[serde(with = "humantime_serde", default = "default_query_timeout")]
    pub timeout: Duration,

    /// Label used as the container group (compose project)
    #[serde(default = "default_group_label")]
    pub group_label: String,

    /// Maximum concurrent container inspections
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: default_docker_socket(),
            timeout: default_query_timeout(),
            group_label: default_group_label(),
            concurrency: default_concurrency(),
        }
    }
}

/// GPU discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuConfig {
    /// Path to nvidia-smi
    #[serde(default = "default_gpu_command")]
    pub command: String,

    /// Timeout for the GPU query
    #[serde(with = "humantime_serde", default = "default_query_timeout")]
    pub timeout: Duration,

    /// Device request driver that marks a GPU request
    #[serde(default = "default_gpu_driver")]
    pub driver: String,

    /// Capability substring that marks a GPU request
    #[serde(default = "default_gpu_capability")]
    pub capability: String,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            command: default_gpu_command(),
            timeout: default_query_timeout(),
            driver: default_gpu_driver(),
            capability: default_gpu_capability(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Collection interval
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Docker configuration
    #[serde(default)]
    pub docker: DockerConfig,

    /// GPU discovery configuration
    #[serde(default)]
    pub gpu: GpuConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            metrics: MetricsConfig::default(),
            docker: DockerConfig::default(),
            gpu: GpuConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            anyhow::bail!("interval must be > 0");
        }
        if self.metrics.port == 0 {
            anyhow::bail!("metrics.port must be > 0");
        }
        if !self.metrics.path.starts_with('/') {
            anyhow::bail!("metrics.path must start with '/'");
        }
        if self.docker.socket.is_empty() {
            anyhow::bail!("docker.socket must not be empty");
        }
        if self.docker.timeout.is_zero() {
            anyhow::bail!("docker.timeout must be > 0");
        }
        if self.docker.concurrency == 0 {
            anyhow::bail!("docker.concurrency must be > 0");
        }
        if self.gpu.command.is_empty() {
            anyhow::bail!("gpu.command must not be empty");
        }
        if self.gpu.timeout.is_zero() {
            anyhow::bail!("gpu.timeout must be > 0");
        }
        if self.gpu.driver.is_empty() || self.gpu.capability.is_empty() {
            anyhow::bail!("gpu.driver and gpu.capability must not be empty");
        }
        Ok(())
    }
}

// Default value functions
fn default_interval() -> Duration {
    gpu_alloc_core::scheduler::DEFAULT_INTERVAL
}

fn default_metrics_port() -> u16 {
    8000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_docker_socket() -> String {
    gpu_alloc_docker::DEFAULT_DOCKER_SOCKET.to_string()
}

fn default_query_timeout() -> Duration {
    gpu_alloc_core::gpu::DEFAULT_QUERY_TIMEOUT
}

fn default_group_label() -> String {
    gpu_alloc_docker::DEFAULT_GROUP_LABEL.to_string()
}

fn default_concurrency() -> usize {
    8
}

fn default_gpu_command() -> String {
    gpu_alloc_core::gpu::DEFAULT_NVIDIA_SMI.to_string()
}

fn default_gpu_driver() -> String {
    gpu_alloc_docker::DEFAULT_GPU_DRIVER.to_string()
}

fn default_gpu_capability() -> String {
    gpu_alloc_docker::DEFAULT_GPU_CAPABILITY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interval, Duration::from_secs(15));
        assert_eq!(config.metrics.port, 8000);
        assert_eq!(config.metrics.path, "/metrics");
        assert_eq!(config.docker.socket, "/var/run/docker.sock");
        assert_eq!(config.docker.group_label, "com.docker.compose.project");
        assert_eq!(config.gpu.driver, "nvidia");
        assert_eq!(config.gpu.capability, "gpu");
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
interval: 30s

metrics:
  port: 9400
  path: /custom

docker:
  socket: /run/user/1000/docker.sock
  timeout: 3s
  group_label: team

gpu:
  command: /usr/bin/nvidia-smi
  timeout: 2s
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.metrics.port, 9400);
        assert_eq!(config.metrics.path, "/custom");
        assert_eq!(config.metrics.bind_address, "0.0.0.0");
        assert_eq!(config.docker.socket, "/run/user/1000/docker.sock");
        assert_eq!(config.docker.timeout, Duration::from_secs(3));
        assert_eq!(config.docker.group_label, "team");
        assert_eq!(config.docker.concurrency, 8);
        assert_eq!(config.gpu.command, "/usr/bin/nvidia-smi");
        assert_eq!(config.gpu.timeout, Duration::from_secs(2));
        assert_eq!(config.gpu.driver, "nvidia");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.interval, Duration::from_secs(15));
        assert_eq!(config.metrics.port, 8000);
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = Config::from_yaml("interval: 0s").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_path() {
        let mut config = Config::default();
        config.metrics.path = "metrics".to_string();
        assert!(config.validate().is_err());
    }
}
