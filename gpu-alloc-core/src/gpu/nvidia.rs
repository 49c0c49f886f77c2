//! NVIDIA GPU enumeration
//!
//! Uses `nvidia-smi` to list the GPU indices present on the host.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{parse_gpu_list, GpuEnumerator, GpuId, GpuQueryError};
use crate::collected::Collected;

/// Default `nvidia-smi` invocation
pub const DEFAULT_NVIDIA_SMI: &str = "nvidia-smi";

/// Default time allowed for one `nvidia-smi` call
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// GPU enumerator backed by `nvidia-smi --query-gpu=index`
pub struct NvidiaSmiEnumerator {
    command: String,
    timeout: Duration,
}

impl NvidiaSmiEnumerator {
    /// Create an enumerator with a custom command path and timeout
    pub fn with_command(command: String, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Run the query and parse its output
    pub async fn query(&self) -> Result<BTreeSet<GpuId>, GpuQueryError> {
        let result = tokio::time::timeout(
            self.timeout,
            Command::new(&self.command)
                .args(["--query-gpu=index", "--format=csv,noheader"])
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GpuQueryError::ToolNotFound(self.command.clone()));
            }
            Ok(Err(e)) => return Err(GpuQueryError::IoError(e)),
            Err(_) => return Err(GpuQueryError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            return Err(GpuQueryError::NonZeroExit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| GpuQueryError::MalformedOutput(e.to_string()))?;

        Ok(parse_gpu_list(&stdout))
    }
}

#[async_trait]
impl GpuEnumerator for NvidiaSmiEnumerator {
    async fn list_gpus(&self) -> Collected<BTreeSet<GpuId>> {
        match self.query().await {
            Ok(gpus) => {
                debug!(count = gpus.len(), "Enumerated host GPUs");
                Collected::ok(gpus)
            }
            Err(e) => {
                warn!(error = %e, command = %self.command, "GPU enumeration failed");
                Collected::empty_failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tool_yields_empty_set() {
        let enumerator = NvidiaSmiEnumerator::with_command(
            "/nonexistent/nvidia-smi".to_string(),
            Duration::from_secs(1),
        );

        let err = enumerator.query().await.unwrap_err();
        assert!(matches!(err, GpuQueryError::ToolNotFound(_)));

        let collected = enumerator.list_gpus().await;
        assert!(collected.is_degraded());
        assert!(collected.value().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_yields_empty_set() {
        // `false` ignores its arguments and exits with status 1
        let enumerator =
            NvidiaSmiEnumerator::with_command("false".to_string(), Duration::from_secs(5));

        let err = enumerator.query().await.unwrap_err();
        assert!(matches!(err, GpuQueryError::NonZeroExit { .. }));
        assert!(enumerator.list_gpus().await.value().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_query_is_parsed() {
        // `echo` prints its arguments back as a single line
        let enumerator =
            NvidiaSmiEnumerator::with_command("echo".to_string(), Duration::from_secs(5));

        let gpus = enumerator.query().await.unwrap();
        assert_eq!(gpus.len(), 1);
        assert!(gpus.contains(&GpuId::from("--query-gpu=index --format=csv,noheader")));
    }
}
