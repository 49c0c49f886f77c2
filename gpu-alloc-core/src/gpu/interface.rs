//! GPU enumerator trait and common types

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collected::Collected;

/// Opaque identifier of one GPU, usually its index as text ("0", "1", ...)
///
/// Ordering is numeric-aware so that "2" sorts before "10". Identifiers that
/// are not plain integers (UUIDs, MIG ids) sort after the numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GpuId(String);

impl GpuId {
    /// Create a GPU id, trimming surrounding whitespace
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for GpuId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for GpuId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GpuId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for GpuId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Errors that can occur while querying the host for GPUs
#[derive(Debug, Error)]
pub enum GpuQueryError {
    /// Query tool is not installed or not on PATH
    #[error("GPU query tool not found: {0}")]
    ToolNotFound(String),

    /// Query tool exited unsuccessfully
    #[error("GPU query exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },

    /// Query tool produced output we cannot read
    #[error("Malformed GPU query output: {0}")]
    MalformedOutput(String),

    /// Query did not finish in time
    #[error("GPU query timed out after {0:?}")]
    Timeout(Duration),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Source of the GPUs present on this host
///
/// Enumeration is best-effort: implementations never fail the caller and
/// report problems through [`Collected::failed`] with an empty set instead.
#[async_trait]
pub trait GpuEnumerator: Send + Sync {
    /// List the GPUs currently present on the host
    async fn list_gpus(&self) -> Collected<BTreeSet<GpuId>>;
}

/// Parse GPU query output: one id per line, blanks dropped, de-duplicated
pub fn parse_gpu_list(output: &str) -> BTreeSet<GpuId> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(GpuId::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_id_trims() {
        assert_eq!(GpuId::new("  3 \n").as_str(), "3");
        assert_eq!(format!("{}", GpuId::from("7")), "7");
    }

    #[test]
    fn test_gpu_id_numeric_ordering() {
        let mut ids: Vec<GpuId> = ["10", "GPU-abc", "2", "0"].into_iter().map(GpuId::from).collect();
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(GpuId::as_str).collect();
        assert_eq!(ordered, vec!["0", "2", "10", "GPU-abc"]);
    }

    #[test]
    fn test_parse_gpu_list() {
        let gpus = parse_gpu_list("0\n 1 \n\n1\n2\n");
        let ids: Vec<&str> = gpus.iter().map(GpuId::as_str).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
    }

    #[test]
    fn test_parse_gpu_list_empty() {
        assert!(parse_gpu_list("").is_empty());
        assert!(parse_gpu_list("\n  \n").is_empty());
    }
}
