//! Container inspection types
//!
//! A [`ContainerSource`] reports the running containers and the GPUs each
//! one has requested. The Docker implementation lives in `gpu-alloc-docker`.

mod mock;

pub use mock::MockContainerSource;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collected::Collected;
use crate::gpu::GpuId;

/// One running container as seen during a collection cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container name, unique among running containers
    pub name: String,
    /// Grouping label (compose project), empty if absent
    pub group_label: String,
    /// GPUs requested by this container, possibly none
    pub gpu_ids: BTreeSet<GpuId>,
}

impl ContainerRecord {
    /// Create a record without any GPUs
    pub fn new(name: impl Into<String>, group_label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_label: group_label.into(),
            gpu_ids: BTreeSet::new(),
        }
    }

    /// Attach GPU ids to the record
    pub fn with_gpus<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.gpu_ids.extend(ids.into_iter().map(GpuId::new));
        self
    }

    /// Whether the container holds any GPU
    pub fn has_gpus(&self) -> bool {
        !self.gpu_ids.is_empty()
    }
}

/// Errors that can occur while querying the container runtime
#[derive(Debug, Error)]
pub enum ContainerQueryError {
    /// Listing running containers failed
    #[error("Failed to list containers: {0}")]
    ListFailed(String),

    /// Inspecting a single container failed
    #[error("Failed to inspect container {container}: {reason}")]
    InspectFailed { container: String, reason: String },

    /// Runtime did not answer in time
    #[error("Container query timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Source of the running containers and their GPU requests
///
/// A failed listing is reported as [`Collected::failed`] with an empty list.
/// Problems with a single container must not drop the others: that
/// container is reported with no GPUs instead.
#[async_trait]
pub trait ContainerSource: Send + Sync {
    /// List currently running containers
    async fn list_containers(&self) -> Collected<Vec<ContainerRecord>>;
}
