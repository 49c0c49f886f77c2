//! Docker container inspector
//!
//! Lists running containers and turns each one into a [`ContainerRecord`]
//! carrying its compose project and requested GPUs.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bollard::models::{ContainerInspectResponse, ContainerSummary};
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use gpu_alloc_core::{Collected, ContainerQueryError, ContainerRecord, ContainerSource};

use super::client::DockerClient;
use super::device_request::GpuRequestMatcher;

/// Label docker compose sets to the project name
pub const DEFAULT_GROUP_LABEL: &str = "com.docker.compose.project";

/// Inspector configuration
#[derive(Debug, Clone)]
pub struct InspectorConfig {
    /// Label key used as the container group
    pub group_label: String,
    /// GPU request matching rules
    pub matcher: GpuRequestMatcher,
    /// Maximum concurrent inspect calls
    pub concurrency: usize,
    /// Bound on the container listing call
    pub timeout: Duration,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            group_label: DEFAULT_GROUP_LABEL.to_string(),
            matcher: GpuRequestMatcher::default(),
            concurrency: 8,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Builds container records from Docker API responses
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    group_label: String,
    matcher: GpuRequestMatcher,
}

impl RecordBuilder {
    /// Create a record builder
    pub fn new(group_label: impl Into<String>, matcher: GpuRequestMatcher) -> Self {
        Self {
            group_label: group_label.into(),
            matcher,
        }
    }

    /// Build the record for one listed container
    ///
    /// A failed inspect still produces a record, named and labelled from the
    /// listing, with no GPUs.
    pub fn build(
        &self,
        summary: &ContainerSummary,
        inspected: Result<ContainerInspectResponse>,
    ) -> ContainerRecord {
        let listed_name = summary_name(summary);

        let details = match inspected {
            Ok(details) => details,
            Err(e) => {
                let err = ContainerQueryError::InspectFailed {
                    container: listed_name.clone(),
                    reason: format!("{:#}", e),
                };
                warn!(error = %err, "Reporting container without GPUs");
                return ContainerRecord::new(listed_name, self.group(summary.labels.as_ref()));
            }
        };

        let name = details
            .name
            .as_deref()
            .map(trim_name)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or(listed_name);

        let labels = details
            .config
            .as_ref()
            .and_then(|config| config.labels.as_ref())
            .or(summary.labels.as_ref());

        ContainerRecord {
            group_label: self.group(labels),
            gpu_ids: self
                .matcher
                .gpu_ids_from_host_config(details.host_config.as_ref()),
            name,
        }
    }

    fn group(&self, labels: Option<&HashMap<String, String>>) -> String {
        labels
            .and_then(|labels| labels.get(&self.group_label))
            .cloned()
            .unwrap_or_default()
    }
}

/// Container source backed by the Docker Engine API
pub struct DockerInspector {
    client: DockerClient,
    builder: RecordBuilder,
    concurrency: usize,
    timeout: Duration,
}

impl DockerInspector {
    /// Create a new inspector
    pub fn new(client: DockerClient, config: InspectorConfig) -> Self {
        Self {
            client,
            builder: RecordBuilder::new(config.group_label, config.matcher),
            concurrency: config.concurrency.max(1),
            timeout: config.timeout,
        }
    }

    /// Get the underlying client
    pub fn client(&self) -> &DockerClient {
        &self.client
    }

    async fn list_running(&self) -> Result<Vec<ContainerSummary>, ContainerQueryError> {
        match tokio::time::timeout(self.timeout, self.client.list_running()).await {
            Ok(Ok(summaries)) => Ok(summaries),
            Ok(Err(e)) => Err(ContainerQueryError::ListFailed(format!("{:#}", e))),
            Err(_) => Err(ContainerQueryError::Timeout(self.timeout)),
        }
    }

    async fn inspect(&self, summary: ContainerSummary) -> ContainerRecord {
        let inspected = match summary.id.as_deref() {
            Some(id) => self.client.inspect(id).await,
            None => Err(anyhow::anyhow!("container has no id")),
        };
        self.builder.build(&summary, inspected)
    }
}

#[async_trait]
impl ContainerSource for DockerInspector {
    async fn list_containers(&self) -> Collected<Vec<ContainerRecord>> {
        let summaries = match self.list_running().await {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!(error = %e, socket = %self.client.socket(), "Container listing failed");
                return Collected::empty_failure(e.to_string());
            }
        };

        // `buffered` keeps listing order
        let records: Vec<ContainerRecord> = stream::iter(summaries)
            .map(|summary| self.inspect(summary))
            .buffered(self.concurrency)
            .collect()
            .await;

        debug!(
            containers = records.len(),
            with_gpus = records.iter().filter(|r| r.has_gpus()).count(),
            "Inspected running containers"
        );
        Collected::ok(records)
    }
}

/// Container name from a listing entry: first name, else the short id
fn summary_name(summary: &ContainerSummary) -> String {
    summary
        .names
        .iter()
        .flatten()
        .map(|name| trim_name(name))
        .find(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| {
            summary
                .id
                .as_deref()
                .map(|id| id.chars().take(12).collect())
        })
        .unwrap_or_default()
}

/// Docker reports names with a leading `/`
fn trim_name(name: &str) -> &str {
    name.trim_start_matches('/')
}
