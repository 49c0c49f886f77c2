//! Prometheus metrics for the GPU allocation exporter
//!
//! The registry is owned by the exporter and injected where needed; nothing
//! is registered with the process-global default registry.

use std::time::Duration;

use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::allocation::{AllocationTable, MetricSample};

/// Allocation metric family name
pub const ALLOCATION_METRIC: &str = "gpu_container_allocation";

/// Allocation metric label names
pub const ALLOCATION_LABELS: [&str; 3] = ["gpu", "container", "compose_project"];

/// Outcome of a collection cycle, used as a counter label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Samples were replaced with the new table
    Published,
    /// Collection was degraded and the previous samples were kept
    Skipped,
}

impl CycleOutcome {
    fn as_label(self) -> &'static str {
        match self {
            CycleOutcome::Published => "published",
            CycleOutcome::Skipped => "skipped",
        }
    }
}

/// Collaborator whose query failed, used as a counter label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionSource {
    /// Host GPU enumeration
    Gpu,
    /// Container runtime listing
    Container,
}

impl CollectionSource {
    fn as_label(self) -> &'static str {
        match self {
            CollectionSource::Gpu => "gpu",
            CollectionSource::Container => "container",
        }
    }
}

/// Result of replacing the allocation samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Samples written
    pub published: usize,
    /// Samples dropped because their labels were rejected
    pub skipped: usize,
}

/// Exporter-owned metrics registry
pub struct AllocationRegistry {
    registry: Registry,
    /// Held for writing while the family is cleared and rebuilt, and for
    /// reading while the registry is gathered.
    allocation: RwLock<GaugeVec>,
    known_gpus: IntGauge,
    cycles: IntCounterVec,
    collection_failures: IntCounterVec,
    cycle_duration: Histogram,
}

impl AllocationRegistry {
    /// Create a registry with all exporter metrics registered
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let allocation = GaugeVec::new(
            Opts::new(
                ALLOCATION_METRIC,
                "Indicates if a container is using a specific GPU",
            ),
            &ALLOCATION_LABELS,
        )?;
        let known_gpus = IntGauge::new(
            "gpu_alloc_exporter_known_gpus",
            "Number of GPUs in the last published allocation table",
        )?;
        let cycles = IntCounterVec::new(
            Opts::new(
                "gpu_alloc_exporter_cycles_total",
                "Total number of collection cycles",
            ),
            &["outcome"],
        )?;
        let collection_failures = IntCounterVec::new(
            Opts::new(
                "gpu_alloc_exporter_collection_failures_total",
                "Total number of failed collaborator queries",
            ),
            &["source"],
        )?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "gpu_alloc_exporter_cycle_duration_seconds",
                "Duration of collection cycles",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        registry.register(Box::new(allocation.clone()))?;
        registry.register(Box::new(known_gpus.clone()))?;
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(collection_failures.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            registry,
            allocation: RwLock::new(allocation),
            known_gpus,
            cycles,
            collection_failures,
            cycle_duration,
        })
    }

    /// Replace every allocation sample with the samples of `table`
    ///
    /// The family is cleared and rebuilt under the write lock, so a
    /// concurrent [`render`](Self::render) sees either the previous or the
    /// new sample set, never a mix.
    pub async fn publish(&self, table: &AllocationTable) -> PublishReport {
        let samples = table.samples();
        let allocation = self.allocation.write().await;
        allocation.reset();

        let mut report = PublishReport::default();
        for sample in &samples {
            match Self::write_sample(&allocation, sample) {
                Ok(()) => report.published += 1,
                Err(e) => {
                    warn!(
                        gpu = %sample.gpu,
                        container = %sample.container,
                        error = %e,
                        "Skipping allocation sample"
                    );
                    report.skipped += 1;
                }
            }
        }
        self.known_gpus.set(table.len() as i64);
        drop(allocation);

        debug!(
            published = report.published,
            skipped = report.skipped,
            "Allocation samples replaced"
        );
        report
    }

    fn write_sample(allocation: &GaugeVec, sample: &MetricSample) -> Result<(), prometheus::Error> {
        if sample.gpu.is_empty() {
            return Err(prometheus::Error::Msg("empty gpu label".to_string()));
        }
        allocation
            .get_metric_with_label_values(&sample.label_values())?
            .set(MetricSample::VALUE);
        Ok(())
    }

    /// Record a finished collection cycle
    pub fn record_cycle(&self, outcome: CycleOutcome, duration: Duration) {
        self.cycles.with_label_values(&[outcome.as_label()]).inc();
        self.cycle_duration.observe(duration.as_secs_f64());
    }

    /// Increment the failure counter for a collaborator
    pub fn inc_collection_failure(&self, source: CollectionSource) {
        self.collection_failures
            .with_label_values(&[source.as_label()])
            .inc();
    }

    /// Snapshot of the allocation samples currently exported
    pub async fn allocation_samples(&self) -> Vec<MetricSample> {
        let _allocation = self.allocation.read().await;
        let mut samples: Vec<MetricSample> = self
            .registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == ALLOCATION_METRIC)
            .flat_map(|family| family.get_metric().iter())
            .map(|metric| {
                let label = |name: &str| {
                    metric
                        .get_label()
                        .iter()
                        .find(|pair| pair.get_name() == name)
                        .map(|pair| pair.get_value().to_string())
                        .unwrap_or_default()
                };
                MetricSample {
                    gpu: label("gpu"),
                    container: label("container"),
                    group: label("compose_project"),
                }
            })
            .collect();
        samples.sort();
        samples
    }

    /// Content type of [`render`](Self::render) output
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Encode every registered metric in the text exposition format
    pub async fn render(&self) -> Result<String, prometheus::Error> {
        let _allocation = self.allocation.read().await;
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::container::ContainerRecord;
    use crate::gpu::GpuId;

    fn table(gpus: &[&str], containers: Vec<ContainerRecord>) -> AllocationTable {
        let gpus: BTreeSet<GpuId> = gpus.iter().copied().map(GpuId::from).collect();
        AllocationTable::reconcile(&gpus, &containers)
    }

    fn sample(gpu: &str, container: &str, group: &str) -> MetricSample {
        MetricSample {
            gpu: gpu.to_string(),
            container: container.to_string(),
            group: group.to_string(),
        }
    }

    #[tokio::test]
    async fn test_publish_writes_samples() {
        let registry = AllocationRegistry::new().unwrap();
        let report = registry
            .publish(&table(
                &["0", "1"],
                vec![ContainerRecord::new("c1", "proj1").with_gpus(["0"])],
            ))
            .await;

        assert_eq!(report, PublishReport { published: 2, skipped: 0 });
        assert_eq!(
            registry.allocation_samples().await,
            vec![sample("0", "c1", "proj1"), sample("1", "None", "")]
        );
    }

    #[tokio::test]
    async fn test_publish_replaces_stale_samples() {
        let registry = AllocationRegistry::new().unwrap();
        registry
            .publish(&table(
                &["0"],
                vec![ContainerRecord::new("old", "p").with_gpus(["0"])],
            ))
            .await;
        registry.publish(&table(&["0"], Vec::new())).await;

        assert_eq!(
            registry.allocation_samples().await,
            vec![sample("0", "None", "")]
        );
    }

    #[tokio::test]
    async fn test_publish_is_idempotent() {
        let registry = AllocationRegistry::new().unwrap();
        let allocations = table(
            &["0", "1", "2"],
            vec![
                ContainerRecord::new("a", "x").with_gpus(["0", "1"]),
                ContainerRecord::new("b", "x").with_gpus(["1"]),
            ],
        );

        registry.publish(&allocations).await;
        let first = registry.allocation_samples().await;
        registry.publish(&allocations).await;
        let second = registry.allocation_samples().await;

        assert_eq!(first, second);
        assert_eq!(second.len(), 4);
    }

    #[tokio::test]
    async fn test_malformed_key_is_skipped() {
        let registry = AllocationRegistry::new().unwrap();
        let report = registry
            .publish(&table(
                &["0"],
                vec![ContainerRecord::new("bad", "").with_gpus([""])],
            ))
            .await;

        assert_eq!(report, PublishReport { published: 1, skipped: 1 });
        assert_eq!(
            registry.allocation_samples().await,
            vec![sample("0", "None", "")]
        );
    }

    #[tokio::test]
    async fn test_render_text_format() {
        let registry = AllocationRegistry::new().unwrap();
        registry
            .publish(&table(
                &["1"],
                vec![ContainerRecord::new("c2", "").with_gpus(["3"])],
            ))
            .await;
        registry.record_cycle(CycleOutcome::Published, Duration::from_millis(20));
        registry.inc_collection_failure(CollectionSource::Gpu);

        let text = registry.render().await.unwrap();
        let has_sample = |container: &str, gpu: &str| {
            text.lines().any(|line| {
                line.starts_with("gpu_container_allocation{")
                    && line.contains(&format!(r#"container="{}""#, container))
                    && line.contains(&format!(r#"gpu="{}""#, gpu))
                    && line.contains(r#"compose_project="""#)
                    && line.ends_with(" 1")
            })
        };
        assert!(text.contains("# TYPE gpu_container_allocation gauge"));
        assert!(has_sample("c2", "3"));
        assert!(has_sample("None", "1"));
        assert!(text.contains("gpu_alloc_exporter_known_gpus 2"));
        assert!(text.contains(r#"gpu_alloc_exporter_cycles_total{outcome="published"} 1"#));
        assert!(text.contains(r#"gpu_alloc_exporter_collection_failures_total{source="gpu"} 1"#));
        assert!(registry.content_type().starts_with("text/plain"));
    }
}
