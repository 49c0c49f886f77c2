//! Collection Scheduler
//!
//! Runs inspect → enumerate → reconcile → publish on a fixed interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::allocation::AllocationTable;
use crate::collected::Collected;
use crate::container::ContainerSource;
use crate::gpu::GpuEnumerator;
use crate::metrics::{AllocationRegistry, CollectionSource, CycleOutcome, PublishReport};

/// Default collection interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// Source of collection ticks
///
/// Abstracted so tests can drive a fixed number of cycles without waiting.
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick
    async fn tick(&mut self);
}

/// Ticker backed by `tokio::time::interval`
///
/// The first tick completes immediately. A cycle that overruns the period
/// delays the following ticks instead of bursting to catch up.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// Create a ticker firing every `period`
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Summary of one collection cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Reconciled allocation table
    pub table: AllocationTable,
    /// Number of running containers inspected
    pub containers: usize,
    /// Whether samples were replaced or the previous ones kept
    pub outcome: CycleOutcome,
    /// Sample counts written by the publisher
    pub publish: PublishReport,
    /// Whether the host GPU query failed
    pub gpu_query_failed: bool,
}

/// Collection scheduler
pub struct CollectionScheduler {
    gpus: Arc<dyn GpuEnumerator>,
    containers: Arc<dyn ContainerSource>,
    registry: Arc<AllocationRegistry>,
    interval: Duration,
    container_timeout: Duration,
    gpu_timeout: Duration,
}

impl CollectionScheduler {
    /// Create a new scheduler
    ///
    /// The container phase and the GPU phase of a cycle are each bounded by
    /// `interval` until overridden.
    pub fn new(
        gpus: Arc<dyn GpuEnumerator>,
        containers: Arc<dyn ContainerSource>,
        registry: Arc<AllocationRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            gpus,
            containers,
            registry,
            interval,
            container_timeout: interval,
            gpu_timeout: interval,
        }
    }

    /// Override the bound on listing and inspecting containers
    pub fn with_container_timeout(mut self, timeout: Duration) -> Self {
        self.container_timeout = timeout;
        self
    }

    /// Override the bound on the host GPU query
    pub fn with_gpu_timeout(mut self, timeout: Duration) -> Self {
        self.gpu_timeout = timeout;
        self
    }

    /// Collection interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the collection loop until `shutdown` flips to true
    ///
    /// Shutdown is observed between cycles.
    pub async fn run<T: Ticker>(&self, ticker: &mut T, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.interval,
            container_timeout = ?self.container_timeout,
            gpu_timeout = ?self.gpu_timeout,
            "Starting collection scheduler"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_once().await;
                    if report.outcome == CycleOutcome::Skipped {
                        error!("Collection cycle failed, previous allocation samples kept");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Shutdown signal received, stopping scheduler");
    }

    /// Run a single collection cycle and record it
    pub async fn run_once(&self) -> CycleReport {
        let start = Instant::now();
        let report = self.collect_cycle().await;
        self.registry.record_cycle(report.outcome, start.elapsed());
        debug!(
            duration = ?start.elapsed(),
            gpus = report.table.len(),
            containers = report.containers,
            samples = report.publish.published,
            "Collection cycle complete"
        );
        report
    }

    /// Inspect, enumerate, reconcile and publish once
    ///
    /// If the container listing failed or timed out the table is still
    /// built but not published, so the previous samples stay visible until
    /// a cycle succeeds. A failed or timed out GPU query still publishes:
    /// GPUs referenced by containers are reported regardless.
    pub async fn collect_cycle(&self) -> CycleReport {
        let listed = match tokio::time::timeout(
            self.container_timeout,
            self.containers.list_containers(),
        )
        .await
        {
            Ok(listed) => listed,
            Err(_) => Collected::empty_failure(format!(
                "container listing timed out after {:?}",
                self.container_timeout
            )),
        };
        let (containers, container_failure) = listed.into_parts();
        if let Some(reason) = &container_failure {
            warn!(reason = %reason, "Container listing failed");
            self.registry
                .inc_collection_failure(CollectionSource::Container);
        }

        let enumerated = match tokio::time::timeout(self.gpu_timeout, self.gpus.list_gpus()).await {
            Ok(enumerated) => enumerated,
            Err(_) => Collected::empty_failure(format!(
                "GPU query timed out after {:?}",
                self.gpu_timeout
            )),
        };
        let (gpus, gpu_failure) = enumerated.into_parts();
        if let Some(reason) = &gpu_failure {
            debug!(reason = %reason, "Host GPU query failed, using container-reported GPUs");
            self.registry.inc_collection_failure(CollectionSource::Gpu);
        }

        let table = AllocationTable::reconcile(&gpus, &containers);

        let (outcome, publish) = if container_failure.is_some() {
            (CycleOutcome::Skipped, PublishReport::default())
        } else {
            (CycleOutcome::Published, self.registry.publish(&table).await)
        };

        CycleReport {
            table,
            containers: containers.len(),
            outcome,
            publish,
            gpu_query_failed: gpu_failure.is_some(),
        }
    }
}
