//! GPU Alloc Core Library
//!
//! Allocation discovery for the GPU allocation exporter.
//! This crate provides GPU enumeration, the container source abstraction,
//! allocation reconciliation, metric publishing and the collection loop.

pub mod allocation;
pub mod collected;
pub mod container;
pub mod gpu;
pub mod metrics;
pub mod scheduler;

// Re-export common types
pub use allocation::{AllocationTable, MetricSample, UNALLOCATED_CONTAINER};
pub use collected::Collected;
pub use container::{ContainerQueryError, ContainerRecord, ContainerSource};
pub use gpu::{GpuEnumerator, GpuId, GpuQueryError, NvidiaSmiEnumerator};
pub use metrics::AllocationRegistry;
pub use scheduler::{CollectionScheduler, CycleReport, IntervalTicker, Ticker};
