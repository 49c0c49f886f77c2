//! GPU Alloc Docker Integration
//!
//! Provides the Docker client and the container inspector used by the
//! GPU allocation exporter.

pub mod client;
pub mod device_request;
pub mod inspector;

pub use client::{DockerClient, DEFAULT_DOCKER_SOCKET};
pub use device_request::{GpuRequestMatcher, DEFAULT_GPU_CAPABILITY, DEFAULT_GPU_DRIVER};
pub use inspector::{DockerInspector, InspectorConfig, RecordBuilder, DEFAULT_GROUP_LABEL};
