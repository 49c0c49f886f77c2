//! Device request matching
//!
//! Docker records `--gpus` and compose `deploy.resources.reservations.devices`
//! as device requests in the container's host config. This module decides
//! which requests are GPU requests and which GPU ids they name.

use std::collections::BTreeSet;

use bollard::models::{DeviceRequest, HostConfig};

use gpu_alloc_core::GpuId;

/// Driver name the NVIDIA container toolkit registers
pub const DEFAULT_GPU_DRIVER: &str = "nvidia";

/// Capability tag substring marking a GPU request
pub const DEFAULT_GPU_CAPABILITY: &str = "gpu";

/// Matches GPU device requests and extracts their device ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuRequestMatcher {
    driver: String,
    capability: String,
}

impl GpuRequestMatcher {
    /// Create a matcher for the given driver name and capability substring
    pub fn new(driver: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            capability: capability.into(),
        }
    }

    /// Whether `request` asks for GPUs
    ///
    /// True if the driver matches, or if any capability tag in the nested
    /// capability lists contains the capability substring.
    pub fn matches(&self, request: &DeviceRequest) -> bool {
        if request.driver.as_deref() == Some(self.driver.as_str()) {
            return true;
        }
        request
            .capabilities
            .iter()
            .flatten()
            .flatten()
            .any(|cap| cap.contains(&self.capability))
    }

    /// GPU ids named by all matching requests in `requests`
    pub fn gpu_ids(&self, requests: &[DeviceRequest]) -> BTreeSet<GpuId> {
        requests
            .iter()
            .filter(|request| self.matches(request))
            .flat_map(|request| request.device_ids.iter().flatten())
            .flat_map(|id| split_device_ids(id))
            .collect()
    }

    /// GPU ids requested through a container's host config
    pub fn gpu_ids_from_host_config(&self, host_config: Option<&HostConfig>) -> BTreeSet<GpuId> {
        host_config
            .and_then(|config| config.device_requests.as_deref())
            .map(|requests| self.gpu_ids(requests))
            .unwrap_or_default()
    }
}

impl Default for GpuRequestMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_GPU_DRIVER, DEFAULT_GPU_CAPABILITY)
    }
}

/// Split one device id entry into GPU ids
///
/// The NVIDIA runtime accepts `"0,1,2"` as a single entry.
pub fn split_device_ids(entry: &str) -> Vec<GpuId> {
    entry
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(GpuId::new)
        .collect()
}
