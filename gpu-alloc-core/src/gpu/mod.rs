//! GPU enumeration
//!
//! Discovers the GPUs present on the host, independent of any container.

mod interface;
mod mock;
mod nvidia;

pub use interface::*;
pub use mock::MockGpuEnumerator;
pub use nvidia::{NvidiaSmiEnumerator, DEFAULT_NVIDIA_SMI, DEFAULT_QUERY_TIMEOUT};
