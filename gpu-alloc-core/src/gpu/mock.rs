//! Mock GPU enumerator for testing

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{GpuEnumerator, GpuId};
use crate::collected::Collected;

/// Mock enumerator returning a configurable GPU set
pub struct MockGpuEnumerator {
    gpus: BTreeSet<GpuId>,
    /// Simulate a failing host query
    pub fail: AtomicBool,
}

impl MockGpuEnumerator {
    /// Create a mock reporting the given GPU ids
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            gpus: ids.into_iter().map(GpuId::new).collect(),
            fail: AtomicBool::new(false),
        }
    }

    /// Create a mock reporting `count` GPUs indexed from zero
    pub fn with_gpu_count(count: u32) -> Self {
        Self::new((0..count).map(|i| i.to_string()))
    }

    /// Create a mock whose query always fails
    pub fn failing() -> Self {
        let mock = Self::new(Vec::<String>::new());
        mock.set_fail(true);
        mock
    }

    /// Set whether the query should fail
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockGpuEnumerator {
    fn default() -> Self {
        Self::with_gpu_count(2)
    }
}

#[async_trait]
impl GpuEnumerator for MockGpuEnumerator {
    async fn list_gpus(&self) -> Collected<BTreeSet<GpuId>> {
        if self.fail.load(Ordering::SeqCst) {
            return Collected::empty_failure("mock GPU query failure");
        }
        Collected::ok(self.gpus.clone())
    }
}
