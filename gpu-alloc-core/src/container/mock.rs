//! Mock container source for testing

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ContainerRecord, ContainerSource};
use crate::collected::Collected;

/// Mock container source returning a configurable container list
pub struct MockContainerSource {
    containers: RwLock<Vec<ContainerRecord>>,
    /// Simulate an unreachable runtime
    pub fail: AtomicBool,
    /// Number of listings served
    pub calls: AtomicU32,
}

impl MockContainerSource {
    /// Create a mock reporting the given containers
    pub fn new(containers: Vec<ContainerRecord>) -> Self {
        Self {
            containers: RwLock::new(containers),
            fail: AtomicBool::new(false),
            calls: AtomicU32::new(0),
        }
    }

    /// Set whether the listing should fail
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Replace the reported containers
    pub async fn set_containers(&self, containers: Vec<ContainerRecord>) {
        *self.containers.write().await = containers;
    }

    /// Number of listings served so far
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockContainerSource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl ContainerSource for MockContainerSource {
    async fn list_containers(&self) -> Collected<Vec<ContainerRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Collected::empty_failure("mock runtime unreachable");
        }
        Collected::ok(self.containers.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_listing() {
        let mock = MockContainerSource::new(vec![ContainerRecord::new("c1", "p1").with_gpus(["0"])]);
        let listed = mock.list_containers().await;
        assert!(!listed.is_degraded());
        assert_eq!(listed.value().len(), 1);
        assert_eq!(mock.call_count(), 1);

        mock.set_fail(true);
        let listed = mock.list_containers().await;
        assert!(listed.is_degraded());
        assert!(listed.value().is_empty());
        assert_eq!(mock.call_count(), 2);
    }
}
