//! Allocation reconciliation
//!
//! Combines the host GPU set with per-container GPU requests into a table
//! covering every known GPU, including the ones no container holds.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::container::ContainerRecord;
use crate::gpu::GpuId;

/// Container label value used for GPUs held by no container
pub const UNALLOCATED_CONTAINER: &str = "None";

/// One exported sample: `gpu` is held by `container` of `group`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricSample {
    pub gpu: String,
    pub container: String,
    pub group: String,
}

impl MetricSample {
    /// Sample value; allocation samples are presence indicators
    pub const VALUE: f64 = 1.0;

    /// Sample for a GPU held by no container
    pub fn unallocated(gpu: &GpuId) -> Self {
        Self {
            gpu: gpu.to_string(),
            container: UNALLOCATED_CONTAINER.to_string(),
            group: String::new(),
        }
    }

    /// Sample for a GPU held by `container`
    pub fn allocated(gpu: &GpuId, container: &ContainerRecord) -> Self {
        Self {
            gpu: gpu.to_string(),
            container: container.name.clone(),
            group: container.group_label.clone(),
        }
    }

    /// Label values in `gpu, container, compose_project` order
    pub fn label_values(&self) -> [&str; 3] {
        [&self.gpu, &self.container, &self.group]
    }
}

/// GPU to bound containers, rebuilt from scratch every cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationTable {
    allocations: BTreeMap<GpuId, Vec<ContainerRecord>>,
}

impl AllocationTable {
    /// Build the table for one cycle
    ///
    /// Keys are the union of `gpus` and every GPU referenced by a container,
    /// so a GPU the host query missed is still reported through its
    /// container. Containers are appended in iteration order.
    pub fn reconcile(gpus: &BTreeSet<GpuId>, containers: &[ContainerRecord]) -> Self {
        let mut allocations: BTreeMap<GpuId, Vec<ContainerRecord>> =
            gpus.iter().map(|gpu| (gpu.clone(), Vec::new())).collect();

        for container in containers {
            for gpu in &container.gpu_ids {
                allocations
                    .entry(gpu.clone())
                    .or_default()
                    .push(container.clone());
            }
        }

        Self { allocations }
    }

    /// Number of GPUs in the table
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Whether the table holds no GPUs
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    /// All GPUs in the table
    pub fn gpus(&self) -> impl Iterator<Item = &GpuId> {
        self.allocations.keys()
    }

    /// Containers bound to `gpu`, `None` if the GPU is unknown
    pub fn containers(&self, gpu: &GpuId) -> Option<&[ContainerRecord]> {
        self.allocations.get(gpu).map(Vec::as_slice)
    }

    /// GPUs held by no container
    pub fn unallocated(&self) -> Vec<&GpuId> {
        self.allocations
            .iter()
            .filter(|(_, containers)| containers.is_empty())
            .map(|(gpu, _)| gpu)
            .collect()
    }

    /// Flatten into exported samples
    ///
    /// A GPU with N containers yields N samples; a free GPU yields exactly
    /// one sentinel sample.
    pub fn samples(&self) -> Vec<MetricSample> {
        let mut samples = Vec::with_capacity(self.allocations.len());
        for (gpu, containers) in &self.allocations {
            if containers.is_empty() {
                samples.push(MetricSample::unallocated(gpu));
            } else {
                samples.extend(
                    containers
                        .iter()
                        .map(|container| MetricSample::allocated(gpu, container)),
                );
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu_set(ids: &[&str]) -> BTreeSet<GpuId> {
        ids.iter().copied().map(GpuId::from).collect()
    }

    fn sample(gpu: &str, container: &str, group: &str) -> MetricSample {
        MetricSample {
            gpu: gpu.to_string(),
            container: container.to_string(),
            group: group.to_string(),
        }
    }

    #[test]
    fn test_keys_are_union_of_host_and_containers() {
        let containers = vec![
            ContainerRecord::new("a", "").with_gpus(["1", "4"]),
            ContainerRecord::new("b", "").with_gpus(["7"]),
        ];
        let table = AllocationTable::reconcile(&gpu_set(&["0", "1"]), &containers);

        let keys: Vec<&str> = table.gpus().map(GpuId::as_str).collect();
        assert_eq!(keys, vec!["0", "1", "4", "7"]);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_unallocated_gpu_kept_with_sentinel() {
        let containers = vec![ContainerRecord::new("c1", "proj1").with_gpus(["0"])];
        let table = AllocationTable::reconcile(&gpu_set(&["0", "1"]), &containers);

        assert_eq!(table.unallocated(), vec![&GpuId::from("1")]);
        assert_eq!(
            table.samples(),
            vec![sample("0", "c1", "proj1"), sample("1", "None", "")]
        );
    }

    #[test]
    fn test_enumeration_failure_falls_back_to_containers() {
        let containers = vec![ContainerRecord::new("c2", "").with_gpus(["3"])];
        let table = AllocationTable::reconcile(&BTreeSet::new(), &containers);

        assert_eq!(table.len(), 1);
        assert_eq!(table.samples(), vec![sample("3", "c2", "")]);
    }

    #[test]
    fn test_shared_gpu_yields_one_sample_per_container() {
        let containers = vec![
            ContainerRecord::new("first", "g").with_gpus(["0"]),
            ContainerRecord::new("idle", "g"),
            ContainerRecord::new("second", "h").with_gpus(["0", "1"]),
        ];
        let table = AllocationTable::reconcile(&gpu_set(&["0", "1", "2"]), &containers);

        let bound: Vec<&str> = table
            .containers(&GpuId::from("0"))
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(bound, vec!["first", "second"]);

        assert_eq!(
            table.samples(),
            vec![
                sample("0", "first", "g"),
                sample("0", "second", "h"),
                sample("1", "second", "h"),
                sample("2", "None", ""),
            ]
        );
    }

    #[test]
    fn test_containers_without_gpus_do_not_add_keys() {
        let containers = vec![ContainerRecord::new("web", "site")];
        let table = AllocationTable::reconcile(&BTreeSet::new(), &containers);
        assert!(table.is_empty());
        assert!(table.samples().is_empty());
        assert!(table.containers(&GpuId::from("0")).is_none());
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let gpus = gpu_set(&["1", "0"]);
        let containers = vec![
            ContainerRecord::new("x", "").with_gpus(["1"]),
            ContainerRecord::new("y", "").with_gpus(["1"]),
        ];
        let first = AllocationTable::reconcile(&gpus, &containers);
        let second = AllocationTable::reconcile(&gpus, &containers);
        assert_eq!(first, second);
        assert_eq!(first.samples(), second.samples());
    }

    #[test]
    fn test_table_serializes_by_gpu() {
        let containers = vec![ContainerRecord::new("c1", "p").with_gpus(["0"])];
        let table = AllocationTable::reconcile(&gpu_set(&["0", "1"]), &containers);

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["allocations"]["0"][0]["name"], "c1");
        assert_eq!(json["allocations"]["1"].as_array().unwrap().len(), 0);
    }
}
