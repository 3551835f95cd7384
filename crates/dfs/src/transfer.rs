//! Estimated input-transfer times for a task landing on a machine.

use crate::{
    config::DfsConfig,
    data_layer::DataLayerManager,
    location::{Dependency, MachineId},
};

pub const BYTES_PER_MBIT: u64 = 125_000;

/// How much of a task's input is already on the target machine and its rack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataStats {
    /// Total declared input size in bytes.
    pub input_size: u64,
    /// Bytes whose closest replica is in the target machine's rack
    /// (includes [data_on_machine](DataStats::data_on_machine)).
    pub data_on_rack: u64,
    /// Bytes whose closest replica is on the target machine itself.
    pub data_on_machine: u64,
}

pub struct TransferModel {
    remote_transfer_us_per_mbit: u64,
    rack_transfer_us_per_mbit: u64,
}

impl TransferModel {
    pub fn new(config: &DfsConfig) -> Self {
        Self {
            remote_transfer_us_per_mbit: config.remote_transfer_us_per_mbit,
            rack_transfer_us_per_mbit: config.rack_transfer_us_per_mbit,
        }
    }

    /// Walks the dependencies and accumulates, over the closest replica of
    /// every block, the bytes already on the machine and on its rack.
    /// A mismatch between a dependency's declared size and the sum of its
    /// block sizes means the DFS is inconsistent and is fatal.
    pub fn data_stats_for_machine(
        &self,
        dependencies: &[Dependency],
        machine: MachineId,
        data_layer: &DataLayerManager,
    ) -> DataStats {
        let rack = data_layer.rack_for_machine(machine);
        let mut stats = DataStats::default();
        for dependency in dependencies {
            stats.input_size += dependency.size_bytes;
            let closest = data_layer.get_closest_replicas(&dependency.location, machine);
            let mut file_size = 0;
            for location in closest.values() {
                if location.machine == machine {
                    stats.data_on_machine += location.size_bytes;
                }
                if location.rack == rack {
                    stats.data_on_rack += location.size_bytes;
                }
                file_size += location.size_bytes;
            }
            assert_eq!(
                dependency.size_bytes, file_size,
                "dependency {} declares {} bytes but its blocks hold {}",
                dependency.location, dependency.size_bytes, file_size
            );
        }
        stats
    }

    /// Transfer time implied by the data stats. Local data is free, same-rack
    /// and remote bytes pay the configured per-Mbit costs.
    pub fn transfer_us_from_stats(&self, stats: &DataStats) -> u64 {
        assert!(
            stats.input_size >= stats.data_on_rack && stats.data_on_rack >= stats.data_on_machine,
            "inconsistent data stats: input {} < rack {} or rack < machine {}",
            stats.input_size,
            stats.data_on_rack,
            stats.data_on_machine
        );
        let remote_data = stats.input_size - stats.data_on_rack;
        let rack_data = stats.data_on_rack - stats.data_on_machine;
        (self.remote_transfer_us_per_mbit * remote_data + self.rack_transfer_us_per_mbit * rack_data)
            / BYTES_PER_MBIT
    }

    pub fn estimated_transfer_us(
        &self,
        dependencies: &[Dependency],
        machine: MachineId,
        data_layer: &DataLayerManager,
    ) -> u64 {
        let stats = self.data_stats_for_machine(dependencies, machine, data_layer);
        self.transfer_us_from_stats(&stats)
    }
}
