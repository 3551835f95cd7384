use std::collections::{btree_map::Entry, BTreeMap, HashMap};

use log::{debug, info};

use crate::{
    block_distribution::BlockCountDistribution,
    config::DfsConfig,
    dfs::SimulatedDfs,
    location::{BlockId, DataLocation, MachineId, RackId, TaskId},
    replica_placement::ReplicaPlacement,
    replica_placements::build_placement,
    runtime_distribution::RuntimeDistribution,
    topology::RackTopology,
};

/// Facade over the simulated DFS: binds hostnames to machines, owns the rack
/// topology and the workload distributions, and answers locality queries.
pub struct DataLayerManager {
    hostname_to_machine: HashMap<String, MachineId>,
    topology: RackTopology,
    dfs: SimulatedDfs,
    block_dist: BlockCountDistribution,
    runtime_dist: RuntimeDistribution,
}

impl DataLayerManager {
    /// Builds a manager with the placement policy named by `config.dfs_type`.
    pub fn new(config: &DfsConfig, seed: u64) -> Self {
        info!("initializing data layer with {} DFS", config.dfs_type);
        Self::with_placement(config, build_placement(config, seed), seed)
    }

    pub fn with_placement(config: &DfsConfig, placement: Box<dyn ReplicaPlacement>, seed: u64) -> Self {
        Self {
            hostname_to_machine: HashMap::new(),
            topology: RackTopology::new(config.machines_per_rack),
            dfs: SimulatedDfs::new(placement, config.block_size_bytes, config.replication_factor, seed),
            block_dist: BlockCountDistribution::default(),
            runtime_dist: RuntimeDistribution::new(config.runtime_factor, config.runtime_power),
        }
    }

    /// Binds a hostname to a machine and returns the rack assigned to it.
    pub fn add_machine(&mut self, hostname: &str, machine: MachineId) -> RackId {
        let previous = self.hostname_to_machine.insert(hostname.to_string(), machine);
        assert!(previous.is_none(), "hostname {} already bound", hostname);
        let rack = self.topology.assign(machine);
        self.dfs.add_machine(machine);
        debug!("machine {} ({}) joined rack {}", machine, hostname, rack);
        rack
    }

    pub fn remove_machine(&mut self, hostname: &str) {
        let machine = self
            .hostname_to_machine
            .remove(hostname)
            .unwrap_or_else(|| panic!("hostname {} not bound to a machine", hostname));
        self.dfs.remove_machine(machine, &self.topology);
        self.topology.remove(machine);
    }

    /// Registers the input file of a task. The block count follows the block
    /// distribution evaluated at the proportion of tasks shorter than the
    /// task's average runtime, so longer tasks tend to read more blocks.
    /// Long-running services have no input; returns the bytes added.
    pub fn add_files_for_task(
        &mut self,
        task_id: TaskId,
        avg_runtime_us: u64,
        long_running_service: bool,
        max_machine_spread: u64,
    ) -> u64 {
        if long_running_service {
            return 0;
        }
        let cumulative_probability = self.runtime_dist.proportion_shorter(avg_runtime_us);
        let num_blocks = self.block_dist.inverse(cumulative_probability);
        self.dfs
            .add_blocks_for_task(task_id, num_blocks, max_machine_spread, &self.topology)
    }

    pub fn remove_files_for_task(&mut self, task_id: TaskId) {
        self.dfs.remove_blocks_for_task(task_id);
    }

    pub fn get_file_locations(&self, path: &str) -> Vec<DataLocation> {
        self.dfs.file_locations(path)
    }

    pub fn get_file_size(&self, path: &str) -> u64 {
        self.dfs.file_size(path)
    }

    /// The closest replica of every block of a file, seen from `from_machine`.
    ///
    /// Starts from the first replica of each block and upgrades whenever a
    /// better one appears: a local replica beats a same-rack replica, which
    /// beats a remote one; within a class the first seen wins.
    pub fn get_closest_replicas(&self, path: &str, from_machine: MachineId) -> BTreeMap<BlockId, DataLocation> {
        let rack = self.topology.rack_of(from_machine);
        let mut closest: BTreeMap<BlockId, DataLocation> = BTreeMap::new();
        for location in self.get_file_locations(path) {
            match closest.entry(location.block_id) {
                Entry::Vacant(entry) => {
                    entry.insert(location);
                }
                Entry::Occupied(mut entry) => {
                    let best = entry.get();
                    if best.machine != from_machine
                        && (location.machine == from_machine || (location.rack == rack && best.rack != rack))
                    {
                        entry.insert(location);
                    }
                }
            }
        }
        closest
    }

    pub fn rack_for_machine(&self, machine: MachineId) -> RackId {
        self.topology.rack_of(machine)
    }

    pub fn task_input_path(task_id: TaskId) -> String {
        SimulatedDfs::task_input_path(task_id)
    }

    pub fn topology(&self) -> &RackTopology {
        &self.topology
    }

    pub fn dfs(&self) -> &SimulatedDfs {
        &self.dfs
    }

    pub fn block_distribution(&self) -> &BlockCountDistribution {
        &self.block_dist
    }

    pub fn runtime_distribution(&self) -> &RuntimeDistribution {
        &self.runtime_dist
    }
}
