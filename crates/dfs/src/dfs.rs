use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::{
    location::{BlockId, DataLocation, MachineId, TaskId},
    replica_placement::{BlockContext, ReplicaPlacement},
    topology::RackTopology,
};

/// All block and replica state of the simulated DFS.
pub struct ReplicaStore {
    files: HashMap<String, Vec<BlockId>>,
    block_locations: HashMap<BlockId, Vec<DataLocation>>,
    machine_blocks: BTreeMap<MachineId, BTreeSet<BlockId>>,
    task_files: HashMap<TaskId, String>,
    next_block_id: BlockId,
}

impl ReplicaStore {
    fn new() -> Self {
        Self {
            files: HashMap::new(),
            block_locations: HashMap::new(),
            machine_blocks: BTreeMap::new(),
            task_files: HashMap::new(),
            next_block_id: 0,
        }
    }

    /// Machines known to the store, in ascending id order.
    pub fn machines(&self) -> impl Iterator<Item = MachineId> + '_ {
        self.machine_blocks.keys().copied()
    }

    /// Number of blocks a machine currently holds.
    pub fn block_count(&self, machine: MachineId) -> usize {
        self.machine_blocks.get(&machine).map(|blocks| blocks.len()).unwrap_or(0)
    }
}

pub struct SimulatedDfs {
    store: ReplicaStore,
    placement: Box<dyn ReplicaPlacement>,
    block_size_bytes: u64,
    replication_factor: usize,
    rng: Pcg64,
}

impl SimulatedDfs {
    pub fn new(
        placement: Box<dyn ReplicaPlacement>,
        block_size_bytes: u64,
        replication_factor: usize,
        seed: u64,
    ) -> Self {
        assert!(block_size_bytes > 0, "block size must be positive");
        assert!(replication_factor > 0, "replication factor must be positive");
        Self {
            store: ReplicaStore::new(),
            placement,
            block_size_bytes,
            replication_factor,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Path under which a task's input file is registered.
    pub fn task_input_path(task_id: TaskId) -> String {
        format!("tasks/{}/input", task_id)
    }

    pub fn store(&self) -> &ReplicaStore {
        &self.store
    }

    pub fn add_machine(&mut self, machine: MachineId) {
        let previous = self.store.machine_blocks.insert(machine, BTreeSet::new());
        assert!(previous.is_none(), "machine {} already in DFS", machine);
    }

    /// Removes a machine and re-replicates every block it held onto a machine
    /// chosen by the placement policy, restoring the replication factor.
    pub fn remove_machine(&mut self, machine: MachineId, topology: &RackTopology) {
        let blocks = self
            .store
            .machine_blocks
            .remove(&machine)
            .unwrap_or_else(|| panic!("machine {} not in DFS", machine));
        for block_id in blocks {
            let locations = self.store.block_locations.get_mut(&block_id).unwrap();
            locations.retain(|location| location.machine != machine);
            let holders = locations.iter().map(|location| location.machine).collect::<Vec<_>>();
            if holders.is_empty() {
                warn!("block {} lost its last replica with machine {}", block_id, machine);
                continue;
            }
            let candidates = self
                .store
                .machines()
                .filter(|m| !holders.contains(m))
                .collect::<Vec<_>>();
            let context = BlockContext {
                block_id,
                writer: holders[0],
                chosen: &holders,
            };
            if let Some(target) = self
                .placement
                .pick_machine(&candidates, &context, &self.store, topology)
            {
                self.record_replica(block_id, target, topology);
            }
        }
    }

    /// Creates the input file of a task: `num_blocks` full-size blocks, each
    /// replicated on pairwise-distinct machines. Returns the bytes added.
    pub fn add_blocks_for_task(
        &mut self,
        task_id: TaskId,
        num_blocks: u64,
        max_machine_spread: u64,
        topology: &RackTopology,
    ) -> u64 {
        let path = Self::task_input_path(task_id);
        assert!(
            !self.store.files.contains_key(&path),
            "task {} already has input blocks",
            task_id
        );
        let machines = self.store.machines().collect::<Vec<_>>();
        assert!(!machines.is_empty(), "no machines in DFS");
        let writer = machines[self.rng.gen_range(0..machines.len())];

        let mut task_machines: BTreeSet<MachineId> = BTreeSet::new();
        let mut blocks = Vec::with_capacity(num_blocks as usize);
        for _ in 0..num_blocks {
            let block_id = self.store.next_block_id;
            self.store.next_block_id += 1;
            let chosen = self.place_block(block_id, writer, &mut task_machines, max_machine_spread, topology);
            for machine in chosen {
                self.record_replica(block_id, machine, topology);
            }
            blocks.push(block_id);
        }
        debug!(
            "added {} blocks for task {} across {} machines",
            num_blocks,
            task_id,
            task_machines.len()
        );
        self.store.files.insert(path.clone(), blocks);
        self.store.task_files.insert(task_id, path);
        num_blocks * self.block_size_bytes
    }

    pub fn remove_blocks_for_task(&mut self, task_id: TaskId) {
        let Some(path) = self.store.task_files.remove(&task_id) else {
            warn!("task {} has no blocks to remove", task_id);
            return;
        };
        for block_id in self.store.files.remove(&path).unwrap() {
            for location in self.store.block_locations.remove(&block_id).unwrap() {
                if let Some(blocks) = self.store.machine_blocks.get_mut(&location.machine) {
                    blocks.remove(&block_id);
                }
            }
        }
    }

    /// All replicas of all blocks of a file; empty for unknown paths.
    pub fn file_locations(&self, path: &str) -> Vec<DataLocation> {
        self.store
            .files
            .get(path)
            .map(|blocks| {
                blocks
                    .iter()
                    .flat_map(|block_id| self.store.block_locations[block_id].iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn file_size(&self, path: &str) -> u64 {
        self.store
            .files
            .get(path)
            .map(|blocks| {
                blocks
                    .iter()
                    .map(|block_id| {
                        self.store.block_locations[block_id]
                            .first()
                            .map(|location| location.size_bytes)
                            .unwrap_or(0)
                    })
                    .sum()
            })
            .unwrap_or(0)
    }

    // The spread cap confines every replica of every block of a task to at
    // most `max_machine_spread` distinct machines once that many are in use.
    fn place_block(
        &mut self,
        block_id: BlockId,
        writer: MachineId,
        task_machines: &mut BTreeSet<MachineId>,
        max_machine_spread: u64,
        topology: &RackTopology,
    ) -> Vec<MachineId> {
        let mut chosen: Vec<MachineId> = Vec::new();
        for _ in 0..self.replication_factor {
            let restrict = max_machine_spread > 0 && task_machines.len() >= max_machine_spread as usize;
            let candidates = self
                .store
                .machines()
                .filter(|machine| !chosen.contains(machine))
                .filter(|machine| !restrict || task_machines.contains(machine))
                .collect::<Vec<_>>();
            let context = BlockContext {
                block_id,
                writer,
                chosen: &chosen,
            };
            match self
                .placement
                .pick_machine(&candidates, &context, &self.store, topology)
            {
                Some(machine) => {
                    chosen.push(machine);
                    task_machines.insert(machine);
                }
                None => break,
            }
        }
        chosen
    }

    fn record_replica(&mut self, block_id: BlockId, machine: MachineId, topology: &RackTopology) {
        let location = DataLocation {
            block_id,
            machine,
            rack: topology.rack_of(machine),
            size_bytes: self.block_size_bytes,
        };
        let locations = self.store.block_locations.entry(block_id).or_default();
        assert!(
            locations.iter().all(|existing| existing.machine != machine),
            "block {} already has a replica on machine {}",
            block_id,
            machine
        );
        locations.push(location);
        self.store.machine_blocks.get_mut(&machine).unwrap().insert(block_id);
    }
}
