use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::{
    dfs::ReplicaStore,
    location::MachineId,
    replica_placement::{BlockContext, ReplicaPlacement},
    topology::RackTopology,
};

pub struct BoundedPlacement {
    blocks_per_machine: u64,
    rng: Pcg64,
}

impl BoundedPlacement {
    pub fn new(blocks_per_machine: u64, seed: u64) -> Self {
        assert!(blocks_per_machine > 0, "blocks_per_machine must be positive");
        Self {
            blocks_per_machine,
            rng: Pcg64::seed_from_u64(seed),
        }
    }
}

impl ReplicaPlacement for BoundedPlacement {
    fn pick_machine(
        &mut self,
        candidates: &[MachineId],
        _block: &BlockContext,
        store: &ReplicaStore,
        _topology: &RackTopology,
    ) -> Option<MachineId> {
        if candidates.is_empty() {
            return None;
        }
        let below_cap = candidates
            .iter()
            .copied()
            .filter(|&machine| (store.block_count(machine) as u64) < self.blocks_per_machine)
            .collect::<Vec<_>>();
        // Every candidate is at capacity: the cluster is overfull, place
        // uniformly anyway.
        let pool = if below_cap.is_empty() { candidates } else { &below_cap };
        Some(pool[self.rng.gen_range(0..pool.len())])
    }
}
