use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::{
    dfs::ReplicaStore,
    location::MachineId,
    replica_placement::{BlockContext, ReplicaPlacement},
    topology::RackTopology,
};

pub struct UniformPlacement {
    rng: Pcg64,
}

impl UniformPlacement {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
        }
    }
}

impl ReplicaPlacement for UniformPlacement {
    fn pick_machine(
        &mut self,
        candidates: &[MachineId],
        _block: &BlockContext,
        _store: &ReplicaStore,
        _topology: &RackTopology,
    ) -> Option<MachineId> {
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[self.rng.gen_range(0..candidates.len())])
    }
}
