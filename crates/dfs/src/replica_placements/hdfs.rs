use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::{
    dfs::ReplicaStore,
    location::MachineId,
    replica_placement::{BlockContext, ReplicaPlacement},
    topology::RackTopology,
};

/// HDFS-style placement: first replica on the writer, second in a different
/// rack, third in the second's rack, the rest uniform.
pub struct HdfsPlacement {
    rng: Pcg64,
}

impl HdfsPlacement {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    fn pick_uniform(&mut self, pool: &[MachineId]) -> Option<MachineId> {
        if pool.is_empty() {
            None
        } else {
            Some(pool[self.rng.gen_range(0..pool.len())])
        }
    }

    fn pick_preferring<F>(&mut self, candidates: &[MachineId], preferred: F) -> Option<MachineId>
    where
        F: Fn(MachineId) -> bool,
    {
        let matching = candidates.iter().copied().filter(|&m| preferred(m)).collect::<Vec<_>>();
        if matching.is_empty() {
            self.pick_uniform(candidates)
        } else {
            self.pick_uniform(&matching)
        }
    }
}

impl ReplicaPlacement for HdfsPlacement {
    fn pick_machine(
        &mut self,
        candidates: &[MachineId],
        block: &BlockContext,
        _store: &ReplicaStore,
        topology: &RackTopology,
    ) -> Option<MachineId> {
        match block.chosen {
            [] => {
                if candidates.contains(&block.writer) {
                    Some(block.writer)
                } else {
                    self.pick_uniform(candidates)
                }
            }
            [first] => {
                let first_rack = topology.rack_of(*first);
                self.pick_preferring(candidates, |m| topology.rack_of(m) != first_rack)
            }
            [_, second] => {
                let second_rack = topology.rack_of(*second);
                self.pick_preferring(candidates, |m| topology.rack_of(m) == second_rack)
            }
            _ => self.pick_uniform(candidates),
        }
    }
}
