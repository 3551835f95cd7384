use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::{
    dfs::ReplicaStore,
    location::MachineId,
    replica_placement::{BlockContext, ReplicaPlacement},
    topology::RackTopology,
};

const SKEW_EXPONENT: f64 = 1.5;

/// Skewed placement: machines with lower ids are preferentially chosen, which
/// turns the earliest machines of the cluster into hotspots.
pub struct SkewedPlacement {
    rng: Pcg64,
}

impl SkewedPlacement {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
        }
    }
}

impl ReplicaPlacement for SkewedPlacement {
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
        // Power-law weights over the candidate rank; candidates arrive in
        // ascending machine id order.
        let weights = (0..candidates.len())
            .map(|rank| 1.0 / ((rank + 1) as f64).powf(SKEW_EXPONENT))
            .collect::<Vec<_>>();
        let total = weights.iter().sum::<f64>();
        let mut draw = self.rng.gen_range(0.0..total);
        for (machine, weight) in candidates.iter().zip(weights.iter()) {
            if draw < *weight {
                return Some(*machine);
            }
            draw -= weight;
        }
        Some(*candidates.last().unwrap())
    }
}
