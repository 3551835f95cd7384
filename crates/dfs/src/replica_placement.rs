//! Trait for a replica-placement policy.

use crate::dfs::ReplicaStore;
use crate::location::{BlockId, MachineId};
use crate::topology::RackTopology;

/// Placement state of the block currently being replicated.
pub struct BlockContext<'a> {
    /// Block being placed.
    pub block_id: BlockId,
    /// Machine the owning task's data is anchored to.
    pub writer: MachineId,
    /// Machines already chosen for earlier replicas of this block.
    pub chosen: &'a [MachineId],
}

/// Trait for a replica-placement policy.
///
/// The store calls [pick_machine](ReplicaPlacement::pick_machine) once per
/// replica. `candidates` never contains a machine already holding a replica
/// of the block, so any returned member keeps replicas pairwise distinct.
pub trait ReplicaPlacement {
    /// Picks the machine for the next replica of a block, or `None` when no
    /// candidate is acceptable.
    fn pick_machine(
        &mut self,
        candidates: &[MachineId],
        block: &BlockContext,
        store: &ReplicaStore,
        topology: &RackTopology,
    ) -> Option<MachineId>;
}
