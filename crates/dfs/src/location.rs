//! Identifiers and query-result types of the data layer.

use serde::{Deserialize, Serialize};

pub type MachineId = u64;
pub type RackId = u64;
pub type BlockId = u64;
pub type TaskId = u64;

/// One replica of a block, as returned by locality lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLocation {
    /// Block this replica belongs to.
    pub block_id: BlockId,
    /// Machine holding the replica.
    pub machine: MachineId,
    /// Rack of [machine](DataLocation::machine).
    pub rack: RackId,
    /// Size of the block in bytes.
    pub size_bytes: u64,
}

/// Reference to one input file of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Path of the file in the data layer.
    pub location: String,
    /// Declared size of the file in bytes.
    pub size_bytes: u64,
}
