//! Some stats from a completed simulation.

use serde::{Deserialize, Serialize};

use crate::interference::LocalityCounts;

/// Some stats from a completed simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunStats {
    /// Total number of submitted tasks.
    pub total_tasks: usize,
    /// Number of tasks which finished before the horizon.
    pub completed_tasks: usize,
    /// Number of committed placements, re-placements included.
    pub scheduled_task_count: u64,
    /// Time of the last processed completion.
    pub makespan_us: u64,
    /// Total estimated input-transfer time charged to placements.
    pub total_transfer_us: u64,
    /// Placements split by input locality.
    pub locality: LocalityCounts,
    /// Wall-clock time spent inside scheduling rounds.
    pub scheduler_runtime_us: u64,
}
