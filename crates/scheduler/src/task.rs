//! Task descriptors and lifecycle timestamps.

use serde::{Deserialize, Serialize};

use locsched_dfs::location::Dependency;
pub use locsched_dfs::location::TaskId;

use crate::resource::ResourceId;

pub type JobId = u64;

/// Resources a task asks for. The placement engine records the vector but
/// does not fit against it; PUs are the unit of admission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpu_cores: f64,
    pub ram_bw: u64,
    pub ram_cap: u64,
    pub disk_bw: u64,
    pub disk_cap: u64,
    pub net_rx_bw: u64,
    pub net_tx_bw: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Submitted,
    Running,
    Completed,
    Evicted,
}

#[derive(Clone, Debug)]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub job_id: JobId,
    pub resource_request: ResourceRequest,
    pub dependencies: Vec<Dependency>,
    pub state: TaskState,
    /// Submission time; re-stamped on eviction and migration.
    pub submit_time_us: u64,
    pub start_time_us: Option<u64>,
    pub finish_time_us: Option<u64>,
    /// Total time spent waiting for a placement, across evictions.
    pub total_unscheduled_time_us: u64,
    /// Total time spent placed on a PU, across evictions.
    pub total_run_time_us: u64,
    pub scheduled_to: Option<ResourceId>,
}

impl TaskDescriptor {
    pub fn new(id: TaskId, job_id: JobId, submit_time_us: u64) -> Self {
        Self {
            id,
            job_id,
            resource_request: ResourceRequest::default(),
            dependencies: Vec::new(),
            state: TaskState::Submitted,
            submit_time_us,
            start_time_us: None,
            finish_time_us: None,
            total_unscheduled_time_us: 0,
            total_run_time_us: 0,
            scheduled_to: None,
        }
    }

    /// Run time accumulated so far, counting the current placement up to
    /// `now_us` when the task is placed.
    pub fn accumulated_run_time_us(&self, now_us: u64) -> u64 {
        self.total_run_time_us
            + self
                .start_time_us
                .map(|start| now_us.saturating_sub(start))
                .unwrap_or(0)
    }
}
