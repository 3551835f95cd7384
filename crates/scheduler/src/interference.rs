//! Task lifecycle observers modelling input-transfer interference.

use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use locsched_dfs::{data_layer::DataLayerManager, location::MachineId, transfer::TransferModel};

use crate::task::{TaskDescriptor, TaskId};

/// End-time change of a task, reported to the simulation event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEndRuntime {
    pub task_id: TaskId,
    /// End time that is no longer valid (evictions).
    pub previous_end_time_us: Option<u64>,
    /// Newly scheduled end time (placements).
    pub current_end_time_us: Option<u64>,
}

/// How placements split by the location of the task's input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalityCounts {
    /// All input bytes on the chosen machine (or no input at all).
    pub local: u64,
    /// All input bytes within the chosen machine's rack.
    pub rack_local: u64,
    pub remote: u64,
}

/// Observer of task lifecycle transitions.
///
/// The placement engine resolves the affected PU to its machine before
/// calling in; observers own the remaining-runtime side table seeded from
/// the workload.
pub trait TaskLifecycleObserver {
    fn on_task_placement(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        machine: MachineId,
        data_layer: &DataLayerManager,
        end_times: &mut Vec<TaskEndRuntime>,
    );

    fn on_task_completion(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        machine: MachineId,
        data_layer: &DataLayerManager,
        end_times: &mut Vec<TaskEndRuntime>,
    );

    fn on_task_eviction(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        machine: MachineId,
        data_layer: &DataLayerManager,
        end_times: &mut Vec<TaskEndRuntime>,
    );

    #[allow(clippy::too_many_arguments)]
    fn on_task_migration(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        old_machine: MachineId,
        new_machine: MachineId,
        data_layer: &DataLayerManager,
        end_times: &mut Vec<TaskEndRuntime>,
    );

    /// Seeds the time the task has left to run, taken from the trace.
    fn seed_remaining_runtime(&mut self, task_id: TaskId, runtime_us: u64);

    fn remaining_runtime_us(&self, task_id: TaskId) -> Option<u64>;

    fn total_transfer_us(&self) -> u64 {
        0
    }

    fn locality_counts(&self) -> LocalityCounts {
        LocalityCounts::default()
    }
}

/// Observer that charges every placement, migration and eviction the
/// estimated time to fetch the task's input to the chosen machine.
pub struct TransferAwareInterference {
    remaining_runtime_us: HashMap<TaskId, u64>,
    transfer: TransferModel,
    horizon_us: u64,
    total_transfer_us: u64,
    locality: LocalityCounts,
}

impl TransferAwareInterference {
    pub fn new(transfer: TransferModel, horizon_us: u64) -> Self {
        Self {
            remaining_runtime_us: HashMap::new(),
            transfer,
            horizon_us,
            total_transfer_us: 0,
            locality: LocalityCounts::default(),
        }
    }
}

impl TaskLifecycleObserver for TransferAwareInterference {
    fn on_task_placement(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        machine: MachineId,
        data_layer: &DataLayerManager,
        end_times: &mut Vec<TaskEndRuntime>,
    ) {
        task.start_time_us = Some(now_us);
        task.total_unscheduled_time_us += now_us.saturating_sub(task.submit_time_us);

        let stats = self
            .transfer
            .data_stats_for_machine(&task.dependencies, machine, data_layer);
        let transfer_us = self.transfer.transfer_us_from_stats(&stats);
        self.total_transfer_us += transfer_us;
        if stats.data_on_machine == stats.input_size {
            self.locality.local += 1;
        } else if stats.data_on_rack == stats.input_size {
            self.locality.rack_local += 1;
        } else {
            self.locality.remote += 1;
        }

        task.finish_time_us = Some(match self.remaining_runtime_us.get(&task.id) {
            Some(&remaining) => now_us + transfer_us + remaining,
            // The task did not finish in the trace; its end event lands just
            // past the end of the simulation.
            None => self.horizon_us + 1,
        });
        debug!(
            "task {} placed on machine {} at {}, transfer {} us, finish at {}",
            task.id,
            machine,
            now_us,
            transfer_us,
            task.finish_time_us.unwrap()
        );
        end_times.push(TaskEndRuntime {
            task_id: task.id,
            previous_end_time_us: None,
            current_end_time_us: task.finish_time_us,
        });
    }

    fn on_task_completion(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        _machine: MachineId,
        _data_layer: &DataLayerManager,
        _end_times: &mut Vec<TaskEndRuntime>,
    ) {
        task.total_run_time_us = task.accumulated_run_time_us(now_us);
    }

    fn on_task_eviction(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        machine: MachineId,
        data_layer: &DataLayerManager,
        end_times: &mut Vec<TaskEndRuntime>,
    ) {
        let transfer_us = self
            .transfer
            .estimated_transfer_us(&task.dependencies, machine, data_layer);
        let start = task.start_time_us.expect("evicted task was never started");
        // Time spent fetching input is not useful work; only what ran after
        // the transfer is saved.
        let executed_for = now_us.saturating_sub(start).saturating_sub(transfer_us);
        task.total_run_time_us = task.accumulated_run_time_us(now_us);
        if let Some(remaining) = self.remaining_runtime_us.get_mut(&task.id) {
            *remaining = remaining.saturating_sub(executed_for);
        }
        end_times.push(TaskEndRuntime {
            task_id: task.id,
            previous_end_time_us: task.finish_time_us,
            current_end_time_us: None,
        });
        task.start_time_us = None;
        task.submit_time_us = now_us;
    }

    fn on_task_migration(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        old_machine: MachineId,
        new_machine: MachineId,
        data_layer: &DataLayerManager,
        _end_times: &mut Vec<TaskEndRuntime>,
    ) {
        let old_transfer_us = self
            .transfer
            .estimated_transfer_us(&task.dependencies, old_machine, data_layer);
        let new_transfer_us = self
            .transfer
            .estimated_transfer_us(&task.dependencies, new_machine, data_layer);
        let start = task.start_time_us.expect("migrated task was never started");
        let executed_for = now_us.saturating_sub(start).saturating_sub(old_transfer_us);
        task.total_run_time_us = task.accumulated_run_time_us(now_us);
        // The in-flight transfer is invalidated; the input is fetched again
        // at the new machine.
        task.finish_time_us = Some(match self.remaining_runtime_us.get_mut(&task.id) {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(executed_for);
                now_us + new_transfer_us + *remaining
            }
            None => self.horizon_us + 1,
        });
        task.submit_time_us = now_us;
        task.start_time_us = Some(now_us);
    }

    fn seed_remaining_runtime(&mut self, task_id: TaskId, runtime_us: u64) {
        self.remaining_runtime_us.insert(task_id, runtime_us);
    }

    fn remaining_runtime_us(&self, task_id: TaskId) -> Option<u64> {
        self.remaining_runtime_us.get(&task_id).copied()
    }

    fn total_transfer_us(&self) -> u64 {
        self.total_transfer_us
    }

    fn locality_counts(&self) -> LocalityCounts {
        self.locality
    }
}

/// Observer used when transfer modelling is disabled: all input is assumed
/// to be in place, tasks run for exactly their remaining runtime.
pub struct NoInterference {
    remaining_runtime_us: HashMap<TaskId, u64>,
    horizon_us: u64,
}

impl NoInterference {
    pub fn new(horizon_us: u64) -> Self {
        Self {
            remaining_runtime_us: HashMap::new(),
            horizon_us,
        }
    }
}

impl TaskLifecycleObserver for NoInterference {
    fn on_task_placement(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        _machine: MachineId,
        _data_layer: &DataLayerManager,
        end_times: &mut Vec<TaskEndRuntime>,
    ) {
        task.start_time_us = Some(now_us);
        task.total_unscheduled_time_us += now_us.saturating_sub(task.submit_time_us);
        task.finish_time_us = Some(match self.remaining_runtime_us.get(&task.id) {
            Some(&remaining) => now_us + remaining,
            None => self.horizon_us + 1,
        });
        end_times.push(TaskEndRuntime {
            task_id: task.id,
            previous_end_time_us: None,
            current_end_time_us: task.finish_time_us,
        });
    }

    fn on_task_completion(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        _machine: MachineId,
        _data_layer: &DataLayerManager,
        _end_times: &mut Vec<TaskEndRuntime>,
    ) {
        task.total_run_time_us = task.accumulated_run_time_us(now_us);
    }

    fn on_task_eviction(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        _machine: MachineId,
        _data_layer: &DataLayerManager,
        end_times: &mut Vec<TaskEndRuntime>,
    ) {
        let start = task.start_time_us.expect("evicted task was never started");
        let executed_for = now_us.saturating_sub(start);
        task.total_run_time_us = task.accumulated_run_time_us(now_us);
        if let Some(remaining) = self.remaining_runtime_us.get_mut(&task.id) {
            *remaining = remaining.saturating_sub(executed_for);
        }
        end_times.push(TaskEndRuntime {
            task_id: task.id,
            previous_end_time_us: task.finish_time_us,
            current_end_time_us: None,
        });
        task.start_time_us = None;
        task.submit_time_us = now_us;
    }

    fn on_task_migration(
        &mut self,
        now_us: u64,
        task: &mut TaskDescriptor,
        _old_machine: MachineId,
        _new_machine: MachineId,
        _data_layer: &DataLayerManager,
        _end_times: &mut Vec<TaskEndRuntime>,
    ) {
        let start = task.start_time_us.expect("migrated task was never started");
        let executed_for = now_us.saturating_sub(start);
        task.total_run_time_us = task.accumulated_run_time_us(now_us);
        task.finish_time_us = Some(match self.remaining_runtime_us.get_mut(&task.id) {
            Some(remaining) => {
                *remaining = remaining.saturating_sub(executed_for);
                now_us + *remaining
            }
            None => self.horizon_us + 1,
        });
        task.submit_time_us = now_us;
        task.start_time_us = Some(now_us);
    }

    fn seed_remaining_runtime(&mut self, task_id: TaskId, runtime_us: u64) {
        self.remaining_runtime_us.insert(task_id, runtime_us);
    }

    fn remaining_runtime_us(&self, task_id: TaskId) -> Option<u64> {
        self.remaining_runtime_us.get(&task_id).copied()
    }
}
