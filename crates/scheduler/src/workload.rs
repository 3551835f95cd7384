//! Synthetic workload generation.

use log::info;
use rand::Rng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use locsched_dfs::{data_layer::DataLayerManager, location::Dependency};

use crate::{
    engine::PlacementEngine,
    task::{TaskDescriptor, TaskId},
};

/// Parameters of a synthetic workload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Number of jobs.
    pub jobs: usize,
    /// Number of tasks in each job.
    pub tasks_per_job: usize,
    /// Mean of task average runtimes in microseconds.
    pub mean_runtime_us: u64,
    /// Relative jitter applied to each task's average runtime, in `[0, 1]`.
    #[serde(default)]
    pub runtime_jitter: f64,
    /// Fraction of tasks that are long-running services without input.
    #[serde(default)]
    pub service_fraction: f64,
    /// Cap on distinct machines holding any block of one task; 0 disables.
    #[serde(default)]
    pub max_machine_spread: u64,
}

/// Generates jobs and tasks, registers their input files in the data layer,
/// sets each task's dependency from the bytes the data layer created and
/// seeds the remaining-runtime table.
pub fn generate(engine: &mut PlacementEngine, config: &WorkloadConfig, now_us: u64, rng: &mut Pcg64) {
    assert!(
        (0.0..=1.0).contains(&config.runtime_jitter),
        "runtime_jitter out of range"
    );
    assert!(
        (0.0..=1.0).contains(&config.service_fraction),
        "service_fraction out of range"
    );
    let mut next_task_id: TaskId = 1;
    for job_index in 0..config.jobs {
        let mut tasks = Vec::with_capacity(config.tasks_per_job);
        for _ in 0..config.tasks_per_job {
            let task_id = next_task_id;
            next_task_id += 1;
            let jitter = 1.0 + config.runtime_jitter * rng.gen_range(-1.0..=1.0);
            let avg_runtime_us = (config.mean_runtime_us as f64 * jitter).max(1.0) as u64;
            let long_running_service = rng.gen_bool(config.service_fraction);
            let mut task = TaskDescriptor::new(task_id, 0, now_us);
            let input_bytes = engine.data_layer_mut().add_files_for_task(
                task_id,
                avg_runtime_us,
                long_running_service,
                config.max_machine_spread,
            );
            if input_bytes > 0 {
                task.dependencies.push(Dependency {
                    location: DataLayerManager::task_input_path(task_id),
                    size_bytes: input_bytes,
                });
            }
            engine.seed_remaining_runtime(task_id, avg_runtime_us);
            tasks.push(task);
        }
        engine.submit_job(now_us, &format!("job_{}", job_index), tasks);
    }
    info!(
        "generated {} jobs with {} tasks each",
        config.jobs, config.tasks_per_job
    );
}
