use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::time::Instant;

use log::info;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use locsched_dfs::{data_layer::DataLayerManager, transfer::TransferModel};

use crate::{
    config::Scenario,
    engine::PlacementEngine,
    interference::{NoInterference, TaskLifecycleObserver, TransferAwareInterference},
    run_stats::RunStats,
    task::{TaskId, TaskState},
    workload,
};

/// One simulation run: brings up the cluster, synthesizes the workload and
/// alternates scheduling rounds with completion events until the work is
/// drained or nothing can be placed any more.
pub struct Simulation {
    scenario: Scenario,
    trace_path: Option<PathBuf>,
}

impl Simulation {
    pub fn new(scenario: Scenario, trace_path: Option<PathBuf>) -> Self {
        Simulation { scenario, trace_path }
    }

    pub fn run(self) -> RunStats {
        let scenario = self.scenario;
        let horizon_us = scenario.scheduler.horizon_us();
        let data_layer = DataLayerManager::new(&scenario.dfs, scenario.seed);
        let observer: Box<dyn TaskLifecycleObserver> = if scenario.scheduler.model_transfers {
            Box::new(TransferAwareInterference::new(
                TransferModel::new(&scenario.dfs),
                horizon_us,
            ))
        } else {
            Box::new(NoInterference::new(horizon_us))
        };
        let mut engine = PlacementEngine::new(scenario.scheduler.clone(), data_layer, observer, scenario.seed);

        for machine in 0..scenario.system.machines {
            engine.add_machine(&format!("machine_{}", machine), scenario.system.pus_per_machine);
        }
        let mut rng = Pcg64::seed_from_u64(scenario.seed);
        workload::generate(&mut engine, &scenario.workload, 0, &mut rng);

        let mut finish_events: BinaryHeap<Reverse<(u64, TaskId)>> = BinaryHeap::new();
        let mut now_us = 0;
        let mut scheduled_task_count = 0;
        let mut scheduler_runtime_us = 0;
        loop {
            let round_start = Instant::now();
            let (scheduled, end_times) = engine.schedule_all_jobs(now_us);
            scheduler_runtime_us += round_start.elapsed().as_micros() as u64;
            scheduled_task_count += scheduled;
            for event in end_times {
                if let Some(end_us) = event.current_end_time_us {
                    // End events past the horizon never fire.
                    if end_us <= horizon_us {
                        finish_events.push(Reverse((end_us, event.task_id)));
                    }
                }
            }
            let Some(Reverse((finish_us, task_id))) = finish_events.pop() else {
                break;
            };
            now_us = finish_us;
            engine.handle_task_completion(now_us, task_id);
        }
        info!("simulation drained at {} us", now_us);

        let completed_tasks = engine
            .task_map()
            .values()
            .filter(|task| task.state == TaskState::Completed)
            .count();
        let stats = RunStats {
            total_tasks: engine.task_map().len(),
            completed_tasks,
            scheduled_task_count,
            makespan_us: now_us,
            total_transfer_us: engine.observer().total_transfer_us(),
            locality: engine.observer().locality_counts(),
            scheduler_runtime_us,
        };
        if let Some(path) = self.trace_path {
            std::fs::write(&path, serde_json::to_string_pretty(engine.trace()).unwrap())
                .unwrap_or_else(|e| panic!("Can't write trace to {}: {e:?}", path.display()));
        }
        stats
    }
}
