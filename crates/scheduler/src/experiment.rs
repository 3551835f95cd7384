use std::{
    io::Write,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use threadpool::ThreadPool;

use locsched_dfs::config::DfsPolicyKind;

use crate::{config::Scenario, run_stats::RunStats, simulation::Simulation};

#[derive(Clone)]
pub struct Plan {
    pub name: String,
    pub scenario_path: PathBuf,
}

#[derive(Clone)]
struct Run {
    plan: Plan,
    dfs_type: DfsPolicyKind,
    placement_mode: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    plan: String,
    dfs_type: String,
    placement_mode: String,
    run_stats: RunStats,
}

pub struct Experiment {
    plans: Vec<Plan>,
    dfs_types: Vec<DfsPolicyKind>,
    placement_modes: Vec<String>,
    traces_folder: Option<PathBuf>,
}

impl Experiment {
    pub fn new(
        plans: Vec<Plan>,
        dfs_types: Vec<DfsPolicyKind>,
        placement_modes: Vec<String>,
        traces_folder: Option<PathBuf>,
    ) -> Self {
        Self {
            plans,
            dfs_types,
            placement_modes,
            traces_folder,
        }
    }

    pub fn run(self, threads: usize) -> Vec<RunResult> {
        if let Some(dir) = &self.traces_folder {
            std::fs::create_dir_all(dir).unwrap();
        }

        let runs = self
            .plans
            .into_iter()
            .cartesian_product(self.dfs_types)
            .cartesian_product(self.placement_modes)
            .map(|((plan, dfs_type), placement_mode)| Run {
                plan,
                dfs_type,
                placement_mode,
            })
            .collect::<Vec<_>>();

        let total_runs = runs.len();

        let finished_run_atomic = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(Vec::new()));

        let pool = ThreadPool::new(threads);
        let start_time = Instant::now();
        for run in runs.into_iter() {
            let finished_run_atomic = finished_run_atomic.clone();
            let results = results.clone();
            let traces_folder = self.traces_folder.clone();
            pool.execute(move || {
                let mut scenario = Scenario::from_yaml(&run.plan.scenario_path);
                scenario.dfs.dfs_type = run.dfs_type;
                scenario.scheduler.randomly_place_tasks = match run.placement_mode.as_str() {
                    "locality" => false,
                    "random" => true,
                    other => panic!("unknown placement mode: {}", other),
                };
                let trace_path = traces_folder.map(|folder| {
                    folder.join(format!("{}_{}_{}.json", run.plan.name, run.dfs_type, run.placement_mode))
                });

                let run_stats = Simulation::new(scenario, trace_path).run();

                results.lock().unwrap().push(RunResult {
                    plan: run.plan.name,
                    dfs_type: run.dfs_type.to_string(),
                    placement_mode: run.placement_mode,
                    run_stats,
                });

                finished_run_atomic.fetch_add(1, Ordering::SeqCst);
                let finished_runs = finished_run_atomic.load(Ordering::SeqCst);

                let elapsed = start_time.elapsed();
                let remaining = Duration::from_secs_f64(
                    elapsed.as_secs_f64() / finished_runs as f64 * (total_runs - finished_runs) as f64,
                );
                print!("\r{}", " ".repeat(70));
                print!(
                    "\rFinished {}/{} [{}%] runs in {:.2?}, remaining time: {:.2?}",
                    finished_runs,
                    total_runs,
                    (finished_runs as f64 * 100. / total_runs as f64).round() as i32,
                    elapsed,
                    remaining
                );
                std::io::stdout().flush().unwrap();
            });
        }

        pool.join();

        print!("\r{}", " ".repeat(70));
        println!("\rFinished {} runs in {:.2?}", total_runs, start_time.elapsed());

        let mut results = Arc::try_unwrap(results).unwrap().into_inner().unwrap();
        results.sort_by_cached_key(|run| {
            (
                run.plan.clone(),
                run.dfs_type.clone(),
                run.placement_mode.clone(),
            )
        });
        results
    }
}
