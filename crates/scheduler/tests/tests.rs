use std::collections::VecDeque;

use rand::SeedableRng;

use locsched_dfs::{
    config::{DfsConfig, DfsPolicyKind},
    data_layer::DataLayerManager,
    dfs::ReplicaStore,
    location::{Dependency, MachineId},
    replica_placement::{BlockContext, ReplicaPlacement},
    topology::RackTopology,
    transfer::TransferModel,
};
use locsched_scheduler::{
    config::{Scenario, SchedulerConfig, SystemConfig},
    engine::PlacementEngine,
    interference::{NoInterference, TransferAwareInterference},
    job::JobState,
    resource::{machine_for_resource, ResourceId, ResourceKind, ResourceState},
    simulation::Simulation,
    task::{TaskDescriptor, TaskId, TaskState},
    trace::TraceEvent,
    workload::WorkloadConfig,
};

/// Places the blocks of consecutive files on a scripted list of machines,
/// falling back to the first candidate when the script runs dry.
struct SequencedPlacement {
    targets: VecDeque<MachineId>,
}

impl SequencedPlacement {
    fn new(targets: &[MachineId]) -> Box<Self> {
        Box::new(Self {
            targets: targets.iter().copied().collect(),
        })
    }
}

impl ReplicaPlacement for SequencedPlacement {
    fn pick_machine(
        &mut self,
        candidates: &[MachineId],
        _block: &BlockContext,
        _store: &ReplicaStore,
        _topology: &RackTopology,
    ) -> Option<MachineId> {
        match self.targets.pop_front() {
            Some(target) if candidates.contains(&target) => Some(target),
            _ => candidates.first().copied(),
        }
    }
}

fn dfs_config(block_size_bytes: u64, replication_factor: usize, machines_per_rack: usize) -> DfsConfig {
    DfsConfig {
        block_size_bytes,
        replication_factor,
        machines_per_rack,
        dfs_type: DfsPolicyKind::Uniform,
        ..DfsConfig::default()
    }
}

fn transfer_aware_engine(
    scheduler: SchedulerConfig,
    dfs: &DfsConfig,
    placement: Option<Box<dyn ReplicaPlacement>>,
) -> PlacementEngine {
    let data_layer = match placement {
        Some(placement) => DataLayerManager::with_placement(dfs, placement, 123),
        None => DataLayerManager::new(dfs, 123),
    };
    let observer = Box::new(TransferAwareInterference::new(
        TransferModel::new(dfs),
        scheduler.horizon_us(),
    ));
    PlacementEngine::new(scheduler, data_layer, observer, 123)
}

/// Adds the task's input through the data layer and returns a descriptor
/// carrying the matching dependency.
fn task_with_input(engine: &mut PlacementEngine, task_id: TaskId, avg_runtime_us: u64) -> TaskDescriptor {
    let bytes = engine
        .data_layer_mut()
        .add_files_for_task(task_id, avg_runtime_us, false, 0);
    let mut task = TaskDescriptor::new(task_id, 0, 0);
    if bytes > 0 {
        task.dependencies.push(Dependency {
            location: DataLayerManager::task_input_path(task_id),
            size_bytes: bytes,
        });
    }
    task
}

fn service_task(task_id: TaskId) -> TaskDescriptor {
    TaskDescriptor::new(task_id, 0, 0)
}

fn pu_of_machine(engine: &PlacementEngine, machine: ResourceId, index: usize) -> ResourceId {
    engine
        .resource_map()
        .values()
        .filter(|descriptor| descriptor.kind == ResourceKind::Pu && descriptor.parent == Some(machine))
        .nth(index)
        .unwrap()
        .id
}

// Average runtime of one microsecond maps to the bottom of the block count
// distribution, so tasks get exactly one block.
const TINY_AVG_US: u64 = 1;

#[test]
fn local_input_is_fetched_for_free() {
    let dfs = dfs_config(10_000_000, 4, 2);
    let mut engine = transfer_aware_engine(SchedulerConfig::default(), &dfs, None);
    let machine = engine.add_machine("machine_0", 1);

    let task = task_with_input(&mut engine, 1, TINY_AVG_US);
    engine.seed_remaining_runtime(1, 100);
    let job_id = engine.submit_job(5, "job", vec![task]);

    let (scheduled, end_times) = engine.schedule_all_jobs(5);
    assert_eq!(scheduled, 1);
    assert_eq!(end_times.len(), 1);
    assert_eq!(end_times[0].current_end_time_us, Some(105));

    let task = engine.task(1);
    assert_eq!(task.state, TaskState::Running);
    assert_eq!(task.start_time_us, Some(5));
    assert_eq!(task.finish_time_us, Some(105));
    let pu = task.scheduled_to.unwrap();
    assert_eq!(machine_for_resource(engine.resource_map(), pu), machine);
    assert_eq!(engine.resource_map()[&pu].state, ResourceState::Busy);
    assert_eq!(engine.job(job_id).state, JobState::Running);
    assert_eq!(engine.observer().locality_counts().local, 1);
    assert_eq!(engine.observer().total_transfer_us(), 0);
}

#[test]
fn placement_fails_when_no_pu_is_idle() {
    let dfs = dfs_config(10_000_000, 4, 2);
    let mut engine = transfer_aware_engine(SchedulerConfig::default(), &dfs, None);
    engine.add_machine("machine_0", 1);

    engine.seed_remaining_runtime(1, 100);
    engine.submit_job(0, "first", vec![service_task(1)]);
    let (scheduled, _) = engine.schedule_all_jobs(0);
    assert_eq!(scheduled, 1);

    engine.seed_remaining_runtime(2, 100);
    let blocked_job = engine.submit_job(1, "second", vec![service_task(2)]);
    let (scheduled, end_times) = engine.schedule_all_jobs(1);
    assert_eq!(scheduled, 0);
    assert!(end_times.is_empty());
    assert_eq!(engine.job(blocked_job).state, JobState::Pending);
    assert_eq!(engine.task(2).state, TaskState::Submitted);
    assert_eq!(engine.task(2).start_time_us, None);
}

#[test]
fn placement_prefers_machines_holding_input() {
    let dfs = dfs_config(10_000_000, 1, 2);
    // Both tasks' single blocks land on the second machine.
    let mut engine = transfer_aware_engine(
        SchedulerConfig::default(),
        &dfs,
        Some(SequencedPlacement::new(&[3, 3])),
    );
    let first = engine.add_machine("machine_0", 1);
    let second = engine.add_machine("machine_1", 1);
    assert_eq!(second, 3);

    let task = task_with_input(&mut engine, 1, TINY_AVG_US);
    engine.seed_remaining_runtime(1, 50);
    engine.submit_job(0, "job_a", vec![task]);
    let (scheduled, _) = engine.schedule_all_jobs(0);
    assert_eq!(scheduled, 1);
    let chosen = machine_for_resource(engine.resource_map(), engine.task(1).scheduled_to.unwrap());
    assert_eq!(chosen, second);

    // The data-bearing machine is busy now; the next task falls back to the
    // first idle PU in map order.
    let task = task_with_input(&mut engine, 2, TINY_AVG_US);
    engine.seed_remaining_runtime(2, 50);
    engine.submit_job(0, "job_b", vec![task]);
    let (scheduled, _) = engine.schedule_all_jobs(0);
    assert_eq!(scheduled, 1);
    let chosen = machine_for_resource(engine.resource_map(), engine.task(2).scheduled_to.unwrap());
    assert_eq!(chosen, first);
}

#[test]
fn eviction_saves_work_done_after_the_transfer() {
    // One 2500-byte block on a remote machine: 250 * 2500 / 125000 = 5 us.
    let dfs = dfs_config(2500, 1, 1);
    let mut engine = transfer_aware_engine(
        SchedulerConfig::default(),
        &dfs,
        Some(SequencedPlacement::new(&[3, 3])),
    );
    let remote = engine.add_machine("machine_0", 1);
    assert_eq!(remote, 0);
    let holder = engine.add_machine("machine_1", 1);
    assert_eq!(holder, 3);

    // Pin the data holder's PU so the task is forced to the remote machine.
    let blocker = task_with_input(&mut engine, 9, TINY_AVG_US);
    engine.seed_remaining_runtime(9, 1_000_000);
    engine.submit_job(0, "blocker", vec![blocker]);
    engine.schedule_all_jobs(0);
    assert_eq!(
        machine_for_resource(engine.resource_map(), engine.task(9).scheduled_to.unwrap()),
        holder
    );

    let task = task_with_input(&mut engine, 1, TINY_AVG_US);
    engine.seed_remaining_runtime(1, 100);
    engine.submit_job(0, "victim", vec![task]);
    let (scheduled, end_times) = engine.schedule_all_jobs(0);
    assert_eq!(scheduled, 1);
    assert_eq!(end_times[0].current_end_time_us, Some(105));
    assert_eq!(
        machine_for_resource(engine.resource_map(), engine.task(1).scheduled_to.unwrap()),
        remote
    );

    let end_times = engine.handle_task_eviction(50, 1);
    assert_eq!(end_times.len(), 1);
    assert_eq!(end_times[0].previous_end_time_us, Some(105));
    assert_eq!(end_times[0].current_end_time_us, None);
    assert_eq!(engine.observer().remaining_runtime_us(1), Some(55));
    let task = engine.task(1);
    assert_eq!(task.state, TaskState::Evicted);
    assert_eq!(task.submit_time_us, 50);
    assert_eq!(task.start_time_us, None);
    assert_eq!(task.total_run_time_us, 50);

    // Re-placement pays the transfer again on top of the saved remainder.
    let (scheduled, end_times) = engine.schedule_all_jobs(60);
    assert_eq!(scheduled, 1);
    assert_eq!(end_times[0].current_end_time_us, Some(60 + 5 + 55));
    assert_eq!(engine.task(1).total_unscheduled_time_us, 10);
}

#[test]
fn migration_repays_transfer_at_the_new_machine() {
    // Racks of two: machines 0 and 3 share rack 0, machines 5 and 8 rack 1.
    let dfs = dfs_config(5000, 1, 2);
    let mut engine = transfer_aware_engine(
        SchedulerConfig::default(),
        &dfs,
        Some(SequencedPlacement::new(&[5, 8, 5])),
    );
    engine.add_machine("machine_0", 1);
    engine.add_machine("machine_1", 1);
    engine.add_machine("machine_2", 1);
    engine.add_machine("machine_3", 1);

    // Two blockers occupy the PUs of rack 1, where the input lives.
    let blocker_a = task_with_input(&mut engine, 101, TINY_AVG_US);
    let blocker_b = task_with_input(&mut engine, 102, TINY_AVG_US);
    engine.seed_remaining_runtime(101, 1_000_000);
    engine.seed_remaining_runtime(102, 1_000_000);
    engine.submit_job(0, "blockers", vec![blocker_a, blocker_b]);
    engine.schedule_all_jobs(0);

    // The task's block is on machine 5 (remote from machine 0):
    // old transfer = 250 * 5000 / 125000 = 10 us.
    let task = task_with_input(&mut engine, 1, TINY_AVG_US);
    engine.seed_remaining_runtime(1, 100);
    engine.submit_job(0, "migrant", vec![task]);
    let (scheduled, _) = engine.schedule_all_jobs(0);
    assert_eq!(scheduled, 1);
    assert_eq!(machine_for_resource(engine.resource_map(), engine.task(1).scheduled_to.unwrap()), 0);
    assert_eq!(engine.task(1).finish_time_us, Some(110));

    // Free the PU of machine 8 (same rack as the data) and migrate there:
    // new transfer = 100 * 5000 / 125000 = 4 us.
    engine.handle_task_completion(35, 102);
    let target_pu = pu_of_machine(&engine, 8, 0);
    engine.handle_task_migration(40, 1, target_pu);

    assert_eq!(engine.observer().remaining_runtime_us(1), Some(70));
    let task = engine.task(1);
    assert_eq!(task.finish_time_us, Some(40 + 4 + 70));
    assert_eq!(task.submit_time_us, 40);
    assert_eq!(task.start_time_us, Some(40));
    assert_eq!(task.scheduled_to, Some(target_pu));
    assert_eq!(engine.resource_map()[&target_pu].state, ResourceState::Busy);
}

#[test]
fn random_mode_places_on_any_idle_pu() {
    let dfs = dfs_config(10_000_000, 4, 2);
    let scheduler = SchedulerConfig {
        randomly_place_tasks: true,
        ..SchedulerConfig::default()
    };
    let mut engine = transfer_aware_engine(scheduler, &dfs, None);
    engine.add_machine("machine_0", 2);
    engine.add_machine("machine_1", 2);

    let tasks = (1..=4).map(service_task).collect();
    engine.submit_job(0, "job", tasks);
    let (scheduled, _) = engine.schedule_all_jobs(0);
    assert_eq!(scheduled, 4);
    for task_id in 1..=4 {
        let pu = engine.task(task_id).scheduled_to.unwrap();
        assert_eq!(engine.resource_map()[&pu].kind, ResourceKind::Pu);
    }
}

#[test]
fn data_on_vanished_machines_is_ignored() {
    let dfs = dfs_config(10_000_000, 1, 2);
    let mut engine = transfer_aware_engine(
        SchedulerConfig::default(),
        &dfs,
        Some(SequencedPlacement::new(&[777])),
    );
    let machine = engine.add_machine("machine_0", 1);
    // A machine the data layer knows but the resource map does not.
    engine.data_layer_mut().add_machine("ghost", 777);

    let task = task_with_input(&mut engine, 1, TINY_AVG_US);
    engine.seed_remaining_runtime(1, 100);
    engine.submit_job(0, "job", vec![task]);
    let (data_on_machines, _) = engine.cluster_data_stats(engine.task(1));
    assert!(data_on_machines.contains_key(&777));

    let (scheduled, _) = engine.schedule_all_jobs(0);
    assert_eq!(scheduled, 1);
    assert_eq!(
        machine_for_resource(engine.resource_map(), engine.task(1).scheduled_to.unwrap()),
        machine
    );
}

#[test]
fn unknown_runtime_finishes_past_the_horizon() {
    let dfs = dfs_config(10_000_000, 4, 2);
    let scheduler = SchedulerConfig::default();
    let horizon = scheduler.horizon_us();
    let mut engine = transfer_aware_engine(scheduler, &dfs, None);
    engine.add_machine("machine_0", 1);

    engine.submit_job(0, "job", vec![service_task(1)]);
    let (_, end_times) = engine.schedule_all_jobs(0);
    assert_eq!(end_times[0].current_end_time_us, Some(horizon + 1));
    assert_eq!(engine.task(1).finish_time_us, Some(horizon + 1));
}

#[test]
fn completing_the_last_task_completes_the_job() {
    let dfs = dfs_config(10_000_000, 4, 2);
    let mut engine = transfer_aware_engine(SchedulerConfig::default(), &dfs, None);
    engine.add_machine("machine_0", 2);

    engine.seed_remaining_runtime(1, 100);
    engine.seed_remaining_runtime(2, 200);
    let job_id = engine.submit_job(0, "job", vec![service_task(1), service_task(2)]);
    engine.schedule_all_jobs(0);

    engine.handle_task_completion(100, 1);
    assert_eq!(engine.job(job_id).state, JobState::Running);
    engine.handle_task_completion(200, 2);
    assert_eq!(engine.job(job_id).state, JobState::Completed);
    assert_eq!(engine.task(1).total_run_time_us, 100);
    assert_eq!(engine.task(2).total_run_time_us, 200);
    assert!(engine
        .trace()
        .events
        .iter()
        .any(|event| matches!(event, TraceEvent::JobCompleted { job_id: id, .. } if *id == job_id)));
    for descriptor in engine.resource_map().values() {
        if descriptor.kind == ResourceKind::Pu {
            assert_eq!(descriptor.state, ResourceState::Idle);
        }
    }
}

#[test]
fn failure_requeues_without_crediting_work() {
    let dfs = dfs_config(10_000_000, 4, 2);
    let mut engine = transfer_aware_engine(SchedulerConfig::default(), &dfs, None);
    engine.add_machine("machine_0", 1);

    engine.seed_remaining_runtime(1, 100);
    engine.submit_job(0, "job", vec![service_task(1)]);
    engine.schedule_all_jobs(0);

    engine.handle_task_failure(40, 1);
    assert_eq!(engine.task(1).state, TaskState::Submitted);
    assert_eq!(engine.task(1).submit_time_us, 40);
    assert_eq!(engine.observer().remaining_runtime_us(1), Some(100));

    let (scheduled, end_times) = engine.schedule_all_jobs(50);
    assert_eq!(scheduled, 1);
    assert_eq!(end_times[0].current_end_time_us, Some(150));
}

#[test]
fn shared_pus_release_only_the_finished_task() {
    let dfs = dfs_config(10_000_000, 4, 2);
    let scheduler = SchedulerConfig {
        allow_pu_sharing: true,
        ..SchedulerConfig::default()
    };
    let mut engine = transfer_aware_engine(scheduler, &dfs, None);
    engine.add_machine("machine_0", 2);

    engine.seed_remaining_runtime(1, 100);
    engine.seed_remaining_runtime(2, 200);
    engine.submit_job(0, "job", vec![service_task(1), service_task(2)]);
    engine.schedule_all_jobs(0);

    // Double up both tasks on the same PU.
    let shared_pu = engine.task(1).scheduled_to.unwrap();
    engine.handle_task_migration(10, 2, shared_pu);
    assert_eq!(engine.resource_map()[&shared_pu].current_running_tasks.len(), 2);

    engine.handle_task_completion(100, 1);
    let descriptor = &engine.resource_map()[&shared_pu];
    assert_eq!(descriptor.current_running_tasks, vec![2]);
    assert_eq!(descriptor.state, ResourceState::Busy);
}

#[test]
fn transfer_free_observer_skips_the_fetch_delay() {
    let dfs = dfs_config(2500, 1, 1);
    let scheduler = SchedulerConfig::default();
    let data_layer = DataLayerManager::with_placement(&dfs, SequencedPlacement::new(&[777]), 123);
    let observer = Box::new(NoInterference::new(scheduler.horizon_us()));
    let mut engine = PlacementEngine::new(scheduler, data_layer, observer, 123);
    engine.add_machine("machine_0", 1);
    // The input lives on a machine outside the resource map, so the task is
    // placed remote from its data; a transfer-aware observer would charge
    // 250 * 2500 / 125000 = 5 us here.
    engine.data_layer_mut().add_machine("ghost", 777);

    let task = task_with_input(&mut engine, 1, TINY_AVG_US);
    engine.seed_remaining_runtime(1, 100);
    engine.submit_job(0, "job", vec![task]);
    let (_, end_times) = engine.schedule_all_jobs(0);
    assert_eq!(end_times[0].current_end_time_us, Some(100));
    assert_eq!(engine.observer().total_transfer_us(), 0);
}

#[test]
fn simulation_drains_a_small_cluster() {
    let scenario = Scenario {
        system: SystemConfig {
            machines: 4,
            pus_per_machine: 2,
        },
        dfs: dfs_config(1_000_000, 4, 2),
        scheduler: SchedulerConfig::default(),
        workload: WorkloadConfig {
            jobs: 3,
            tasks_per_job: 4,
            mean_runtime_us: 60_000_000,
            runtime_jitter: 0.5,
            service_fraction: 0.0,
            max_machine_spread: 0,
        },
        seed: 7,
    };
    let stats = Simulation::new(scenario, None).run();
    assert_eq!(stats.total_tasks, 12);
    assert_eq!(stats.completed_tasks, 12);
    assert_eq!(stats.scheduled_task_count, 12);
    assert!(stats.makespan_us > 0);
    let locality = stats.locality;
    assert_eq!(locality.local + locality.rack_local + locality.remote, 12);
}

#[test]
fn workload_generation_wires_dependencies() {
    let dfs = dfs_config(1_000_000, 2, 2);
    let mut engine = transfer_aware_engine(SchedulerConfig::default(), &dfs, None);
    engine.add_machine("machine_0", 1);
    engine.add_machine("machine_1", 1);

    let config = WorkloadConfig {
        jobs: 2,
        tasks_per_job: 3,
        mean_runtime_us: 60_000_000,
        runtime_jitter: 0.0,
        service_fraction: 0.0,
        max_machine_spread: 0,
    };
    let mut rng = rand_pcg::Pcg64::seed_from_u64(1);
    locsched_scheduler::workload::generate(&mut engine, &config, 0, &mut rng);

    assert_eq!(engine.task_map().len(), 6);
    assert_eq!(engine.job_map().len(), 2);
    for task in engine.task_map().values() {
        assert_eq!(task.dependencies.len(), 1);
        let dependency = &task.dependencies[0];
        assert_eq!(engine.data_layer().get_file_size(&dependency.location), dependency.size_bytes);
        assert!(engine.observer().remaining_runtime_us(task.id).is_some());
    }
}
