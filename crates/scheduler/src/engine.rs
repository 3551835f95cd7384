use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use locsched_dfs::{
    data_layer::DataLayerManager,
    location::{MachineId, RackId},
};

use crate::{
    config::SchedulerConfig,
    interference::{TaskEndRuntime, TaskLifecycleObserver},
    job::{JobDescriptor, JobId, JobState},
    resource::{machine_for_resource, ResourceDescriptor, ResourceId, ResourceKind, ResourceState},
    task::{TaskDescriptor, TaskId, TaskState},
    trace::{Trace, TraceEvent},
};

const MAX_RANDOM_PLACEMENT_ATTEMPTS: u64 = 2000;

/// Centralized scheduler: owns the resource, task and job maps, the data
/// layer and the lifecycle observer, and places runnable tasks on idle PUs,
/// preferring machines that already hold the task's input.
///
/// All mutation goes through `&mut self`; callers that share the engine
/// between a trace player and lifecycle notifications wrap it in a mutex,
/// which serializes rounds and callbacks.
pub struct PlacementEngine {
    config: SchedulerConfig,
    data_layer: DataLayerManager,
    observer: Box<dyn TaskLifecycleObserver>,
    resource_map: BTreeMap<ResourceId, ResourceDescriptor>,
    task_map: BTreeMap<TaskId, TaskDescriptor>,
    job_map: BTreeMap<JobId, JobDescriptor>,
    jobs_to_schedule: BTreeSet<JobId>,
    runnable_tasks: HashMap<JobId, BTreeSet<TaskId>>,
    machine_pus: BTreeMap<ResourceId, Vec<ResourceId>>,
    rack_resources: HashMap<RackId, ResourceId>,
    machine_by_hostname: HashMap<String, ResourceId>,
    next_resource_id: ResourceId,
    next_job_id: JobId,
    trace: Trace,
    rng: Pcg64,
}

impl PlacementEngine {
    pub fn new(
        config: SchedulerConfig,
        data_layer: DataLayerManager,
        observer: Box<dyn TaskLifecycleObserver>,
        seed: u64,
    ) -> Self {
        Self {
            config,
            data_layer,
            observer,
            resource_map: BTreeMap::new(),
            task_map: BTreeMap::new(),
            job_map: BTreeMap::new(),
            jobs_to_schedule: BTreeSet::new(),
            runnable_tasks: HashMap::new(),
            machine_pus: BTreeMap::new(),
            rack_resources: HashMap::new(),
            machine_by_hostname: HashMap::new(),
            next_resource_id: 0,
            next_job_id: 0,
            trace: Trace::new(),
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Adds a machine with `pu_count` PUs, binds it in the data layer and
    /// creates its rack resource if this is the rack's first machine.
    pub fn add_machine(&mut self, hostname: &str, pu_count: usize) -> ResourceId {
        assert!(pu_count > 0, "machine must expose at least one PU");
        let machine_id = self.alloc_resource_id();
        let rack_ec = self.data_layer.add_machine(hostname, machine_id);
        let rack_resource = match self.rack_resources.get(&rack_ec) {
            Some(&id) => id,
            None => {
                let id = self.alloc_resource_id();
                self.resource_map
                    .insert(id, ResourceDescriptor::new(id, ResourceKind::Rack, None));
                self.rack_resources.insert(rack_ec, id);
                id
            }
        };
        let mut machine = ResourceDescriptor::new(machine_id, ResourceKind::Machine, Some(rack_resource));
        machine.hostname = Some(hostname.to_string());
        self.resource_map.insert(machine_id, machine);
        self.machine_by_hostname.insert(hostname.to_string(), machine_id);
        let mut pus = Vec::with_capacity(pu_count);
        for _ in 0..pu_count {
            let pu_id = self.alloc_resource_id();
            self.resource_map
                .insert(pu_id, ResourceDescriptor::new(pu_id, ResourceKind::Pu, Some(machine_id)));
            pus.push(pu_id);
        }
        self.machine_pus.insert(machine_id, pus);
        info!(
            "machine {} ({}) joined with {} PUs in rack {}",
            machine_id, hostname, pu_count, rack_ec
        );
        machine_id
    }

    /// Removes a machine: evicts whatever still runs on its PUs, drops the
    /// resources and lets the data layer re-replicate the machine's blocks.
    /// Returns the end-time changes of the evicted tasks.
    pub fn remove_machine(&mut self, now_us: u64, hostname: &str) -> Vec<TaskEndRuntime> {
        let machine_id = self
            .machine_by_hostname
            .remove(hostname)
            .unwrap_or_else(|| panic!("hostname {} not bound to a machine", hostname));
        let pus = self.machine_pus.remove(&machine_id).unwrap();
        let mut end_times = Vec::new();
        for &pu in &pus {
            let running = self.resource_map[&pu].current_running_tasks.clone();
            for task_id in running {
                end_times.extend(self.handle_task_eviction(now_us, task_id));
            }
        }
        for &pu in &pus {
            self.resource_map.remove(&pu);
        }
        self.resource_map.remove(&machine_id);
        self.data_layer.remove_machine(hostname);
        info!("machine {} ({}) removed", machine_id, hostname);
        end_times
    }

    /// Registers a job and its tasks; every task enters the runnable set.
    pub fn submit_job(&mut self, now_us: u64, name: &str, mut tasks: Vec<TaskDescriptor>) -> JobId {
        let job_id = self.next_job_id;
        self.next_job_id += 1;
        let mut job = JobDescriptor::new(job_id, name);
        let runnable = self.runnable_tasks.entry(job_id).or_default();
        for task in &mut tasks {
            task.job_id = job_id;
            task.submit_time_us = now_us;
            assert!(
                !self.task_map.contains_key(&task.id),
                "task {} already submitted",
                task.id
            );
            job.tasks.push(task.id);
            runnable.insert(task.id);
            self.trace.log(TraceEvent::TaskSubmitted {
                time_us: now_us,
                job_id,
                task_id: task.id,
            });
        }
        for task in tasks {
            self.task_map.insert(task.id, task);
        }
        self.job_map.insert(job_id, job);
        self.jobs_to_schedule.insert(job_id);
        job_id
    }

    /// Runs one scheduling round over every job with runnable tasks, in job
    /// submission order. Returns the number of placed tasks and the end-time
    /// events the placements produced.
    pub fn schedule_all_jobs(&mut self, now_us: u64) -> (u64, Vec<TaskEndRuntime>) {
        let jobs = self.jobs_to_schedule.iter().copied().collect::<Vec<_>>();
        self.schedule_jobs(now_us, &jobs)
    }

    pub fn schedule_jobs(&mut self, now_us: u64, jobs: &[JobId]) -> (u64, Vec<TaskEndRuntime>) {
        let mut end_times = Vec::new();
        let mut scheduled = 0;
        for &job_id in jobs {
            scheduled += self.schedule_job(now_us, job_id, &mut end_times);
        }
        (scheduled, end_times)
    }

    pub fn schedule_job(&mut self, now_us: u64, job_id: JobId, end_times: &mut Vec<TaskEndRuntime>) -> u64 {
        debug!("preparing to schedule job {}", job_id);
        let runnable = self
            .runnable_tasks
            .get(&job_id)
            .map(|tasks| tasks.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default();
        let mut scheduled = 0;
        for task_id in runnable {
            let best_resource = if self.config.randomly_place_tasks {
                self.find_random_resource_for_task(task_id)
            } else {
                self.find_resource_for_task(task_id)
            };
            match best_resource {
                Some(pu) => {
                    self.commit_placement(now_us, job_id, task_id, pu, end_times);
                    scheduled += 1;
                }
                None => {
                    debug!("no suitable resource found for task {}, will need to try again", task_id);
                }
            }
        }
        if scheduled > 0 {
            self.job_map.get_mut(&job_id).unwrap().state = JobState::Running;
        }
        if self
            .runnable_tasks
            .get(&job_id)
            .map(|tasks| tasks.is_empty())
            .unwrap_or(true)
        {
            self.jobs_to_schedule.remove(&job_id);
        }
        scheduled
    }

    /// Bytes of the task's input found on every machine and in every rack.
    pub fn cluster_data_stats(&self, task: &TaskDescriptor) -> (HashMap<MachineId, u64>, HashMap<RackId, u64>) {
        let mut data_on_machines: HashMap<MachineId, u64> = HashMap::new();
        let mut data_on_racks: HashMap<RackId, u64> = HashMap::new();
        for dependency in &task.dependencies {
            for location in self.data_layer.get_file_locations(&dependency.location) {
                *data_on_machines.entry(location.machine).or_default() += location.size_bytes;
                *data_on_racks.entry(location.rack).or_default() += location.size_bytes;
            }
        }
        (data_on_machines, data_on_racks)
    }

    // Machines are ranked by descending bytes of the task's input; the first
    // idle PU under them wins. With no data-bearing machine available the
    // whole resource map is scanned in map order.
    fn find_resource_for_task(&self, task_id: TaskId) -> Option<ResourceId> {
        let task = &self.task_map[&task_id];
        debug!("trying to place task {}", task_id);
        let (data_on_machines, _data_on_racks) = self.cluster_data_stats(task);
        let mut machines = data_on_machines
            .into_iter()
            .map(|(machine, bytes)| (bytes, machine))
            .collect::<Vec<_>>();
        machines.sort_by_key(|&(bytes, machine)| (Reverse(bytes), machine));
        for (_bytes, machine) in machines {
            // The data layer may still hold blocks of a machine that already
            // left the resource map.
            let Some(descriptor) = self.resource_map.get(&machine) else {
                continue;
            };
            assert_eq!(
                descriptor.kind,
                ResourceKind::Machine,
                "data location {} is not a machine resource",
                machine
            );
            let Some(pus) = self.machine_pus.get(&machine) else {
                continue;
            };
            for &pu in pus {
                if self.resource_map[&pu].state == ResourceState::Idle {
                    return Some(pu);
                }
            }
        }
        for (&id, descriptor) in self.resource_map.iter() {
            if descriptor.kind == ResourceKind::Pu && descriptor.state == ResourceState::Idle {
                return Some(id);
            }
        }
        None
    }

    fn find_random_resource_for_task(&mut self, task_id: TaskId) -> Option<ResourceId> {
        debug!("trying to place task {} randomly", task_id);
        if self.resource_map.is_empty() {
            return None;
        }
        let resources = self.resource_map.keys().copied().collect::<Vec<_>>();
        for _ in 0..MAX_RANDOM_PLACEMENT_ATTEMPTS {
            let id = resources[self.rng.gen_range(0..resources.len())];
            let descriptor = &self.resource_map[&id];
            if descriptor.kind == ResourceKind::Pu && descriptor.state == ResourceState::Idle {
                return Some(id);
            }
        }
        None
    }

    fn commit_placement(
        &mut self,
        now_us: u64,
        job_id: JobId,
        task_id: TaskId,
        pu: ResourceId,
        end_times: &mut Vec<TaskEndRuntime>,
    ) {
        if let Some(tasks) = self.runnable_tasks.get_mut(&job_id) {
            tasks.remove(&task_id);
        }
        let machine = machine_for_resource(&self.resource_map, pu);
        {
            let descriptor = self.resource_map.get_mut(&pu).unwrap();
            assert_eq!(descriptor.kind, ResourceKind::Pu, "placement target {} is not a PU", pu);
            descriptor.state = ResourceState::Busy;
            descriptor.current_running_tasks.push(task_id);
        }
        let task = self.task_map.get_mut(&task_id).unwrap();
        task.scheduled_to = Some(pu);
        task.state = TaskState::Running;
        self.observer
            .on_task_placement(now_us, task, machine, &self.data_layer, end_times);
        debug!("scheduling task {} on resource {}", task_id, pu);
        self.trace.log(TraceEvent::TaskPlaced {
            time_us: now_us,
            job_id,
            task_id,
            resource: pu,
        });
    }

    pub fn handle_task_completion(&mut self, now_us: u64, task_id: TaskId) -> Vec<TaskEndRuntime> {
        let (job_id, pu) = self.scheduled_resource_of(task_id, "completion");
        let machine = machine_for_resource(&self.resource_map, pu);
        self.release_pu(pu, task_id);
        let mut end_times = Vec::new();
        let task = self.task_map.get_mut(&task_id).unwrap();
        self.observer
            .on_task_completion(now_us, task, machine, &self.data_layer, &mut end_times);
        task.state = TaskState::Completed;
        task.scheduled_to = None;
        self.data_layer.remove_files_for_task(task_id);
        self.trace.log(TraceEvent::TaskCompleted {
            time_us: now_us,
            job_id,
            task_id,
        });
        let job = self.job_map.get_mut(&job_id).unwrap();
        if job.tasks.iter().all(|t| self.task_map[t].state == TaskState::Completed) {
            job.state = JobState::Completed;
            self.trace.log(TraceEvent::JobCompleted {
                time_us: now_us,
                job_id,
            });
        }
        end_times
    }

    pub fn handle_task_eviction(&mut self, now_us: u64, task_id: TaskId) -> Vec<TaskEndRuntime> {
        let (job_id, pu) = self.scheduled_resource_of(task_id, "eviction");
        let machine = machine_for_resource(&self.resource_map, pu);
        self.release_pu(pu, task_id);
        let mut end_times = Vec::new();
        let task = self.task_map.get_mut(&task_id).unwrap();
        self.observer
            .on_task_eviction(now_us, task, machine, &self.data_layer, &mut end_times);
        task.state = TaskState::Evicted;
        task.scheduled_to = None;
        task.finish_time_us = None;
        self.runnable_tasks.entry(job_id).or_default().insert(task_id);
        self.jobs_to_schedule.insert(job_id);
        self.trace.log(TraceEvent::TaskEvicted {
            time_us: now_us,
            job_id,
            task_id,
        });
        self.trace.log(TraceEvent::TaskSubmitted {
            time_us: now_us,
            job_id,
            task_id,
        });
        end_times
    }

    /// A failure loses the task's progress: it re-enters the runnable set
    /// with its remaining runtime untouched.
    pub fn handle_task_failure(&mut self, now_us: u64, task_id: TaskId) {
        warn!("task {} failed on its resource", task_id);
        let (job_id, pu) = self.scheduled_resource_of(task_id, "failure");
        self.release_pu(pu, task_id);
        let task = self.task_map.get_mut(&task_id).unwrap();
        task.state = TaskState::Submitted;
        task.scheduled_to = None;
        task.start_time_us = None;
        task.finish_time_us = None;
        task.submit_time_us = now_us;
        self.runnable_tasks.entry(job_id).or_default().insert(task_id);
        self.jobs_to_schedule.insert(job_id);
        self.trace.log(TraceEvent::TaskFailed {
            time_us: now_us,
            job_id,
            task_id,
        });
        self.trace.log(TraceEvent::TaskSubmitted {
            time_us: now_us,
            job_id,
            task_id,
        });
    }

    /// Moves a running task to another PU; the input transfer is paid again
    /// at the new machine.
    pub fn handle_task_migration(&mut self, now_us: u64, task_id: TaskId, new_pu: ResourceId) -> Vec<TaskEndRuntime> {
        let (job_id, old_pu) = self.scheduled_resource_of(task_id, "migration");
        let old_machine = machine_for_resource(&self.resource_map, old_pu);
        let new_machine = machine_for_resource(&self.resource_map, new_pu);
        self.release_pu(old_pu, task_id);
        {
            let descriptor = self
                .resource_map
                .get_mut(&new_pu)
                .unwrap_or_else(|| panic!("migration target {} not in resource map", new_pu));
            assert_eq!(descriptor.kind, ResourceKind::Pu, "migration target {} is not a PU", new_pu);
            descriptor.state = ResourceState::Busy;
            descriptor.current_running_tasks.push(task_id);
        }
        let mut end_times = Vec::new();
        let task = self.task_map.get_mut(&task_id).unwrap();
        task.scheduled_to = Some(new_pu);
        self.observer
            .on_task_migration(now_us, task, old_machine, new_machine, &self.data_layer, &mut end_times);
        self.trace.log(TraceEvent::TaskMigrated {
            time_us: now_us,
            job_id,
            task_id,
            from: old_pu,
            to: new_pu,
        });
        end_times
    }

    pub fn seed_remaining_runtime(&mut self, task_id: TaskId, runtime_us: u64) {
        self.observer.seed_remaining_runtime(task_id, runtime_us);
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn data_layer(&self) -> &DataLayerManager {
        &self.data_layer
    }

    pub fn data_layer_mut(&mut self) -> &mut DataLayerManager {
        &mut self.data_layer
    }

    pub fn observer(&self) -> &dyn TaskLifecycleObserver {
        self.observer.as_ref()
    }

    pub fn resource_map(&self) -> &BTreeMap<ResourceId, ResourceDescriptor> {
        &self.resource_map
    }

    pub fn task_map(&self) -> &BTreeMap<TaskId, TaskDescriptor> {
        &self.task_map
    }

    pub fn job_map(&self) -> &BTreeMap<JobId, JobDescriptor> {
        &self.job_map
    }

    pub fn task(&self, task_id: TaskId) -> &TaskDescriptor {
        self.task_map
            .get(&task_id)
            .unwrap_or_else(|| panic!("task {} not in task map", task_id))
    }

    pub fn job(&self, job_id: JobId) -> &JobDescriptor {
        self.job_map
            .get(&job_id)
            .unwrap_or_else(|| panic!("job {} not in job map", job_id))
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    fn alloc_resource_id(&mut self) -> ResourceId {
        let id = self.next_resource_id;
        self.next_resource_id += 1;
        id
    }

    fn scheduled_resource_of(&self, task_id: TaskId, event: &str) -> (JobId, ResourceId) {
        let task = self
            .task_map
            .get(&task_id)
            .unwrap_or_else(|| panic!("{} for unknown task {}", event, task_id));
        let pu = task
            .scheduled_to
            .unwrap_or_else(|| panic!("{} for task {} which is not placed", event, task_id));
        (task.job_id, pu)
    }

    fn release_pu(&mut self, pu: ResourceId, task_id: TaskId) {
        let descriptor = self
            .resource_map
            .get_mut(&pu)
            .unwrap_or_else(|| panic!("scheduled resource {} not in resource map", pu));
        if self.config.allow_pu_sharing {
            descriptor.current_running_tasks.retain(|&t| t != task_id);
        } else {
            descriptor.current_running_tasks.clear();
        }
        if descriptor.current_running_tasks.is_empty() {
            descriptor.state = ResourceState::Idle;
        }
    }
}
