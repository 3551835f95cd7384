//! Scheduler and scenario configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use locsched_dfs::config::DfsConfig;

use crate::workload::WorkloadConfig;

/// Configuration of the placement engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Replace locality-aware placement with random sampling.
    pub randomly_place_tasks: bool,
    /// Simulated time horizon in microseconds.
    pub runtime_us: u64,
    /// Scale factor applied to the horizon.
    pub trace_speed_up: f64,
    /// Whether a PU may host several tasks at once. When disabled,
    /// completion, eviction and failure clear every task recorded on the PU.
    pub allow_pu_sharing: bool,
    /// Charge placements, migrations and evictions the estimated input
    /// transfer time. When disabled a null observer is used and tasks run
    /// for exactly their remaining runtime.
    pub model_transfers: bool,
}

impl SchedulerConfig {
    /// End of the simulated time range; tasks with unknown runtimes finish
    /// one microsecond past it.
    pub fn horizon_us(&self) -> u64 {
        (self.runtime_us as f64 / self.trace_speed_up) as u64
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            randomly_place_tasks: false,
            runtime_us: 3_600_000_000,
            trace_speed_up: 1.0,
            allow_pu_sharing: false,
            model_transfers: true,
        }
    }
}

/// Shape of the simulated cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Number of machines.
    pub machines: usize,
    /// Number of PUs each machine exposes.
    pub pus_per_machine: usize,
}

/// A full simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub system: SystemConfig,
    #[serde(default)]
    pub dfs: DfsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub workload: WorkloadConfig,
    #[serde(default)]
    pub seed: u64,
}

impl Scenario {
    pub fn from_yaml<P: AsRef<Path>>(file: P) -> Self {
        serde_yaml::from_str(
            &std::fs::read_to_string(&file).unwrap_or_else(|_| panic!("Can't read file {}", file.as_ref().display())),
        )
        .unwrap_or_else(|e| panic!("Can't parse YAML from file {}: {e:?}", file.as_ref().display()))
    }
}
