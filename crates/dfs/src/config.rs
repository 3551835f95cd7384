//! Data-layer configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Replica-placement policy of the simulated DFS.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DfsPolicyKind {
    /// Replicas land on machines drawn uniformly without replacement.
    Uniform,
    /// Uniform, but no machine holds more than
    /// [blocks_per_machine](DfsConfig::blocks_per_machine) blocks.
    Bounded,
    /// First replica on the writer, second in a different rack, third in the
    /// second's rack.
    Hdfs,
    /// Some machines are preferentially chosen to create hotspots.
    Skewed,
}

#[derive(Debug, Error)]
#[error("unknown DFS type: {0}, expected one of uniform | bounded | hdfs | skewed")]
pub struct UnknownDfsPolicy(String);

impl FromStr for DfsPolicyKind {
    type Err = UnknownDfsPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(DfsPolicyKind::Uniform),
            "bounded" => Ok(DfsPolicyKind::Bounded),
            "hdfs" => Ok(DfsPolicyKind::Hdfs),
            "skewed" => Ok(DfsPolicyKind::Skewed),
            _ => Err(UnknownDfsPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for DfsPolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DfsPolicyKind::Uniform => "uniform",
            DfsPolicyKind::Bounded => "bounded",
            DfsPolicyKind::Hdfs => "hdfs",
            DfsPolicyKind::Skewed => "skewed",
        };
        write!(f, "{}", name)
    }
}

/// Configuration of the simulated data layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DfsConfig {
    /// Size of a DFS block in bytes.
    pub block_size_bytes: u64,
    /// Number of blocks each machine stores, used by the bounded policy.
    /// Defaults to 12288, i.e. 6 TB for 512 MB blocks.
    pub blocks_per_machine: u64,
    /// The number of times each block is replicated.
    pub replication_factor: usize,
    /// Replica-placement policy.
    pub dfs_type: DfsPolicyKind,
    /// Number of machines per rack equivalence class.
    pub machines_per_rack: usize,
    /// Time in microseconds to transfer 1 Mbit from a remote rack.
    pub remote_transfer_us_per_mbit: u64,
    /// Time in microseconds to transfer 1 Mbit from another machine in the
    /// same rack.
    pub rack_transfer_us_per_mbit: u64,
    /// Factor parameter of the runtime power-law distribution.
    pub runtime_factor: f64,
    /// Power parameter of the runtime power-law distribution.
    pub runtime_power: f64,
}

impl Default for DfsConfig {
    fn default() -> Self {
        Self {
            block_size_bytes: 536870912,
            blocks_per_machine: 12288,
            replication_factor: 4,
            dfs_type: DfsPolicyKind::Bounded,
            machines_per_rack: 40,
            remote_transfer_us_per_mbit: 250,
            rack_transfer_us_per_mbit: 100,
            runtime_factor: 0.298,
            runtime_power: -0.2627,
        }
    }
}
