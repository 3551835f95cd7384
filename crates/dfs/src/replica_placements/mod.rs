pub mod bounded;
pub mod hdfs;
pub mod skewed;
pub mod uniform;

use crate::config::{DfsConfig, DfsPolicyKind};
use crate::replica_placement::ReplicaPlacement;

use self::{
    bounded::BoundedPlacement, hdfs::HdfsPlacement, skewed::SkewedPlacement, uniform::UniformPlacement,
};

pub fn build_placement(config: &DfsConfig, seed: u64) -> Box<dyn ReplicaPlacement> {
    match config.dfs_type {
        DfsPolicyKind::Uniform => Box::new(UniformPlacement::new(seed)),
        DfsPolicyKind::Bounded => Box::new(BoundedPlacement::new(config.blocks_per_machine, seed)),
        DfsPolicyKind::Hdfs => Box::new(HdfsPlacement::new(seed)),
        DfsPolicyKind::Skewed => Box::new(SkewedPlacement::new(seed)),
    }
}
