//! Resource tree of the cluster: racks, machines and processing units.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use locsched_dfs::location::TaskId;

pub type ResourceId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Rack aggregator grouping machines with cheap local bandwidth.
    Rack,
    /// Machine exposing one or more processing units.
    Machine,
    /// Finest-grained schedulable resource.
    Pu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    Idle,
    Busy,
    Failed,
}

#[derive(Clone, Debug)]
pub struct ResourceDescriptor {
    pub id: ResourceId,
    pub kind: ResourceKind,
    pub state: ResourceState,
    pub parent: Option<ResourceId>,
    /// Hostname bound in the data layer; machines only.
    pub hostname: Option<String>,
    pub current_running_tasks: Vec<TaskId>,
}

impl ResourceDescriptor {
    pub fn new(id: ResourceId, kind: ResourceKind, parent: Option<ResourceId>) -> Self {
        Self {
            id,
            kind,
            state: ResourceState::Idle,
            parent,
            hostname: None,
            current_running_tasks: Vec::new(),
        }
    }
}

/// Machine ancestor of a resource. Every PU has exactly one; a broken tree is
/// a fatal inconsistency.
pub fn machine_for_resource(resource_map: &BTreeMap<ResourceId, ResourceDescriptor>, id: ResourceId) -> ResourceId {
    let mut current = id;
    loop {
        let descriptor = resource_map
            .get(&current)
            .unwrap_or_else(|| panic!("resource {} not in resource map", current));
        if descriptor.kind == ResourceKind::Machine {
            return current;
        }
        current = descriptor
            .parent
            .unwrap_or_else(|| panic!("resource {} has no machine ancestor", id));
    }
}
