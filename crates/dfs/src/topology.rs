//! Machine to rack assignment.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::location::{MachineId, RackId};

/// Rack equivalence classes of the cluster.
///
/// Machines fill racks in arrival order; a removal frees a slot which the
/// next arrival may take. Rack ids are never reused for a different group.
pub struct RackTopology {
    machines_per_rack: usize,
    racks: BTreeMap<RackId, BTreeSet<MachineId>>,
    machine_racks: HashMap<MachineId, RackId>,
}

impl RackTopology {
    pub fn new(machines_per_rack: usize) -> Self {
        assert!(machines_per_rack > 0, "machines_per_rack must be positive");
        Self {
            machines_per_rack,
            racks: BTreeMap::new(),
            machine_racks: HashMap::new(),
        }
    }

    /// Assigns a rack to a new machine and returns it.
    pub fn assign(&mut self, machine: MachineId) -> RackId {
        assert!(
            !self.machine_racks.contains_key(&machine),
            "machine {} already has a rack",
            machine
        );
        let rack = self
            .racks
            .iter()
            .find(|(_rack, machines)| machines.len() < self.machines_per_rack)
            .map(|(&rack, _machines)| rack)
            .unwrap_or_else(|| self.racks.keys().next_back().map(|&rack| rack + 1).unwrap_or(0));
        self.racks.entry(rack).or_default().insert(machine);
        self.machine_racks.insert(machine, rack);
        rack
    }

    pub fn remove(&mut self, machine: MachineId) {
        let rack = self
            .machine_racks
            .remove(&machine)
            .unwrap_or_else(|| panic!("machine {} not in topology", machine));
        self.racks.get_mut(&rack).unwrap().remove(&machine);
    }

    pub fn rack_of(&self, machine: MachineId) -> RackId {
        *self
            .machine_racks
            .get(&machine)
            .unwrap_or_else(|| panic!("machine {} not in topology", machine))
    }

    pub fn contains(&self, machine: MachineId) -> bool {
        self.machine_racks.contains_key(&machine)
    }

    pub fn machines_in_rack(&self, rack: RackId) -> Option<&BTreeSet<MachineId>> {
        self.racks.get(&rack)
    }
}
