
use crate::movement::canonical_key;
use crate::topology::StaticTopology;
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// The value reported for a movement whose detector is not working.
pub const FAULT_SENTINEL: f32 = -1.0;

/// The set of movement detectors currently considered broken.
///
/// The mask is an overlay applied whenever readings are read out, so it also
/// blanks readings that were recorded before the fault was set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SensorFaultMask {
    faulted: BTreeSet<String>,
}

impl SensorFaultMask {
    /// Creates a mask with no faults.
    pub fn new() -> Self {
        Default::default()
    }

    /// Replaces the fault state with a single faulted movement,
    /// or clears every fault when `None` is given.
    /// Keys which are not part of the junction are kept but have no effect.
    pub fn set_fault(&mut self, movement: Option<&str>) {
        self.faulted.clear();
        if let Some(movement) = movement.filter(|m| !m.is_empty()) {
            self.faulted.insert(canonical_key(movement));
        }
    }

    /// Marks an additional movement as faulted. Returns `false` if it already was.
    pub fn add_fault(&mut self, movement: &str) -> bool {
        self.faulted.insert(canonical_key(movement))
    }

    /// Marks a movement as healthy. Returns `false` if it was not faulted.
    pub fn clear_fault(&mut self, movement: &str) -> bool {
        self.faulted.remove(&canonical_key(movement))
    }

    /// Clears every fault.
    pub fn clear(&mut self) {
        self.faulted.clear();
    }

    /// Whether the detector of the movement is faulted.
    pub fn is_faulted(&self, movement: &str) -> bool {
        self.faulted.contains(&canonical_key(movement))
    }

    /// Whether no detector is faulted.
    pub fn is_empty(&self) -> bool {
        self.faulted.is_empty()
    }

    /// Iterates over the faulted movement keys.
    pub fn faulted(&self) -> impl Iterator<Item = &str> + '_ {
        self.faulted.iter().map(String::as_str)
    }

    /// Returns a copy of the readings with faulted movements set to [FAULT_SENTINEL].
    pub fn apply(&self, readings: &[(String, f32)]) -> Vec<(String, f32)> {
        readings
            .iter()
            .map(|(key, value)| {
                let value = if self.is_faulted(key) {
                    FAULT_SENTINEL
                } else {
                    *value
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// The vector indices of the faulted movements that exist in the topology.
    pub fn columns(&self, topology: &StaticTopology) -> SmallVec<[usize; 2]> {
        self.faulted
            .iter()
            .filter_map(|key| topology.index_of(key).ok())
            .collect()
    }

    /// Overwrites the faulted positions of a caller-owned, topology-ordered vector.
    pub fn apply_in_place(&self, topology: &StaticTopology, values: &mut [f32]) {
        for idx in self.columns(topology) {
            if let Some(value) = values.get_mut(idx) {
                *value = FAULT_SENTINEL;
            }
        }
    }
}
