//! Static junction topology, fixed for the lifetime of an episode.

use crate::error::{EnvError, Result};
use crate::junction::JunctionState;
use crate::movement::{canonical_key, split_movement_key, Movement};
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};

/// A group of movements which receive green at the same time.
#[derive(Clone, Debug, PartialEq)]
pub struct Phase {
    /// The phase index.
    pub index: usize,
    /// The canonical keys of the member movements.
    pub movements: SmallVec<[String; 4]>,
}

/// A presentation descriptor of a signalised movement.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MovementInfo {
    pub direction: &'static str,
    pub number_of_lanes: u32,
}

/// A presentation descriptor of a phase.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PhaseInfo {
    pub name: String,
    pub movements: Vec<String>,
}

/// The movements and phases of a junction.
///
/// The movement order fixes the position of every movement in every vector
/// produced during the episode.
#[derive(Clone, Debug)]
pub struct StaticTopology {
    movements: Vec<Movement>,
    index: HashMap<String, usize>,
    phases: Vec<Phase>,
}

impl StaticTopology {
    /// Derives the topology from the simulator's initial junction state.
    pub fn from_junction(state: &JunctionState) -> Result<Self> {
        if state.movement_ids.is_empty() {
            return Err(EnvError::MissingMetadata("movement_ids"));
        }
        if state.phase2movements.is_empty() {
            return Err(EnvError::MissingMetadata("phase2movements"));
        }

        // Metadata maps may use either key style
        let directions = canonical_map(&state.movement_directions);
        let lane_numbers = canonical_map(&state.movement_lane_numbers);
        let edges = canonical_map(&state.from_edge_to_edge);

        let mut movements = Vec::with_capacity(state.movement_ids.len());
        let mut index = HashMap::with_capacity(state.movement_ids.len());
        for raw_key in &state.movement_ids {
            let key = canonical_key(raw_key);
            let parsed = split_movement_key(&key);
            let direction = directions
                .get(&key)
                .copied()
                .or_else(|| parsed.map(|(_, dir)| dir))
                .ok_or(EnvError::MissingMetadata("movement_directions"))?;
            let lanes = lane_numbers
                .get(&key)
                .copied()
                .filter(|lanes| *lanes > 0)
                .ok_or(EnvError::MissingMetadata("movement_lane_numbers"))?;
            let edge = match (edges.get(&key), parsed) {
                (Some((in_edge, _)), _) => in_edge.clone(),
                (None, Some((edge, _))) => edge.to_string(),
                (None, None) => key.clone(),
            };
            if index.insert(key.clone(), movements.len()).is_some() {
                return Err(EnvError::DuplicateMovement(key));
            }
            let out_edge = edges.get(&key).map(|(_, out)| out.clone());
            movements.push(Movement {
                key,
                edge,
                direction,
                lanes,
                out_edge,
            });
        }

        let mut owner: HashMap<usize, usize> = HashMap::new();
        let mut phases = Vec::with_capacity(state.phase2movements.len());
        for (expected, (phase_idx, members)) in state.phase2movements.iter().enumerate() {
            if *phase_idx != expected {
                return Err(EnvError::PhaseGap(expected));
            }
            let mut keys = SmallVec::new();
            for member in members {
                let key = canonical_key(member);
                let movement = *index.get(&key).ok_or_else(|| EnvError::UnknownPhaseMovement {
                    phase: *phase_idx,
                    movement: member.clone(),
                })?;
                if let Some(first) = owner.insert(movement, *phase_idx) {
                    if first != *phase_idx {
                        return Err(EnvError::DuplicatePhaseMovement {
                            movement: key,
                            first,
                            second: *phase_idx,
                        });
                    }
                    continue;
                }
                keys.push(key);
            }
            phases.push(Phase {
                index: *phase_idx,
                movements: keys,
            });
        }

        Ok(Self {
            movements,
            index,
            phases,
        })
    }

    /// The number of movements.
    pub fn len(&self) -> usize {
        self.movements.len()
    }

    /// Whether the junction has no movements.
    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    /// The number of phases.
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// The movements in vector order.
    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    /// The movement keys in vector order.
    pub fn movement_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.movements.iter().map(|m| m.key.as_str())
    }

    /// The phases in index order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Gets a phase by index.
    pub fn phase(&self, index: usize) -> Result<&Phase> {
        self.phases.get(index).ok_or(EnvError::PhaseOutOfRange {
            index,
            phase_count: self.phases.len(),
        })
    }

    /// Gets the vector index of a movement. Either key style is accepted.
    pub fn index_of(&self, key: &str) -> Result<usize> {
        self.index
            .get(&canonical_key(key))
            .copied()
            .ok_or_else(|| EnvError::UnknownMovement(key.to_string()))
    }

    /// Gets a movement by key.
    pub fn movement(&self, key: &str) -> Result<&Movement> {
        self.index_of(key).map(|idx| &self.movements[idx])
    }

    /// The vector indices of the movements of a phase.
    pub fn phase_columns(&self, index: usize) -> Result<SmallVec<[usize; 4]>> {
        self.phase(index)?
            .movements
            .iter()
            .map(|key| self.index_of(key))
            .collect()
    }

    /// Re-indexes a positional vector reported in `keys` order into topology order.
    /// An empty `keys` means the vector is already in topology order.
    pub fn align<T: Clone>(&self, keys: &[String], values: &[T]) -> Result<Vec<T>> {
        if values.len() != self.len() {
            return Err(EnvError::SampleLength {
                expected: self.len(),
                got: values.len(),
            });
        }
        if keys.is_empty() || keys.iter().map(String::as_str).eq(self.movement_keys()) {
            return Ok(values.to_vec());
        }
        if keys.len() != self.len() {
            return Err(EnvError::SampleLength {
                expected: self.len(),
                got: keys.len(),
            });
        }
        let mut slots: Vec<Option<T>> = vec![None; self.len()];
        for (key, value) in keys.iter().zip(values) {
            let idx = self.index_of(key)?;
            if slots[idx].replace(value.clone()).is_some() {
                return Err(EnvError::DuplicateMovement(canonical_key(key)));
            }
        }
        // Every slot is filled: `keys` has one distinct known key per movement
        Ok(slots.into_iter().flatten().collect())
    }

    /// Descriptors of the signalised movements, keyed by movement.
    pub fn movement_infos(&self) -> BTreeMap<String, MovementInfo> {
        self.movements
            .iter()
            .filter(|m| m.is_signalised())
            .map(|m| {
                let info = MovementInfo {
                    direction: m.direction.label(),
                    number_of_lanes: m.lanes,
                };
                (m.key.clone(), info)
            })
            .collect()
    }

    /// Descriptors of the phases, listing their signalised movements.
    pub fn phase_infos(&self) -> Vec<PhaseInfo> {
        self.phases
            .iter()
            .map(|phase| PhaseInfo {
                name: format!("Phase {}", phase.index),
                movements: phase
                    .movements
                    .iter()
                    .filter(|key| self.movement(key).map_or(false, |m| m.is_signalised()))
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// The total number of lanes given green by each phase.
    pub fn phase_lane_counts(&self) -> Vec<u32> {
        self.phases
            .iter()
            .map(|phase| {
                phase
                    .movements
                    .iter()
                    .filter_map(|key| self.movement(key).ok())
                    .map(|m| m.lanes)
                    .sum()
            })
            .collect()
    }
}

fn canonical_map<V: Clone>(map: &BTreeMap<String, V>) -> HashMap<String, V> {
    map.iter()
        .map(|(key, value)| (canonical_key(key), value.clone()))
        .collect()
}
