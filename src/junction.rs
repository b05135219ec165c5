//! The boundary between the observation core and a traffic simulator.

use crate::error::{EnvError, Result, SimulatorError};
use crate::movement::Direction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A snapshot of one signalised junction, as reported by the simulator.
///
/// All `Vec` fields except `movement_ids` are positional and follow the
/// order of `movement_ids` in the same snapshot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JunctionState {
    /// The ordered movement keys.
    pub movement_ids: Vec<String>,
    /// The turning direction of each movement.
    pub movement_directions: BTreeMap<String, Direction>,
    /// The number of lanes of each movement.
    pub movement_lane_numbers: BTreeMap<String, u32>,
    /// The movements given green by each phase.
    pub phase2movements: BTreeMap<usize, Vec<String>>,
    /// The incoming and outgoing edge of each movement.
    pub from_edge_to_edge: BTreeMap<String, (String, String)>,
    /// The occupancy of each movement's detector during the last tick, in percent.
    pub last_step_occupancy: Vec<f32>,
    /// The length of the queue on each movement in m.
    pub jam_length_meters: Vec<f32>,
    /// The vehicles seen by each movement's detector during the last tick.
    pub last_step_vehicle_id_list: Vec<Vec<String>>,
    /// Whether the signal controller will accept a new action.
    pub can_perform_action: bool,
    /// The index of the phase currently shown.
    pub this_phase_index: usize,
    /// Which movements are green in the current phase.
    pub this_phase: Vec<bool>,
    /// Which movements are green in the following phase.
    pub next_phase: Vec<bool>,
    /// The simulation time in s.
    pub sim_time: f64,
}

/// The state of a simulated vehicle relevant to the reward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub id: String,
    /// The accumulated time spent stopped, in s.
    pub waiting_time: f64,
}

/// The result of advancing the simulator by one substep.
#[derive(Clone, Debug, PartialEq)]
pub struct SimStep {
    pub junction: JunctionState,
    pub vehicles: Vec<VehicleState>,
    /// The episode has terminated.
    pub done: bool,
    /// The episode was cut short by its time limit.
    pub truncated: bool,
}

/// A signal control action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Show the given phase.
    SetPhase(usize),
    /// Advance to the next phase in the cycle.
    Next,
    /// Keep the current phase.
    Hold,
}

/// How a discrete policy output is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// The action is the index of the phase to show.
    #[default]
    ChooseNextPhase,
    /// `0` advances to the next phase, `1` keeps the current one.
    NextOrNot,
}

impl ActionType {
    /// The number of discrete actions.
    pub fn action_count(self, phase_count: usize) -> usize {
        match self {
            ActionType::ChooseNextPhase => phase_count,
            ActionType::NextOrNot => 2,
        }
    }

    /// Converts a discrete policy output into an [Action].
    pub fn from_discrete(self, value: usize, phase_count: usize) -> Result<Action> {
        match (self, value) {
            (ActionType::ChooseNextPhase, idx) if idx < phase_count => Ok(Action::SetPhase(idx)),
            (ActionType::NextOrNot, 0) => Ok(Action::Next),
            (ActionType::NextOrNot, 1) => Ok(Action::Hold),
            (action_type, index) => Err(EnvError::PhaseOutOfRange {
                index,
                phase_count: action_type.action_count(phase_count),
            }),
        }
    }

    /// The action which keeps the current phase.
    pub fn hold(self, current_phase: usize) -> Action {
        match self {
            ActionType::ChooseNextPhase => Action::SetPhase(current_phase),
            ActionType::NextOrNot => Action::Hold,
        }
    }
}

/// A microscopic traffic simulator driving a single junction.
pub trait Simulator {
    /// Starts a new episode and returns the junction's initial state.
    fn reset(&mut self) -> Result<JunctionState, SimulatorError>;

    /// Advances the simulation by one substep while applying `action`.
    fn step(&mut self, action: Action) -> Result<SimStep, SimulatorError>;

    /// Sets the speed limit of every lane of an edge, in m/s.
    fn set_edge_speed(&mut self, edge: &str, speed: f64) -> Result<(), SimulatorError>;

    /// The speed limit of the first lane of an edge, in m/s.
    fn lane_max_speed(&self, edge: &str) -> Result<f64, SimulatorError>;

    /// Tears down the simulation.
    fn close(&mut self) {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn discrete_actions() {
        let choose = ActionType::ChooseNextPhase;
        assert_eq!(choose.from_discrete(3, 4), Ok(Action::SetPhase(3)));
        assert!(choose.from_discrete(4, 4).is_err());
        assert_eq!(choose.hold(2), Action::SetPhase(2));

        let binary = ActionType::NextOrNot;
        assert_eq!(binary.from_discrete(0, 4), Ok(Action::Next));
        assert_eq!(binary.from_discrete(1, 4), Ok(Action::Hold));
        assert_eq!(
            binary.from_discrete(2, 4),
            Err(EnvError::PhaseOutOfRange {
                index: 2,
                phase_count: 2
            })
        );
    }
}
