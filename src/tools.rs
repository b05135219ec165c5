//! Tools a language-model agent can call to inspect and reason about the junction.

use crate::env::DecisionEnvironment;
use crate::error::{EnvError, Result};
use crate::fault::FAULT_SENTINEL;
use crate::junction::Simulator;
use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;

/// A capability exposed to a decision strategy.
pub trait AgentTool {
    /// The name the agent calls the tool by.
    fn name(&self) -> &'static str;

    /// What the tool does and what input it takes.
    fn description(&self) -> &'static str;

    /// Runs the tool and returns its textual result.
    fn invoke<S: Simulator>(&self, env: &mut DecisionEnvironment<S>, input: &str) -> Result<String>;
}

/// The tools available to an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tool {
    AvailableActions,
    CurrentPhase,
    IntersectionLayout,
    SignalPhaseStructure,
    CurrentOccupancy,
    PreviousOccupancy,
    PredictQueueLength,
    PrivilegedMovements,
    MovementPassability,
    DetectorState,
}

impl Tool {
    /// Every tool, in the order they are presented to an agent.
    pub const ALL: [Tool; 10] = [
        Tool::AvailableActions,
        Tool::CurrentPhase,
        Tool::IntersectionLayout,
        Tool::SignalPhaseStructure,
        Tool::CurrentOccupancy,
        Tool::PreviousOccupancy,
        Tool::PredictQueueLength,
        Tool::PrivilegedMovements,
        Tool::MovementPassability,
        Tool::DetectorState,
    ];

    /// Looks up a tool by name.
    pub fn from_name(name: &str) -> Option<Tool> {
        Self::ALL.iter().copied().find(|tool| tool.name() == name.trim())
    }

    /// Lists every tool as `name: description` lines.
    pub fn catalogue() -> String {
        Self::ALL
            .iter()
            .map(|tool| format!("{}: {}", tool.name(), tool.description()))
            .join("\n")
    }
}

impl AgentTool for Tool {
    fn name(&self) -> &'static str {
        match self {
            Tool::AvailableActions => "get_available_actions",
            Tool::CurrentPhase => "get_current_phase",
            Tool::IntersectionLayout => "get_intersection_layout",
            Tool::SignalPhaseStructure => "get_signal_phase_structure",
            Tool::CurrentOccupancy => "get_current_occupancy",
            Tool::PreviousOccupancy => "get_previous_occupancy",
            Tool::PredictQueueLength => "predict_queue_length",
            Tool::PrivilegedMovements => "get_emergency_vehicle_movements",
            Tool::MovementPassability => "get_movement_passability",
            Tool::DetectorState => "get_detector_state",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Tool::AvailableActions => "Lists the phases the signal can be set to. No input.",
            Tool::CurrentPhase => "Returns the phase currently shown. No input.",
            Tool::IntersectionLayout => {
                "Returns the turning direction and lane count of each signalised movement. No input."
            }
            Tool::SignalPhaseStructure => {
                "Returns the movements given green by each phase. No input."
            }
            Tool::CurrentOccupancy => {
                "Returns the occupancy of each movement during the last decision step. \
                 A value of -1 means the movement's detector is not working. No input."
            }
            Tool::PreviousOccupancy => {
                "Returns the occupancy of each movement during the decision step before the last. No input."
            }
            Tool::PredictQueueLength => {
                "Predicts the average and maximum queue length of every phase if the given phase \
                 is set green. Input: the phase index, e.g. 2."
            }
            Tool::PrivilegedMovements => {
                "Lists the movements on which an emergency vehicle is waiting. No input."
            }
            Tool::MovementPassability => {
                "Returns whether each movement can flow, or is blocked downstream. No input."
            }
            Tool::DetectorState => {
                "Returns whether the detector of each movement is working. No input."
            }
        }
    }

    fn invoke<S: Simulator>(&self, env: &mut DecisionEnvironment<S>, input: &str) -> Result<String> {
        match self {
            Tool::AvailableActions => Ok(env.available_actions()?.iter().join(", ")),
            Tool::CurrentPhase => Ok(format!("Phase-{}", env.current_phase()?)),
            Tool::IntersectionLayout => to_json(&env.intersection_layout()?),
            Tool::SignalPhaseStructure => to_json(&env.signal_phase_structure()?),
            Tool::CurrentOccupancy => to_json(&format_occupancy(env.current_occupancy()?)),
            Tool::PreviousOccupancy => to_json(&format_occupancy(env.previous_occupancy()?)),
            Tool::PredictQueueLength => {
                let input = input.trim();
                let phase = input
                    .parse::<usize>()
                    .map_err(|_| EnvError::InvalidPhaseIndex(input.to_string()))?;
                let projections = env
                    .predict_future_scene(phase)?
                    .into_iter()
                    .enumerate()
                    .map(|(idx, projection)| (format!("Phase {}", idx), projection))
                    .collect::<BTreeMap<_, _>>();
                to_json(&projections)
            }
            Tool::PrivilegedMovements => {
                let movements = env.privileged_movements()?;
                if movements.is_empty() {
                    Ok("None".to_string())
                } else {
                    Ok(movements.iter().join(", "))
                }
            }
            Tool::MovementPassability => to_json(&env.movement_passability()?),
            Tool::DetectorState => to_json(&env.detector_state()?),
        }
    }
}

/// Formats occupancy readings as percentages, or `-1` for a faulted detector.
fn format_occupancy(readings: BTreeMap<String, f32>) -> BTreeMap<String, String> {
    readings
        .into_iter()
        .map(|(key, value)| {
            let text = if value == FAULT_SENTINEL {
                "-1".to_string()
            } else {
                format!("{:.2}%", value)
            };
            (key, text)
        })
        .collect()
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|err| EnvError::Serialize(err.to_string()))
}
