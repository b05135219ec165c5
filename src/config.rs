//! Configuration of the decision environment and the built-in junction simulator.

use crate::error::ConfigError;
use crate::junction::ActionType;
use crate::movement::split_movement_key;
use crate::projection::DEFAULT_SAMPLES;
use crate::window::DEFAULT_HISTORY;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// A movement is considered impassable below this downstream speed limit, in m/s.
pub const MIN_PASSABLE_SPEED: f64 = 5.0; // m/s

/// Settings of a [DecisionEnvironment](crate::DecisionEnvironment).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// The ID of the controlled junction.
    pub junction_id: String,
    /// The number of aggregated occupancy vectors in the observation.
    pub history: usize,
    /// How discrete policy outputs are turned into actions.
    pub action_type: ActionType,
    /// The number of samples per queue projection.
    pub projection_samples: usize,
    /// The downstream speed limit below which a movement is impassable, in m/s.
    pub min_passable_speed: f64,
    /// Vehicle IDs containing this marker are privileged (emergency) vehicles.
    pub privileged_marker: String,
    /// Seeds the queue projector. Seeded from entropy when absent.
    pub seed: Option<u64>,
    /// Fail a step if the controller is not ready after this many substeps.
    pub max_gating_substeps: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            junction_id: "J1".to_string(),
            history: DEFAULT_HISTORY,
            action_type: ActionType::ChooseNextPhase,
            projection_samples: DEFAULT_SAMPLES,
            min_passable_speed: MIN_PASSABLE_SPEED,
            privileged_marker: "rescue".to_string(),
            seed: None,
            max_gating_substeps: 600,
        }
    }
}

impl EnvConfig {
    /// Parses a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        parse_validated(json, Self::validate)
    }

    /// Loads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Checks that the settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history == 0 {
            return invalid("history must be at least 1");
        }
        if self.projection_samples == 0 {
            return invalid("projection_samples must be at least 1");
        }
        if self.max_gating_substeps == 0 {
            return invalid("max_gating_substeps must be at least 1");
        }
        if !(self.min_passable_speed >= 0.0) {
            return invalid("min_passable_speed must be non-negative");
        }
        Ok(())
    }
}

/// A movement of the built-in simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementSpec {
    /// The movement key, `<edge>--<l|s|r>`.
    pub key: String,
    /// The outgoing edge.
    pub out_edge: String,
    /// The number of lanes.
    pub lanes: u32,
    /// The mean number of arriving vehicles per second.
    pub arrival_rate: f64,
}

/// Settings of a [JunctionSimulation](crate::JunctionSimulation).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// The ID of the junction.
    pub junction_id: String,
    /// The movements, in vector order.
    pub movements: Vec<MovementSpec>,
    /// The movement keys given green by each phase.
    pub phases: Vec<Vec<String>>,
    /// The episode length in s.
    pub num_seconds: usize,
    /// The duration of the amber interval in s.
    pub amber_time: usize,
    /// The minimum green time of each decision in s.
    pub green_time: usize,
    /// Vehicles discharged per lane per second of green.
    pub saturation_flow: f64,
    /// The length of each detector in m.
    pub detector_length: f64,
    /// The space taken by a queued vehicle in m.
    pub vehicle_spacing: f64,
    /// The default speed limit of every edge in m/s.
    pub speed_limit: f64,
    /// The fraction of arriving vehicles which are emergency vehicles.
    pub rescue_probability: f64,
    /// Seeds vehicle arrivals.
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self::four_way()
    }
}

impl ScenarioConfig {
    /// A four-armed junction with 12 movements and 4 phases.
    ///
    /// Phases 0 and 2 serve the through (and right turning) traffic of the
    /// east-west and north-south arms, phases 1 and 3 their left turns.
    pub fn four_way() -> Self {
        let movement = |key: &str, out_edge: &str, lanes, arrival_rate| MovementSpec {
            key: key.to_string(),
            out_edge: out_edge.to_string(),
            lanes,
            arrival_rate,
        };
        let phase =
            |keys: &[&str]| -> Vec<String> { keys.iter().map(|k| k.to_string()).collect() };
        Self {
            junction_id: "J1".to_string(),
            movements: vec![
                movement("-E2--l", "-E3", 1, 0.04),
                movement("-E2--r", "E4", 1, 0.03),
                movement("-E2--s", "-E1", 2, 0.20),
                movement("-E4--l", "E2", 1, 0.03),
                movement("-E4--r", "-E1", 1, 0.02),
                movement("-E4--s", "-E3", 2, 0.08),
                movement("E1--l", "E4", 1, 0.04),
                movement("E1--r", "-E3", 1, 0.03),
                movement("E1--s", "E2", 2, 0.20),
                movement("E3--l", "-E1", 1, 0.03),
                movement("E3--r", "E2", 1, 0.02),
                movement("E3--s", "E4", 2, 0.10),
            ],
            phases: vec![
                phase(&["-E2--s", "-E2--r", "E1--s", "E1--r"]),
                phase(&["E1--l", "-E2--l"]),
                phase(&["E3--s", "E3--r", "-E4--s", "-E4--r"]),
                phase(&["-E4--l", "E3--l"]),
            ],
            num_seconds: 500,
            amber_time: 3,
            green_time: 5,
            saturation_flow: 0.5,
            detector_length: 60.0,
            vehicle_spacing: 7.5,
            speed_limit: 13.89,
            rescue_probability: 0.03,
            seed: 0,
        }
    }

    /// Parses a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        parse_validated(json, Self::validate)
    }

    /// Loads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Checks that the scenario describes a usable junction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.movements.is_empty() {
            return invalid("scenario has no movements");
        }
        if self.phases.is_empty() {
            return invalid("scenario has no phases");
        }
        let mut keys = HashSet::new();
        for movement in &self.movements {
            if split_movement_key(&movement.key).is_none() {
                return invalid(format!("malformed movement key {:?}", movement.key));
            }
            if !keys.insert(movement.key.as_str()) {
                return invalid(format!("duplicate movement {:?}", movement.key));
            }
            if movement.lanes == 0 {
                return invalid(format!("movement {:?} has no lanes", movement.key));
            }
            if !(movement.arrival_rate >= 0.0) {
                return invalid(format!("movement {:?} has a negative arrival rate", movement.key));
            }
        }
        let mut owned = HashSet::new();
        for (idx, phase) in self.phases.iter().enumerate() {
            for key in phase {
                if !keys.contains(key.as_str()) {
                    return invalid(format!("phase {} refers to unknown movement {:?}", idx, key));
                }
                if !owned.insert(key.as_str()) {
                    return invalid(format!("movement {:?} is in more than one phase", key));
                }
            }
        }
        if self.green_time == 0 {
            return invalid("green_time must be at least 1");
        }
        if !(self.saturation_flow > 0.0 && self.detector_length > 0.0 && self.vehicle_spacing > 0.0) {
            return invalid("saturation_flow, detector_length and vehicle_spacing must be positive");
        }
        if !(0.0..=1.0).contains(&self.rescue_probability) {
            return invalid("rescue_probability must be within [0, 1]");
        }
        Ok(())
    }
}

fn parse_validated<T: DeserializeOwned>(
    json: &str,
    validate: impl Fn(&T) -> Result<(), ConfigError>,
) -> Result<T, ConfigError> {
    let config = serde_json::from_str(json)?;
    validate(&config)?;
    Ok(config)
}

fn invalid(reason: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(reason.into()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EnvConfig::default().validate().unwrap();
        ScenarioConfig::four_way().validate().unwrap();
        assert_eq!(ScenarioConfig::four_way().movements.len(), 12);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config =
            EnvConfig::from_json(r#"{ "history": 8, "action_type": "next_or_not" }"#).unwrap();
        assert_eq!(config.history, 8);
        assert_eq!(config.action_type, ActionType::NextOrNot);
        assert_eq!(config.privileged_marker, "rescue");
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(matches!(
            EnvConfig::from_json(r#"{ "history": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EnvConfig::from_json("{ history"),
            Err(ConfigError::Parse(_))
        ));

        let mut scenario = ScenarioConfig::four_way();
        scenario.phases[1].push("E1--s".to_string());
        assert!(scenario.validate().is_err());

        let mut scenario = ScenarioConfig::four_way();
        scenario.movements[0].key = "E9".to_string();
        assert!(scenario.validate().is_err());
    }
}
