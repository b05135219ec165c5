pub use aggregate::OccupancyAggregator;
pub use config::{EnvConfig, MovementSpec, ScenarioConfig};
pub use controller::{Controller, FixedTime, Sotl};
pub use decision::{parse_decision, Decision};
pub use env::{DecisionEnvironment, DetectorState, EnvState, Observation, StepInfo, StepResult};
pub use error::{ConfigError, EnvError, Result, SimulatorError};
pub use fault::{SensorFaultMask, FAULT_SENTINEL};
pub use junction::{Action, ActionType, JunctionState, SimStep, Simulator, VehicleState};
pub use light::{LightState, SignalController};
pub use movement::{canonical_key, split_movement_key, Direction, Movement};
pub use projection::{phase_queue_lengths, ProjectedQueue, QueueProjector, QueueStats};
pub use simulation::JunctionSimulation;
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use tools::{AgentTool, Tool};
pub use topology::{MovementInfo, Phase, PhaseInfo, StaticTopology};
pub use vehicle::{Vehicle, VehicleAttributes};
pub use window::TemporalStateWindow;

mod aggregate;
pub mod config;
pub mod controller;
mod decision;
mod env;
mod error;
mod fault;
mod junction;
mod light;
mod movement;
pub mod projection;
mod simulation;
mod tools;
mod topology;
mod vehicle;
pub mod window;

new_key_type! {
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type VehicleSet = SlotMap<VehicleId, Vehicle>;
