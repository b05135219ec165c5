
use thiserror::Error;

/// Errors raised by the observation core and the decision environment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// An occupancy sample had the wrong number of values.
    #[error("occupancy sample has {got} values, expected {expected}")]
    SampleLength { expected: usize, got: usize },
    /// An occupancy sample contained NaN or an infinity.
    #[error("occupancy value at index {index} is not a finite number ({value})")]
    NonNumeric { index: usize, value: f32 },
    /// The aggregator was reduced before any sample was recorded.
    #[error("no occupancy samples were recorded for this decision step")]
    NoSamples,
    /// A phase index could not be parsed.
    #[error("phase index must be a number, got {0:?}")]
    InvalidPhaseIndex(String),
    /// A phase index was parsed but does not exist.
    #[error("phase {index} does not exist, the junction has {phase_count} phases")]
    PhaseOutOfRange { index: usize, phase_count: usize },
    /// The environment was queried or stepped before `reset`.
    #[error("the environment has not been reset")]
    NotReset,
    /// A previous step failed and the episode can not continue.
    #[error("a previous step failed, the environment must be reset")]
    NeedsReset,
    /// A movement key is not part of the junction topology.
    #[error("movement {0:?} is not part of the junction")]
    UnknownMovement(String),
    /// A movement key appears twice in the movement list.
    #[error("movement {0:?} is listed more than once")]
    DuplicateMovement(String),
    /// The simulator's junction state lacks required static information.
    #[error("junction state is missing {0}")]
    MissingMetadata(&'static str),
    /// A phase refers to a movement that is not in the movement list.
    #[error("phase {phase} refers to unknown movement {movement:?}")]
    UnknownPhaseMovement { phase: usize, movement: String },
    /// A movement is a member of more than one phase.
    #[error("movement {movement:?} belongs to phase {first} and phase {second}")]
    DuplicatePhaseMovement {
        movement: String,
        first: usize,
        second: usize,
    },
    /// Phase indices are not numbered `0..n`.
    #[error("phase indices must be contiguous from zero, phase {0} is missing")]
    PhaseGap(usize),
    /// The signal controller never became ready for a new action.
    #[error("signal controller was not ready after {substeps} substeps")]
    GatingStalled { substeps: usize },
    /// A tool result could not be serialised.
    #[error("could not serialise tool output: {0}")]
    Serialize(String),
    /// The simulator failed.
    #[error("simulator failure: {0}")]
    Simulator(#[from] SimulatorError),
}

/// Errors raised by a [Simulator](crate::Simulator) backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulatorError {
    /// The edge does not exist in the road network.
    #[error("edge {0:?} does not exist")]
    UnknownEdge(String),
    /// The scenario failed validation.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
    /// The simulation was stepped before it was reset.
    #[error("the simulation has not been started")]
    NotStarted,
    /// The simulation was stepped after its episode had ended.
    #[error("the simulation has finished, reset it first")]
    Finished,
    /// The requested phase does not exist.
    #[error("phase {0} does not exist")]
    InvalidAction(usize),
    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type used throughout the crate.
pub type Result<T, E = EnvError> = std::result::Result<T, E>;
