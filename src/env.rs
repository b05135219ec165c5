//! The decision environment: drives a simulator one decision step at a time.

use crate::aggregate::OccupancyAggregator;
use crate::config::EnvConfig;
use crate::decision::parse_decision;
use crate::error::{EnvError, Result};
use crate::fault::{SensorFaultMask, FAULT_SENTINEL};
use crate::junction::{Action, JunctionState, SimStep, Simulator};
use crate::projection::{phase_queue_lengths, ProjectedQueue, QueueProjector};
use crate::topology::{MovementInfo, PhaseInfo, StaticTopology};
use crate::window::TemporalStateWindow;
use log::{debug, info, warn};
use ndarray::Array2;
use serde::Serialize;
use std::collections::BTreeMap;

/// The lifecycle state of a [DecisionEnvironment].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvState {
    /// Not reset since creation or the last `close`.
    Unset,
    /// Ready to accept an action.
    AwaitingAction,
    /// Executing substeps while the signal controller is mid-transition.
    Gating,
    /// A step failed. Only `reset` or `close` are accepted.
    Failed,
}

/// The working state of a movement's detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DetectorState {
    #[serde(rename = "Work")]
    Work,
    #[serde(rename = "Not Work")]
    NotWork,
}

/// An observation of the junction after a decision step.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// The masked occupancy history, `(history, movements)`, oldest row first.
    pub history: Array2<f32>,
    /// Which movements are green in the current phase.
    pub this_phase: Vec<bool>,
    /// Which movements are green in the following phase.
    pub next_phase: Vec<bool>,
}

/// Auxiliary information about a decision step.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StepInfo {
    /// The simulation time at the end of the step, in s.
    pub step_time: f64,
    /// The index of the phase shown at the end of the step.
    pub this_phase_index: usize,
    /// The summed occupancy of each phase's movements, with a faulted
    /// movement contributing [FAULT_SENTINEL].
    pub phase_occ: Vec<f32>,
    /// The vehicle waiting time summed over every substep of the step, in s.
    pub accumulated_waiting: f64,
    /// The number of simulator substeps consumed.
    pub substeps: usize,
}

/// The outcome of a decision step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepResult {
    pub observation: Observation,
    /// The negative total waiting time of the vehicles present when the step ended.
    pub reward: f64,
    pub truncated: bool,
    pub done: bool,
    pub info: StepInfo,
}

/// The dynamic junction state of the last substep, in topology order.
#[derive(Clone, Debug, Default)]
struct Snapshot {
    sim_time: f64,
    this_phase_index: usize,
    this_phase: Vec<bool>,
    next_phase: Vec<bool>,
    jam_lengths: Vec<f32>,
    vehicle_ids: Vec<Vec<String>>,
}

/// The outcome of the action-gating loop.
struct Gated {
    step: SimStep,
    substeps: usize,
    accumulated_waiting: f64,
}

/// Converts a simulator's tick stream into fixed-shape, fault-aware
/// observations, one per decision step.
///
/// A decision step runs simulator substeps until the signal controller is
/// ready for a new action. The occupancy of every substep is averaged into one
/// vector, which is pushed into the temporal window.
pub struct DecisionEnvironment<S> {
    /// The simulator being driven.
    sim: S,
    /// The settings.
    config: EnvConfig,
    /// The lifecycle state.
    state: EnvState,
    /// The junction topology of the current episode.
    topology: Option<StaticTopology>,
    /// Occupancy samples of the decision step in progress.
    aggregator: OccupancyAggregator,
    /// The occupancy history.
    window: TemporalStateWindow,
    /// The faulted detectors.
    mask: SensorFaultMask,
    /// Samples queue projections.
    projector: QueueProjector,
    /// The dynamic state of the last substep.
    snapshot: Snapshot,
    /// The aggregated occupancy of the last decision step, as fractions.
    current_occupancy: Vec<f32>,
    /// The aggregated occupancy of the decision step before it.
    previous_occupancy: Vec<f32>,
    /// The number of episodes started.
    episode: usize,
}

impl<S: Simulator> DecisionEnvironment<S> {
    /// Creates an environment driving `sim`. It must be reset before use.
    ///
    /// Zero history and sample counts are raised to one, and a zero substep
    /// guard falls back to the default.
    pub fn new(sim: S, mut config: EnvConfig) -> Self {
        config.history = config.history.max(1);
        config.projection_samples = config.projection_samples.max(1);
        if config.max_gating_substeps == 0 {
            config.max_gating_substeps = EnvConfig::default().max_gating_substeps;
        }
        Self {
            projector: Self::projector(&config),
            window: TemporalStateWindow::new(config.history, 0),
            sim,
            config,
            state: EnvState::Unset,
            topology: None,
            aggregator: OccupancyAggregator::new(0),
            mask: SensorFaultMask::new(),
            snapshot: Snapshot::default(),
            current_occupancy: vec![],
            previous_occupancy: vec![],
            episode: 0,
        }
    }

    fn projector(config: &EnvConfig) -> QueueProjector {
        let projector = match config.seed {
            Some(seed) => QueueProjector::seeded(seed),
            None => QueueProjector::from_entropy(),
        };
        projector.with_samples(config.projection_samples)
    }

    /// The settings.
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// The lifecycle state.
    pub fn state(&self) -> EnvState {
        self.state
    }

    /// The number of episodes started.
    pub fn episode(&self) -> usize {
        self.episode
    }

    /// The simulator being driven.
    pub fn simulator(&self) -> &S {
        &self.sim
    }

    /// The junction topology of the current episode.
    pub fn topology(&self) -> Result<&StaticTopology> {
        match self.state {
            EnvState::Unset => Err(EnvError::NotReset),
            EnvState::Failed => self.topology.as_ref().ok_or(EnvError::NeedsReset),
            _ => self.topology.as_ref().ok_or(EnvError::NotReset),
        }
    }

    /// Starts a new episode.
    pub fn reset(&mut self) -> Result<(Observation, StepInfo)> {
        self.episode += 1;
        self.state = EnvState::Failed;
        self.topology = None;
        self.snapshot = Snapshot::default();
        self.aggregator.clear();
        self.current_occupancy.clear();
        self.previous_occupancy.clear();
        let junction = self.sim.reset()?;
        let topology = StaticTopology::from_junction(&junction)?;
        let width = topology.len();

        let occupancy = topology
            .align(&junction.movement_ids, &junction.last_step_occupancy)?
            .into_iter()
            .map(|occ| occ / 100.0)
            .collect::<Vec<_>>();
        self.snapshot = Snapshot::from_junction(&topology, &junction)?;
        self.aggregator = OccupancyAggregator::new(width);
        self.window = TemporalStateWindow::new(self.config.history, width);
        self.window.push(occupancy.clone())?;
        self.mask.clear();
        self.projector = Self::projector(&self.config);
        self.previous_occupancy = vec![0.0; width];
        self.current_occupancy = occupancy;
        info!(
            "Episode {} of junction {}: {} movements, {} phases",
            self.episode,
            self.config.junction_id,
            width,
            topology.phase_count()
        );
        self.topology = Some(topology);
        self.state = EnvState::AwaitingAction;

        let info = StepInfo {
            step_time: self.snapshot.sim_time,
            this_phase_index: self.snapshot.this_phase_index,
            phase_occ: self.phase_occupancy()?,
            accumulated_waiting: 0.0,
            substeps: 0,
        };
        Ok((self.observation(), info))
    }

    /// Applies an action and runs the simulator until the signal controller
    /// is ready for the next one.
    ///
    /// If the simulator or any consistency check fails, the environment must
    /// be reset before it can be stepped again.
    pub fn step(&mut self, action: Action) -> Result<StepResult> {
        match self.state {
            EnvState::Unset => return Err(EnvError::NotReset),
            EnvState::Failed | EnvState::Gating => return Err(EnvError::NeedsReset),
            EnvState::AwaitingAction => {}
        }
        self.state = EnvState::Gating;
        match self.step_inner(action) {
            Ok(result) => {
                self.state = EnvState::AwaitingAction;
                Ok(result)
            }
            Err(err) => {
                warn!("Step of junction {} failed: {}", self.config.junction_id, err);
                self.aggregator.clear();
                self.state = EnvState::Failed;
                Err(err)
            }
        }
    }

    /// Applies a discrete policy output, interpreted per the configured action type.
    pub fn step_discrete(&mut self, value: usize) -> Result<StepResult> {
        let phase_count = self.topology()?.phase_count();
        let action = self.config.action_type.from_discrete(value, phase_count)?;
        self.step(action)
    }

    /// Applies a free-text decision. A decision without a valid phase index
    /// holds the current phase.
    pub fn step_decision(&mut self, text: &str) -> Result<StepResult> {
        let phase_count = self.topology()?.phase_count();
        let action = parse_decision(text, phase_count)
            .into_action(self.snapshot.this_phase_index, self.config.action_type);
        self.step(action)
    }

    fn step_inner(&mut self, action: Action) -> Result<StepResult> {
        let gated = self.run_gating(action)?;
        let topology = self.topology.as_ref().ok_or(EnvError::NotReset)?;

        let occupancy = self.aggregator.reduce()?;
        self.window.push(occupancy.clone())?;
        self.previous_occupancy = std::mem::replace(&mut self.current_occupancy, occupancy);
        self.snapshot = Snapshot::from_junction(topology, &gated.step.junction)?;

        // Point sample of the state the step ended in
        let reward = -gated
            .step
            .vehicles
            .iter()
            .map(|v| v.waiting_time)
            .sum::<f64>();
        debug!(
            "Step at {} s: {} substeps, phase {}, reward {}",
            self.snapshot.sim_time, gated.substeps, self.snapshot.this_phase_index, reward
        );

        let info = StepInfo {
            step_time: self.snapshot.sim_time,
            this_phase_index: self.snapshot.this_phase_index,
            phase_occ: self.phase_occupancy()?,
            accumulated_waiting: gated.accumulated_waiting,
            substeps: gated.substeps,
        };
        Ok(StepResult {
            observation: self.observation(),
            reward,
            truncated: gated.step.truncated,
            done: gated.step.done,
            info,
        })
    }

    /// Runs substeps until the controller can perform an action or the episode ends.
    fn run_gating(&mut self, action: Action) -> Result<Gated> {
        let topology = self.topology.as_ref().ok_or(EnvError::NotReset)?;
        let mut substeps = 0;
        let mut accumulated_waiting = 0.0;
        loop {
            let step = self.sim.step(action)?;
            substeps += 1;
            let occupancy = topology.align(
                &step.junction.movement_ids,
                &step.junction.last_step_occupancy,
            )?;
            self.aggregator.record(&occupancy)?;
            accumulated_waiting += step.vehicles.iter().map(|v| v.waiting_time).sum::<f64>();
            if step.junction.can_perform_action || step.done || step.truncated {
                return Ok(Gated {
                    step,
                    substeps,
                    accumulated_waiting,
                });
            }
            if substeps >= self.config.max_gating_substeps {
                return Err(EnvError::GatingStalled { substeps });
            }
        }
    }

    /// Builds the observation from the window and the last snapshot.
    fn observation(&self) -> Observation {
        let masked = match &self.topology {
            Some(topology) => self.mask.columns(topology),
            None => Default::default(),
        };
        Observation {
            history: self.window.snapshot(&masked),
            this_phase: self.snapshot.this_phase.clone(),
            next_phase: self.snapshot.next_phase.clone(),
        }
    }

    /// The current observation.
    pub fn current_observation(&self) -> Result<Observation> {
        self.topology()?;
        Ok(self.observation())
    }

    /// The summed, masked occupancy of each phase.
    fn phase_occupancy(&self) -> Result<Vec<f32>> {
        let topology = self.topology()?;
        let mut occupancy = self.current_occupancy.clone();
        self.mask.apply_in_place(topology, &mut occupancy);
        (0..topology.phase_count())
            .map(|phase| -> Result<f32> {
                let columns = topology.phase_columns(phase)?;
                Ok(columns.iter().map(|idx| occupancy[*idx]).sum())
            })
            .collect()
    }

    /// The actions a decision strategy may choose from, as phase names.
    pub fn available_actions(&self) -> Result<Vec<String>> {
        let topology = self.topology()?;
        Ok((0..topology.phase_count())
            .map(|idx| format!("Phase-{}", idx))
            .collect())
    }

    /// The index of the phase currently shown.
    pub fn current_phase(&self) -> Result<usize> {
        self.topology()?;
        Ok(self.snapshot.this_phase_index)
    }

    /// The signalised movements of the junction.
    pub fn intersection_layout(&self) -> Result<BTreeMap<String, MovementInfo>> {
        Ok(self.topology()?.movement_infos())
    }

    /// The phases of the junction.
    pub fn signal_phase_structure(&self) -> Result<Vec<PhaseInfo>> {
        Ok(self.topology()?.phase_infos())
    }

    /// The occupancy of every signalised movement during the last decision
    /// step in percent, or [FAULT_SENTINEL] where the detector is faulted.
    pub fn current_occupancy(&self) -> Result<BTreeMap<String, f32>> {
        self.occupancy_readings(&self.current_occupancy)
    }

    /// As [current_occupancy](Self::current_occupancy), for the decision step before.
    pub fn previous_occupancy(&self) -> Result<BTreeMap<String, f32>> {
        self.occupancy_readings(&self.previous_occupancy)
    }

    fn occupancy_readings(&self, occupancy: &[f32]) -> Result<BTreeMap<String, f32>> {
        let topology = self.topology()?;
        Ok(topology
            .movements()
            .iter()
            .zip(occupancy)
            .filter(|(movement, _)| movement.is_signalised())
            .map(|(movement, occ)| {
                let value = if self.mask.is_faulted(&movement.key) {
                    FAULT_SENTINEL
                } else {
                    occ * 100.0
                };
                (movement.key.clone(), value)
            })
            .collect())
    }

    /// Whether each signalised movement can flow, judged by the speed limit
    /// of its outgoing edge.
    pub fn movement_passability(&self) -> Result<BTreeMap<String, bool>> {
        let topology = self.topology()?;
        topology
            .movements()
            .iter()
            .filter(|m| m.is_signalised())
            .map(|m| -> Result<(String, bool)> {
                let out_edge = m
                    .out_edge
                    .as_deref()
                    .ok_or(EnvError::MissingMetadata("from_edge_to_edge"))?;
                let speed = self.sim.lane_max_speed(out_edge)?;
                Ok((m.key.clone(), speed > self.config.min_passable_speed))
            })
            .collect()
    }

    /// The working state of the detector of each signalised movement.
    pub fn detector_state(&self) -> Result<BTreeMap<String, DetectorState>> {
        let topology = self.topology()?;
        Ok(topology
            .movements()
            .iter()
            .filter(|m| m.is_signalised())
            .map(|m| {
                let state = if self.mask.is_faulted(&m.key) {
                    DetectorState::NotWork
                } else {
                    DetectorState::Work
                };
                (m.key.clone(), state)
            })
            .collect())
    }

    /// The movements on which a privileged vehicle was detected during the
    /// last substep, in topology order.
    pub fn privileged_movements(&self) -> Result<Vec<String>> {
        let topology = self.topology()?;
        let marker = self.config.privileged_marker.as_str();
        Ok(topology
            .movements()
            .iter()
            .zip(&self.snapshot.vehicle_ids)
            .filter(|(_, ids)| ids.iter().any(|id| id.contains(marker)))
            .map(|(movement, _)| movement.key.clone())
            .collect())
    }

    /// Projects every phase's queue length, assuming only `phase_index` is
    /// shown green. Returned in phase order.
    pub fn predict_future_scene(&mut self, phase_index: usize) -> Result<Vec<ProjectedQueue>> {
        let topology = self.topology()?;
        topology.phase(phase_index)?;
        let stats = phase_queue_lengths(topology, &self.snapshot.jam_lengths);
        Ok(self.projector.project_phases(&stats, phase_index))
    }

    /// Sets the speed limit of an edge, for example to simulate an incident.
    pub fn set_edge_speed(&mut self, edge: &str, speed: f64) -> Result<()> {
        warn!("Setting speed limit of edge {} to {} m/s", edge, speed);
        self.sim.set_edge_speed(edge, speed)?;
        Ok(())
    }

    /// Marks a single movement's detector as faulted, replacing any previous
    /// fault, or clears every fault when `None` is given.
    pub fn set_sensor_fault(&mut self, movement: Option<&str>) {
        match movement {
            Some(movement) => warn!("Detector of movement {} marked as faulted", movement),
            None => info!("All detectors marked as working"),
        }
        self.mask.set_fault(movement);
    }

    /// Marks an additional movement's detector as faulted.
    pub fn add_sensor_fault(&mut self, movement: &str) -> bool {
        warn!("Detector of movement {} marked as faulted", movement);
        self.mask.add_fault(movement)
    }

    /// Marks a movement's detector as working again.
    pub fn clear_sensor_fault(&mut self, movement: &str) -> bool {
        self.mask.clear_fault(movement)
    }

    /// Tears down the simulator. The environment must be reset before further use.
    pub fn close(&mut self) {
        info!("Closing junction {}", self.config.junction_id);
        self.sim.close();
        self.topology = None;
        self.aggregator.clear();
        self.state = EnvState::Unset;
    }
}

impl Snapshot {
    fn from_junction(topology: &StaticTopology, junction: &JunctionState) -> Result<Self> {
        let keys = &junction.movement_ids;
        Ok(Self {
            sim_time: junction.sim_time,
            this_phase_index: junction.this_phase_index,
            this_phase: topology.align(keys, &junction.this_phase)?,
            next_phase: topology.align(keys, &junction.next_phase)?,
            jam_lengths: align_or_default(topology, keys, &junction.jam_length_meters)?,
            vehicle_ids: align_or_default(topology, keys, &junction.last_step_vehicle_id_list)?,
        })
    }
}

/// Aligns an optional positional vector. A simulator which does not report
/// it leaves it empty.
fn align_or_default<T: Clone + Default>(
    topology: &StaticTopology,
    keys: &[String],
    values: &[T],
) -> Result<Vec<T>> {
    if values.is_empty() {
        Ok(vec![T::default(); topology.len()])
    } else {
        topology.align(keys, values)
    }
}

impl Observation {
    /// The number of rows and columns of [to_tensor](Self::to_tensor).
    pub fn dim(&self) -> (usize, usize) {
        let (rows, width) = self.history.dim();
        (rows + 2, width)
    }

    /// Stacks the history, the current phase and the next phase into one
    /// `(history + 2, movements)` array.
    pub fn to_tensor(&self) -> Array2<f32> {
        let (rows, width) = self.history.dim();
        let mut out = Array2::zeros((rows + 2, width));
        for (mut dst, src) in out.rows_mut().into_iter().zip(self.history.rows()) {
            dst.assign(&src);
        }
        for (row, flags) in [(rows, &self.this_phase), (rows + 1, &self.next_phase)] {
            for (dst, flag) in out.row_mut(row).iter_mut().zip(flags) {
                *dst = if *flag { 1.0 } else { 0.0 };
            }
        }
        out
    }
}
