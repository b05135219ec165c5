use crate::config::ScenarioConfig;
use crate::error::SimulatorError;
use crate::junction::{Action, JunctionState, SimStep, Simulator, VehicleState};
use crate::light::SignalController;
use crate::movement::{split_movement_key, Direction};
use crate::vehicle::{Vehicle, VehicleAttributes};
use crate::{VehicleId, VehicleSet};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use std::collections::{HashMap, VecDeque};

/// The duration of one simulation frame.
const FRAME_SEC: f64 = 1.0; // s

/// The marker in the name of privileged vehicles.
const PRIVILEGED_MARKER: &str = "rescue";

/// A coarse queue-based simulation of a single signalised junction.
///
/// Each movement holds a queue of stopped vehicles. Vehicles arrive by a
/// Poisson process and leave at the saturation flow while their movement
/// has a green light. Right turns are never held by the signal.
pub struct JunctionSimulation {
    /// The scenario being simulated.
    config: ScenarioConfig,
    /// The signal controller.
    light: SignalController,
    /// The static description of each movement.
    movements: Vec<MovementLane>,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The speed limit of each edge in m/s.
    edge_speeds: HashMap<String, f64>,
    /// The random source for arrivals.
    rng: StdRng,
    /// The current frame of simulation.
    frame: usize,
    /// The next sequence number.
    seq: usize,
    /// Whether the simulation has been reset since it was created or closed.
    started: bool,
}

/// A movement's queue and its static attributes.
struct MovementLane {
    /// The movement key.
    key: String,
    /// The incoming edge.
    edge: String,
    /// The outgoing edge.
    out_edge: String,
    /// The turning direction.
    direction: Direction,
    /// The number of lanes.
    lanes: u32,
    /// The phase which gives the movement a green light.
    phase: Option<usize>,
    /// The arrival process, if vehicles arrive at all.
    arrivals: Option<Poisson<f64>>,
    /// The queued vehicles, front of the queue first.
    queue: VecDeque<VehicleId>,
    /// Discharge capacity carried between frames, in vehicles.
    discharge: f64,
}

impl JunctionSimulation {
    /// Creates a simulation of the given scenario. It must be reset before it is stepped.
    pub fn new(config: ScenarioConfig) -> Result<Self, SimulatorError> {
        config
            .validate()
            .map_err(|err| SimulatorError::InvalidScenario(err.to_string()))?;
        let movements = config
            .movements
            .iter()
            .map(|spec| {
                let (edge, direction) = split_movement_key(&spec.key).ok_or_else(|| {
                    SimulatorError::Backend(format!("malformed movement key {:?}", spec.key))
                })?;
                let phase = config
                    .phases
                    .iter()
                    .position(|phase| phase.iter().any(|key| *key == spec.key));
                let arrivals = if spec.arrival_rate > 0.0 {
                    Some(
                        Poisson::new(spec.arrival_rate)
                            .map_err(|err| SimulatorError::Backend(err.to_string()))?,
                    )
                } else {
                    None
                };
                Ok(MovementLane {
                    key: spec.key.clone(),
                    edge: edge.to_string(),
                    out_edge: spec.out_edge.clone(),
                    direction,
                    lanes: spec.lanes,
                    phase,
                    arrivals,
                    queue: VecDeque::new(),
                    discharge: 0.0,
                })
            })
            .collect::<Result<Vec<_>, SimulatorError>>()?;
        let phase_count = config.phases.len().max(1);
        Ok(Self {
            light: SignalController::new(phase_count, config.amber_time, config.green_time),
            rng: StdRng::seed_from_u64(config.seed),
            edge_speeds: Self::default_speeds(&config, &movements),
            config,
            movements,
            vehicles: VehicleSet::default(),
            frame: 0,
            seq: 0,
            started: false,
        })
    }

    /// Gets the current simulation frame index.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Returns an iterator over all the vehicles in the simulation.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, vehicle_id: VehicleId) -> &Vehicle {
        &self.vehicles[vehicle_id]
    }

    /// The number of vehicles queued on each movement.
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.movements.iter().map(|m| m.queue.len()).collect()
    }

    /// Adds a vehicle to the back of a movement's queue.
    pub fn add_vehicle(&mut self, movement: usize, privileged: bool) -> Option<VehicleId> {
        let lane = self.movements.get_mut(movement)?;
        let seq = self.seq;
        self.seq += 1;
        let vehicle_id = self.vehicles.insert_with_key(|id| {
            Vehicle::new(
                id,
                &VehicleAttributes {
                    seq,
                    movement,
                    privileged,
                    privileged_marker: PRIVILEGED_MARKER,
                },
            )
        });
        lane.queue.push_back(vehicle_id);
        Some(vehicle_id)
    }

    /// Every edge starts at the scenario's speed limit.
    fn default_speeds(config: &ScenarioConfig, movements: &[MovementLane]) -> HashMap<String, f64> {
        movements
            .iter()
            .flat_map(|m| [m.edge.clone(), m.out_edge.clone()])
            .map(|edge| (edge, config.speed_limit))
            .collect()
    }

    /// Forwards an action to the signal controller, if it will accept one.
    fn apply_action(&mut self, action: Action) -> Result<(), SimulatorError> {
        let phase_count = self.light.phase_count();
        if let Action::SetPhase(phase) = action {
            if phase >= phase_count {
                return Err(SimulatorError::InvalidAction(phase));
            }
        }
        if !self.light.can_perform_action() {
            return Ok(());
        }
        let phase = match action {
            Action::SetPhase(phase) => phase,
            Action::Next => self.light.next_phase(),
            Action::Hold => self.light.current_phase(),
        };
        self.light.request(phase);
        Ok(())
    }

    /// Whether a movement may currently discharge.
    fn has_green(&self, lane: &MovementLane) -> bool {
        !lane.direction.is_signalised() || lane.phase.map_or(true, |p| self.light.is_green(p))
    }

    /// Removes vehicles from the front of each queue with a green light.
    fn discharge_vehicles(&mut self) {
        for idx in 0..self.movements.len() {
            let green = self.has_green(&self.movements[idx]);
            let speed = self
                .edge_speeds
                .get(&self.movements[idx].out_edge)
                .copied()
                .unwrap_or(self.config.speed_limit);
            let throttle = (speed / self.config.speed_limit).clamp(0.0, 1.0);
            let lane = &mut self.movements[idx];
            if !green || lane.queue.is_empty() {
                lane.discharge = 0.0;
                continue;
            }
            lane.discharge += self.config.saturation_flow * lane.lanes as f64 * throttle;
            while lane.discharge >= 1.0 {
                match lane.queue.pop_front() {
                    Some(vehicle_id) => {
                        self.vehicles.remove(vehicle_id);
                        lane.discharge -= 1.0;
                    }
                    None => {
                        lane.discharge = 0.0;
                        break;
                    }
                }
            }
        }
    }

    /// Accumulates the waiting time of every queued vehicle.
    fn update_waiting(&mut self) {
        for (_, vehicle) in &mut self.vehicles {
            vehicle.wait(FRAME_SEC);
        }
    }

    /// Samples new arrivals on every movement.
    fn add_arrivals(&mut self) {
        for idx in 0..self.movements.len() {
            let count = match &self.movements[idx].arrivals {
                Some(arrivals) => arrivals.sample(&mut self.rng) as usize,
                None => 0,
            };
            for _ in 0..count {
                let privileged = self.rng.gen_bool(self.config.rescue_probability);
                self.add_vehicle(idx, privileged);
            }
        }
    }

    /// Builds the junction state reported to the environment.
    fn junction_state(&self) -> JunctionState {
        let current = self.light.current_phase();
        let next = self.light.next_phase();
        let mut state = JunctionState {
            can_perform_action: self.light.can_perform_action(),
            this_phase_index: current,
            sim_time: self.frame as f64 * FRAME_SEC,
            ..Default::default()
        };
        for (idx, phase) in self.config.phases.iter().enumerate() {
            state.phase2movements.insert(idx, phase.clone());
        }
        for lane in &self.movements {
            let lanes = lane.lanes as f64;
            let queued = lane.queue.len() as f64 * self.config.vehicle_spacing;
            let detected =
                (self.config.detector_length * lanes / self.config.vehicle_spacing) as usize;

            state.movement_ids.push(lane.key.clone());
            state.movement_directions.insert(lane.key.clone(), lane.direction);
            state.movement_lane_numbers.insert(lane.key.clone(), lane.lanes);
            state
                .from_edge_to_edge
                .insert(lane.key.clone(), (lane.edge.clone(), lane.out_edge.clone()));
            state.last_step_occupancy.push(
                f64::min(100.0 * queued / (self.config.detector_length * lanes), 100.0) as f32,
            );
            state.jam_length_meters.push((queued / lanes) as f32);
            state.last_step_vehicle_id_list.push(
                lane.queue
                    .iter()
                    .take(detected)
                    .map(|id| self.vehicles[*id].name().to_string())
                    .collect(),
            );
            state.this_phase.push(lane.phase == Some(current));
            state.next_phase.push(lane.phase == Some(next));
        }
        state
    }
}

impl Simulator for JunctionSimulation {
    fn reset(&mut self) -> Result<JunctionState, SimulatorError> {
        self.light = SignalController::new(
            self.light.phase_count(),
            self.config.amber_time,
            self.config.green_time,
        );
        self.vehicles.clear();
        for lane in &mut self.movements {
            lane.queue.clear();
            lane.discharge = 0.0;
        }
        self.edge_speeds = Self::default_speeds(&self.config, &self.movements);
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.frame = 0;
        self.seq = 0;
        self.started = true;
        debug!("Junction {} reset", self.config.junction_id);
        Ok(self.junction_state())
    }

    fn step(&mut self, action: Action) -> Result<SimStep, SimulatorError> {
        if !self.started {
            return Err(SimulatorError::NotStarted);
        }
        if self.frame >= self.config.num_seconds {
            return Err(SimulatorError::Finished);
        }
        self.apply_action(action)?;
        self.light.step();
        self.discharge_vehicles();
        self.update_waiting();
        self.add_arrivals();
        self.frame += 1;

        let truncated = self.frame >= self.config.num_seconds;
        Ok(SimStep {
            junction: self.junction_state(),
            vehicles: self
                .vehicles
                .values()
                .map(|v| VehicleState {
                    id: v.name().to_string(),
                    waiting_time: v.waiting_time(),
                })
                .collect(),
            done: truncated,
            truncated,
        })
    }

    fn set_edge_speed(&mut self, edge: &str, speed: f64) -> Result<(), SimulatorError> {
        match self.edge_speeds.get_mut(edge) {
            Some(limit) => {
                warn!("Speed limit of edge {} set to {} m/s", edge, speed);
                *limit = speed.max(0.0);
                Ok(())
            }
            None => Err(SimulatorError::UnknownEdge(edge.to_string())),
        }
    }

    fn lane_max_speed(&self, edge: &str) -> Result<f64, SimulatorError> {
        self.edge_speeds
            .get(edge)
            .copied()
            .ok_or_else(|| SimulatorError::UnknownEdge(edge.to_string()))
    }

    fn close(&mut self) {
        self.vehicles.clear();
        for lane in &mut self.movements {
            lane.queue.clear();
        }
        self.started = false;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::MovementSpec;
    use assert_approx_eq::assert_approx_eq;

    /// Two opposing through movements, each in its own phase, with no arrivals.
    fn crossing() -> ScenarioConfig {
        let movement = |key: &str, out_edge: &str| MovementSpec {
            key: key.to_string(),
            out_edge: out_edge.to_string(),
            lanes: 1,
            arrival_rate: 0.0,
        };
        ScenarioConfig {
            movements: vec![movement("A--s", "B"), movement("C--s", "D")],
            phases: vec![vec!["A--s".to_string()], vec!["C--s".to_string()]],
            num_seconds: 100,
            amber_time: 3,
            green_time: 5,
            saturation_flow: 1.0,
            detector_length: 30.0,
            vehicle_spacing: 7.5,
            rescue_probability: 0.0,
            ..ScenarioConfig::four_way()
        }
    }

    #[test]
    fn rejects_invalid_scenario() {
        for rescue_probability in [1.5, -0.1, f64::NAN] {
            let config = ScenarioConfig {
                rescue_probability,
                ..ScenarioConfig::four_way()
            };
            assert!(matches!(
                JunctionSimulation::new(config),
                Err(SimulatorError::InvalidScenario(_))
            ));
        }
        let config = ScenarioConfig {
            phases: vec![],
            ..crossing()
        };
        assert!(JunctionSimulation::new(config).is_err());
    }

    #[test]
    fn step_before_reset_fails() {
        let mut sim = JunctionSimulation::new(crossing()).unwrap();
        assert_eq!(sim.step(Action::Hold), Err(SimulatorError::NotStarted));
    }

    #[test]
    fn reset_reports_topology() {
        let mut sim = JunctionSimulation::new(ScenarioConfig::four_way()).unwrap();
        let state = sim.reset().unwrap();
        assert_eq!(state.movement_ids.len(), 12);
        assert_eq!(state.phase2movements.len(), 4);
        assert_eq!(state.movement_lane_numbers["E1--s"], 2);
        assert_eq!(
            state.from_edge_to_edge["E1--s"],
            ("E1".to_string(), "E2".to_string())
        );
        assert!(state.can_perform_action);
        assert!(state.last_step_occupancy.iter().all(|o| *o == 0.0));
    }

    #[test]
    fn red_movement_queues_and_waits() {
        let mut sim = JunctionSimulation::new(crossing()).unwrap();
        sim.reset().unwrap();
        // Phase 0 is green, so C--s is held
        sim.add_vehicle(1, false);
        sim.add_vehicle(1, true);
        let step = sim.step(Action::Hold).unwrap();
        assert_eq!(sim.queue_lengths(), vec![0, 2]);
        // 2 vehicles * 7.5 m over a 30 m detector
        assert_approx_eq!(step.junction.last_step_occupancy[1], 50.0);
        assert_approx_eq!(step.junction.jam_length_meters[1], 15.0);
        assert_eq!(
            step.junction.last_step_vehicle_id_list[1],
            vec!["veh_0".to_string(), "rescue_1".to_string()]
        );
        assert_eq!(step.vehicles.len(), 2);
        assert!(step.vehicles.iter().all(|v| v.waiting_time == FRAME_SEC));
    }

    #[test]
    fn green_movement_discharges() {
        let mut sim = JunctionSimulation::new(crossing()).unwrap();
        sim.reset().unwrap();
        sim.add_vehicle(0, false);
        sim.add_vehicle(0, false);
        sim.step(Action::Hold).unwrap();
        assert_eq!(sim.queue_lengths(), vec![1, 0]);
        sim.step(Action::Hold).unwrap();
        assert_eq!(sim.queue_lengths(), vec![0, 0]);
    }

    #[test]
    fn blocked_exit_stops_discharge() {
        let mut sim = JunctionSimulation::new(crossing()).unwrap();
        sim.reset().unwrap();
        sim.set_edge_speed("B", 0.0).unwrap();
        assert_eq!(sim.lane_max_speed("B"), Ok(0.0));
        sim.add_vehicle(0, false);
        for _ in 0..5 {
            sim.step(Action::Hold).unwrap();
        }
        assert_eq!(sim.queue_lengths(), vec![1, 0]);
        assert_eq!(
            sim.set_edge_speed("Z", 1.0),
            Err(SimulatorError::UnknownEdge("Z".to_string()))
        );
    }

    #[test]
    fn phase_change_reports_gating() {
        let mut sim = JunctionSimulation::new(crossing()).unwrap();
        sim.reset().unwrap();
        let mut substeps = 0;
        loop {
            let step = sim.step(Action::SetPhase(1)).unwrap();
            substeps += 1;
            if step.junction.can_perform_action {
                assert_eq!(step.junction.this_phase_index, 1);
                assert_eq!(step.junction.this_phase, vec![false, true]);
                assert_eq!(step.junction.next_phase, vec![true, false]);
                break;
            }
        }
        assert_eq!(substeps, 9);
        assert_eq!(
            sim.step(Action::SetPhase(2)),
            Err(SimulatorError::InvalidAction(2))
        );
    }

    #[test]
    fn episode_ends_after_num_seconds() {
        let mut config = crossing();
        config.num_seconds = 3;
        let mut sim = JunctionSimulation::new(config).unwrap();
        sim.reset().unwrap();
        assert!(!sim.step(Action::Hold).unwrap().done);
        assert!(!sim.step(Action::Hold).unwrap().done);
        let last = sim.step(Action::Hold).unwrap();
        assert!(last.done && last.truncated);
        assert_eq!(sim.step(Action::Hold), Err(SimulatorError::Finished));
    }

    #[test]
    fn seeded_arrivals_repeat() {
        let run = || {
            let mut sim = JunctionSimulation::new(ScenarioConfig::four_way()).unwrap();
            sim.reset().unwrap();
            for _ in 0..50 {
                sim.step(Action::Hold).unwrap();
            }
            sim.queue_lengths()
        };
        assert_eq!(run(), run());
    }
}
