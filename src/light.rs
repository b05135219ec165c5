use std::cell::Cell;

/// The signal controller of a junction, cycling between phases.
///
/// Only one phase is shown at a time. A phase change passes through an amber
/// clearance interval, during which no new action is accepted.
#[derive(Clone, Debug)]
pub struct SignalController {
    /// The phases.
    phases: Vec<PhaseLight>,
    /// The phase that has been requested.
    target: usize,
    /// The number of frames the target phase has been green since the last request.
    held: usize,
    /// The duration of the amber interval in frames.
    amber_time: usize,
    /// The number of green frames each request is held for.
    green_time: usize,
}

/// The light of a single phase.
#[derive(Clone, Debug)]
struct PhaseLight {
    /// The current state.
    state: LightState,
    /// The next state.
    next_state: Cell<LightState>,
    /// The number of frames since the current state was entered.
    since: usize,
}

/// The state of a phase's light.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightState {
    Red,
    Amber,
    Green,
}

impl SignalController {
    /// Creates a controller showing phase 0, ready for an action.
    ///
    /// # Panics
    /// If `phase_count` is zero.
    pub fn new(phase_count: usize, amber_time: usize, green_time: usize) -> Self {
        assert!(phase_count > 0, "Signal controller must have at least one phase");
        let phases = (0..phase_count)
            .map(|idx| {
                let state = if idx == 0 {
                    LightState::Green
                } else {
                    LightState::Red
                };
                PhaseLight {
                    state,
                    next_state: Cell::new(state),
                    since: green_time,
                }
            })
            .collect();
        Self {
            phases,
            target: 0,
            held: green_time,
            amber_time,
            green_time,
        }
    }

    /// The number of phases.
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Requests that a phase be shown. Requesting the current phase holds it
    /// for another `green_time` frames.
    pub fn request(&mut self, phase: usize) {
        if phase < self.phases.len() {
            self.target = phase;
            self.held = 0;
        }
    }

    /// Advances the light timing by one frame.
    pub fn step(&mut self) {
        for (idx, phase) in self.phases.iter().enumerate() {
            use LightState::*;
            let active = idx == self.target;
            let next = match (active, phase.state) {
                (false, Green) => Amber,
                (false, Amber) if phase.since >= self.amber_time => Red,
                (true, Red) if self.all_others_red(idx) => Green,
                (_, state) => state,
            };
            phase.next_state.set(next);
        }
        for phase in &mut self.phases {
            phase.step();
        }
        if self.phases[self.target].state == LightState::Green {
            self.held += 1;
        }
    }

    /// Whether the controller will accept a new action.
    pub fn can_perform_action(&self) -> bool {
        self.phases[self.target].state == LightState::Green && self.held >= self.green_time
    }

    /// The phase currently shown: the green phase, or the phase clearing
    /// through amber, or the requested phase while all lights are red.
    pub fn current_phase(&self) -> usize {
        self.phases
            .iter()
            .position(|p| p.state == LightState::Green)
            .or_else(|| self.phases.iter().position(|p| p.state == LightState::Amber))
            .unwrap_or(self.target)
    }

    /// The phase after the current one in the cycle.
    pub fn next_phase(&self) -> usize {
        (self.current_phase() + 1) % self.phases.len()
    }

    /// Whether the given phase is green.
    pub fn is_green(&self, phase: usize) -> bool {
        self.state(phase) == Some(LightState::Green)
    }

    /// Gets the state of a phase's light.
    pub fn state(&self, phase: usize) -> Option<LightState> {
        self.phases.get(phase).map(|p| p.state)
    }

    /// Checks that every other phase has cleared to red.
    fn all_others_red(&self, phase: usize) -> bool {
        self.phases
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != phase)
            .all(|(_, p)| p.state == LightState::Red)
    }
}

impl PhaseLight {
    fn step(&mut self) {
        if self.next_state.get() != self.state {
            self.state = self.next_state.get();
            self.since = 1;
        } else {
            self.since += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn starts_ready_on_phase_zero() {
        let light = SignalController::new(4, 3, 5);
        assert!(light.can_perform_action());
        assert_eq!(light.current_phase(), 0);
        assert_eq!(light.next_phase(), 1);
    }

    #[test]
    fn hold_waits_for_green_time() {
        let mut light = SignalController::new(2, 3, 5);
        light.request(0);
        let mut frames = 0;
        while !light.can_perform_action() {
            light.step();
            frames += 1;
        }
        assert_eq!(frames, 5);
        assert!(light.is_green(0));
    }

    #[test]
    fn change_passes_through_amber() {
        let mut light = SignalController::new(2, 3, 5);
        light.request(1);

        light.step();
        assert_eq!(light.state(0), Some(LightState::Amber));
        assert_eq!(light.current_phase(), 0);
        assert!(!light.can_perform_action());

        let mut frames = 1;
        while !light.can_perform_action() {
            light.step();
            frames += 1;
            assert!(!(light.is_green(0) && light.is_green(1)));
        }
        // 3 amber frames, 1 all-red frame, 5 green frames
        assert_eq!(frames, 9);
        assert_eq!(light.state(0), Some(LightState::Red));
        assert_eq!(light.current_phase(), 1);
    }
}
