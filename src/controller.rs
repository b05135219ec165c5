
use crate::env::StepInfo;
use crate::junction::Action;

/// The default cycle length of [FixedTime], in s.
pub const DEFAULT_CYCLE: f64 = 30.0; // s

/// A decision strategy choosing an action from the last step's information.
pub trait Controller {
    /// Chooses the next action.
    fn decide(&mut self, info: &StepInfo) -> Action;

    /// Forgets any state kept from a previous episode.
    fn reset(&mut self) {}
}

/// Advances to the next phase once every `cycle` seconds.
#[derive(Clone, Debug)]
pub struct FixedTime {
    /// The time each phase is held, in s.
    cycle: f64,
    /// The simulation time of the last phase change, in s.
    last_change: f64,
}

impl FixedTime {
    /// Creates a controller holding each phase for `cycle` seconds.
    pub fn new(cycle: f64) -> Self {
        Self {
            cycle,
            last_change: 0.0,
        }
    }
}

impl Default for FixedTime {
    fn default() -> Self {
        Self::new(DEFAULT_CYCLE)
    }
}

impl Controller for FixedTime {
    fn decide(&mut self, info: &StepInfo) -> Action {
        if info.step_time - self.last_change >= self.cycle {
            self.last_change = info.step_time;
            Action::Next
        } else {
            Action::Hold
        }
    }

    fn reset(&mut self) {
        self.last_change = 0.0;
    }
}

/// Self-organising traffic light: advances when the next phase is more
/// occupied than the current one.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sotl;

impl Controller for Sotl {
    fn decide(&mut self, info: &StepInfo) -> Action {
        let phase_count = info.phase_occ.len();
        if phase_count == 0 {
            return Action::Hold;
        }
        let this = info.phase_occ[info.this_phase_index % phase_count];
        let next = info.phase_occ[(info.this_phase_index + 1) % phase_count];
        if next > this {
            Action::Next
        } else {
            Action::Hold
        }
    }
}
