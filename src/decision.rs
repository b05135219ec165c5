
use crate::junction::{Action, ActionType};
use log::warn;

/// The outcome of parsing a decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// A validated phase index.
    Phase(usize),
    /// The decision could not be turned into a phase index.
    Invalid(String),
}

/// Parses the phase index out of a decision text.
///
/// The last run of ASCII digits in the text is taken as the phase index, so
/// both `"2"` and `"Decision: phase 2"` select phase 2.
pub fn parse_decision(text: &str, phase_count: usize) -> Decision {
    let digits = text
        .rsplit(|c: char| !c.is_ascii_digit())
        .find(|part| !part.is_empty());
    let digits = match digits {
        Some(digits) => digits,
        None => return Decision::Invalid(format!("no phase index in {:?}", text)),
    };
    match digits.parse::<usize>() {
        Ok(index) if index < phase_count => Decision::Phase(index),
        Ok(index) => Decision::Invalid(format!(
            "phase {} does not exist, the junction has {} phases",
            index, phase_count
        )),
        Err(err) => Decision::Invalid(format!("bad phase index {:?}: {}", digits, err)),
    }
}

impl Decision {
    /// Whether the decision selected a valid phase.
    pub fn is_valid(&self) -> bool {
        matches!(self, Decision::Phase(_))
    }

    /// Converts the decision into an action.
    ///
    /// An invalid decision always holds the current phase.
    pub fn into_action(self, current_phase: usize, action_type: ActionType) -> Action {
        match (self, action_type) {
            (Decision::Phase(index), ActionType::ChooseNextPhase) => Action::SetPhase(index),
            (Decision::Phase(index), ActionType::NextOrNot) if index == current_phase => {
                Action::Hold
            }
            (Decision::Phase(_), ActionType::NextOrNot) => Action::Next,
            (Decision::Invalid(reason), action_type) => {
                warn!("Invalid decision ({}), holding phase {}", reason, current_phase);
                action_type.hold(current_phase)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn takes_last_number() {
        assert_eq!(parse_decision("2", 4), Decision::Phase(2));
        assert_eq!(parse_decision("Phase 1 is busy, choose phase 3", 4), Decision::Phase(3));
        assert_eq!(parse_decision("phase 0.", 4), Decision::Phase(0));
    }

    #[test]
    fn rejects_bad_decisions() {
        assert!(!parse_decision("keep the current phase", 4).is_valid());
        assert!(!parse_decision("", 4).is_valid());
        assert!(!parse_decision("phase 7", 4).is_valid());
        assert!(!parse_decision("99999999999999999999999", 4).is_valid());
    }

    #[test]
    fn invalid_decision_holds() {
        let invalid = parse_decision("no idea", 4);
        assert_eq!(
            invalid.clone().into_action(2, ActionType::ChooseNextPhase),
            Action::SetPhase(2)
        );
        assert_eq!(invalid.into_action(2, ActionType::NextOrNot), Action::Hold);
    }

    #[test]
    fn valid_decision_under_next_or_not() {
        assert_eq!(
            Decision::Phase(1).into_action(1, ActionType::NextOrNot),
            Action::Hold
        );
        assert_eq!(
            Decision::Phase(2).into_action(1, ActionType::NextOrNot),
            Action::Next
        );
        assert_eq!(
            Decision::Phase(2).into_action(1, ActionType::ChooseNextPhase),
            Action::SetPhase(2)
        );
    }
}
