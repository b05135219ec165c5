//! Movements, the atomic units of occupancy measurement.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between the edge and the turn code in a canonical movement key.
const KEY_SEPARATOR: &str = "--";

/// The turning direction of a movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Through,
    Right,
}

impl Direction {
    /// Parses a one letter turn code (`l`, `s` or `r`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "l" => Some(Direction::Left),
            "s" => Some(Direction::Through),
            "r" => Some(Direction::Right),
            _ => None,
        }
    }

    /// The one letter turn code.
    pub fn code(self) -> &'static str {
        match self {
            Direction::Left => "l",
            Direction::Through => "s",
            Direction::Right => "r",
        }
    }

    /// A human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Direction::Left => "Left Turn",
            Direction::Through => "Through",
            Direction::Right => "Right Turn",
        }
    }

    /// Whether the movement is controlled by the signal.
    /// Right turns are always permitted.
    pub fn is_signalised(self) -> bool {
        self != Direction::Right
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Splits a movement key such as `E1--s` or `E1_s` into its edge and direction.
pub fn split_movement_key(key: &str) -> Option<(&str, Direction)> {
    let (edge, code) = key
        .rsplit_once(KEY_SEPARATOR)
        .or_else(|| key.rsplit_once('_'))?;
    if edge.is_empty() {
        return None;
    }
    Direction::from_code(code).map(|dir| (edge, dir))
}

/// Rewrites a movement key into the canonical `<edge>--<code>` form.
/// Keys which can't be parsed are returned unchanged.
pub fn canonical_key(key: &str) -> String {
    match split_movement_key(key) {
        Some((edge, dir)) => format!("{}{}{}", edge, KEY_SEPARATOR, dir.code()),
        None => key.to_string(),
    }
}

/// A directional traffic flow through the junction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    /// The canonical movement key.
    pub key: String,
    /// The incoming edge.
    pub edge: String,
    /// The turning direction.
    pub direction: Direction,
    /// The number of lanes serving the movement.
    pub lanes: u32,
    /// The outgoing edge, if the simulator reported it.
    pub out_edge: Option<String>,
}

impl Movement {
    /// Whether the movement is controlled by the signal.
    pub fn is_signalised(&self) -> bool {
        self.direction.is_signalised()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn split_both_key_styles() {
        assert_eq!(split_movement_key("E1--s"), Some(("E1", Direction::Through)));
        assert_eq!(split_movement_key("-E2_l"), Some(("-E2", Direction::Left)));
        assert_eq!(
            split_movement_key("gsndj_n7--r"),
            Some(("gsndj_n7", Direction::Right))
        );
        assert_eq!(
            split_movement_key("161701303#7.248_s"),
            Some(("161701303#7.248", Direction::Through))
        );
        assert_eq!(split_movement_key("E1"), None);
        assert_eq!(split_movement_key("--s"), None);
        assert_eq!(split_movement_key("E1--x"), None);
    }

    #[test]
    fn canonical_keys() {
        assert_eq!(canonical_key("gsndj_n7_l"), "gsndj_n7--l");
        assert_eq!(canonical_key("E1--s"), "E1--s");
        assert_eq!(canonical_key("bogus"), "bogus");
    }

    #[test]
    fn right_detection_ignores_edge_name() {
        // An `r` in the edge name must not make a movement a right turn.
        let (edge, dir) = split_movement_key("corridor--s").unwrap();
        assert_eq!(edge, "corridor");
        assert!(dir.is_signalised());
    }
}
