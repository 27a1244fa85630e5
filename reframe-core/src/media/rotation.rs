//! Rotation normalization.
//!
//! Probing tools report rotation in several shapes: a `rotate` tag string
//! ("90", "-90"), a display-matrix angle (`-90.00`), or a float from the
//! media-inspection tool ("270.000"). Everything downstream works with the
//! closed set {0, 90, 180, 270}; this module is the only place raw angles are
//! turned into that set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::Degradable;

/// Clockwise rotation that must be applied for upright display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    /// True when the rotation swaps width and height.
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }

    pub fn is_none(self) -> bool {
        self == Rotation::None
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Cw90),
            180 => Ok(Rotation::Cw180),
            270 => Ok(Rotation::Cw270),
            other => Err(format!("rotation {other} is not a multiple of 90 in [0, 360)")),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Maps any finite angle to the nearest quarter turn in [0, 360).
///
/// Non-finite input maps to `Rotation::None`.
pub fn normalize_rotation(angle: f64) -> Rotation {
    if !angle.is_finite() {
        return Rotation::None;
    }
    let quarter_turns = (angle / 90.0).round();
    let degrees = (quarter_turns * 90.0).rem_euclid(360.0) as u16;
    Rotation::try_from(degrees).unwrap_or_default()
}

/// Normalizes a rotation value as it appears in tool output.
///
/// Accepts numbers and numeric strings. A missing, non-numeric or non-finite
/// value yields `Rotation::None` as a degraded result, and the condition is
/// logged.
pub fn normalize_rotation_value(raw: Option<&Value>) -> Degradable<Rotation> {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(angle) if angle.is_finite() => Degradable::Ok(normalize_rotation(angle)),
        _ => {
            let reason = match raw {
                None => "rotation value missing".to_string(),
                Some(value) => format!("rotation value {value} is not numeric"),
            };
            log::warn!("Metadata degraded: {}; assuming 0°", reason);
            Degradable::Degraded {
                value: Rotation::None,
                reason,
            }
        }
    }
}
