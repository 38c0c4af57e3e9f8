//! `rally-types` – shared vocabulary of the rally workspace.
//!
//! Sensor readings produced by perception collaborators, actuation commands
//! consumed by drivers, geometry, and the error types every crate returns.

pub mod geometry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use geometry::{normalize_degrees, Pose, Quaternion, Vec3};

// ─────────────────────────────────────────────────────────────────────────────
// Actuation
// ─────────────────────────────────────────────────────────────────────────────

/// Differential-drive velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Forward velocity (m/s); negative reverses.
    pub linear: f32,
    /// Yaw rate (rad/s); positive turns counter-clockwise.
    pub angular: f32,
}

impl VelocityCommand {
    pub fn new(linear: f32, angular: f32) -> Self {
        Self { linear, angular }
    }

    /// The zero command.
    pub fn stop() -> Self {
        Self::default()
    }

    pub fn is_stop(&self) -> bool {
        self.linear == 0.0 && self.angular == 0.0
    }
}

/// The two indicator LEDs on the robot base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Led {
    Led1,
    Led2,
}

/// Colours an indicator LED can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedColor {
    #[default]
    Off,
    Green,
    Orange,
    Red,
}

// ─────────────────────────────────────────────────────────────────────────────
// Perception readings
// ─────────────────────────────────────────────────────────────────────────────

/// Shape label produced by a single-frame classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// The frame held no single recognisable shape.
    Unknown,
    Triangle,
    Square,
    Pentagon,
    Circle,
}

/// Which colour mask a shape classification runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeMask {
    Green,
    Red,
}

/// Line centroid found in the search band of a camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineReading {
    Found {
        cx: f32,
        cy: f32,
        /// Horizontal offset of the centroid from the image centre (pixels).
        error: f32,
    },
    /// No line pixels in the search band (invalid frame).
    Lost,
}

impl LineReading {
    pub fn error(&self) -> Option<f32> {
        match self {
            LineReading::Found { error, .. } => Some(*error),
            LineReading::Lost => None,
        }
    }
}

/// Position of the lowest red stop-line blob in the camera image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StopLine {
    /// Image row of the blob centroid; `None` when no stop line is visible.
    pub row: Option<f32>,
}

/// One sweep of a planar range finder.  Angles are in radians.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeScan {
    pub ranges: Vec<f32>,
    pub angle_min: f32,
    pub angle_max: f32,
    pub angle_increment: f32,
}

/// An AR marker seen in the current camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerObservation {
    pub id: u32,
    /// Marker pose in the camera frame.
    pub pose: Pose,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Wiring or configuration defects.  Always fatal: they indicate a bug in the
/// mission graph or the configuration file, never a runtime condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("state '{0}' is registered twice")]
    DuplicateState(String),

    #[error("state '{from}' transitions to unregistered state '{to}'")]
    UnregisteredState { from: String, to: String },

    #[error("unknown start state '{0}'")]
    UnknownStart(String),

    #[error("state '{state}' has no transition for outcome {outcome}")]
    MissingTransition { state: String, outcome: String },

    #[error("state '{state}' produced or maps undeclared outcome {outcome}")]
    UndeclaredOutcome { state: String, outcome: String },

    #[error("state '{0}' cannot abort: its exit outcome does not reach a terminal")]
    UnreachableExit(String),

    #[error("undefined waypoint '{0}'")]
    UnknownWaypoint(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
}

/// Errors that abort a mission run.
#[derive(Error, Debug)]
pub enum MissionError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Hardware Fault on {component}: {details}")]
    Hardware { component: String, details: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_command_is_zero() {
        assert!(VelocityCommand::stop().is_stop());
        assert!(!VelocityCommand::new(0.0, 0.1).is_stop());
    }

    #[test]
    fn line_reading_error_only_when_found() {
        let found = LineReading::Found {
            cx: 340.0,
            cy: 420.0,
            error: 20.0,
        };
        assert_eq!(found.error(), Some(20.0));
        assert_eq!(LineReading::Lost.error(), None);
    }

    #[test]
    fn shape_serializes_lowercase() {
        let json = serde_json::to_string(&Shape::Pentagon).unwrap();
        assert_eq!(json, "\"pentagon\"");
        let back: Shape = serde_json::from_str("\"circle\"").unwrap();
        assert_eq!(back, Shape::Circle);
    }

    #[test]
    fn mission_error_display() {
        let err: MissionError = ConfigurationError::MissingTransition {
            state: "DRIVE".to_string(),
            outcome: "Advance".to_string(),
        }
        .into();
        assert!(err.to_string().contains("DRIVE"));

        let err2 = MissionError::Hardware {
            component: "drive_base".to_string(),
            details: "motor stalled".to_string(),
        };
        assert!(err2.to_string().contains("drive_base"));
    }
}
