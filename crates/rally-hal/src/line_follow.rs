//! PD line-following controller.
//!
//! Maps the lateral pixel offset of the line centroid to a velocity command.
//! Gains are divisors, matching how the course was tuned: a larger `k_p`
//! means a gentler response.
//!
//! ```text
//! angular = -(error / k_p) - ((error - previous_error) / k_d)
//! linear  = forward_speed
//! ```
//!
//! When the frame holds no line the controller hands back the call site's
//! [`Recovery`] instead of a PD output.
//!
//! # Example
//!
//! ```rust
//! use rally_hal::line_follow::{LineFollower, LineGains, Recovery, FollowCommand};
//! use rally_types::LineReading;
//!
//! let mut follower = LineFollower::new(LineGains::new(100.0, 100.0, 0.4), Recovery::Hold);
//!
//! let cmd = follower.update(LineReading::Found { cx: 370.0, cy: 420.0, error: 50.0 });
//! // Line to the right of centre → turn clockwise.
//! assert!(cmd.command().angular < 0.0);
//!
//! assert_eq!(follower.update(LineReading::Lost), FollowCommand::Recover(Recovery::Hold));
//! ```

use rally_types::{ConfigurationError, LineReading, VelocityCommand};
use serde::{Deserialize, Serialize};

/// Per-call-site controller tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineGains {
    /// Proportional divisor (pixels per rad/s).
    pub k_p: f32,
    /// Derivative divisor.
    pub k_d: f32,
    /// Forward speed while tracking (m/s).
    pub forward_speed: f32,
}

impl Default for LineGains {
    fn default() -> Self {
        Self {
            k_p: 100.0,
            k_d: 100.0,
            forward_speed: 0.4,
        }
    }
}

impl LineGains {
    pub fn new(k_p: f32, k_d: f32, forward_speed: f32) -> Self {
        Self {
            k_p,
            k_d,
            forward_speed,
        }
    }

    /// Both divisors must be positive and finite.
    pub fn validate(&self, name: &str) -> Result<(), ConfigurationError> {
        for (term, value) in [("k_p", self.k_p), ("k_d", self.k_d)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::InvalidParameter {
                    name: format!("{name}.{term}"),
                    reason: format!("gain must be positive and finite, got {value}"),
                });
            }
        }
        if !self.forward_speed.is_finite() {
            return Err(ConfigurationError::InvalidParameter {
                name: format!("{name}.forward_speed"),
                reason: "speed must be finite".to_string(),
            });
        }
        Ok(())
    }
}

/// What to do on a frame without a line.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recovery {
    /// Keep moving slowly with a constant turn bias.
    Creep { linear: f32, angular: f32 },
    /// Back up for at most `ticks` control ticks.
    Reverse { linear: f32, ticks: u32 },
    /// Stand still.
    #[default]
    Hold,
}

impl Recovery {
    pub fn command(&self) -> VelocityCommand {
        match *self {
            Recovery::Creep { linear, angular } => VelocityCommand::new(linear, angular),
            Recovery::Reverse { linear, .. } => VelocityCommand::new(linear, 0.0),
            Recovery::Hold => VelocityCommand::stop(),
        }
    }
}

/// One PD step.
pub fn step(current_error: f32, previous_error: f32, gains: &LineGains) -> VelocityCommand {
    let proportional = -(current_error / gains.k_p);
    let derivative = -((current_error - previous_error) / gains.k_d);
    VelocityCommand::new(gains.forward_speed, proportional + derivative)
}

/// Output of [`LineFollower::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FollowCommand {
    /// PD output for a frame with a line.
    Track(VelocityCommand),
    /// The configured recovery for a frame without one.
    Recover(Recovery),
}

impl FollowCommand {
    pub fn command(&self) -> VelocityCommand {
        match self {
            FollowCommand::Track(cmd) => *cmd,
            FollowCommand::Recover(recovery) => recovery.command(),
        }
    }

    pub fn is_recovery(&self) -> bool {
        matches!(self, FollowCommand::Recover(_))
    }
}

/// Controller instance owning its derivative memory.
///
/// Build a new one on every state entry; previous error starts at zero.
#[derive(Debug, Clone)]
pub struct LineFollower {
    gains: LineGains,
    recovery: Recovery,
    previous_error: f32,
}

impl LineFollower {
    pub fn new(gains: LineGains, recovery: Recovery) -> Self {
        Self {
            gains,
            recovery,
            previous_error: 0.0,
        }
    }

    pub fn previous_error(&self) -> f32 {
        self.previous_error
    }

    /// Lost frames leave the derivative memory untouched.
    pub fn update(&mut self, reading: LineReading) -> FollowCommand {
        match reading.error() {
            Some(error) => {
                let cmd = step(error, self.previous_error, &self.gains);
                self.previous_error = error;
                FollowCommand::Track(cmd)
            }
            None => FollowCommand::Recover(self.recovery),
        }
    }
}
