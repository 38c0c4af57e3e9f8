//! In-place rotation by a signed angle, closed on odometry yaw.

use async_trait::async_trait;
use rally_types::{normalize_degrees, MissionError, VelocityCommand};
use tracing::{debug, info, warn};

use crate::fsm::State;
use crate::mission::Mission;
use crate::states::Outcome;

/// Below this remaining angle the turn rate ramps down.
const SLOWDOWN_DEG: f32 = 30.0;
/// Smallest fraction of the configured turn rate.
const MIN_RATE: f32 = 0.25;

/// How far to turn, in degrees, positive counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurnAngle {
    Fixed(f32),
    /// Picked by the active location-3 stop.
    PerStop([f32; 3]),
}

pub struct Turn {
    angle: TurnAngle,
    outcome: Outcome,
}

impl Turn {
    pub fn by(degrees: f32, outcome: Outcome) -> Self {
        Self {
            angle: TurnAngle::Fixed(degrees),
            outcome,
        }
    }

    pub fn per_stop(degrees: [f32; 3], outcome: Outcome) -> Self {
        Self {
            angle: TurnAngle::PerStop(degrees),
            outcome,
        }
    }

    fn degrees(&self, m: &Mission) -> f32 {
        match self.angle {
            TurnAngle::Fixed(degrees) => degrees,
            TurnAngle::PerStop(per_stop) => {
                let stop = m.context.location3_stop.unwrap_or_else(|| {
                    warn!("no location-3 stop recorded; using the first");
                    1
                });
                per_stop[usize::from(stop.clamp(1, 3)) - 1]
            }
        }
    }
}

#[async_trait]
impl State<Mission, Outcome> for Turn {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![self.outcome, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        let turn = m.config.turn;
        let degrees = self.degrees(m);

        let Some(start) = m.wait_for_pose().await else {
            warn!(degrees, "no odometry; skipping turn");
            return Ok(self.outcome);
        };
        let start_yaw = start.yaw_degrees();
        let target = normalize_degrees(start_yaw + degrees);
        debug!(start_yaw, target, "turning");

        for _ in 0..turn.max_ticks {
            if m.cancelled() {
                return m.abort();
            }
            let yaw = m.pose().map_or(start_yaw, |p| p.yaw_degrees());
            let remaining = normalize_degrees(target - yaw);
            if remaining.abs() <= turn.tolerance_deg {
                m.stop()?;
                info!(degrees, yaw, "turn complete");
                return Ok(self.outcome);
            }
            let rate = (remaining.abs() / SLOWDOWN_DEG).clamp(MIN_RATE, 1.0);
            m.drive(VelocityCommand::new(0.0, (turn.angular_speed * rate).copysign(remaining)))?;
            m.tick().await;
        }

        m.stop()?;
        warn!(degrees, "turn did not settle within its tick budget");
        Ok(self.outcome)
    }
}
