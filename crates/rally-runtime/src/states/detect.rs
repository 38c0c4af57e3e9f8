//! Vision stops: counting objects, studying and matching shapes, parking.
//!
//! All four states sample the single-shot classifier through the confidence
//! sampler.  A verdict that did not converge is never an error; each state
//! decides how far to trust it.

use async_trait::async_trait;
use rally_types::{LedColor, MissionError, Shape, ShapeMask, VelocityCommand};
use tracing::{info, warn};

use crate::fsm::State;
use crate::mission::Mission;
use crate::states::{Outcome, LOCATION3_STOPS};

/// Parking spots searched by [`ShapeScan`], in order.
pub const PARKING_SPOTS: [&str; 3] = ["8", "7", "6"];

/// Sample the object count; a missing verdict reads as zero.  `None` when
/// cancelled.
async fn sample_count(m: &mut Mission) -> Option<u32> {
    let sampler = m.config.sampling.count;
    let verdict = m.sample(sampler, |vision| vision.count_objects()).await?;
    let count = match verdict.label {
        Some(count) => {
            if !verdict.converged {
                warn!(count, samples = verdict.samples, "object count below confidence");
            }
            count
        }
        None => {
            warn!(samples = verdict.samples, "object count undecided; showing zero");
            0
        }
    };
    Some(count)
}

/// Show and beep `count`.  `false` when cancelled while beeping.
async fn announce_count(m: &mut Mission, count: u32) -> Result<bool, MissionError> {
    m.context.object_count = Some(count);
    info!(count, "objects counted");
    m.show_count(count, LedColor::Green, LedColor::Orange)?;
    m.beep(count).await
}

// ─────────────────────────────────────────────────────────────────────────────
// DETECT1
// ─────────────────────────────────────────────────────────────────────────────

pub struct CountObjects;

#[async_trait]
impl State<Mission, Outcome> for CountObjects {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::TurnRight, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        if m.cancelled() {
            return m.abort();
        }
        m.stop()?;
        let Some(count) = sample_count(m).await else {
            return m.abort();
        };
        if !announce_count(m, count).await? {
            return m.abort();
        }
        Ok(Outcome::TurnRight)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DETECT2
// ─────────────────────────────────────────────────────────────────────────────

/// Learn the green shape and count the objects beside it.
pub struct StudyObjects;

#[async_trait]
impl State<Mission, Outcome> for StudyObjects {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::Turn180, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        if m.cancelled() {
            return m.abort();
        }
        m.stop()?;

        let sampler = m.config.sampling.green_shape;
        let Some(verdict) = m
            .sample(sampler, |vision| vision.classify_shape(ShapeMask::Green))
            .await
        else {
            return m.abort();
        };
        match verdict.label {
            Some(shape) if shape != Shape::Unknown => {
                if !verdict.converged {
                    warn!(?shape, samples = verdict.samples, "green shape below confidence");
                }
                info!(?shape, "green shape studied");
                m.context.shape = Some(shape);
            }
            _ => {
                warn!(samples = verdict.samples, "green shape undecided; nothing to match later");
                m.context.shape = None;
            }
        }

        let Some(count) = sample_count(m).await else {
            return m.abort();
        };
        if !announce_count(m, count).await? {
            return m.abort();
        }
        Ok(Outcome::Turn180)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DETECT3
// ─────────────────────────────────────────────────────────────────────────────

/// Compare the red shape at a location-3 stop against the studied shape.
pub struct MatchShape;

#[async_trait]
impl State<Mission, Outcome> for MatchShape {
    fn outcomes(&self) -> Vec<Outcome> {
        LOCATION3_STOPS
            .iter()
            .map(|k| Outcome::TurnRight3(*k))
            .chain([Outcome::Exit])
            .collect()
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        if m.cancelled() {
            return m.abort();
        }
        m.stop()?;

        let stop = m.context.location3_stop.unwrap_or_else(|| {
            warn!("no location-3 stop recorded; assuming the first");
            1
        });

        let sampler = m.config.sampling.red_shape;
        let Some(verdict) = m
            .sample(sampler, |vision| vision.classify_shape(ShapeMask::Red))
            .await
        else {
            return m.abort();
        };
        let matched = verdict
            .label
            .is_some_and(|shape| m.context.matches_shape(shape));
        if !verdict.converged {
            warn!(stop, samples = verdict.samples, "red shape below confidence");
        }

        if matched {
            info!(stop, shape = ?verdict.label, "shape matches");
            m.show_count(1, LedColor::Red, LedColor::Off)?;
            if !m.beep(1).await? {
                return m.abort();
            }
        } else {
            m.show_count(0, LedColor::Off, LedColor::Off)?;
        }
        Ok(Outcome::TurnRight3(stop.clamp(1, 3)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SHAPE_SCAN
// ─────────────────────────────────────────────────────────────────────────────

/// Visit the parking spots and pull into the one showing the studied shape.
pub struct ShapeScan;

#[async_trait]
impl State<Mission, Outcome> for ShapeScan {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::Done, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        let signal = m.config.signal;
        let sampler = m.config.sampling.red_shape;

        for spot in PARKING_SPOTS {
            m.go_to_waypoint(spot).await?;
            if m.cancelled() {
                return m.abort();
            }
            let back = VelocityCommand::new(-signal.park_speed, 0.0);
            if !m.drive_for(back, signal.park_ticks).await? {
                return m.abort();
            }

            let Some(verdict) = m
                .sample(sampler, |vision| vision.classify_shape(ShapeMask::Red))
                .await
            else {
                return m.abort();
            };
            if !verdict.converged {
                warn!(spot, samples = verdict.samples, "spot shape below confidence; skipping");
                continue;
            }
            let Some(shape) = verdict.label.filter(|s| m.context.matches_shape(*s)) else {
                continue;
            };

            info!(spot, ?shape, "parking spot found");
            m.show_count(2, LedColor::Orange, LedColor::Orange)?;
            if !m.beep(1).await? {
                return m.abort();
            }
            let pull_in = VelocityCommand::new(signal.park_speed, 0.0);
            if !m.drive_for(pull_in, signal.park_ticks).await? {
                return m.abort();
            }
            m.show_count(3, LedColor::Orange, LedColor::Green)?;
            return Ok(Outcome::Done);
        }

        warn!("no parking spot matched");
        Ok(Outcome::Done)
    }
}
