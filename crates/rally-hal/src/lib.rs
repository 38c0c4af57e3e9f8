//! `rally-hal` – the robot's edges.
//!
//! Traits for everything the mission drives or asks (drive base, LEDs,
//! buzzer, navigation, vision), the line-following controller that turns a
//! camera offset into a drive command, and simulated implementations for
//! headless runs.
//!
//! # Modules
//!
//! - [`actuation`] – [`VelocitySink`][actuation::VelocitySink],
//!   [`IndicatorSink`][actuation::IndicatorSink],
//!   [`SoundSink`][actuation::SoundSink] and the LED count convention.
//! - [`navigation`] – [`Navigator`][navigation::Navigator]: blocking
//!   go-to-pose requests.
//! - [`vision`] – [`Vision`][vision::Vision]: single-shot shape and object
//!   count classifier.
//! - [`line_follow`] – [`LineFollower`][line_follow::LineFollower]: PD
//!   controller with per-call-site recovery.
//! - [`sim`] – recording stand-ins for all of the above.

pub mod actuation;
pub mod line_follow;
pub mod navigation;
pub mod sim;
pub mod vision;
