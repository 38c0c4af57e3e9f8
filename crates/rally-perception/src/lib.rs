//! `rally-perception` – turning noisy sensor streams into decisions.
//!
//! # Modules
//!
//! - [`zones`] – [`ZoneDetector`][zones::ZoneDetector]: splits a range scan
//!   into angular zones and answers clearance questions.
//! - [`sampler`] – [`classify`][sampler::classify]: repeated single-frame
//!   classification with early stopping on confidence.
//! - [`debounce`] – [`TargetDebouncer`][debounce::TargetDebouncer]: confirms a
//!   marker identity after enough consecutive sightings, plus the
//!   [`SweepBudget`][debounce::SweepBudget] bounding rotating searches.
//! - [`transform`] – [`TfTree`][transform::TfTree]: named reference frames
//!   and the transforms between them.

pub mod debounce;
pub mod sampler;
pub mod transform;
pub mod zones;
