//! `rally-middleware` – plumbing between sensor ingestion and the mission.
//!
//! Moves data without caring about its meaning.
//!
//! # Modules
//!
//! - [`feeds`] – single-slot latest-value cells built on Tokio watch
//!   channels, plus the [`SensorFeeds`] bundle the mission reads from.
//! - [`signal`] – [`CancelToken`]: the process-wide cooperative
//!   cancellation flag.

pub mod feeds;
pub mod signal;

pub use feeds::{FeedReader, LatestCell, SensorFeeds, SensorReaders};
pub use signal::CancelToken;
