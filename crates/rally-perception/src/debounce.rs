//! [`TargetDebouncer`] – marker identity confirmation.
//!
//! Marker detections flicker: a frame may miss the marker or briefly report
//! a neighbour.  The debouncer tracks one candidate id and counts how many
//! consecutive readings repeated it.  A candidate is *confirmed* once its
//! repetition count reaches the threshold and it passes the optional
//! [`TargetFilter`].
//!
//! Rotating searches pair the debouncer with a [`SweepBudget`] so that an
//! episode gives up after a bounded amount of rotation.
//!
//! # Example
//!
//! ```rust
//! use rally_perception::debounce::TargetDebouncer;
//!
//! let mut tracker = TargetDebouncer::new(2);
//! tracker.observe(Some(7));
//! tracker.observe(Some(7));
//! assert_eq!(tracker.confirmed(), None);
//! tracker.observe(Some(7));
//! assert_eq!(tracker.confirmed(), Some(7));
//!
//! tracker.observe(None); // marker lost → start over
//! assert_eq!(tracker.state(), (None, 0));
//! ```

use std::collections::BTreeSet;

use rally_types::{normalize_degrees, MarkerObservation};
use tracing::debug;

/// Which ids may be confirmed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetFilter {
    /// When set, only these ids can be confirmed.
    pub allowed: Option<BTreeSet<u32>>,
    /// An id that was already claimed (e.g. the box marker); readings skip it.
    pub excluded: Option<u32>,
}

impl TargetFilter {
    fn admits(&self, id: u32) -> bool {
        self.excluded != Some(id) && self.allowed.as_ref().is_none_or(|set| set.contains(&id))
    }
}

/// Consecutive-repetition tracker for noisy identity observations.
#[derive(Debug, Clone)]
pub struct TargetDebouncer {
    tracked: Option<u32>,
    repetitions: u32,
    threshold: u32,
    filter: TargetFilter,
}

impl TargetDebouncer {
    /// A debouncer confirming after `threshold` repetitions, with no filter.
    pub fn new(threshold: u32) -> Self {
        Self {
            tracked: None,
            repetitions: 0,
            threshold,
            filter: TargetFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: TargetFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Current `(tracked id, repetitions)`.
    pub fn state(&self) -> (Option<u32>, u32) {
        (self.tracked, self.repetitions)
    }

    /// Feed one observation (`None` = nothing detected this reading).
    pub fn observe(&mut self, candidate: Option<u32>) -> (Option<u32>, u32) {
        match candidate {
            None => {
                self.tracked = None;
                self.repetitions = 0;
            }
            Some(id) if self.tracked == Some(id) => {
                self.repetitions += 1;
            }
            Some(id) => {
                debug!(id, previous = ?self.tracked, "new marker candidate");
                self.tracked = Some(id);
                self.repetitions = 0;
            }
        }
        self.state()
    }

    /// Feed a whole detection reading.  Only its first entry that is not the
    /// excluded id is considered; an empty reading resets the tracker.  A
    /// reading made only of excluded ids leaves the state untouched.
    pub fn observe_reading(&mut self, reading: &[MarkerObservation]) -> (Option<u32>, u32) {
        if reading.is_empty() {
            return self.observe(None);
        }
        match reading
            .iter()
            .map(|m| m.id)
            .find(|id| self.filter.excluded != Some(*id))
        {
            Some(id) => self.observe(Some(id)),
            None => self.state(),
        }
    }

    /// The tracked id once it has been repeated `threshold` times and passes
    /// the filter.
    pub fn confirmed(&self) -> Option<u32> {
        self.tracked
            .filter(|id| self.repetitions >= self.threshold && self.filter.admits(*id))
    }

    /// Forget the tracked candidate (start of a new tracking episode).
    pub fn reset(&mut self) {
        self.tracked = None;
        self.repetitions = 0;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SweepBudget
// ────────────────────────────────────────────────────────────────────────────

/// Accumulates absolute heading change during a rotating search.
#[derive(Debug, Clone)]
pub struct SweepBudget {
    limit_deg: f32,
    last_yaw_deg: Option<f32>,
    swept_deg: f32,
}

impl SweepBudget {
    pub fn new(limit_deg: f32) -> Self {
        Self {
            limit_deg,
            last_yaw_deg: None,
            swept_deg: 0.0,
        }
    }

    /// Record the current heading.  Returns `false` once the accumulated
    /// sweep exceeds the limit.
    pub fn update(&mut self, yaw_deg: f32) -> bool {
        if let Some(last) = self.last_yaw_deg {
            self.swept_deg += normalize_degrees(yaw_deg - last).abs();
        }
        self.last_yaw_deg = Some(yaw_deg);
        !self.exhausted()
    }

    pub fn swept(&self) -> f32 {
        self.swept_deg
    }

    pub fn exhausted(&self) -> bool {
        self.swept_deg > self.limit_deg
    }
}
