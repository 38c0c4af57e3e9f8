//! Zone classifier.
//!
//! Splits a planar range scan into equal-width angular sectors ("zones") and
//! reports the nearest valid return in each.  With the standard six zones the
//! sectors are, in ascending angle (negative angles are to the robot's right):
//!
//! | Index | Zone |
//! |---|---|
//! | [`OUTER_RIGHT`] | 0 |
//! | [`RIGHT`] | 1 |
//! | [`INNER_RIGHT`] | 2 |
//! | [`INNER_LEFT`] | 3 |
//! | [`LEFT`] | 4 |
//! | [`OUTER_LEFT`] | 5 |
//!
//! [`ZoneDistances`] answers the clearance questions the mission states ask
//! (is the right side clear, is straight ahead blocked, …) against three
//! independently tunable [`ZoneLimits`].
//!
//! # Example
//!
//! ```rust
//! use rally_perception::zones::{classify, ZONE_NUM};
//!
//! let ranges = vec![2.0_f32; 61];
//! let min = (-30.0_f32).to_radians();
//! let max = 30.0_f32.to_radians();
//! let inc = 1.0_f32.to_radians();
//!
//! let zones = classify(&ranges, min, max, inc, ZONE_NUM);
//! assert_eq!(zones.len(), ZONE_NUM);
//! assert!(zones.iter().all(|d| (*d - 2.0).abs() < 1e-6));
//! ```

use std::ops::RangeInclusive;

use rally_types::RangeScan;
use serde::{Deserialize, Serialize};

pub const ZONE_NUM: usize = 6;

pub const OUTER_RIGHT: usize = 0;
pub const RIGHT: usize = 1;
pub const INNER_RIGHT: usize = 2;
pub const INNER_LEFT: usize = 3;
pub const LEFT: usize = 4;
pub const OUTER_LEFT: usize = 5;

/// Distance reported for a zone with no valid return (metres).
pub const CLEAR_DISTANCE: f32 = 10.0;

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// Angular layout of a scan, as reported by the scanner itself (radians).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanGeometry {
    pub angle_min: f32,
    pub angle_max: f32,
    pub angle_increment: f32,
}

/// Inclusive angular bounds `[left, right]` of one zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneBounds {
    pub left: f32,
    pub right: f32,
}

impl ScanGeometry {
    /// Take the geometry from a scan, or `None` if the scan does not report a
    /// usable one.
    pub fn from_scan(scan: &RangeScan) -> Option<Self> {
        let geometry = Self {
            angle_min: scan.angle_min,
            angle_max: scan.angle_max,
            angle_increment: scan.angle_increment,
        };
        geometry.is_valid().then_some(geometry)
    }

    fn is_valid(&self) -> bool {
        self.angle_increment.is_finite()
            && self.angle_increment > 0.0
            && self.angle_min.is_finite()
            && self.angle_max.is_finite()
            && self.angle_max > self.angle_min
    }

    /// Zone `i` covers `[angle_min + i·span, angle_min + (i+1)·span − increment]`.
    pub fn zone_bounds(&self, zone_count: usize) -> Vec<ZoneBounds> {
        if zone_count == 0 {
            return Vec::new();
        }
        let span = (self.angle_max - self.angle_min) / zone_count as f32;
        (0..zone_count)
            .map(|i| {
                let left = self.angle_min + span * i as f32;
                ZoneBounds {
                    left,
                    right: left + span - self.angle_increment,
                }
            })
            .collect()
    }

    /// Indices into a `len`-long range array whose angles fall in `bounds`.
    ///
    /// Returns `None` when the bounds lie entirely outside the array.
    pub fn index_span(&self, bounds: ZoneBounds, len: usize) -> Option<RangeInclusive<usize>> {
        if len == 0 {
            return None;
        }
        let first = ((bounds.left - self.angle_min) / self.angle_increment).round();
        let last = ((bounds.right - self.angle_min) / self.angle_increment).round();
        if last < 0.0 || first > (len - 1) as f32 || last < first {
            return None;
        }
        let first = first.max(0.0) as usize;
        let last = (last as usize).min(len - 1);
        Some(first..=last)
    }

    /// Nearest valid return in every zone, [`CLEAR_DISTANCE`]-style sentinel
    /// `clear` where a zone has none.
    pub fn zone_distances(&self, ranges: &[f32], zone_count: usize, clear: f32) -> ZoneDistances {
        let distances = self
            .zone_bounds(zone_count)
            .into_iter()
            .map(|bounds| {
                self.index_span(bounds, ranges.len())
                    .map(|span| nearest(&ranges[span], clear))
                    .unwrap_or(clear)
            })
            .collect();
        ZoneDistances(distances)
    }
}

/// Valid returns are finite and strictly positive.
fn nearest(ranges: &[f32], clear: f32) -> f32 {
    ranges
        .iter()
        .copied()
        .filter(|r| r.is_finite() && *r > 0.0)
        .fold(clear, f32::min)
}

/// Nearest obstacle per zone for one scan, using [`CLEAR_DISTANCE`] for empty
/// zones.
pub fn classify(
    ranges: &[f32],
    angle_min: f32,
    angle_max: f32,
    angle_increment: f32,
    zone_count: usize,
) -> Vec<f32> {
    let geometry = ScanGeometry {
        angle_min,
        angle_max,
        angle_increment,
    };
    if !geometry.is_valid() {
        return vec![CLEAR_DISTANCE; zone_count];
    }
    geometry
        .zone_distances(ranges, zone_count, CLEAR_DISTANCE)
        .0
}

// ────────────────────────────────────────────────────────────────────────────
// Predicates
// ────────────────────────────────────────────────────────────────────────────

/// Clearance thresholds (metres), from the widest zones inward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneLimits {
    pub outer: f32,
    pub normal: f32,
    pub inner: f32,
}

impl Default for ZoneLimits {
    fn default() -> Self {
        Self {
            outer: 0.5,
            normal: 0.6,
            inner: 0.8,
        }
    }
}

/// Per-zone nearest distances of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneDistances(pub Vec<f32>);

impl ZoneDistances {
    /// Distance in zone `i`; a missing zone reads as blocked.
    fn at(&self, i: usize) -> f32 {
        self.0.get(i).copied().unwrap_or(0.0)
    }

    pub fn is_right_clear(&self, limits: &ZoneLimits) -> bool {
        self.at(OUTER_RIGHT) >= limits.outer
            && self.at(RIGHT) >= limits.normal
            && self.at(INNER_RIGHT) >= limits.inner
    }

    pub fn is_left_clear(&self, limits: &ZoneLimits) -> bool {
        self.at(OUTER_LEFT) >= limits.outer
            && self.at(LEFT) >= limits.normal
            && self.at(INNER_LEFT) >= limits.inner
    }

    pub fn is_straight_ahead_blocked(&self, limits: &ZoneLimits) -> bool {
        self.at(INNER_LEFT) < limits.inner && self.at(INNER_RIGHT) < limits.inner
    }

    pub fn is_straight_ahead_clear(&self, limits: &ZoneLimits) -> bool {
        self.at(INNER_LEFT) >= limits.inner
            && self.at(LEFT) >= limits.normal
            && self.at(INNER_RIGHT) >= limits.inner
            && self.at(RIGHT) >= limits.normal
    }

    /// Only the two innermost zones need to be clear.
    pub fn is_straight_ahead_clear_nimble(&self, limits: &ZoneLimits) -> bool {
        self.at(INNER_LEFT) >= limits.inner && self.at(INNER_RIGHT) >= limits.inner
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ZoneDetector
// ────────────────────────────────────────────────────────────────────────────

/// Stateful classifier that learns the scanner geometry from the first scan
/// that reports one.
///
/// Until then [`ZoneDetector::process`] returns `None`; afterwards the learned
/// geometry is reused for every scan.
#[derive(Debug, Clone)]
pub struct ZoneDetector {
    geometry: Option<ScanGeometry>,
    zone_count: usize,
    clear_distance: f32,
}

impl ZoneDetector {
    pub fn new(zone_count: usize, clear_distance: f32) -> Self {
        Self {
            geometry: None,
            zone_count,
            clear_distance,
        }
    }

    pub fn geometry(&self) -> Option<ScanGeometry> {
        self.geometry
    }

    pub fn process(&mut self, scan: &RangeScan) -> Option<ZoneDistances> {
        if self.geometry.is_none() {
            self.geometry = ScanGeometry::from_scan(scan);
        }
        let geometry = self.geometry?;
        Some(geometry.zone_distances(&scan.ranges, self.zone_count, self.clear_distance))
    }
}

impl Default for ZoneDetector {
    fn default() -> Self {
        Self::new(ZONE_NUM, CLEAR_DISTANCE)
    }
}
