//! Mission configuration: launch selection, waypoints and the threshold table.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration.  Loading from disk and environment overrides live in the
//! CLI; this module only defines the shape and [`MissionConfig::validate`].
//!
//! ```toml
//! tick_hz = 10.0
//!
//! [launch]
//! course = "ultra"
//! initial_line = 0
//! skip_push = false
//!
//! [waypoints.scan_east]
//! x = 1.2
//! y = -0.8
//! yaw_deg = 90.0
//!
//! [line.drive]
//! k_p = 100.0
//! k_d = 100.0
//! forward_speed = 0.4
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use rally_hal::line_follow::{LineGains, Recovery};
use rally_perception::sampler::SamplerConfig;
use rally_perception::zones::ZoneLimits;
use rally_types::{ConfigurationError, Pose};
use serde::{Deserialize, Serialize};

/// Which mission graph to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Course {
    /// Short course: line, turns and detection stops.
    Racer,
    /// Extended course with the ramp, parking, box and tag search.
    #[default]
    Ultra,
}

impl std::fmt::Display for Course {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Course::Racer => write!(f, "racer"),
            Course::Ultra => write!(f, "ultra"),
        }
    }
}

impl FromStr for Course {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "racer" => Ok(Course::Racer),
            "ultra" => Ok(Course::Ultra),
            other => Err(ConfigurationError::InvalidParameter {
                name: "launch.course".to_string(),
                reason: format!("unknown course `{other}` (expected racer or ultra)"),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    pub course: Course,
    /// Course plan index `AT_LINE` starts from.
    pub initial_line: usize,
    /// Found tags go straight to the ramp without pushing the box.
    pub skip_push: bool,
}

/// A named pose in the `map` frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub yaw_deg: f32,
}

impl Waypoint {
    pub const fn new(x: f32, y: f32, yaw_deg: f32) -> Self {
        Self { x, y, yaw_deg }
    }

    pub fn pose(&self) -> Pose {
        Pose::planar(self.x, self.y, self.yaw_deg)
    }
}

/// Survey layout of the extended course.
fn default_waypoints() -> BTreeMap<String, Waypoint> {
    [
        ("off_ramp", Waypoint::new(3.15, 0.05, 180.0)),
        ("8", Waypoint::new(2.35, 1.60, 90.0)),
        ("7", Waypoint::new(1.60, 1.60, 90.0)),
        ("6", Waypoint::new(0.85, 1.60, 90.0)),
        ("box_vantage", Waypoint::new(1.10, 0.40, -90.0)),
        ("scan_east", Waypoint::new(1.85, -0.60, 0.0)),
        ("scan_west", Waypoint::new(0.55, -0.60, 180.0)),
        ("scan_westest", Waypoint::new(0.10, -0.20, 180.0)),
        ("on_ramp", Waypoint::new(0.10, 0.60, 90.0)),
        ("3", Waypoint::new(1.20, -1.25, -90.0)),
    ]
    .into_iter()
    .map(|(name, wp)| (name.to_string(), wp))
    .collect()
}

/// Line-following stages, stop-line rows and creep settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    pub drive: LineGains,
    pub drive_recovery: Recovery,
    /// Stop-line row (pixels from the top) at which `DRIVE` hands over.
    pub approach_row: f32,
    /// Creep speed while the stop line passes under the camera.
    pub advance_speed: f32,
    /// Row past which the stop line counts as crossed.
    pub stop_row: f32,
    pub advance_max_ticks: u32,
    /// Ticks `AT_LINE` stands still before emitting the next plan entry.
    pub line_pause_ticks: u32,
    pub to_objects: LineGains,
    pub to_objects_recovery: Recovery,
    pub from_objects: LineGains,
    pub from_objects_recovery: Recovery,
    pub from_objects_row: f32,
    pub ramp: LineGains,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            drive: LineGains::new(100.0, 100.0, 0.4),
            drive_recovery: Recovery::Creep {
                linear: 0.2,
                angular: 0.0,
            },
            approach_row: 360.0,
            advance_speed: 0.2,
            stop_row: 460.0,
            advance_max_ticks: 30,
            line_pause_ticks: 50,
            to_objects: LineGains::new(100.0, 100.0, 0.4),
            to_objects_recovery: Recovery::Reverse {
                linear: -0.4,
                ticks: 3,
            },
            from_objects: LineGains::new(150.0, 225.0, 0.4),
            from_objects_recovery: Recovery::Creep {
                linear: 0.075,
                angular: -0.2,
            },
            from_objects_row: 400.0,
            ramp: LineGains::new(100.0, 100.0, 0.3),
        }
    }
}

/// Confidence sampler settings per call site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Wait between draws, roughly one camera frame.
    pub frame_interval_ms: u64,
    pub count: SamplerConfig,
    pub green_shape: SamplerConfig,
    pub red_shape: SamplerConfig,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 33,
            count: SamplerConfig::new(30, 30, 0.6),
            green_shape: SamplerConfig::new(25, 100, 0.65),
            red_shape: SamplerConfig::new(10, 60, 0.5),
        }
    }
}

impl SamplingConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Marker search thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub box_repetitions: u32,
    pub tag_repetitions: u32,
    /// Ids a tag scan may confirm.
    pub allowed_ids: Vec<u32>,
    /// Rotation speed while searching (rad/s).
    pub search_angular: f32,
    pub box_sweep_deg: f32,
    pub east_sweep_deg: f32,
    pub west_sweep_deg: f32,
    /// Offset of the box side frames from the box marker: standoff in front
    /// of the face and lateral shift to each side (metres).
    pub side_standoff: f32,
    pub side_offset: f32,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            box_repetitions: 4,
            tag_repetitions: 3,
            allowed_ids: vec![1, 2, 3, 4, 5],
            search_angular: 0.3,
            box_sweep_deg: 360.0,
            east_sweep_deg: 104.0,
            west_sweep_deg: 150.0,
            side_standoff: 0.45,
            side_offset: 0.55,
        }
    }
}

/// In-place turns.  Angles in degrees, positive counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub angular_speed: f32,
    pub tolerance_deg: f32,
    pub max_ticks: u32,
    pub left_1: f32,
    pub right_1: f32,
    pub left_2_start: f32,
    pub turn_180: f32,
    pub left_2_end: f32,
    pub adjust_3: f32,
    /// One angle per location-3 stop.
    pub left_3: [f32; 3],
    pub right_3: [f32; 3],
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            angular_speed: 0.8,
            tolerance_deg: 3.0,
            max_ticks: 150,
            left_1: 60.0,
            right_1: -60.0,
            left_2_start: 64.0,
            turn_180: 130.0,
            left_2_end: 43.0,
            adjust_3: 15.0,
            left_3: [65.0, 70.0, 73.0],
            right_3: [-68.0, -70.0, -69.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub speed: f32,
    /// Heading-hold gain (rad/s per degree of drift).
    pub heading_gain: f32,
    /// Lateral distance to the target at which pushing stops (metres).
    pub stop_distance: f32,
    pub max_ticks: u32,
    pub reverse_speed: f32,
    pub reverse_ticks: u32,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            speed: 0.24,
            heading_gain: 0.01,
            stop_distance: 0.45,
            max_ticks: 150,
            reverse_speed: -0.3,
            reverse_ticks: 12,
        }
    }
}

/// Beeps, parking manoeuvre and initial-pose publication.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Pause between consecutive beeps (milliseconds).
    pub beep_gap_ms: u64,
    pub park_speed: f32,
    pub park_ticks: u32,
    /// How often the initial pose estimate is broadcast after the ramp.
    pub initial_pose_repeats: u32,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            beep_gap_ms: 300,
            park_speed: 0.2,
            park_ticks: 3,
            initial_pose_repeats: 3,
        }
    }
}

/// Accepted control loop rates.
pub const MIN_TICK_HZ: f64 = 0.5;
pub const MAX_TICK_HZ: f64 = 1000.0;

/// Top-level mission configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Control loop frequency inside states.
    pub tick_hz: f32,
    pub launch: LaunchConfig,
    pub waypoints: BTreeMap<String, Waypoint>,
    pub zones: ZoneLimits,
    pub line: LineConfig,
    pub sampling: SamplingConfig,
    pub markers: MarkerConfig,
    pub turn: TurnConfig,
    pub push: PushConfig,
    pub signal: SignalConfig,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            tick_hz: 10.0,
            launch: LaunchConfig::default(),
            waypoints: default_waypoints(),
            zones: ZoneLimits::default(),
            line: LineConfig::default(),
            sampling: SamplingConfig::default(),
            markers: MarkerConfig::default(),
            turn: TurnConfig::default(),
            push: PushConfig::default(),
            signal: SignalConfig::default(),
        }
    }
}

impl MissionConfig {
    /// Control tick length.  Rates outside the validated range are clamped.
    pub fn tick_period(&self) -> Duration {
        let hz = f64::from(self.tick_hz);
        let hz = if hz.is_nan() { MIN_TICK_HZ } else { hz.clamp(MIN_TICK_HZ, MAX_TICK_HZ) };
        Duration::from_secs_f64(1.0 / hz)
    }

    pub fn beep_gap(&self) -> Duration {
        Duration::from_millis(self.signal.beep_gap_ms)
    }

    /// Look up a waypoint pose in `map`.
    pub fn waypoint(&self, name: &str) -> Result<Pose, ConfigurationError> {
        self.waypoints
            .get(name)
            .map(Waypoint::pose)
            .ok_or_else(|| ConfigurationError::UnknownWaypoint(name.to_string()))
    }

    /// Check gains, sampler bounds and loop rates.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let hz = f64::from(self.tick_hz);
        if !(MIN_TICK_HZ..=MAX_TICK_HZ).contains(&hz) {
            return Err(invalid(
                "tick_hz",
                format!("must be within {MIN_TICK_HZ}..={MAX_TICK_HZ}, got {}", self.tick_hz),
            ));
        }
        if self.sampling.frame_interval_ms == 0 {
            return Err(invalid("sampling.frame_interval_ms", "must be at least 1"));
        }

        for (name, gains) in [
            ("line.drive", &self.line.drive),
            ("line.to_objects", &self.line.to_objects),
            ("line.from_objects", &self.line.from_objects),
            ("line.ramp", &self.line.ramp),
        ] {
            gains.validate(name)?;
        }

        for (name, sampler) in [
            ("sampling.count", &self.sampling.count),
            ("sampling.green_shape", &self.sampling.green_shape),
            ("sampling.red_shape", &self.sampling.red_shape),
        ] {
            validate_sampler(name, sampler)?;
        }

        for (name, value) in [
            ("markers.box_sweep_deg", self.markers.box_sweep_deg),
            ("markers.east_sweep_deg", self.markers.east_sweep_deg),
            ("markers.west_sweep_deg", self.markers.west_sweep_deg),
            ("turn.angular_speed", self.turn.angular_speed),
            ("turn.tolerance_deg", self.turn.tolerance_deg),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(name, format!("must be positive, got {value}")));
            }
        }

        if self.markers.box_repetitions == 0 || self.markers.tag_repetitions == 0 {
            return Err(invalid("markers", "repetition thresholds must be at least 1"));
        }
        Ok(())
    }
}

fn validate_sampler(name: &str, sampler: &SamplerConfig) -> Result<(), ConfigurationError> {
    if sampler.max_samples == 0 || sampler.min_samples > sampler.max_samples {
        return Err(invalid(
            name,
            format!(
                "need 0 < min_samples <= max_samples, got {}..{}",
                sampler.min_samples, sampler.max_samples
            ),
        ));
    }
    if !(sampler.confidence > 0.0 && sampler.confidence <= 1.0) {
        return Err(invalid(
            name,
            format!("confidence must be in (0, 1], got {}", sampler.confidence),
        ));
    }
    Ok(())
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidParameter {
        name: name.to_string(),
        reason: reason.into(),
    }
}
