//! The mission handle every state runs against.
//!
//! [`Mission`] bundles the robot's collaborators ([`RobotIo`]), the sensor
//! feed readers, the shared [`MissionContext`] and the configuration.  States
//! get `&mut Mission` for the duration of one activation and use the helpers
//! here for the per-tick chores: cancellation checks, driving, signalling and
//! navigation.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use rally_hal::actuation::{display_count, IndicatorSink, SoundSink, VelocitySink};
use rally_hal::navigation::{NavGoal, NavOutcome, Navigator};
use rally_hal::vision::Vision;
use rally_middleware::{CancelToken, SensorReaders};
use rally_perception::sampler::{SamplerConfig, SamplingRun, Verdict};
use rally_perception::transform::{TransformBroadcaster, TransformLookup};
use rally_perception::zones::ZoneDetector;
use rally_types::{LedColor, MarkerObservation, MissionError, Pose, VelocityCommand};
use tracing::{debug, error, info, warn};

use crate::config::MissionConfig;
use crate::context::MissionContext;
use crate::fsm::SafeStop;
use crate::states::Outcome;

/// Odometry frame; the robot pose feed is expressed here.
pub const ODOM_FRAME: &str = "odom";
pub const BASE_FRAME: &str = "base_link";
/// Frame marker observations are reported in.
pub const CAMERA_FRAME: &str = "camera";
/// Frame name the initial pose estimate is published under.
pub const INITIAL_POSE_FRAME: &str = "initialpose";
pub const BOX_LEFT_FRAME: &str = "box_left";
pub const BOX_RIGHT_FRAME: &str = "box_right";

/// Frame name of an anchored AR marker.
pub fn marker_frame(id: u32) -> String {
    format!("ar_marker_{id}")
}

/// How long a state waits for the first odometry message.
const POSE_WAIT: Duration = Duration::from_secs(1);

/// Actuators, navigation, vision and transforms.
pub struct RobotIo {
    pub drive: Box<dyn VelocitySink>,
    pub indicators: Box<dyn IndicatorSink>,
    pub sound: Box<dyn SoundSink>,
    pub navigator: Box<dyn Navigator>,
    pub vision: Box<dyn Vision>,
    pub transforms: Arc<dyn TransformLookup>,
    pub broadcaster: Arc<dyn TransformBroadcaster>,
}

pub struct Mission {
    pub io: RobotIo,
    pub feeds: SensorReaders,
    pub context: MissionContext,
    pub config: MissionConfig,
    cancel: CancelToken,
    zones: ZoneDetector,
}

impl Mission {
    pub fn new(io: RobotIo, feeds: SensorReaders, config: MissionConfig, cancel: CancelToken) -> Self {
        Self {
            io,
            feeds,
            context: MissionContext::new(config.launch.initial_line),
            config,
            cancel,
            zones: ZoneDetector::default(),
        }
    }

    // ── Tick loop ───────────────────────────────────────────────────────────

    pub fn cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleep one control tick.
    pub fn tick(&self) -> tokio::time::Sleep {
        tokio::time::sleep(self.config.tick_period())
    }

    /// Zero velocity, then the exit outcome.
    pub fn abort(&mut self) -> Result<Outcome, MissionError> {
        info!("cancelled; stopping");
        self.stop()?;
        Ok(Outcome::Exit)
    }

    // ── Actuation ───────────────────────────────────────────────────────────

    pub fn drive(&mut self, command: VelocityCommand) -> Result<(), MissionError> {
        debug!(linear = command.linear, angular = command.angular, "cmd_vel");
        self.io.drive.send(command)
    }

    pub fn stop(&mut self) -> Result<(), MissionError> {
        self.drive(VelocityCommand::stop())
    }

    /// Send `command` for `ticks` ticks, then stop.  Returns `false` if the
    /// run was cancelled on the way (the robot is stopped either way).
    pub async fn drive_for(&mut self, command: VelocityCommand, ticks: u32) -> Result<bool, MissionError> {
        for _ in 0..ticks {
            if self.cancelled() {
                self.stop()?;
                return Ok(false);
            }
            self.drive(command)?;
            self.tick().await;
        }
        self.stop()?;
        Ok(true)
    }

    /// Show `count` on the two LEDs.
    pub fn show_count(&mut self, count: u32, primary: LedColor, secondary: LedColor) -> Result<(), MissionError> {
        for (led, color) in display_count(count, primary, secondary) {
            self.io.indicators.set(led, color)?;
        }
        Ok(())
    }

    /// Beep `times` times, `beep_gap` apart.  Returns `false` if the run was
    /// cancelled before the last beep.
    pub async fn beep(&mut self, times: u32) -> Result<bool, MissionError> {
        for i in 0..times {
            if i > 0 {
                tokio::time::sleep(self.config.beep_gap()).await;
            }
            if self.cancelled() {
                return Ok(false);
            }
            self.io.sound.beep()?;
        }
        Ok(true)
    }

    // ── Perception ──────────────────────────────────────────────────────────

    /// Run `sampler` over successive camera frames, one draw per frame
    /// interval.  `None` when the run is cancelled part way.
    pub async fn sample<L, F>(&mut self, sampler: SamplerConfig, mut draw: F) -> Option<Verdict<L>>
    where
        L: Eq + Hash + Clone + Send,
        F: FnMut(&mut dyn Vision) -> L + Send,
    {
        let interval = self.config.sampling.frame_interval();
        let mut run = SamplingRun::new(sampler);
        while !run.is_exhausted() {
            if run.samples() > 0 {
                tokio::time::sleep(interval).await;
            }
            if self.cancelled() {
                debug!(samples = run.samples(), "sampling cancelled");
                return None;
            }
            if let Some(verdict) = run.record(draw(&mut *self.io.vision)) {
                return Some(verdict);
            }
        }
        Some(run.finish())
    }

    /// Latest robot pose in `odom`.
    pub fn pose(&self) -> Option<Pose> {
        self.feeds.odometry.latest()
    }

    /// Latest pose, or the next one to arrive within a second.
    pub async fn wait_for_pose(&mut self) -> Option<Pose> {
        if let Some(pose) = self.pose() {
            return Some(pose);
        }
        self.feeds.odometry.next_within(POSE_WAIT).await
    }

    /// Whether the newest range scan shows the path straight ahead blocked.
    pub fn obstacle_ahead(&mut self) -> bool {
        let Some(scan) = self.feeds.scan.latest() else {
            return false;
        };
        self.zones
            .process(&scan)
            .is_some_and(|zones| zones.is_straight_ahead_blocked(&self.config.zones))
    }

    /// Express a camera-frame marker observation in `frame`.
    pub fn anchor(&self, frame: &str, marker: &MarkerObservation) -> Option<Pose> {
        self.io
            .transforms
            .lookup(frame, CAMERA_FRAME)
            .map(|camera| camera.compose(marker.pose))
    }

    // ── Navigation ──────────────────────────────────────────────────────────

    pub fn waypoint(&self, name: &str) -> Result<Pose, MissionError> {
        Ok(self.config.waypoint(name)?)
    }

    /// Blocks until the navigator answers.  Failures are logged, not raised.
    pub async fn go_to(&mut self, goal: NavGoal) -> NavOutcome {
        info!(target = goal.label(), frame = goal.frame(), "navigating");
        let outcome = self.io.navigator.go_to(&goal).await;
        if !outcome.succeeded() {
            warn!(target = goal.label(), "navigation failed");
        }
        outcome
    }

    pub async fn go_to_waypoint(&mut self, name: &str) -> Result<NavOutcome, MissionError> {
        let pose = self.waypoint(name)?;
        Ok(self.go_to(NavGoal::waypoint(name, pose)).await)
    }
}

impl SafeStop for Mission {
    fn safe_stop(&mut self) {
        if let Err(e) = self.io.drive.send(VelocityCommand::stop()) {
            error!(error = %e, "safe stop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::{Engine, GraphBuilder, Next, Terminal};
    use crate::states::{Advance, AtLine, Drive};
    use crate::testkit::Harness;
    use rally_types::{Led, LineReading, StopLine};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn beeps_are_spaced_and_counted() {
        let mut harness = Harness::new();
        let start = Instant::now();
        assert!(harness.mission.beep(3).await.unwrap());
        assert_eq!(harness.sound.beeps(), 3);
        assert_eq!(start.elapsed(), harness.mission.config.beep_gap() * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn beeping_stops_when_cancelled() {
        let mut harness = Harness::new();
        let gap = harness.mission.config.beep_gap();
        let cancel = harness.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(gap + gap / 2).await;
            cancel.cancel();
        });

        let finished = harness.mission.beep(5).await.unwrap();
        assert!(!finished);
        assert_eq!(harness.sound.beeps(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_draws_one_frame_per_interval() {
        let mut harness = Harness::new();
        let interval = harness.mission.config.sampling.frame_interval();
        let stamps: Arc<Mutex<Vec<Instant>>> = Arc::default();
        let seen = Arc::clone(&stamps);

        let verdict = harness
            .mission
            .sample(SamplerConfig::new(5, 5, 1.0), move |vision| {
                seen.lock().unwrap().push(Instant::now());
                vision.count_objects()
            })
            .await
            .unwrap();

        assert_eq!(verdict.samples, 5);
        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 5);
        for pair in stamps.windows(2) {
            assert_eq!(pair[1] - pair[0], interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sampling_stops_when_cancelled() {
        let mut harness = Harness::new();
        let interval = harness.mission.config.sampling.frame_interval();
        let cancel = harness.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(interval * 3 + interval / 2).await;
            cancel.cancel();
        });

        let draws = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&draws);
        let verdict = harness
            .mission
            .sample(SamplerConfig::new(100, 100, 1.0), move |vision| {
                *counter.lock().unwrap() += 1;
                vision.count_objects()
            })
            .await;

        assert!(verdict.is_none());
        assert_eq!(*draws.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn sampling_skips_draws_once_cancelled() {
        let mut harness = Harness::new();
        harness.cancel.cancel();
        let verdict = harness
            .mission
            .sample(SamplerConfig::new(3, 3, 1.0), |_: &mut dyn Vision| -> u32 {
                panic!("no draw after cancellation")
            })
            .await;
        assert!(verdict.is_none());
    }

    #[tokio::test]
    async fn show_count_lights_both_leds() {
        let mut harness = Harness::new();
        harness
            .mission
            .show_count(3, LedColor::Orange, LedColor::Green)
            .unwrap();
        assert_eq!(harness.lights.color(Led::Led1), LedColor::Orange);
        assert_eq!(harness.lights.color(Led::Led2), LedColor::Green);
    }

    #[tokio::test(start_paused = true)]
    async fn drive_for_stops_on_cancel() {
        let mut harness = Harness::new();
        harness.cancel.cancel();
        let finished = harness
            .mission
            .drive_for(VelocityCommand::new(-0.3, 0.0), 10)
            .await
            .unwrap();
        assert!(!finished);
        assert_eq!(harness.drive.commands(), vec![VelocityCommand::stop()]);
    }

    #[tokio::test]
    async fn unknown_waypoint_is_configuration_error() {
        let mut harness = Harness::new();
        let err = harness.mission.go_to_waypoint("nowhere").await.unwrap_err();
        assert!(matches!(err, MissionError::Configuration(_)));
        assert!(harness.nav.goals().is_empty());
    }

    #[tokio::test]
    async fn obstacle_detection_uses_zone_limits() {
        let mut harness = Harness::new();
        assert!(!harness.mission.obstacle_ahead(), "no scan yet");

        harness.feeds.scan.publish(Harness::scan_with_front(0.3));
        assert!(harness.mission.obstacle_ahead());

        harness.feeds.scan.publish(Harness::scan_with_front(3.0));
        assert!(!harness.mission.obstacle_ahead());
    }

    #[tokio::test]
    async fn safe_stop_sends_zero_velocity() {
        let mut harness = Harness::new();
        harness.mission.drive(VelocityCommand::new(0.4, 0.1)).unwrap();
        harness.mission.safe_stop();
        assert!(harness.drive.last().unwrap().is_stop());
    }

    /// DRIVE → ADVANCE → AT_LINE with cancellation arriving during ADVANCE.
    #[tokio::test(start_paused = true)]
    async fn cancellation_during_advance_stops_within_one_tick() {
        let mut harness = Harness::new();
        let period = harness.mission.config.tick_period();
        let approach = harness.mission.config.line.approach_row;

        let graph = GraphBuilder::new()
            .add(
                "DRIVE",
                Drive,
                [
                    (Outcome::Advance, Next::to("ADVANCE")),
                    (Outcome::Exit, Next::EXIT),
                ],
            )
            .add(
                "ADVANCE",
                Advance,
                [
                    (Outcome::AtLine, Next::to("AT_LINE")),
                    (Outcome::Exit, Next::EXIT),
                ],
            )
            .add(
                "AT_LINE",
                AtLine::new(Vec::new()),
                [(Outcome::Finish, Next::COMPLETE), (Outcome::Exit, Next::EXIT)],
            )
            .build()
            .unwrap();
        let mut engine = Engine::new(graph);

        // Keep the line in view and the stop line at the approach row.
        let feeds = harness.feeds.clone();
        let publisher = tokio::spawn(async move {
            loop {
                feeds.line.publish(LineReading::Found {
                    cx: 320.0,
                    cy: 400.0,
                    error: 0.0,
                });
                feeds.stop_line.publish(StopLine {
                    row: Some(approach + 5.0),
                });
                tokio::time::sleep(period / 2).await;
            }
        });

        let cancelled_at: Arc<Mutex<Option<Instant>>> = Arc::default();
        let mut observer = engine.observer();
        let cancel = harness.cancel.clone();
        let stamp = Arc::clone(&cancelled_at);
        let canceller = tokio::spawn(async move {
            while observer.changed().await.is_ok() {
                if observer.borrow_and_update().as_deref() == Some("ADVANCE") {
                    // Let ADVANCE run a couple of ticks first.
                    tokio::time::sleep(period * 2).await;
                    *stamp.lock().unwrap() = Some(Instant::now());
                    cancel.cancel();
                    break;
                }
            }
        });

        let terminal = engine.run("DRIVE", &mut harness.mission).await.unwrap();
        let finished_at = Instant::now();
        publisher.abort();
        canceller.await.unwrap();

        assert_eq!(terminal, Terminal::Exit);
        let cancelled_at = cancelled_at.lock().unwrap().expect("cancel fired");
        assert!(finished_at.duration_since(cancelled_at) <= period);

        let commands = harness.drive.commands();
        assert!(commands.iter().any(|c| c.linear > 0.0), "advance crept forward");
        assert!(commands.last().unwrap().is_stop());
    }
}
