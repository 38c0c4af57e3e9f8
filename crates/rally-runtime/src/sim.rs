//! Headless course simulation.
//!
//! * [`SimWorld`] – the robot's true pose, published as odometry and as the
//!   `odom → base_link` transform.
//! * [`KinematicDrive`] – a unicycle drive base integrating every velocity
//!   command over one control tick.
//! * [`TeleportNavigator`] – resolves each goal through the transform tree and
//!   moves the robot there instantly.
//! * [`SyntheticCourse`] – publishes line, stop-line, ramp, scan and marker
//!   readings that fit whichever state is active, so a full mission can run
//!   end to end without a camera.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rally_hal::actuation::VelocitySink;
use rally_hal::navigation::{NavGoal, NavOutcome, Navigator, MAP_FRAME};
use rally_hal::sim::{RecordingDrive, SimNavigator};
use rally_middleware::SensorFeeds;
use rally_perception::transform::{SharedTfTree, TransformBroadcaster, TransformLookup};
use rally_types::{
    LineReading, MarkerObservation, MissionError, Pose, Quaternion, RangeScan, StopLine, Vec3,
    VelocityCommand,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::mission::{BASE_FRAME, CAMERA_FRAME, ODOM_FRAME};

/// Camera mount ahead of the base centre (metres).
const CAMERA_OFFSET: f32 = 0.1;

// ─────────────────────────────────────────────────────────────────────────────
// World
// ─────────────────────────────────────────────────────────────────────────────

/// Ground-truth robot pose shared by the simulated collaborators.
#[derive(Debug, Clone)]
pub struct SimWorld {
    feeds: SensorFeeds,
    tf: SharedTfTree,
    pose: Arc<Mutex<Pose>>,
    dt: f32,
}

impl SimWorld {
    /// A robot at the `odom` origin; `map` and `odom` coincide.
    pub fn new(feeds: SensorFeeds, tf: SharedTfTree, tick: Duration) -> Self {
        tf.broadcast(MAP_FRAME, ODOM_FRAME, Pose::identity());
        tf.broadcast(BASE_FRAME, CAMERA_FRAME, Pose::planar(CAMERA_OFFSET, 0.0, 0.0));
        let world = Self {
            feeds,
            tf,
            pose: Arc::new(Mutex::new(Pose::identity())),
            dt: tick.as_secs_f32(),
        };
        world.set_pose(Pose::identity());
        world
    }

    pub fn pose(&self) -> Pose {
        match self.pose.lock() {
            Ok(pose) => *pose,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Place the robot at `pose` in `odom`.
    pub fn set_pose(&self, pose: Pose) {
        match self.pose.lock() {
            Ok(mut current) => *current = pose,
            Err(poisoned) => *poisoned.into_inner() = pose,
        }
        self.feeds.odometry.publish(pose);
        self.tf.broadcast(ODOM_FRAME, BASE_FRAME, pose);
    }

    /// Apply `command` for one tick.
    fn integrate(&self, command: VelocityCommand) {
        let pose = self.pose();
        let yaw = pose.orientation.yaw() + command.angular * self.dt;
        let distance = command.linear * self.dt;
        let position = Vec3::new(
            pose.position.x + distance * yaw.cos(),
            pose.position.y + distance * yaw.sin(),
            pose.position.z,
        );
        self.set_pose(Pose::new(position, Quaternion::from_yaw(yaw)));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Drive and navigation
// ─────────────────────────────────────────────────────────────────────────────

/// Records commands like [`RecordingDrive`] and moves the world.
pub struct KinematicDrive {
    world: SimWorld,
    recorder: RecordingDrive,
}

impl KinematicDrive {
    pub fn new(world: SimWorld, recorder: RecordingDrive) -> Self {
        Self { world, recorder }
    }
}

impl VelocitySink for KinematicDrive {
    fn send(&mut self, command: VelocityCommand) -> Result<(), MissionError> {
        self.recorder.send(command)?;
        self.world.integrate(command);
        Ok(())
    }
}

/// Answers every goal by teleporting the robot onto it.
pub struct TeleportNavigator {
    world: SimWorld,
    tf: SharedTfTree,
    recorder: SimNavigator,
}

impl TeleportNavigator {
    pub fn new(world: SimWorld, tf: SharedTfTree, recorder: SimNavigator) -> Self {
        Self {
            world,
            tf,
            recorder,
        }
    }

    /// Goal pose in `odom`, if its frame is known.
    fn resolve(&self, goal: &NavGoal) -> Option<Pose> {
        let in_map = self.tf.lookup(MAP_FRAME, goal.frame())?.compose(goal.pose());
        Some(self.tf.lookup(ODOM_FRAME, MAP_FRAME)?.compose(in_map))
    }
}

#[async_trait]
impl Navigator for TeleportNavigator {
    async fn go_to(&mut self, goal: &NavGoal) -> NavOutcome {
        if !self.recorder.go_to(goal).await.succeeded() {
            return NavOutcome::Failed;
        }
        match self.resolve(goal) {
            Some(pose) => {
                debug!(target = goal.label(), "teleported");
                self.world.set_pose(pose);
                NavOutcome::Succeeded
            }
            None => {
                warn!(frame = goal.frame(), "goal frame unknown to the simulator");
                NavOutcome::Failed
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Synthetic sensors
// ─────────────────────────────────────────────────────────────────────────────

/// Publishes sensor readings shaped for the active state.
#[derive(Debug, Clone)]
pub struct SyntheticCourse {
    feeds: SensorFeeds,
    box_id: u32,
    tag_id: u32,
}

impl SyntheticCourse {
    pub fn new(feeds: SensorFeeds) -> Self {
        Self {
            feeds,
            box_id: 9,
            tag_id: 3,
        }
    }

    pub fn with_markers(mut self, box_id: u32, tag_id: u32) -> Self {
        self.box_id = box_id;
        self.tag_id = tag_id;
        self
    }

    /// Publish once per `period`, following the state reported by
    /// `observer`.  Runs until the observed engine is dropped.
    pub async fn run(self, mut observer: watch::Receiver<Option<String>>, period: Duration) {
        let mut active: Option<String> = None;
        let mut ticks = 0u32;
        loop {
            // Half a tick out of phase with the states' own loops.
            tokio::time::sleep(period / 2).await;
            if observer.has_changed().is_err() {
                break;
            }
            let state = observer.borrow_and_update().clone();
            if state != active {
                active = state;
                ticks = 0;
            } else {
                ticks = ticks.saturating_add(1);
            }
            if let Some(name) = active.as_deref() {
                self.publish(name, ticks);
            }
            tokio::time::sleep(period / 2).await;
        }
    }

    /// One round of readings for `state`, `ticks` ticks after it began.
    pub fn publish(&self, state: &str, ticks: u32) {
        self.feeds.scan.publish(open_scan());
        match state {
            "DRIVE" | "DRIVE_FROM_OBJECTS" => {
                self.feeds.line.publish(wobble(ticks));
                let row = (ticks >= 5).then(|| 300.0 + 25.0 * (ticks - 4) as f32);
                self.feeds.stop_line.publish(StopLine { row });
            }
            "ADVANCE" => {
                self.feeds.line.publish(wobble(ticks));
                let row = 380.0 + 30.0 * ticks as f32;
                self.feeds.stop_line.publish(StopLine { row: Some(row) });
            }
            "DRIVE_TO_OBJECTS" => {
                let reading = if ticks < 8 { wobble(ticks) } else { LineReading::Lost };
                self.feeds.line.publish(reading);
            }
            "OFF_RAMP" => {
                let reading = if ticks < 8 { wobble(ticks) } else { LineReading::Lost };
                self.feeds.ramp_line.publish(reading);
            }
            "BOX_SURVEY" => {
                let seen = if ticks >= 4 { vec![ahead(self.box_id)] } else { Vec::new() };
                self.feeds.markers.publish(seen);
            }
            "TAG_SCAN_1" | "TAG_SCAN_2" => {
                let mut seen = vec![ahead(self.box_id)];
                if ticks >= 4 {
                    seen.push(ahead(self.tag_id));
                }
                self.feeds.markers.publish(seen);
            }
            _ => {
                self.feeds.markers.publish(Vec::new());
                self.feeds.stop_line.publish(StopLine { row: None });
            }
        }
    }
}

fn wobble(ticks: u32) -> LineReading {
    let error = 15.0 * (ticks as f32 * 0.4).sin();
    LineReading::Found {
        cx: 320.0 + error,
        cy: 420.0,
        error,
    }
}

/// A marker one metre ahead of the camera, facing it.
fn ahead(id: u32) -> MarkerObservation {
    MarkerObservation {
        id,
        pose: Pose::planar(1.0, 0.0, 180.0),
    }
}

/// Nothing within three metres over ±90°.
fn open_scan() -> RangeScan {
    let increment = 1.0_f32.to_radians();
    RangeScan {
        ranges: vec![3.0; 181],
        angle_min: (-90.0_f32).to_radians(),
        angle_max: 90.0_f32.to_radians(),
        angle_increment: increment,
    }
}
