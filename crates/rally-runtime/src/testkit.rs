//! Shared fixtures for state and mission tests.

use std::sync::Arc;
use std::time::Duration;

use rally_hal::sim::{RecordingDrive, ScriptedVision, SimIndicators, SimNavigator, SimSound};
use rally_middleware::{CancelToken, LatestCell, SensorFeeds};
use tokio::task::JoinHandle;
use rally_perception::transform::SharedTfTree;
use rally_types::{MarkerObservation, Pose, RangeScan};

use crate::config::MissionConfig;
use crate::mission::{Mission, RobotIo};

/// A mission wired to recording stubs, with handles to inspect them.
pub struct Harness {
    pub mission: Mission,
    pub feeds: SensorFeeds,
    pub drive: RecordingDrive,
    pub lights: SimIndicators,
    pub sound: SimSound,
    pub nav: SimNavigator,
    pub tf: SharedTfTree,
    pub cancel: CancelToken,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(MissionConfig::default(), ScriptedVision::new(), SimNavigator::new())
    }

    pub fn with(config: MissionConfig, vision: ScriptedVision, nav: SimNavigator) -> Self {
        Self::with_drive(config, vision, nav, RecordingDrive::new())
    }

    pub fn with_drive(
        config: MissionConfig,
        vision: ScriptedVision,
        nav: SimNavigator,
        drive: RecordingDrive,
    ) -> Self {
        let feeds = SensorFeeds::new();
        let lights = SimIndicators::new();
        let sound = SimSound::new();
        let tf = SharedTfTree::new();
        let cancel = CancelToken::new();

        let io = RobotIo {
            drive: Box::new(drive.clone()),
            indicators: Box::new(lights.clone()),
            sound: Box::new(sound.clone()),
            navigator: Box::new(nav.clone()),
            vision: Box::new(vision),
            transforms: Arc::new(tf.clone()),
            broadcaster: Arc::new(tf.clone()),
        };
        let mission = Mission::new(io, feeds.readers(), config, cancel.clone());

        Self {
            mission,
            feeds,
            drive,
            lights,
            sound,
            nav,
            tf,
            cancel,
        }
    }

    /// 61 readings over ±30°, `front` metres in the two inner zones and open
    /// elsewhere.
    pub fn scan_with_front(front: f32) -> RangeScan {
        let ranges = (0..61)
            .map(|i| if (20..=40).contains(&i) { front } else { 5.0 })
            .collect();
        RangeScan {
            ranges,
            angle_min: (-30.0_f32).to_radians(),
            angle_max: 30.0_f32.to_radians(),
            angle_increment: 1.0_f32.to_radians(),
        }
    }

    /// Publish one `script` entry per tick, half a tick out of phase with a
    /// state entered now, then keep repeating the last entry.
    pub fn replay<T: Clone + Send + Sync + 'static>(
        cell: LatestCell<T>,
        script: Vec<T>,
        period: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(period / 2).await;
            let mut last = None;
            for value in script {
                cell.publish(value.clone());
                last = Some(value);
                tokio::time::sleep(period).await;
            }
            let Some(last) = last else { return };
            loop {
                cell.publish(last.clone());
                tokio::time::sleep(period).await;
            }
        })
    }

    pub fn period(&self) -> Duration {
        self.mission.config.tick_period()
    }

    /// A marker one metre ahead of the camera, facing it.
    pub fn marker(id: u32) -> MarkerObservation {
        MarkerObservation {
            id,
            pose: Pose::planar(1.0, 0.0, 180.0),
        }
    }
}
