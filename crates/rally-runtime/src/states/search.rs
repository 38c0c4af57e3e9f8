//! Rotating marker searches: the box survey and the two tag scans.
//!
//! A search rotates in place, feeding every fresh marker reading to a
//! [`TargetDebouncer`] until an id is confirmed or the [`SweepBudget`] runs
//! out.  Confirmed markers are anchored in a fixed frame right away; the
//! camera frame moves with the robot.

use std::collections::BTreeSet;

use async_trait::async_trait;
use rally_hal::navigation::MAP_FRAME;
use rally_perception::debounce::{SweepBudget, TargetDebouncer, TargetFilter};
use rally_types::{LedColor, MarkerObservation, MissionError, Pose, VelocityCommand};
use tracing::{debug, info, warn};

use crate::context::BoxSides;
use crate::fsm::State;
use crate::mission::{marker_frame, Mission, BOX_LEFT_FRAME, BOX_RIGHT_FRAME, ODOM_FRAME};
use crate::states::Outcome;

enum Search {
    Found(MarkerObservation),
    NotFound,
    Cancelled,
}

/// Rotate at `angular` until `debouncer` confirms a marker or the sweep
/// exceeds `limit_deg`.  Stops the robot before returning.
async fn sweep(
    m: &mut Mission,
    mut debouncer: TargetDebouncer,
    limit_deg: f32,
    angular: f32,
) -> Result<Search, MissionError> {
    let mut budget = SweepBudget::new(limit_deg);
    // Dead-reckoned heading for when odometry is silent.
    let mut heading = m.pose().map_or(0.0, |p| p.yaw_degrees());
    let step = angular.to_degrees() * m.config.tick_period().as_secs_f32();
    m.feeds.markers.mark_seen();

    loop {
        if m.cancelled() {
            m.stop()?;
            return Ok(Search::Cancelled);
        }
        if let Some(reading) = m.feeds.markers.fresh() {
            let (tracked, repetitions) = debouncer.observe_reading(&reading);
            debug!(?tracked, repetitions, "marker reading");
            if let Some(id) = debouncer.confirmed()
                && let Some(marker) = reading.iter().find(|o| o.id == id)
            {
                m.stop()?;
                info!(id, swept = budget.swept(), "marker confirmed");
                return Ok(Search::Found(*marker));
            }
        }

        heading = m.pose().map_or(heading + step, |p| p.yaw_degrees());
        if !budget.update(heading) {
            m.stop()?;
            info!(swept = budget.swept(), "sweep exhausted");
            return Ok(Search::NotFound);
        }
        m.drive(VelocityCommand::new(0.0, angular))?;
        m.tick().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BOX_SURVEY
// ─────────────────────────────────────────────────────────────────────────────

/// Find the box marker and derive the two push frames from it.
pub struct BoxSurvey;

impl BoxSurvey {
    /// Anchor the marker in `map`, hang the side frames off it and read them
    /// back in `map`.
    fn broadcast_sides(m: &Mission, marker: &MarkerObservation) -> Option<BoxSides> {
        let anchored = m.anchor(MAP_FRAME, marker)?;
        let frame = marker_frame(marker.id);
        let cfg = &m.config.markers;
        let broadcaster = &m.io.broadcaster;

        broadcaster.broadcast(MAP_FRAME, &frame, anchored);
        broadcaster.broadcast(
            &frame,
            BOX_LEFT_FRAME,
            Pose::planar(cfg.side_standoff, cfg.side_offset, 180.0),
        );
        broadcaster.broadcast(
            &frame,
            BOX_RIGHT_FRAME,
            Pose::planar(cfg.side_standoff, -cfg.side_offset, 180.0),
        );

        let transforms = &m.io.transforms;
        Some(BoxSides {
            left: transforms.lookup(MAP_FRAME, BOX_LEFT_FRAME)?,
            right: transforms.lookup(MAP_FRAME, BOX_RIGHT_FRAME)?,
        })
    }
}

#[async_trait]
impl State<Mission, Outcome> for BoxSurvey {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::TagScan1, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        m.go_to_waypoint("box_vantage").await?;
        if m.cancelled() {
            return m.abort();
        }

        let markers = m.config.markers.clone();
        let debouncer = TargetDebouncer::new(markers.box_repetitions);
        match sweep(m, debouncer, markers.box_sweep_deg, markers.search_angular).await? {
            Search::Cancelled => return m.abort(),
            Search::NotFound => warn!("no box marker confirmed; tag scans run without exclusion"),
            Search::Found(marker) => {
                m.context.box_id = Some(marker.id);
                match Self::broadcast_sides(m, &marker) {
                    Some(sides) => {
                        info!(id = marker.id, "box sides published");
                        m.context.box_sides = Some(sides);
                    }
                    None => warn!(id = marker.id, "camera not connected to map; box sides unknown"),
                }
                m.show_count(2, LedColor::Red, LedColor::Red)?;
                if !m.beep(1).await? {
                    return m.abort();
                }
            }
        }
        Ok(Outcome::TagScan1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TAG_SCAN_1 / TAG_SCAN_2
// ─────────────────────────────────────────────────────────────────────────────

/// Vantage point of a tag scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSide {
    /// From `scan_east`, counter-clockwise; push from `box_left`.
    East,
    /// From `scan_west`, clockwise; push from `box_right`.
    West,
}

/// Waypoint used as the target when neither scan confirms a tag.
pub const FALLBACK_TARGET: &str = "3";

pub struct TagScan {
    side: ScanSide,
}

impl TagScan {
    pub fn new(side: ScanSide) -> Self {
        Self { side }
    }

    fn filter(m: &Mission) -> TargetFilter {
        TargetFilter {
            allowed: Some(m.config.markers.allowed_ids.iter().copied().collect::<BTreeSet<_>>()),
            excluded: m.context.box_id,
        }
    }
}

#[async_trait]
impl State<Mission, Outcome> for TagScan {
    fn outcomes(&self) -> Vec<Outcome> {
        match self.side {
            ScanSide::East => vec![Outcome::TagScan2, Outcome::FoundTag, Outcome::Exit],
            ScanSide::West => vec![Outcome::FoundTag, Outcome::Exit],
        }
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        let markers = m.config.markers.clone();
        let (waypoint, angular, limit, push_frame) = match self.side {
            ScanSide::East => ("scan_east", markers.search_angular, markers.east_sweep_deg, BOX_LEFT_FRAME),
            ScanSide::West => ("scan_west", -markers.search_angular, markers.west_sweep_deg, BOX_RIGHT_FRAME),
        };

        m.go_to_waypoint(waypoint).await?;
        if m.cancelled() {
            return m.abort();
        }

        let debouncer = TargetDebouncer::new(markers.tag_repetitions).with_filter(Self::filter(m));
        let target = match sweep(m, debouncer, limit, angular).await? {
            Search::Cancelled => return m.abort(),
            Search::Found(marker) => {
                let anchored = m.anchor(ODOM_FRAME, &marker);
                if anchored.is_none() {
                    warn!(id = marker.id, "camera not connected to odom; tag unusable");
                }
                anchored.map(|pose| (marker.id, pose))
            }
            Search::NotFound => None,
        };

        match (target, self.side) {
            (Some((id, pose)), _) => {
                info!(id, side = ?self.side, push_frame, "target tag found");
                m.context.target_pose = Some(pose);
                m.context.push_start_frame = Some(push_frame.to_string());
                m.show_count(2, LedColor::Green, LedColor::Green)?;
                if !m.beep(1).await? {
                    return m.abort();
                }
                if self.side == ScanSide::East {
                    m.go_to_waypoint("scan_west").await?;
                    if m.cancelled() {
                        return m.abort();
                    }
                }
                Ok(Outcome::FoundTag)
            }
            (None, ScanSide::East) => Ok(Outcome::TagScan2),
            (None, ScanSide::West) => {
                warn!(fallback = FALLBACK_TARGET, "no tag confirmed; pushing towards the fallback");
                m.context.target_pose = Some(m.waypoint(FALLBACK_TARGET)?);
                m.context.push_start_frame = Some(push_frame.to_string());
                Ok(Outcome::FoundTag)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissionConfig;
    use crate::sim::{KinematicDrive, SimWorld};
    use crate::testkit::Harness;
    use rally_hal::sim::{ScriptedVision, SimNavigator};
    use rally_types::{normalize_degrees, Led};

    /// Harness whose drive rotates the simulated robot.
    fn kinematic() -> (Harness, SimWorld) {
        let mut h = Harness::with(MissionConfig::default(), ScriptedVision::new(), SimNavigator::new());
        let world = SimWorld::new(h.feeds.clone(), h.tf.clone(), h.period());
        h.mission.io.drive = Box::new(KinematicDrive::new(world.clone(), h.drive.clone()));
        (h, world)
    }

    /// Harness with the frame tree in place but a robot that never moves.
    fn stationary() -> Harness {
        let h = Harness::with(MissionConfig::default(), ScriptedVision::new(), SimNavigator::new());
        SimWorld::new(h.feeds.clone(), h.tf.clone(), h.period());
        h
    }

    #[tokio::test(start_paused = true)]
    async fn box_survey_records_box_and_sides() {
        let mut h = stationary();
        let p = h.period();
        let markers = Harness::replay(
            h.feeds.markers.clone(),
            vec![vec![], vec![Harness::marker(9)]],
            p,
        );

        let outcome = BoxSurvey.execute(&mut h.mission).await.unwrap();
        markers.abort();

        assert_eq!(outcome, Outcome::TagScan1);
        assert_eq!(h.nav.visited(), vec!["box_vantage"]);
        assert_eq!(h.mission.context.box_id, Some(9));

        // Robot at the origin facing +x, camera 0.1 ahead, marker 1 m beyond
        // facing back at it.
        let sides = h.mission.context.box_sides.unwrap();
        let cfg = &h.mission.config.markers;
        assert!((sides.left.position.x - (1.1 - cfg.side_standoff)).abs() < 1e-4);
        assert!((sides.left.position.y - -cfg.side_offset).abs() < 1e-4);
        assert!((sides.right.position.y - cfg.side_offset).abs() < 1e-4);
        assert!(normalize_degrees(sides.left.yaw_degrees()).abs() < 1e-2);

        assert_eq!(h.lights.color(Led::Led2), LedColor::Red);
        assert_eq!(h.sound.beeps(), 1);
        assert!(h.drive.last().unwrap().is_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn box_survey_gives_up_after_full_sweep() {
        let (mut h, _world) = kinematic();
        let outcome = BoxSurvey.execute(&mut h.mission).await.unwrap();

        assert_eq!(outcome, Outcome::TagScan1);
        assert_eq!(h.mission.context.box_id, None);
        assert_eq!(h.sound.beeps(), 0);
        // 360° at 0.3 rad/s and 10 Hz takes a little over 200 ticks.
        assert!(h.drive.commands().len() > 200);
    }

    #[tokio::test(start_paused = true)]
    async fn east_scan_skips_box_marker_and_rejects_disallowed_ids() {
        let mut h = stationary();
        h.mission.context.box_id = Some(9);
        let p = h.period();
        // 9 (box) is skipped in favour of 4; 12 alone is never allowed.
        let markers = Harness::replay(
            h.feeds.markers.clone(),
            vec![
                vec![Harness::marker(12)],
                vec![Harness::marker(12)],
                vec![Harness::marker(12)],
                vec![Harness::marker(12)],
                vec![Harness::marker(9), Harness::marker(4)],
            ],
            p,
        );

        let outcome = TagScan::new(ScanSide::East)
            .execute(&mut h.mission)
            .await
            .unwrap();
        markers.abort();

        assert_eq!(outcome, Outcome::FoundTag);
        assert_eq!(h.nav.visited(), vec!["scan_east", "scan_west"]);
        assert_eq!(h.mission.context.push_start_frame.as_deref(), Some(BOX_LEFT_FRAME));
        let target = h.mission.context.target_pose.unwrap();
        assert!(target.position.x > 1.0, "tag lies ahead of the vantage point");
        assert_eq!(h.sound.beeps(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn east_scan_hands_over_when_sweep_exhausted() {
        let (mut h, world) = kinematic();
        let outcome = TagScan::new(ScanSide::East)
            .execute(&mut h.mission)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::TagScan2);
        assert!(h.mission.context.target_pose.is_none());
        // Counter-clockwise, stopped just past the sweep limit.
        let start_yaw = h.mission.config.waypoint("scan_east").unwrap().yaw_degrees();
        let swept = normalize_degrees(world.pose().yaw_degrees() - start_yaw);
        assert!(swept > 100.0 && swept < 110.0, "swept {swept}");
    }

    #[tokio::test(start_paused = true)]
    async fn west_scan_falls_back_to_waypoint() {
        let (mut h, _world) = kinematic();
        let outcome = TagScan::new(ScanSide::West)
            .execute(&mut h.mission)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::FoundTag);
        let fallback = h.mission.config.waypoint(FALLBACK_TARGET).unwrap();
        assert_eq!(h.mission.context.target_pose, Some(fallback));
        assert_eq!(h.mission.context.push_start_frame.as_deref(), Some(BOX_RIGHT_FRAME));
        assert!(h.drive.commands().iter().any(|c| c.angular < 0.0), "clockwise sweep");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_scan_exits() {
        let (mut h, _world) = kinematic();
        h.cancel.cancel();
        let outcome = TagScan::new(ScanSide::West)
            .execute(&mut h.mission)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Exit);
        assert!(h.drive.last().unwrap().is_stop());
    }
}
