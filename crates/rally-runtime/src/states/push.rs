//! Box push and the climb back onto the ramp.

use async_trait::async_trait;
use rally_hal::navigation::NavGoal;
use rally_types::{normalize_degrees, LedColor, MissionError, VelocityCommand};
use tracing::{info, warn};

use crate::fsm::State;
use crate::mission::{Mission, BOX_LEFT_FRAME};
use crate::states::Outcome;

/// Drive to the push frame, push the box towards the target tag with heading
/// hold, then back off.
pub struct Push;

#[async_trait]
impl State<Mission, Outcome> for Push {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::OnRamp, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        let push = m.config.push;
        let frame = m
            .context
            .push_start_frame
            .clone()
            .unwrap_or_else(|| BOX_LEFT_FRAME.to_string());

        let arrived = m.go_to(NavGoal::frame_origin(&frame)).await;
        if m.cancelled() {
            return m.abort();
        }
        m.show_count(2, LedColor::Green, LedColor::Red)?;
        if !arrived.succeeded() {
            warn!(frame, "push frame unreachable; skipping push");
            return Ok(Outcome::OnRamp);
        }
        let Some(target) = m.context.target_pose else {
            warn!("no push target; skipping push");
            return Ok(Outcome::OnRamp);
        };
        let Some(start) = m.wait_for_pose().await else {
            warn!("no odometry; skipping push");
            return Ok(Outcome::OnRamp);
        };

        let reference = start.yaw_degrees();
        info!(frame, reference, "pushing");
        for _ in 0..push.max_ticks {
            if m.cancelled() {
                return m.abort();
            }
            let pose = m.pose().unwrap_or(start);
            let lateral = (target.position.y - pose.position.y).abs();
            if lateral <= push.stop_distance {
                info!(lateral, "box delivered");
                break;
            }
            let drift = normalize_degrees(pose.yaw_degrees() - reference);
            m.drive(VelocityCommand::new(push.speed, -push.heading_gain * drift))?;
            m.tick().await;
        }

        let back = VelocityCommand::new(push.reverse_speed, 0.0);
        if !m.drive_for(back, push.reverse_ticks).await? {
            return m.abort();
        }
        Ok(Outcome::OnRamp)
    }
}

/// Navigate back to the ramp foot.
pub struct OnRamp;

#[async_trait]
impl State<Mission, Outcome> for OnRamp {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::Drive, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        for waypoint in ["scan_westest", "on_ramp"] {
            m.go_to_waypoint(waypoint).await?;
            if m.cancelled() {
                return m.abort();
            }
        }
        Ok(Outcome::Drive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissionConfig;
    use crate::sim::{KinematicDrive, SimWorld, TeleportNavigator};
    use crate::testkit::Harness;
    use rally_hal::navigation::MAP_FRAME;
    use rally_hal::sim::{ScriptedVision, SimNavigator};
    use rally_perception::transform::TransformBroadcaster;
    use rally_types::{Led, Pose};

    /// Kinematic drive plus a navigator that teleports onto frames.
    fn simulated(nav: SimNavigator) -> (Harness, SimWorld) {
        let mut h = Harness::with(MissionConfig::default(), ScriptedVision::new(), nav.clone());
        let world = SimWorld::new(h.feeds.clone(), h.tf.clone(), h.period());
        h.mission.io.drive = Box::new(KinematicDrive::new(world.clone(), h.drive.clone()));
        h.mission.io.navigator = Box::new(TeleportNavigator::new(world.clone(), h.tf.clone(), nav));
        (h, world)
    }

    #[tokio::test(start_paused = true)]
    async fn pushes_until_target_is_abreast_then_reverses() {
        let (mut h, world) = simulated(SimNavigator::new());
        // Push frame facing +y; target one metre further along y.
        h.tf.broadcast(MAP_FRAME, "box_right", Pose::planar(0.5, 0.0, 90.0));
        h.mission.context.push_start_frame = Some("box_right".to_string());
        h.mission.context.target_pose = Some(Pose::planar(0.5, 1.0, 0.0));

        let outcome = Push.execute(&mut h.mission).await.unwrap();

        assert_eq!(outcome, Outcome::OnRamp);
        assert_eq!(h.nav.visited(), vec!["box_right"]);
        let push = h.mission.config.push;
        let commands = h.drive.commands();
        let forward = commands.iter().filter(|c| c.linear > 0.0).count();
        let back = commands.iter().filter(|c| c.linear < 0.0).count();
        assert!(forward > 0 && forward < push.max_ticks as usize);
        assert_eq!(back, push.reverse_ticks as usize);
        assert!(commands.last().unwrap().is_stop());
        // Pushed past the stop distance, then reversed a little.
        let y = world.pose().position.y;
        assert!(y > 1.0 - push.stop_distance - 0.4 && y < 1.0, "ended at y = {y}");
        assert_eq!(h.lights.color(Led::Led1), LedColor::Green);
    }

    #[tokio::test(start_paused = true)]
    async fn heading_drift_is_corrected() {
        let (mut h, world) = simulated(SimNavigator::new());
        h.tf.broadcast(MAP_FRAME, "box_left", Pose::planar(0.0, 0.0, 90.0));
        h.mission.context.target_pose = Some(Pose::planar(0.0, 3.0, 0.0));

        // Nudge the heading after arrival; the controller must steer back.
        let drifting = world.clone();
        let nudge = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
            let mut pose = drifting.pose();
            pose.orientation = rally_types::Quaternion::from_yaw(100.0_f32.to_radians());
            drifting.set_pose(pose);
        });

        Push.execute(&mut h.mission).await.unwrap();
        nudge.await.unwrap();

        assert!(h.drive.commands().iter().any(|c| c.angular < 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_failure_skips_push() {
        let (mut h, _world) = simulated(SimNavigator::new().failing_on("box_left"));
        h.mission.context.target_pose = Some(Pose::planar(0.0, 1.0, 0.0));

        let outcome = Push.execute(&mut h.mission).await.unwrap();

        assert_eq!(outcome, Outcome::OnRamp);
        assert!(h.drive.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_target_skips_push() {
        let (mut h, _world) = simulated(SimNavigator::new());
        h.tf.broadcast(MAP_FRAME, "box_left", Pose::planar(0.0, 0.0, 90.0));
        let outcome = Push.execute(&mut h.mission).await.unwrap();
        assert_eq!(outcome, Outcome::OnRamp);
        assert!(h.drive.commands().is_empty());
    }

    #[tokio::test]
    async fn on_ramp_visits_both_waypoints() {
        let mut h = Harness::new();
        let outcome = OnRamp.execute(&mut h.mission).await.unwrap();
        assert_eq!(outcome, Outcome::Drive);
        assert_eq!(h.nav.visited(), vec!["scan_westest", "on_ramp"]);
    }

    #[tokio::test]
    async fn on_ramp_navigation_failure_is_not_fatal() {
        let mut h = Harness::with(
            MissionConfig::default(),
            ScriptedVision::new(),
            SimNavigator::new().failing_on("scan_westest"),
        );
        let outcome = OnRamp.execute(&mut h.mission).await.unwrap();
        assert_eq!(outcome, Outcome::Drive);
        assert_eq!(h.nav.visited(), vec!["scan_westest", "on_ramp"]);
    }
}
