//! Line-following states.
//!
//! Each activation builds its own [`LineFollower`], so derivative memory never
//! leaks from one stage into the next.  Feeds are marked seen on entry and only
//! readings published afterwards drive decisions; a stop line left over from
//! the previous stage cannot trigger a hand-over.

use async_trait::async_trait;
use rally_hal::line_follow::{FollowCommand, LineFollower, LineGains, Recovery};
use rally_hal::navigation::MAP_FRAME;
use rally_types::{MissionError, VelocityCommand};
use tracing::{debug, info};

use crate::fsm::State;
use crate::mission::{Mission, INITIAL_POSE_FRAME};
use crate::states::Outcome;

// ─────────────────────────────────────────────────────────────────────────────
// DRIVE
// ─────────────────────────────────────────────────────────────────────────────

/// Follow the main line until a stop line comes close.
pub struct Drive;

#[async_trait]
impl State<Mission, Outcome> for Drive {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::Advance, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        let line = m.config.line;
        let mut follower = LineFollower::new(line.drive, line.drive_recovery);
        let mut command = VelocityCommand::stop();
        m.feeds.stop_line.mark_seen();

        loop {
            if m.cancelled() {
                return m.abort();
            }
            if let Some(row) = m.feeds.stop_line.fresh().and_then(|s| s.row)
                && row >= line.approach_row
            {
                info!(row, "stop line ahead");
                return Ok(Outcome::Advance);
            }
            if let Some(reading) = m.feeds.line.fresh() {
                command = follower.update(reading).command();
                m.context.path_error = follower.previous_error();
            }
            if m.obstacle_ahead() {
                debug!("path blocked; holding");
                m.stop()?;
            } else {
                m.drive(command)?;
            }
            m.tick().await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ADVANCE
// ─────────────────────────────────────────────────────────────────────────────

/// Creep until the stop line has passed under the camera.
pub struct Advance;

#[async_trait]
impl State<Mission, Outcome> for Advance {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::AtLine, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        let line = m.config.line;
        let creep = LineGains {
            forward_speed: line.advance_speed,
            ..line.drive
        };
        let mut follower = LineFollower::new(
            creep,
            Recovery::Creep {
                linear: line.advance_speed,
                angular: 0.0,
            },
        );
        let mut command = VelocityCommand::new(line.advance_speed, 0.0);
        let mut seen = m.feeds.stop_line.latest().is_some_and(|s| s.row.is_some());
        m.feeds.stop_line.mark_seen();

        for _ in 0..line.advance_max_ticks {
            if m.cancelled() {
                return m.abort();
            }
            if let Some(stop) = m.feeds.stop_line.fresh() {
                match stop.row {
                    Some(row) if row >= line.stop_row => {
                        debug!(row, "stop line under the robot");
                        break;
                    }
                    Some(_) => seen = true,
                    None if seen => {
                        debug!("stop line passed");
                        break;
                    }
                    None => {}
                }
            }
            if let Some(reading) = m.feeds.line.fresh() {
                command = follower.update(reading).command();
            }
            m.drive(command)?;
            m.tick().await;
        }

        m.stop()?;
        Ok(Outcome::AtLine)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AT_LINE
// ─────────────────────────────────────────────────────────────────────────────

/// Stop on the line and pick the next course plan entry.
///
/// The plan is indexed by `MissionContext::line_index`; past its end the
/// state emits [`Outcome::Finish`].
pub struct AtLine {
    plan: Vec<Outcome>,
}

impl AtLine {
    pub fn new(plan: Vec<Outcome>) -> Self {
        Self { plan }
    }
}

#[async_trait]
impl State<Mission, Outcome> for AtLine {
    fn outcomes(&self) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        for outcome in self.plan.iter().copied().chain([Outcome::Finish, Outcome::Exit]) {
            if !outcomes.contains(&outcome) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        m.stop()?;
        for _ in 0..m.config.line.line_pause_ticks {
            if m.cancelled() {
                return m.abort();
            }
            m.tick().await;
        }

        let index = m.context.line_index;
        m.context.line_index += 1;
        let next = self.plan.get(index).copied().unwrap_or(Outcome::Finish);
        if let Outcome::TurnLeft3(stop) = next {
            m.context.location3_stop = Some(stop);
        }
        info!(index, ?next, "at line");
        Ok(next)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DRIVE_TO_OBJECTS
// ─────────────────────────────────────────────────────────────────────────────

/// Follow the spur line to its end, then back off.
pub struct DriveToObjects;

#[async_trait]
impl State<Mission, Outcome> for DriveToObjects {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::Detect2, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        let line = m.config.line;
        let mut follower = LineFollower::new(line.to_objects, line.to_objects_recovery);
        let mut command = VelocityCommand::new(line.to_objects.forward_speed, 0.0);
        m.feeds.line.mark_seen();

        loop {
            if m.cancelled() {
                return m.abort();
            }
            if let Some(reading) = m.feeds.line.fresh() {
                match follower.update(reading) {
                    FollowCommand::Track(cmd) => command = cmd,
                    FollowCommand::Recover(recovery) => {
                        info!(?recovery, "line ended");
                        let ticks = match recovery {
                            Recovery::Reverse { ticks, .. } => ticks,
                            _ => 1,
                        };
                        if !m.drive_for(recovery.command(), ticks).await? {
                            return m.abort();
                        }
                        return Ok(Outcome::Detect2);
                    }
                }
            }
            m.drive(command)?;
            m.tick().await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DRIVE_FROM_OBJECTS
// ─────────────────────────────────────────────────────────────────────────────

/// Follow the line back until the next stop line is close.
pub struct DriveFromObjects;

#[async_trait]
impl State<Mission, Outcome> for DriveFromObjects {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::Advance, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        let line = m.config.line;
        let mut follower = LineFollower::new(line.from_objects, line.from_objects_recovery);
        let mut command = line.from_objects_recovery.command();
        m.feeds.stop_line.mark_seen();

        loop {
            if m.cancelled() {
                return m.abort();
            }
            if let Some(row) = m.feeds.stop_line.fresh().and_then(|s| s.row)
                && row > line.from_objects_row
            {
                info!(row, "back at the main line");
                return Ok(Outcome::Advance);
            }
            if let Some(reading) = m.feeds.line.fresh() {
                command = follower.update(reading).command();
                m.context.path_error = follower.previous_error();
            }
            m.drive(command)?;
            m.tick().await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OFF_RAMP
// ─────────────────────────────────────────────────────────────────────────────

/// Follow the ramp line down, then seed localisation with the `off_ramp`
/// waypoint.
pub struct DriveRamp;

#[async_trait]
impl State<Mission, Outcome> for DriveRamp {
    fn outcomes(&self) -> Vec<Outcome> {
        vec![Outcome::Start, Outcome::Exit]
    }

    async fn execute(&mut self, m: &mut Mission) -> Result<Outcome, MissionError> {
        let gains = m.config.line.ramp;
        let mut follower = LineFollower::new(gains, Recovery::Hold);
        let mut command = VelocityCommand::new(gains.forward_speed, 0.0);
        m.feeds.ramp_line.mark_seen();

        loop {
            if m.cancelled() {
                return m.abort();
            }
            if let Some(reading) = m.feeds.ramp_line.fresh() {
                match follower.update(reading) {
                    FollowCommand::Track(cmd) => command = cmd,
                    FollowCommand::Recover(_) => break,
                }
            }
            m.drive(command)?;
            m.tick().await;
        }
        m.stop()?;

        let pose = m.waypoint("off_ramp")?;
        for _ in 0..m.config.signal.initial_pose_repeats {
            if m.cancelled() {
                return m.abort();
            }
            m.io.broadcaster.broadcast(MAP_FRAME, INITIAL_POSE_FRAME, pose);
            m.tick().await;
        }
        info!("off the ramp; initial pose published");
        Ok(Outcome::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissionConfig;
    use crate::testkit::Harness;
    use rally_hal::sim::{ScriptedVision, SimNavigator};
    use rally_perception::transform::TransformLookup;
    use rally_types::{LineReading, StopLine};

    fn found(error: f32) -> LineReading {
        LineReading::Found {
            cx: 320.0 + error,
            cy: 400.0,
            error,
        }
    }

    fn row(r: Option<f32>) -> StopLine {
        StopLine { row: r }
    }

    fn quick_config() -> MissionConfig {
        let mut config = MissionConfig::default();
        config.line.line_pause_ticks = 2;
        config.signal.initial_pose_repeats = 2;
        config
    }

    fn harness() -> Harness {
        Harness::with(quick_config(), ScriptedVision::new(), SimNavigator::new())
    }

    #[tokio::test(start_paused = true)]
    async fn drive_follows_line_until_approach_row() {
        let mut h = harness();
        let p = h.period();
        let line = Harness::replay(h.feeds.line.clone(), vec![found(10.0)], p);
        let stop = Harness::replay(
            h.feeds.stop_line.clone(),
            vec![row(None), row(None), row(Some(200.0)), row(Some(370.0))],
            p,
        );

        let outcome = Drive.execute(&mut h.mission).await.unwrap();
        line.abort();
        stop.abort();

        assert_eq!(outcome, Outcome::Advance);
        let commands = h.drive.commands();
        assert!(commands.len() >= 3);
        // Line right of centre → clockwise correction at drive speed.
        let tracking = commands.last().unwrap();
        assert_eq!(tracking.linear, 0.4);
        assert!(tracking.angular < 0.0);
        assert_eq!(h.mission.context.path_error, 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn drive_holds_while_straight_ahead_blocked() {
        let mut h = harness();
        let p = h.period();
        h.feeds.scan.publish(Harness::scan_with_front(0.3));
        let line = Harness::replay(h.feeds.line.clone(), vec![found(0.0)], p);
        let stop = Harness::replay(
            h.feeds.stop_line.clone(),
            vec![row(None), row(None), row(None), row(Some(400.0))],
            p,
        );

        let outcome = Drive.execute(&mut h.mission).await.unwrap();
        line.abort();
        stop.abort();

        assert_eq!(outcome, Outcome::Advance);
        assert!(h.drive.commands().iter().all(|c| c.is_stop()));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_stop_line_does_not_hand_over() {
        let mut h = harness();
        let p = h.period();
        // Left over from the previous stage.
        h.feeds.stop_line.publish(row(Some(470.0)));
        let stop = Harness::replay(
            h.feeds.stop_line.clone(),
            vec![row(None), row(None), row(Some(365.0))],
            p,
        );

        let outcome = Drive.execute(&mut h.mission).await.unwrap();
        stop.abort();

        assert_eq!(outcome, Outcome::Advance);
        assert!(h.drive.commands().len() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn advance_stops_once_line_passed() {
        let mut h = harness();
        let p = h.period();
        h.feeds.stop_line.publish(row(Some(365.0)));
        let stop = Harness::replay(
            h.feeds.stop_line.clone(),
            vec![row(Some(390.0)), row(Some(430.0)), row(None)],
            p,
        );

        let outcome = Advance.execute(&mut h.mission).await.unwrap();
        stop.abort();

        assert_eq!(outcome, Outcome::AtLine);
        let commands = h.drive.commands();
        assert_eq!(commands.len(), 4, "three creep ticks then stop");
        assert_eq!(commands[0], VelocityCommand::new(0.2, 0.0));
        assert!(commands.last().unwrap().is_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn advance_is_bounded() {
        let mut h = harness();
        let outcome = Advance.execute(&mut h.mission).await.unwrap();
        assert_eq!(outcome, Outcome::AtLine);
        let max = h.mission.config.line.advance_max_ticks as usize;
        assert_eq!(h.drive.commands().len(), max + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn at_line_walks_the_course_plan() {
        let mut h = harness();
        let mut state = AtLine::new(vec![Outcome::TurnLeft1, Outcome::TurnLeft3(2)]);
        assert_eq!(
            state.outcomes(),
            vec![
                Outcome::TurnLeft1,
                Outcome::TurnLeft3(2),
                Outcome::Finish,
                Outcome::Exit
            ]
        );

        assert_eq!(state.execute(&mut h.mission).await.unwrap(), Outcome::TurnLeft1);
        assert_eq!(h.mission.context.location3_stop, None);

        assert_eq!(state.execute(&mut h.mission).await.unwrap(), Outcome::TurnLeft3(2));
        assert_eq!(h.mission.context.location3_stop, Some(2));

        assert_eq!(state.execute(&mut h.mission).await.unwrap(), Outcome::Finish);
        assert_eq!(h.mission.context.line_index, 3);
        assert!(h.drive.commands().iter().all(|c| c.is_stop()));
    }

    #[tokio::test(start_paused = true)]
    async fn at_line_honours_launch_line() {
        let mut config = quick_config();
        config.launch.initial_line = 1;
        let mut h = Harness::with(config, ScriptedVision::new(), SimNavigator::new());
        let mut state = AtLine::new(vec![Outcome::TurnLeft1, Outcome::TurnLeft2Start]);
        assert_eq!(
            state.execute(&mut h.mission).await.unwrap(),
            Outcome::TurnLeft2Start
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drive_to_objects_backs_off_when_line_ends() {
        let mut h = harness();
        let p = h.period();
        let line = Harness::replay(
            h.feeds.line.clone(),
            vec![found(0.0), found(0.0), LineReading::Lost],
            p,
        );

        let outcome = DriveToObjects.execute(&mut h.mission).await.unwrap();
        line.abort();

        assert_eq!(outcome, Outcome::Detect2);
        let commands = h.drive.commands();
        let tail: Vec<_> = commands.iter().rev().take(4).rev().copied().collect();
        assert_eq!(
            tail,
            vec![
                VelocityCommand::new(-0.4, 0.0),
                VelocityCommand::new(-0.4, 0.0),
                VelocityCommand::new(-0.4, 0.0),
                VelocityCommand::stop(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn drive_from_objects_creeps_without_line() {
        let mut h = harness();
        let p = h.period();
        let line = Harness::replay(h.feeds.line.clone(), vec![LineReading::Lost], p);
        let stop = Harness::replay(
            h.feeds.stop_line.clone(),
            vec![row(None), row(Some(390.0)), row(Some(401.0))],
            p,
        );

        let outcome = DriveFromObjects.execute(&mut h.mission).await.unwrap();
        line.abort();
        stop.abort();

        assert_eq!(outcome, Outcome::Advance);
        assert!(
            h.drive
                .commands()
                .iter()
                .all(|c| *c == VelocityCommand::new(0.075, -0.2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_descent_publishes_initial_pose() {
        let mut h = harness();
        let p = h.period();
        let ramp = Harness::replay(
            h.feeds.ramp_line.clone(),
            vec![found(-5.0), found(0.0), LineReading::Lost],
            p,
        );

        let outcome = DriveRamp.execute(&mut h.mission).await.unwrap();
        ramp.abort();

        assert_eq!(outcome, Outcome::Start);
        let published = h.tf.lookup(MAP_FRAME, INITIAL_POSE_FRAME).unwrap();
        let expected = h.mission.config.waypoint("off_ramp").unwrap();
        assert!((published.position.x - expected.position.x).abs() < 1e-5);
        assert!((published.position.y - expected.position.y).abs() < 1e-5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_drive_exits_with_zero_velocity() {
        let mut h = harness();
        h.cancel.cancel();
        let outcome = Drive.execute(&mut h.mission).await.unwrap();
        assert_eq!(outcome, Outcome::Exit);
        assert_eq!(h.drive.commands(), vec![VelocityCommand::stop()]);
    }
}
