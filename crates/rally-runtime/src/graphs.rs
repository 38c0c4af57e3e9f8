//! The two course graphs.
//!
//! Both start in [`START_STATE`] and share the line, turn and detection
//! states.  `AT_LINE` walks a per-course plan: entry `i` is what happens at
//! the `i`-th stop line.
//!
//! ```text
//! racer:  DRIVE → ADVANCE → AT_LINE ┬─ TURN_LEFT_1 → DETECT1 → TURN_RIGHT ────────────┐
//!                                   ├─ TURN_LEFT_2_START → DRIVE_TO_OBJECTS → DETECT2 │
//!                                   │    → TURN_180 → DRIVE_FROM_OBJECTS → ADVANCE    │
//!                                   ├─ TURN_LEFT_2_END ───────────────────────────────┤
//!                                   ├─ ADJUST_3 ──────────────────────────────────────┤
//!                                   ├─ TURN_LEFT_3 → DETECT3 → TURN_RIGHT_3 ──────────┤
//!                                   └─ finish                                         │
//!                                                                        back to DRIVE
//! ultra:  as racer without ADJUST_3, location 3 split into three stops, plus
//!         OFF_RAMP → SHAPE_SCAN → BOX_SURVEY → TAG_SCAN_1 (→ TAG_SCAN_2)
//!           → PUSH → ON_RAMP → DRIVE
//! ```

use rally_types::ConfigurationError;

use crate::config::{Course, MissionConfig};
use crate::fsm::{GraphBuilder, MissionGraph, Next, State};
use crate::mission::Mission;
use crate::states::{
    Advance, AtLine, BoxSurvey, CountObjects, Drive, DriveFromObjects, DriveRamp, DriveToObjects,
    MatchShape, OnRamp, Outcome, Push, ScanSide, ShapeScan, StudyObjects, TagScan, Turn,
    LOCATION3_STOPS,
};

pub const START_STATE: &str = "DRIVE";

pub type CourseGraph = MissionGraph<Mission, Outcome>;

/// Waypoints the extended course navigates to.
pub const ULTRA_WAYPOINTS: [&str; 10] = [
    "off_ramp",
    "8",
    "7",
    "6",
    "box_vantage",
    "scan_east",
    "scan_west",
    "scan_westest",
    "on_ramp",
    "3",
];

/// Stop-line plan of the short course.
pub fn racer_plan() -> Vec<Outcome> {
    vec![
        Outcome::TurnLeft1,
        Outcome::TurnLeft2Start,
        Outcome::TurnLeft2End,
        Outcome::Adjust3,
        Outcome::TurnLeft3(1),
        Outcome::TurnLeft3(2),
        Outcome::TurnLeft3(3),
    ]
}

/// Stop-line plan of the extended course.
pub fn ultra_plan() -> Vec<Outcome> {
    vec![
        Outcome::TurnLeft1,
        Outcome::TurnLeft2Start,
        Outcome::TurnLeft2End,
        Outcome::OffRamp,
        Outcome::TurnLeft3(1),
        Outcome::TurnLeft3(2),
        Outcome::TurnLeft3(3),
    ]
}

/// Build the graph selected by `config.launch.course`.
pub fn build(config: &MissionConfig) -> Result<CourseGraph, ConfigurationError> {
    match config.launch.course {
        Course::Racer => racer(config),
        Course::Ultra => ultra(config),
    }
}

fn exit() -> (Outcome, Next) {
    (Outcome::Exit, Next::EXIT)
}

fn check_launch(plan: &[Outcome], config: &MissionConfig) -> Result<(), ConfigurationError> {
    if config.launch.initial_line > plan.len() {
        return Err(ConfigurationError::InvalidParameter {
            name: "launch.initial_line".to_string(),
            reason: format!(
                "course plan has {} lines, got {}",
                plan.len(),
                config.launch.initial_line
            ),
        });
    }
    Ok(())
}

/// Where `AT_LINE` sends each plan entry.
fn at_line_transitions(plan: &[Outcome], location3: impl Fn(u8) -> String) -> Vec<(Outcome, Next)> {
    AtLine::new(plan.to_vec())
        .outcomes()
        .into_iter()
        .filter_map(|outcome| {
            let next = match outcome {
                Outcome::Drive => Next::to("DRIVE"),
                Outcome::TurnLeft1 => Next::to("TURN_LEFT_1"),
                Outcome::TurnLeft2Start => Next::to("TURN_LEFT_2_START"),
                Outcome::TurnLeft2End => Next::to("TURN_LEFT_2_END"),
                Outcome::Adjust3 => Next::to("ADJUST_3"),
                Outcome::TurnLeft3(k) => Next::State(location3(k)),
                Outcome::OffRamp => Next::to("OFF_RAMP"),
                Outcome::Finish => Next::COMPLETE,
                Outcome::Exit => Next::EXIT,
                _ => return None,
            };
            Some((outcome, next))
        })
        .collect()
}

/// States shared by both courses, up to and including location 2.
fn common(builder: GraphBuilder<Mission, Outcome>, config: &MissionConfig) -> GraphBuilder<Mission, Outcome> {
    let turn = &config.turn;
    builder
        .add("DRIVE", Drive, [(Outcome::Advance, Next::to("ADVANCE")), exit()])
        .add("ADVANCE", Advance, [(Outcome::AtLine, Next::to("AT_LINE")), exit()])
        .add(
            "TURN_LEFT_1",
            Turn::by(turn.left_1, Outcome::Detect1),
            [(Outcome::Detect1, Next::to("DETECT1")), exit()],
        )
        .add(
            "DETECT1",
            CountObjects,
            [(Outcome::TurnRight, Next::to("TURN_RIGHT")), exit()],
        )
        .add(
            "TURN_RIGHT",
            Turn::by(turn.right_1, Outcome::Drive),
            [(Outcome::Drive, Next::to("DRIVE")), exit()],
        )
        .add(
            "TURN_LEFT_2_START",
            Turn::by(turn.left_2_start, Outcome::DriveToObjects),
            [(Outcome::DriveToObjects, Next::to("DRIVE_TO_OBJECTS")), exit()],
        )
        .add(
            "DRIVE_TO_OBJECTS",
            DriveToObjects,
            [(Outcome::Detect2, Next::to("DETECT2")), exit()],
        )
        .add(
            "DETECT2",
            StudyObjects,
            [(Outcome::Turn180, Next::to("TURN_180")), exit()],
        )
        .add(
            "TURN_180",
            Turn::by(turn.turn_180, Outcome::DriveFromObjects),
            [(Outcome::DriveFromObjects, Next::to("DRIVE_FROM_OBJECTS")), exit()],
        )
        .add(
            "DRIVE_FROM_OBJECTS",
            DriveFromObjects,
            [(Outcome::Advance, Next::to("ADVANCE")), exit()],
        )
        .add(
            "TURN_LEFT_2_END",
            Turn::by(turn.left_2_end, Outcome::Drive),
            [(Outcome::Drive, Next::to("DRIVE")), exit()],
        )
}

/// The short course.
pub fn racer(config: &MissionConfig) -> Result<CourseGraph, ConfigurationError> {
    config.validate()?;
    let plan = racer_plan();
    check_launch(&plan, config)?;
    let turn = &config.turn;

    let detect3: Vec<_> = LOCATION3_STOPS
        .iter()
        .map(|k| (Outcome::TurnRight3(*k), Next::to("TURN_RIGHT_3")))
        .chain([exit()])
        .collect();

    common(GraphBuilder::new(), config)
        .add(
            "AT_LINE",
            AtLine::new(plan.clone()),
            at_line_transitions(&plan, |_| "TURN_LEFT_3".to_string()),
        )
        .add(
            "ADJUST_3",
            Turn::by(turn.adjust_3, Outcome::Drive),
            [(Outcome::Drive, Next::to("DRIVE")), exit()],
        )
        .add(
            "TURN_LEFT_3",
            Turn::per_stop(turn.left_3, Outcome::Detect3),
            [(Outcome::Detect3, Next::to("DETECT3")), exit()],
        )
        .add("DETECT3", MatchShape, detect3)
        .add(
            "TURN_RIGHT_3",
            Turn::per_stop(turn.right_3, Outcome::Drive),
            [(Outcome::Drive, Next::to("DRIVE")), exit()],
        )
        .build()
}

/// The extended course.
pub fn ultra(config: &MissionConfig) -> Result<CourseGraph, ConfigurationError> {
    config.validate()?;
    for name in ULTRA_WAYPOINTS {
        config.waypoint(name)?;
    }
    let plan = ultra_plan();
    check_launch(&plan, config)?;
    let turn = &config.turn;

    let after_tag = if config.launch.skip_push {
        Next::to("ON_RAMP")
    } else {
        Next::to("PUSH")
    };

    let mut builder = common(GraphBuilder::new(), config)
        .add(
            "AT_LINE",
            AtLine::new(plan.clone()),
            at_line_transitions(&plan, |k| format!("TURN_LEFT_3_{k}")),
        )
        .add(
            "DETECT3",
            MatchShape,
            LOCATION3_STOPS
                .iter()
                .map(|k| (Outcome::TurnRight3(*k), Next::State(format!("TURN_RIGHT_3_{k}"))))
                .chain([exit()])
                .collect::<Vec<_>>(),
        )
        .add("OFF_RAMP", DriveRamp, [(Outcome::Start, Next::to("SHAPE_SCAN")), exit()])
        .add("SHAPE_SCAN", ShapeScan, [(Outcome::Done, Next::to("BOX_SURVEY")), exit()])
        .add("BOX_SURVEY", BoxSurvey, [(Outcome::TagScan1, Next::to("TAG_SCAN_1")), exit()])
        .add(
            "TAG_SCAN_1",
            TagScan::new(ScanSide::East),
            [
                (Outcome::TagScan2, Next::to("TAG_SCAN_2")),
                (Outcome::FoundTag, after_tag.clone()),
                exit(),
            ],
        )
        .add(
            "TAG_SCAN_2",
            TagScan::new(ScanSide::West),
            [(Outcome::FoundTag, after_tag), exit()],
        )
        .add("PUSH", Push, [(Outcome::OnRamp, Next::to("ON_RAMP")), exit()])
        .add("ON_RAMP", OnRamp, [(Outcome::Drive, Next::to("DRIVE")), exit()]);

    for (i, k) in LOCATION3_STOPS.iter().enumerate() {
        builder = builder
            .add(
                format!("TURN_LEFT_3_{k}"),
                Turn::by(turn.left_3[i], Outcome::Detect3),
                [(Outcome::Detect3, Next::to("DETECT3")), exit()],
            )
            .add(
                format!("TURN_RIGHT_3_{k}"),
                Turn::by(turn.right_3[i], Outcome::Drive),
                [(Outcome::Drive, Next::to("DRIVE")), exit()],
            );
    }

    builder.build()
}
