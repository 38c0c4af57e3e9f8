//! Concrete course states and the closed outcome set they emit.
//!
//! | Module | States |
//! |---|---|
//! | [`line`] | `Drive`, `Advance`, `AtLine`, `DriveToObjects`, `DriveFromObjects`, `DriveRamp` |
//! | [`turn`] | `Turn` |
//! | [`detect`] | `CountObjects`, `StudyObjects`, `MatchShape`, `ShapeScan` |
//! | [`search`] | `BoxSurvey`, `TagScan` |
//! | [`push`] | `Push`, `OnRamp` |

pub mod detect;
pub mod line;
pub mod push;
pub mod search;
pub mod turn;

pub use detect::{CountObjects, MatchShape, ShapeScan, StudyObjects};
pub use line::{Advance, AtLine, Drive, DriveFromObjects, DriveRamp, DriveToObjects};
pub use push::{OnRamp, Push};
pub use search::{BoxSurvey, ScanSide, TagScan};
pub use turn::{Turn, TurnAngle};

use crate::fsm::OutcomeKind;

/// Every outcome a course state can return.
///
/// Location-3 outcomes carry the stop number (1 to 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Advance,
    AtLine,
    Drive,
    TurnLeft1,
    TurnRight,
    Detect1,
    TurnLeft2Start,
    DriveToObjects,
    Detect2,
    Turn180,
    DriveFromObjects,
    TurnLeft2End,
    Adjust3,
    TurnLeft3(u8),
    Detect3,
    TurnRight3(u8),
    OffRamp,
    Start,
    Done,
    TagScan1,
    TagScan2,
    FoundTag,
    OnRamp,
    Finish,
    Exit,
}

impl OutcomeKind for Outcome {
    fn exit() -> Self {
        Outcome::Exit
    }
}

/// Location-3 stop numbers.
pub const LOCATION3_STOPS: [u8; 3] = [1, 2, 3];
