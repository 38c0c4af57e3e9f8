//! Request/response navigation to a goal pose.
//!
//! Planning and obstacle avoidance live behind [`Navigator`]; the caller only
//! learns whether the goal was reached.  No timeout is imposed here: a call
//! blocks until the navigator answers.

use async_trait::async_trait;
use rally_types::Pose;

/// Frame waypoint poses are expressed in.
pub const MAP_FRAME: &str = "map";

/// Where to drive.
#[derive(Debug, Clone, PartialEq)]
pub enum NavGoal {
    /// A named waypoint from the configuration table, in [`MAP_FRAME`].
    Waypoint { name: String, pose: Pose },
    /// A pose relative to a named frame (e.g. the identity pose of
    /// `"box_left"`).
    InFrame { frame: String, pose: Pose },
}

impl NavGoal {
    pub fn waypoint(name: impl Into<String>, pose: Pose) -> Self {
        Self::Waypoint {
            name: name.into(),
            pose,
        }
    }

    /// The origin of `frame`.
    pub fn frame_origin(frame: impl Into<String>) -> Self {
        Self::InFrame {
            frame: frame.into(),
            pose: Pose::identity(),
        }
    }

    pub fn frame(&self) -> &str {
        match self {
            NavGoal::Waypoint { .. } => MAP_FRAME,
            NavGoal::InFrame { frame, .. } => frame,
        }
    }

    pub fn pose(&self) -> Pose {
        match self {
            NavGoal::Waypoint { pose, .. } | NavGoal::InFrame { pose, .. } => *pose,
        }
    }

    /// Short human-readable label for logs.
    pub fn label(&self) -> &str {
        match self {
            NavGoal::Waypoint { name, .. } => name,
            NavGoal::InFrame { frame, .. } => frame,
        }
    }
}

/// Final status reported by the navigator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    Succeeded,
    Failed,
}

impl NavOutcome {
    pub fn succeeded(self) -> bool {
        self == NavOutcome::Succeeded
    }
}

/// External go-to-pose collaborator.
#[async_trait]
pub trait Navigator: Send {
    async fn go_to(&mut self, goal: &NavGoal) -> NavOutcome;
}
