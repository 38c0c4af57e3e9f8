//! Mutable record shared by every state of one mission run.
//!
//! Owned exclusively by the mission; states read and write it between ticks.
//! Nothing here is synchronised because only the active state touches it.

use rally_types::{Pose, Shape};

/// Box side frames resolved into `map` after the box survey.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSides {
    pub left: Pose,
    pub right: Pose,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionContext {
    /// Shape studied at location 2, compared against at location 3 and the
    /// parking spots.
    pub shape: Option<Shape>,
    /// Object count from the most recent count sample.
    pub object_count: Option<u32>,
    /// Marker id claimed by the box.
    pub box_id: Option<u32>,
    pub box_sides: Option<BoxSides>,
    /// Pose of the target tag (or the fallback waypoint) for the push.
    pub target_pose: Option<Pose>,
    /// Frame the push starts from: `box_left` or `box_right`.
    pub push_start_frame: Option<String>,
    /// Last line-following error.
    pub path_error: f32,
    /// Index into the course plan consumed by `AT_LINE`.
    pub line_index: usize,
    /// Active location-3 stop, 1 to 3.
    pub location3_stop: Option<u8>,
}

impl MissionContext {
    pub fn new(initial_line: usize) -> Self {
        Self {
            line_index: initial_line,
            ..Self::default()
        }
    }

    /// True when `shape` is known and equals the studied shape.
    pub fn matches_shape(&self, shape: Shape) -> bool {
        shape != Shape::Unknown && self.shape == Some(shape)
    }
}
