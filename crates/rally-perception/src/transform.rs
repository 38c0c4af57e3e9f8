//! Named-transform tree.
//!
//! Maintains a graph of named reference frames (`"map"`, `"odom"`,
//! `"base_link"`, `"ar_marker_4"`, `"box_left"`, …) and the rigid transforms
//! that relate them.  Each edge is stored once, parent → child; lookups walk
//! edges in either direction (inverting where needed) and compose the chain
//! found by BFS.
//!
//! [`TransformLookup`] and [`TransformBroadcaster`] are the seams mission
//! states use; [`SharedTfTree`] is a cloneable handle implementing both.
//!
//! # Example
//!
//! ```rust
//! use rally_perception::transform::TfTree;
//! use rally_types::Pose;
//!
//! let mut tf = TfTree::new();
//! tf.set_transform("map", "odom", Pose::planar(1.0, 0.0, 0.0));
//! tf.set_transform("odom", "base_link", Pose::planar(0.5, 0.0, 0.0));
//!
//! let base_in_map = tf.lookup("map", "base_link").unwrap();
//! assert!((base_in_map.position.x - 1.5).abs() < 1e-5);
//!
//! // Reverse direction is resolved through the inverse transform.
//! let map_in_base = tf.lookup("base_link", "map").unwrap();
//! assert!((map_in_base.position.x + 1.5).abs() < 1e-5);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use rally_types::Pose;
use tracing::warn;

/// Resolve the pose of `source_frame` expressed in `target_frame`.
pub trait TransformLookup: Send + Sync {
    fn lookup(&self, target_frame: &str, source_frame: &str) -> Option<Pose>;
}

/// Publish the pose of `child_frame` relative to `parent_frame`.
pub trait TransformBroadcaster: Send + Sync {
    fn broadcast(&self, parent_frame: &str, child_frame: &str, pose: Pose);
}

// ────────────────────────────────────────────────────────────────────────────
// TfTree
// ────────────────────────────────────────────────────────────────────────────

/// Graph of named frames.
///
/// `edges[parent][child]` is the pose of `child` in `parent`.
#[derive(Debug, Default, Clone)]
pub struct TfTree {
    edges: HashMap<String, HashMap<String, Pose>>,
}

impl TfTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update the transform from `parent_frame` to `child_frame`.
    ///
    /// A frame has a single parent: re-parenting removes the old edge.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, pose: Pose) {
        for (parent, children) in self.edges.iter_mut() {
            if parent != parent_frame {
                children.remove(child_frame);
            }
        }
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), pose);
    }

    pub fn has_frame(&self, frame: &str) -> bool {
        self.edges.contains_key(frame) || self.edges.values().any(|c| c.contains_key(frame))
    }

    /// Outgoing hops from `frame`: children as stored, parents inverted.
    fn neighbours<'a>(&'a self, frame: &'a str) -> impl Iterator<Item = (&'a str, Pose)> + 'a {
        let down = self
            .edges
            .get(frame)
            .into_iter()
            .flat_map(|children| children.iter().map(|(c, p)| (c.as_str(), *p)));
        let up = self.edges.iter().filter_map(move |(parent, children)| {
            children
                .get(frame)
                .map(|pose| (parent.as_str(), pose.inverse()))
        });
        down.chain(up)
    }

    /// Pose of `source_frame` expressed in `target_frame`, or `None` if the
    /// frames are not connected.
    pub fn lookup(&self, target_frame: &str, source_frame: &str) -> Option<Pose> {
        if source_frame == target_frame {
            return Some(Pose::identity());
        }

        // BFS from the target; the accumulated pose is T_target_current.
        let mut queue: VecDeque<(String, Pose)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back((target_frame.to_string(), Pose::identity()));
        visited.insert(target_frame.to_string());

        while let Some((current, accumulated)) = queue.pop_front() {
            for (next, hop) in self.neighbours(&current) {
                if visited.contains(next) {
                    continue;
                }
                let composed = accumulated.compose(hop);
                if next == source_frame {
                    return Some(composed);
                }
                visited.insert(next.to_string());
                queue.push_back((next.to_string(), composed));
            }
        }

        None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SharedTfTree
// ────────────────────────────────────────────────────────────────────────────

/// Cloneable, thread-safe handle over one [`TfTree`].
#[derive(Debug, Clone, Default)]
pub struct SharedTfTree {
    inner: Arc<RwLock<TfTree>>,
}

impl SharedTfTree {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransformLookup for SharedTfTree {
    fn lookup(&self, target_frame: &str, source_frame: &str) -> Option<Pose> {
        match self.inner.read() {
            Ok(tree) => tree.lookup(target_frame, source_frame),
            Err(_) => {
                warn!("transform tree lock poisoned");
                None
            }
        }
    }
}

impl TransformBroadcaster for SharedTfTree {
    fn broadcast(&self, parent_frame: &str, child_frame: &str, pose: Pose) {
        match self.inner.write() {
            Ok(mut tree) => tree.set_transform(parent_frame, child_frame, pose),
            Err(_) => warn!(child_frame, "transform tree lock poisoned; broadcast dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rally_types::{Quaternion, Vec3};
    use std::f32::consts::FRAC_1_SQRT_2;

    fn translation(x: f32, y: f32) -> Pose {
        Pose::new(Vec3::new(x, y, 0.0), Quaternion::identity())
    }

    #[test]
    fn lookup_same_frame_returns_identity() {
        let tf = TfTree::new();
        assert_eq!(tf.lookup("map", "map"), Some(Pose::identity()));
    }

    #[test]
    fn lookup_composed_chain() {
        let mut tf = TfTree::new();
        tf.set_transform("map", "odom", translation(1.0, 0.0));
        tf.set_transform("odom", "base_link", translation(0.5, 0.0));

        let t = tf.lookup("map", "base_link").unwrap();
        assert!((t.position.x - 1.5).abs() < 1e-5);
    }

    #[test]
    fn lookup_respects_rotation_in_chain() {
        // base_link yawed 90° at the origin; the camera 1 m ahead of it ends
        // up on the map's +Y axis.
        let q90z = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let mut tf = TfTree::new();
        tf.set_transform("map", "base_link", Pose::new(Vec3::zero(), q90z));
        tf.set_transform("base_link", "camera", translation(1.0, 0.0));

        let t = tf.lookup("map", "camera").unwrap();
        assert!(t.position.x.abs() < 1e-5, "x={}", t.position.x);
        assert!((t.position.y - 1.0).abs() < 1e-5, "y={}", t.position.y);
    }

    #[test]
    fn lookup_walks_sibling_branches() {
        // odom → base_link → camera → ar_marker_3 → box_left, resolved from
        // the marker side back up to odom.
        let mut tf = TfTree::new();
        tf.set_transform("odom", "base_link", Pose::planar(2.0, 0.0, 90.0));
        tf.set_transform("base_link", "camera", translation(0.1, 0.0));
        tf.set_transform("camera", "ar_marker_3", translation(1.0, 0.0));
        tf.set_transform("ar_marker_3", "box_left", translation(0.0, 0.3));

        let marker = tf.lookup("odom", "ar_marker_3").unwrap();
        assert!((marker.position.x - 2.0).abs() < 1e-4);
        assert!((marker.position.y - 1.1).abs() < 1e-4);

        let back = tf.lookup("ar_marker_3", "odom").unwrap();
        let round = marker.compose(back);
        assert!(round.position.x.abs() < 1e-4 && round.position.y.abs() < 1e-4);

        let side = tf.lookup("odom", "box_left").unwrap();
        assert!((side.position.x - 1.7).abs() < 1e-4);
    }

    #[test]
    fn lookup_no_path_returns_none() {
        let mut tf = TfTree::new();
        tf.set_transform("map", "odom", translation(1.0, 0.0));
        tf.set_transform("camera", "ar_marker_1", translation(1.0, 0.0));
        assert!(tf.lookup("map", "ar_marker_1").is_none());
        assert!(tf.lookup("map", "ghost").is_none());
    }

    #[test]
    fn reparenting_replaces_the_old_edge() {
        let mut tf = TfTree::new();
        tf.set_transform("map", "box_left", translation(1.0, 0.0));
        tf.set_transform("ar_marker_2", "box_left", translation(0.0, 0.5));
        tf.set_transform("map", "ar_marker_2", translation(3.0, 0.0));

        let t = tf.lookup("map", "box_left").unwrap();
        assert!((t.position.x - 3.0).abs() < 1e-5);
        assert!((t.position.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn shared_handle_sees_broadcasts() {
        let shared = SharedTfTree::new();
        let other = shared.clone();
        other.broadcast("map", "initialpose", Pose::planar(4.0, -1.0, 180.0));

        let pose = shared.lookup("map", "initialpose").unwrap();
        assert!((pose.position.x - 4.0).abs() < 1e-5);
        assert!((pose.yaw_degrees().abs() - 180.0).abs() < 1e-2);
    }
}
