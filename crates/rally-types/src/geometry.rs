//! Rigid-body geometry shared by every crate: translations, unit quaternions
//! and poses.
//!
//! A [`Pose`] doubles as a transform: the pose of frame B expressed in frame A
//! maps points from B into A (rotate, then translate).
//!
//! # Example
//!
//! ```rust
//! use rally_types::{Pose, Vec3};
//!
//! let base = Pose::planar(1.0, 0.0, 90.0);
//! let camera = Pose::new(Vec3::new(0.5, 0.0, 0.0), rally_types::Quaternion::identity());
//!
//! let composed = base.compose(camera);
//! assert!((composed.position.y - 0.5).abs() < 1e-5);
//! ```

use serde::{Deserialize, Serialize};

/// A 3-D translation vector (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `yaw_rad` about the vertical (Z) axis.
    pub fn from_yaw(yaw_rad: f32) -> Self {
        let half = yaw_rad * 0.5;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Heading about the vertical axis, in radians within `(-π, π]`.
    pub fn yaw(self) -> f32 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

/// Position and orientation of a body, or equivalently the rigid transform
/// from a child frame into its parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// A pose on the floor plane: `(x, y)` in metres, heading in degrees.
    pub fn planar(x: f32, y: f32, yaw_deg: f32) -> Self {
        Self::new(
            Vec3::new(x, y, 0.0),
            Quaternion::from_yaw(yaw_deg.to_radians()),
        )
    }

    /// Heading about the vertical axis in degrees within `(-180, 180]`.
    pub fn yaw_degrees(&self) -> f32 {
        self.orientation.yaw().to_degrees()
    }

    /// Compose two transforms: `self` applied first, then `other`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self
            .position
            .add(self.orientation.rotate(other.position));
        Self::new(translated, self.orientation.mul(other.orientation))
    }

    /// The inverse transform: if `self` = T_A_B, returns T_B_A.
    pub fn inverse(self) -> Self {
        let inv_rot = self.orientation.conjugate();
        let p = inv_rot.rotate(self.position);
        Self::new(Vec3::new(-p.x, -p.y, -p.z), inv_rot)
    }
}

/// Wrap an angle in degrees into `(-180, 180]`.
pub fn normalize_degrees(angle: f32) -> f32 {
    let mut a = angle % 360.0;
    if a > 180.0 {
        a -= 360.0;
    } else if a <= -180.0 {
        a += 360.0;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaw_survives_quaternion_roundtrip() {
        for deg in [-170.0_f32, -90.0, 0.0, 45.0, 135.0] {
            let q = Quaternion::from_yaw(deg.to_radians());
            assert!((q.yaw().to_degrees() - deg).abs() < 1e-3, "yaw {deg}");
        }
    }

    #[test]
    fn compose_then_inverse_is_identity() {
        let a = Pose::planar(1.0, 2.0, 30.0);
        let back = a.compose(a.inverse());
        assert!(back.position.x.abs() < 1e-5);
        assert!(back.position.y.abs() < 1e-5);
        assert!(back.yaw_degrees().abs() < 1e-3);
    }

    #[test]
    fn normalize_wraps_into_half_open_range() {
        assert!((normalize_degrees(190.0) - -170.0).abs() < 1e-4);
        assert!((normalize_degrees(-190.0) - 170.0).abs() < 1e-4);
        assert!((normalize_degrees(180.0) - 180.0).abs() < 1e-4);
        assert!((normalize_degrees(-180.0) - 180.0).abs() < 1e-4);
        assert!((normalize_degrees(725.0) - 5.0).abs() < 1e-4);
    }
}
