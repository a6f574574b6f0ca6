//! Rigid-body pose math shared by every kinema crate.
//!
//! A [`Pose`] is a position, a unit-quaternion orientation and a uniform
//! scale. Poses compose parent-first: `parent.compose(&local)` yields the
//! world pose of a frame whose local pose is `local` relative to `parent`.

use nalgebra::{Unit, UnitQuaternion, Vector3};

/// Default absolute tolerance used for approximate pose comparisons.
pub const DEFAULT_TOLERANCE: f32 = 1e-5;

// ---------------------------------------------------------------------------
// Pose
// ---------------------------------------------------------------------------

/// Position, orientation and uniform scale of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Translation of the frame origin.
    pub position: Vector3<f32>,
    /// Orientation of the frame.
    pub orientation: UnitQuaternion<f32>,
    /// Uniform scale applied to child translations.
    pub scale: f32,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// The identity pose (origin, no rotation, unit scale).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            scale: 1.0,
        }
    }

    /// Create a pose with unit scale.
    #[must_use]
    pub const fn new(position: Vector3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self {
            position,
            orientation,
            scale: 1.0,
        }
    }

    /// Create a pose at `position` with identity orientation.
    #[must_use]
    pub fn from_position(position: Vector3<f32>) -> Self {
        Self::new(position, UnitQuaternion::identity())
    }

    /// Set the uniform scale.
    #[must_use]
    pub const fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Compose this (parent) pose with a local pose expressed in it.
    #[must_use]
    pub fn compose(&self, local: &Self) -> Self {
        Self {
            position: self.position + self.orientation * (local.position * self.scale),
            orientation: self.orientation * local.orientation,
            scale: self.scale * local.scale,
        }
    }

    /// Map a point expressed in this frame into the parent frame.
    #[must_use]
    pub fn transform_point(&self, local: &Vector3<f32>) -> Vector3<f32> {
        self.position + self.orientation * (local * self.scale)
    }

    /// Map a point expressed in the parent frame into this frame.
    ///
    /// A zero scale maps every point to the origin.
    #[must_use]
    pub fn inverse_transform_point(&self, world: &Vector3<f32>) -> Vector3<f32> {
        if self.scale == 0.0 {
            return Vector3::zeros();
        }
        self.orientation.inverse() * (world - self.position) / self.scale
    }

    /// Map a displacement expressed in the parent frame into this frame.
    #[must_use]
    pub fn inverse_transform_vector(&self, world: &Vector3<f32>) -> Vector3<f32> {
        if self.scale == 0.0 {
            return Vector3::zeros();
        }
        self.orientation.inverse() * world / self.scale
    }

    /// Euclidean distance between the two positions.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        (self.position - other.position).norm()
    }

    /// Angle in radians between the two orientations, in `[0, π]`.
    #[must_use]
    pub fn angle_to(&self, other: &Self) -> f32 {
        rotation_angle(&(self.orientation.inverse() * other.orientation))
    }

    /// Whether position and orientation agree within `tolerance`.
    ///
    /// Orientation is compared through the angle of the relative rotation,
    /// so `q` and `-q` are considered equal.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        position_eq(&self.position, &other.position, tolerance)
            && orientation_eq(&self.orientation, &other.orientation, tolerance)
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

/// Component-wise approximate equality of two vectors.
#[must_use]
pub fn position_eq(a: &Vector3<f32>, b: &Vector3<f32>, tolerance: f32) -> bool {
    (a - b).amax() <= tolerance
}

/// Approximate equality of two rotations, sign-insensitive.
///
/// `tolerance` bounds the angle (radians) of the relative rotation.
#[must_use]
pub fn orientation_eq(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, tolerance: f32) -> bool {
    rotation_angle(&(a.inverse() * b)) <= tolerance
}

/// Rotation angle of `q` in `[0, π]`.
///
/// Uses `atan2` on the vector part so that small angles keep their
/// precision in `f32`.
#[must_use]
pub fn rotation_angle(q: &UnitQuaternion<f32>) -> f32 {
    2.0 * q.imag().norm().atan2(q.w.abs())
}

/// Euler angles `(roll, pitch, yaw)` of a rotation.
#[must_use]
pub fn euler_angles(q: &UnitQuaternion<f32>) -> Vector3<f32> {
    let (roll, pitch, yaw) = q.euler_angles();
    Vector3::new(roll, pitch, yaw)
}

/// Rotation built from `(roll, pitch, yaw)` Euler angles.
#[must_use]
pub fn from_euler(angles: &Vector3<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::from_euler_angles(angles.x, angles.y, angles.z)
}

/// Normalize `v`, returning `None` when its length is below `eps`.
#[must_use]
pub fn try_unit(v: &Vector3<f32>, eps: f32) -> Option<Unit<Vector3<f32>>> {
    Unit::try_new(*v, eps)
}

/// Any unit vector perpendicular to `v`.
///
/// `v` need not be normalized but must be non-zero; a zero input yields the
/// X axis.
#[must_use]
pub fn any_orthogonal(v: &Vector3<f32>) -> Unit<Vector3<f32>> {
    let helper = if v.x.abs() < 0.9 * v.norm() {
        Vector3::x()
    } else {
        Vector3::y()
    };
    Unit::try_new(v.cross(&helper), 1e-9).unwrap_or_else(Vector3::x_axis)
}

/// Signed twist angle of `q` about `axis`, in `(-π, π]`.
///
/// This is the angle of the twist component of the swing-twist
/// decomposition of `q` with respect to `axis`.
#[must_use]
pub fn twist_angle(q: &UnitQuaternion<f32>, axis: &Unit<Vector3<f32>>) -> f32 {
    let imag = q.imag();
    let projected = axis.dot(&imag);
    let angle = 2.0 * projected.atan2(q.w);
    wrap_angle(angle)
}

/// Wrap an angle into `(-π, π]`.
#[must_use]
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
