use nalgebra::{Unit, UnitQuaternion, Vector3};

use kinema_core::error::ConstraintError;
use kinema_core::math::{twist_angle, wrap_angle};

use super::{delta_from_relative, relative_to_rest, unit_axis};
use crate::joint::Joint;

/// Rotation about a single axis, bounded to `[min, max]` radians from rest.
///
/// Any swing away from the axis is discarded; the remaining twist angle is
/// clamped to the nearer bound (measured around the circle).
#[derive(Debug, Clone)]
pub struct Hinge {
    rest: UnitQuaternion<f32>,
    axis: Unit<Vector3<f32>>,
    min: f32,
    max: f32,
}

impl Hinge {
    /// Create a hinge about `axis` (in the rest frame).
    ///
    /// # Errors
    ///
    /// [`ConstraintError::ZeroAxis`] for a zero axis,
    /// [`ConstraintError::InvalidBounds`] unless `-π <= min <= max <= π`.
    pub fn new(axis: Vector3<f32>, min: f32, max: f32) -> Result<Self, ConstraintError> {
        use std::f32::consts::PI;
        let axis = unit_axis(axis)?;
        if !min.is_finite() || !max.is_finite() || min > max || min < -PI || max > PI {
            return Err(ConstraintError::InvalidBounds { min, max });
        }
        Ok(Self {
            rest: UnitQuaternion::identity(),
            axis,
            min,
            max,
        })
    }

    /// Set the rest orientation the bounds are measured from.
    #[must_use]
    pub const fn with_rest(mut self, rest: UnitQuaternion<f32>) -> Self {
        self.rest = rest;
        self
    }

    /// The hinge axis in the rest frame.
    pub const fn axis(&self) -> Unit<Vector3<f32>> {
        self.axis
    }

    /// Rest orientation.
    pub const fn rest(&self) -> &UnitQuaternion<f32> {
        &self.rest
    }

    /// Angular bounds `(min, max)`.
    pub const fn bounds(&self) -> (f32, f32) {
        (self.min, self.max)
    }

    /// Clamp an angle to the bounds, choosing the circularly nearer bound
    /// when it lies outside.
    pub fn clamp_angle(&self, angle: f32) -> f32 {
        if (self.min..=self.max).contains(&angle) {
            return angle;
        }
        let to_min = wrap_angle(angle - self.min).abs();
        let to_max = wrap_angle(angle - self.max).abs();
        if to_min <= to_max { self.min } else { self.max }
    }

    pub(crate) fn constrain_rotation(
        &self,
        delta: &UnitQuaternion<f32>,
        joint: &Joint,
    ) -> UnitQuaternion<f32> {
        let relative = relative_to_rest(&self.rest, delta, joint);
        let angle = self.clamp_angle(twist_angle(&relative, &self.axis));
        let feasible = UnitQuaternion::from_axis_angle(&self.axis, angle);
        delta_from_relative(&self.rest, &feasible, joint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kinema_core::math::{orientation_eq, rotation_angle};

    fn joint_at(rotation: UnitQuaternion<f32>) -> Joint {
        Joint::detached(Vector3::zeros(), rotation)
    }

    #[test]
    fn rejects_inverted_bounds() {
        assert!(matches!(
            Hinge::new(Vector3::z(), 0.5, -0.5),
            Err(ConstraintError::InvalidBounds { .. })
        ));
        assert!(matches!(
            Hinge::new(Vector3::zeros(), -0.5, 0.5),
            Err(ConstraintError::ZeroAxis)
        ));
    }

    #[test]
    fn feasible_delta_unchanged() {
        let hinge = Hinge::new(Vector3::z(), -1.0, 1.0).unwrap();
        let delta = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.4);
        let out = hinge.constrain_rotation(&delta, &joint_at(UnitQuaternion::identity()));
        assert!(orientation_eq(&out, &delta, 1e-5));
    }

    #[test]
    fn over_bound_returns_boundary() {
        let hinge = Hinge::new(Vector3::z(), -0.25, 0.5).unwrap();
        let delta = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.0);
        let out = hinge.constrain_rotation(&delta, &joint_at(UnitQuaternion::identity()));
        let boundary = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5);
        assert!(orientation_eq(&out, &boundary, 1e-5));

        let delta = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -1.0);
        let out = hinge.constrain_rotation(&delta, &joint_at(UnitQuaternion::identity()));
        let boundary = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -0.25);
        assert!(orientation_eq(&out, &boundary, 1e-5));
    }

    #[test]
    fn bound_measured_from_current_rotation() {
        let hinge = Hinge::new(Vector3::z(), -0.5, 0.5).unwrap();
        let current = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3);
        let delta = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.4);
        let out = hinge.constrain_rotation(&delta, &joint_at(current));
        assert_relative_eq!(rotation_angle(&out), 0.2, epsilon = 1e-4);
    }

    #[test]
    fn swing_is_removed() {
        let hinge = Hinge::new(Vector3::z(), -1.0, 1.0).unwrap();
        let delta = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.6)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3);
        let out = hinge.constrain_rotation(&delta, &joint_at(UnitQuaternion::identity()));
        let mapped = out * Vector3::z();
        assert_relative_eq!(mapped, Vector3::z(), epsilon = 1e-5);
    }

    #[test]
    fn rest_offsets_bounds() {
        let rest = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.0);
        let hinge = Hinge::new(Vector3::z(), -0.1, 0.1).unwrap().with_rest(rest);
        let out = hinge.constrain_rotation(
            &UnitQuaternion::identity(),
            &joint_at(UnitQuaternion::identity()),
        );
        assert_relative_eq!(twist_angle(&out, &Vector3::z_axis()), 0.9, epsilon = 1e-4);
    }

    #[test]
    fn clamp_angle_picks_circular_neighbour() {
        let hinge = Hinge::new(Vector3::z(), -0.5, 2.5).unwrap();
        assert_relative_eq!(hinge.clamp_angle(3.0), 2.5);
        assert_relative_eq!(hinge.clamp_angle(-3.0), 2.5);
        assert_relative_eq!(hinge.clamp_angle(-0.9), -0.5);
    }
}
