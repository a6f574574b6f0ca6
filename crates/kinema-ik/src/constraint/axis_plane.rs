use nalgebra::{Unit, UnitQuaternion, Vector3};

use kinema_core::math::twist_angle;

/// Degrees of freedom left to one kind of motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Freedom {
    /// Unrestricted.
    Free,
    /// Only along (translation) or about (rotation) this axis.
    Axis(Unit<Vector3<f32>>),
    /// Only within the plane with this normal. For rotations the rotation
    /// vector is kept inside the plane.
    Plane(Unit<Vector3<f32>>),
    /// No motion at all.
    Forbidden,
}

/// Projects rotation and translation deltas onto an axis or a plane, in the
/// joint's local frame. Unlike the cone variants it acts on the delta alone.
#[derive(Debug, Clone)]
pub struct AxisPlane {
    rotation: Freedom,
    translation: Freedom,
}

impl AxisPlane {
    pub const fn new(rotation: Freedom, translation: Freedom) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Rotation only about `axis`, no translation.
    pub const fn revolute(axis: Unit<Vector3<f32>>) -> Self {
        Self::new(Freedom::Axis(axis), Freedom::Forbidden)
    }

    /// Translation only along `axis`, no rotation.
    pub const fn prismatic(axis: Unit<Vector3<f32>>) -> Self {
        Self::new(Freedom::Forbidden, Freedom::Axis(axis))
    }

    pub const fn rotation(&self) -> &Freedom {
        &self.rotation
    }

    pub const fn translation(&self) -> &Freedom {
        &self.translation
    }

    pub(crate) fn constrain_rotation(&self, delta: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
        match self.rotation {
            Freedom::Free => *delta,
            Freedom::Forbidden => UnitQuaternion::identity(),
            Freedom::Axis(axis) => UnitQuaternion::from_axis_angle(&axis, twist_angle(delta, &axis)),
            Freedom::Plane(normal) => {
                let v = delta.scaled_axis();
                UnitQuaternion::from_scaled_axis(v - normal.into_inner() * normal.dot(&v))
            }
        }
    }

    pub(crate) fn constrain_translation(&self, delta: &Vector3<f32>) -> Vector3<f32> {
        match self.translation {
            Freedom::Free => *delta,
            Freedom::Forbidden => Vector3::zeros(),
            Freedom::Axis(axis) => axis.into_inner() * axis.dot(delta),
            Freedom::Plane(normal) => delta - normal.into_inner() * normal.dot(delta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use kinema_core::math::orientation_eq;

    #[test]
    fn prismatic_projects_translation() {
        let c = AxisPlane::prismatic(Vector3::x_axis());
        let out = c.constrain_translation(&Vector3::new(0.7, 0.3, -0.2));
        assert_relative_eq!(out, Vector3::new(0.7, 0.0, 0.0));
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5);
        assert!(orientation_eq(
            &c.constrain_rotation(&q),
            &UnitQuaternion::identity(),
            1e-6
        ));
    }

    #[test]
    fn plane_translation_drops_normal_component() {
        let c = AxisPlane::new(Freedom::Free, Freedom::Plane(Vector3::z_axis()));
        let out = c.constrain_translation(&Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(out, Vector3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn revolute_keeps_twist_only() {
        let c = AxisPlane::revolute(Vector3::z_axis());
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.4)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.3);
        let out = c.constrain_rotation(&q);
        assert_relative_eq!(twist_angle(&out, &Vector3::z_axis()), 0.4, epsilon = 1e-4);
        assert_relative_eq!(out * Vector3::z(), Vector3::z(), epsilon = 1e-5);
    }

    #[test]
    fn plane_rotation_removes_normal_component() {
        let c = AxisPlane::new(Freedom::Plane(Vector3::x_axis()), Freedom::Free);
        let q = UnitQuaternion::from_scaled_axis(Vector3::new(0.3, 0.2, -0.1));
        let out = c.constrain_rotation(&q);
        assert_relative_eq!(out.scaled_axis(), Vector3::new(0.0, 0.2, -0.1), epsilon = 1e-5);
    }

    #[test]
    fn free_passes_through() {
        let c = AxisPlane::new(Freedom::Free, Freedom::Free);
        let q = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        assert!(orientation_eq(&c.constrain_rotation(&q), &q, 1e-6));
        assert_relative_eq!(c.constrain_translation(&Vector3::x()), Vector3::x());
    }
}
