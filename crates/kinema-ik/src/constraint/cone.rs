use nalgebra::{Unit, UnitQuaternion, Vector3};

use kinema_core::error::ConstraintError;
use kinema_core::math::twist_angle;

use super::{
    AXIS_EPSILON, cone_frame, delta_from_relative, relative_to_rest, swing_between, unit_axis,
};
use crate::joint::Joint;

/// Ball-and-socket joint: the rotated twist axis must stay inside an
/// elliptical cone around the rest twist axis, and the twist about it is
/// bounded independently.
///
/// The cone is described by four half-angles (up, down, left, right); the
/// limit in an intermediate direction interpolates them elliptically.
#[derive(Debug, Clone)]
pub struct BallAndSocket {
    rest: UnitQuaternion<f32>,
    twist: Unit<Vector3<f32>>,
    up: Unit<Vector3<f32>>,
    right: Unit<Vector3<f32>>,
    /// Half-angles `[up, down, left, right]`.
    angles: [f32; 4],
    min_twist: f32,
    max_twist: f32,
}

impl BallAndSocket {
    /// Circular cone of half-angle `angle` around `twist_axis`, free twist.
    ///
    /// # Errors
    ///
    /// [`ConstraintError::ZeroAxis`] or [`ConstraintError::InvalidConeAngle`].
    pub fn circular(twist_axis: Vector3<f32>, angle: f32) -> Result<Self, ConstraintError> {
        let twist = unit_axis(twist_axis)?;
        let up = kinema_core::math::any_orthogonal(&twist);
        Self::elliptical(twist.into_inner(), up.into_inner(), [angle; 4])
    }

    /// Elliptical cone with half-angles `[up, down, left, right]`, measured
    /// towards `up_axis` (projected perpendicular to `twist_axis`) and its
    /// complements. Twist is free.
    ///
    /// # Errors
    ///
    /// [`ConstraintError::ZeroAxis`] or [`ConstraintError::InvalidConeAngle`].
    pub fn elliptical(
        twist_axis: Vector3<f32>,
        up_axis: Vector3<f32>,
        angles: [f32; 4],
    ) -> Result<Self, ConstraintError> {
        use std::f32::consts::PI;
        let twist = unit_axis(twist_axis)?;
        for angle in angles {
            if !(angle > 0.0 && angle <= PI) {
                return Err(ConstraintError::InvalidConeAngle(angle));
            }
        }
        let (up, right) = cone_frame(&twist, &up_axis);
        Ok(Self {
            rest: UnitQuaternion::identity(),
            twist,
            up,
            right,
            angles,
            min_twist: -PI,
            max_twist: PI,
        })
    }

    /// Bound the twist about the cone axis to `[min, max]`.
    ///
    /// # Errors
    ///
    /// [`ConstraintError::InvalidBounds`] unless `-π <= min <= max <= π`.
    pub fn with_twist_limits(mut self, min: f32, max: f32) -> Result<Self, ConstraintError> {
        use std::f32::consts::PI;
        if !min.is_finite() || !max.is_finite() || min > max || min < -PI || max > PI {
            return Err(ConstraintError::InvalidBounds { min, max });
        }
        self.min_twist = min;
        self.max_twist = max;
        Ok(self)
    }

    /// Set the rest orientation the cone is measured from.
    #[must_use]
    pub const fn with_rest(mut self, rest: UnitQuaternion<f32>) -> Self {
        self.rest = rest;
        self
    }

    /// Cone axis in the rest frame.
    pub const fn twist_axis(&self) -> Unit<Vector3<f32>> {
        self.twist
    }

    /// Largest swing angle allowed in the direction `(x, y)` of the cone
    /// plane (`x` along right, `y` along up).
    fn limit(&self, x: f32, y: f32) -> f32 {
        let [up, down, left, right] = self.angles;
        let a = if x >= 0.0 { right } else { left };
        let b = if y >= 0.0 { up } else { down };
        let phi = y.atan2(x);
        let (s, c) = phi.sin_cos();
        a * b / ((b * c).powi(2) + (a * s).powi(2)).sqrt()
    }

    pub(crate) fn constrain_rotation(
        &self,
        delta: &UnitQuaternion<f32>,
        joint: &Joint,
    ) -> UnitQuaternion<f32> {
        let relative = relative_to_rest(&self.rest, delta, joint);
        let v = Unit::new_normalize(relative * self.twist.into_inner());

        let swing = swing_between(&self.twist, &v);
        let twist_part = swing.inverse() * relative;
        let twist = twist_angle(&twist_part, &self.twist);
        let clamped_twist = twist.clamp(self.min_twist, self.max_twist);

        let theta = v.dot(&self.twist).clamp(-1.0, 1.0).acos();
        let x = v.dot(&self.right);
        let y = v.dot(&self.up);
        let limit = self.limit(x, y);

        if theta <= limit && (clamped_twist - twist).abs() <= f32::EPSILON {
            return *delta;
        }

        let swing = if theta <= limit {
            swing
        } else {
            let planar = self.right.into_inner() * x + self.up.into_inner() * y;
            let dir = Unit::try_new(planar, AXIS_EPSILON).unwrap_or(self.right);
            let axis = Unit::new_normalize(self.twist.cross(&dir));
            UnitQuaternion::from_axis_angle(&axis, limit)
        };
        let feasible = swing * UnitQuaternion::from_axis_angle(&self.twist, clamped_twist);
        delta_from_relative(&self.rest, &feasible, joint)
    }
}
