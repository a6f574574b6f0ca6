use nalgebra::{Unit, UnitQuaternion, Vector2, Vector3};

use kinema_core::error::ConstraintError;

use super::{
    AXIS_EPSILON, cone_frame, delta_from_relative, relative_to_rest, swing_between, unit_axis,
};
use crate::joint::Joint;

/// Cone over an arbitrary simple polygon.
///
/// The polygon lies in the plane at distance `height` along the twist axis,
/// with 2-D coordinates `(right, up)`. A rotation is feasible when the
/// rotated twist axis, projected from the joint origin onto that plane,
/// falls inside the polygon. Infeasible rotations are moved to the nearest
/// point of the polygon boundary; the twist about the axis is kept.
#[derive(Debug, Clone)]
pub struct PlanarPolygon {
    rest: UnitQuaternion<f32>,
    twist: Unit<Vector3<f32>>,
    up: Unit<Vector3<f32>>,
    right: Unit<Vector3<f32>>,
    height: f32,
    vertices: Vec<Vector2<f32>>,
}

impl PlanarPolygon {
    /// Create a polygon cone.
    ///
    /// # Errors
    ///
    /// [`ConstraintError::ZeroAxis`], [`ConstraintError::InvalidHeight`] or
    /// [`ConstraintError::DegeneratePolygon`] for fewer than 3 vertices.
    pub fn new(
        twist_axis: Vector3<f32>,
        up_axis: Vector3<f32>,
        height: f32,
        vertices: Vec<Vector2<f32>>,
    ) -> Result<Self, ConstraintError> {
        let twist = unit_axis(twist_axis)?;
        if !height.is_finite() || height <= 0.0 {
            return Err(ConstraintError::InvalidHeight(height));
        }
        if vertices.len() < 3 {
            return Err(ConstraintError::DegeneratePolygon(vertices.len()));
        }
        let (up, right) = cone_frame(&twist, &up_axis);
        Ok(Self {
            rest: UnitQuaternion::identity(),
            twist,
            up,
            right,
            height,
            vertices,
        })
    }

    /// Set the rest orientation the cone is measured from.
    #[must_use]
    pub const fn with_rest(mut self, rest: UnitQuaternion<f32>) -> Self {
        self.rest = rest;
        self
    }

    /// Polygon vertices in plane coordinates.
    pub fn vertices(&self) -> &[Vector2<f32>] {
        &self.vertices
    }

    /// Ray-casting point-in-polygon test.
    pub fn contains(&self, p: &Vector2<f32>) -> bool {
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[j];
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Closest point of the polygon boundary to `p`.
    pub fn closest_boundary_point(&self, p: &Vector2<f32>) -> Vector2<f32> {
        let n = self.vertices.len();
        let mut best = self.vertices[0];
        let mut best_dist = f32::INFINITY;
        for i in 0..n {
            let candidate = closest_on_segment(p, &self.vertices[i], &self.vertices[(i + 1) % n]);
            let dist = (candidate - p).norm_squared();
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
        best
    }

    pub(crate) fn constrain_rotation(
        &self,
        delta: &UnitQuaternion<f32>,
        joint: &Joint,
    ) -> UnitQuaternion<f32> {
        let relative = relative_to_rest(&self.rest, delta, joint);
        let v = relative * self.twist.into_inner();
        let along = v.dot(&self.twist);
        let planar = Vector2::new(v.dot(&self.right), v.dot(&self.up));

        let target = if along > AXIS_EPSILON {
            let projected = planar * (self.height / along);
            if self.contains(&projected) {
                return *delta;
            }
            self.closest_boundary_point(&projected)
        } else {
            // Behind the polygon plane: aim from far away in the same
            // planar direction.
            match planar.try_normalize(AXIS_EPSILON) {
                Some(dir) => self.closest_boundary_point(&(dir * self.height * 1e3)),
                None => self.vertices[0],
            }
        };

        let lifted = self.twist.into_inner() * self.height
            + self.right.into_inner() * target.x
            + self.up.into_inner() * target.y;
        let Some(lifted) = Unit::try_new(lifted, AXIS_EPSILON) else {
            return UnitQuaternion::identity();
        };
        let original_swing = swing_between(&self.twist, &Unit::new_normalize(v));
        let twist_part = original_swing.inverse() * relative;
        let feasible = swing_between(&self.twist, &lifted) * twist_part;
        delta_from_relative(&self.rest, &feasible, joint)
    }
}

fn closest_on_segment(p: &Vector2<f32>, a: &Vector2<f32>, b: &Vector2<f32>) -> Vector2<f32> {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f32::EPSILON {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}
