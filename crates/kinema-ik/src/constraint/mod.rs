//! Feasible-motion filters attached to joints.
//!
//! A [`Constraint`] maps a proposed local rotation (or translation) delta to
//! the closest delta that keeps the joint inside its feasible set, measured
//! from the constraint's rest orientation. All variants share the contract:
//!
//! - feasible input comes back unchanged,
//! - the mapping is idempotent: `c(c(x)) == c(x)`,
//! - a delta with no feasible representative degrades to no motion.
//!
//! Constraints are stateless and are shared between chains behind `Arc`.
//! Dispatch is a `match` over the closed set of variants.

mod axis_plane;
mod cone;
mod hinge;
mod polygon;

pub use axis_plane::{AxisPlane, Freedom};
pub use cone::BallAndSocket;
pub use hinge::Hinge;
pub use polygon::PlanarPolygon;

use nalgebra::{Unit, UnitQuaternion, Vector3};

use kinema_core::error::ConstraintError;
use kinema_core::math::any_orthogonal;

use crate::joint::Joint;

/// Below this length an axis or direction is treated as zero.
pub(crate) const AXIS_EPSILON: f32 = 1e-6;

/// Joint motion constraint.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Rotation about one local axis within angular bounds.
    Hinge(Hinge),
    /// Swing inside an elliptical cone plus a bounded twist.
    BallAndSocket(BallAndSocket),
    /// Swing inside the cone over a planar polygon; no translation.
    PlanarPolygon(PlanarPolygon),
    /// Rotation and translation each limited to an axis, a plane, nothing
    /// or everything.
    AxisPlane(AxisPlane),
}

impl Constraint {
    /// Limit a local rotation delta (post-multiplied onto the joint
    /// rotation) to the feasible set.
    #[must_use]
    pub fn constrain_rotation(
        &self,
        delta: &UnitQuaternion<f32>,
        joint: &Joint,
    ) -> UnitQuaternion<f32> {
        match self {
            Self::Hinge(c) => c.constrain_rotation(delta, joint),
            Self::BallAndSocket(c) => c.constrain_rotation(delta, joint),
            Self::PlanarPolygon(c) => c.constrain_rotation(delta, joint),
            Self::AxisPlane(c) => c.constrain_rotation(delta),
        }
    }

    /// Limit a translation delta (expressed in the parent frame).
    #[must_use]
    pub fn constrain_translation(&self, delta: &Vector3<f32>) -> Vector3<f32> {
        match self {
            Self::Hinge(_) | Self::BallAndSocket(_) | Self::PlanarPolygon(_) => Vector3::zeros(),
            Self::AxisPlane(c) => c.constrain_translation(delta),
        }
    }

    /// The single rotation axis this constraint allows, in the joint's own
    /// frame, when there is one.
    #[must_use]
    pub fn rotation_axis(&self) -> Option<Unit<Vector3<f32>>> {
        match self {
            Self::Hinge(c) => Some(c.axis()),
            Self::AxisPlane(c) => match c.rotation() {
                Freedom::Axis(axis) => Some(*axis),
                _ => None,
            },
            Self::BallAndSocket(_) | Self::PlanarPolygon(_) => None,
        }
    }
}

impl From<Hinge> for Constraint {
    fn from(c: Hinge) -> Self {
        Self::Hinge(c)
    }
}

impl From<BallAndSocket> for Constraint {
    fn from(c: BallAndSocket) -> Self {
        Self::BallAndSocket(c)
    }
}

impl From<PlanarPolygon> for Constraint {
    fn from(c: PlanarPolygon) -> Self {
        Self::PlanarPolygon(c)
    }
}

impl From<AxisPlane> for Constraint {
    fn from(c: AxisPlane) -> Self {
        Self::AxisPlane(c)
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Normalize a constructor axis argument.
pub(crate) fn unit_axis(v: Vector3<f32>) -> Result<Unit<Vector3<f32>>, ConstraintError> {
    Unit::try_new(v, AXIS_EPSILON).ok_or(ConstraintError::ZeroAxis)
}

/// Orthonormal `(up, right)` pair perpendicular to `twist`, with `up` as
/// close as possible to the requested direction.
pub(crate) fn cone_frame(
    twist: &Unit<Vector3<f32>>,
    up: &Vector3<f32>,
) -> (Unit<Vector3<f32>>, Unit<Vector3<f32>>) {
    let projected = up - twist.into_inner() * twist.dot(up);
    let up = Unit::try_new(projected, AXIS_EPSILON).unwrap_or_else(|| any_orthogonal(twist));
    let right = Unit::new_normalize(up.cross(twist));
    (up, right)
}

/// Minimal rotation taking `from` onto `to`; a half turn about any
/// perpendicular axis when they are opposite.
pub(crate) fn swing_between(
    from: &Unit<Vector3<f32>>,
    to: &Unit<Vector3<f32>>,
) -> UnitQuaternion<f32> {
    UnitQuaternion::rotation_between_axis(from, to).unwrap_or_else(|| {
        UnitQuaternion::from_axis_angle(&any_orthogonal(from), std::f32::consts::PI)
    })
}

/// The rotation a delta would leave the joint in, relative to `rest`.
pub(crate) fn relative_to_rest(
    rest: &UnitQuaternion<f32>,
    delta: &UnitQuaternion<f32>,
    joint: &Joint,
) -> UnitQuaternion<f32> {
    rest.inverse() * joint.rotation() * delta
}

/// Convert a feasible rotation relative to `rest` back into a delta.
pub(crate) fn delta_from_relative(
    rest: &UnitQuaternion<f32>,
    relative: &UnitQuaternion<f32>,
    joint: &Joint,
) -> UnitQuaternion<f32> {
    joint.rotation().inverse() * rest * relative
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
