//! A single joint of a chain.
//!
//! Joints are plain data: local translation, rotation and scale relative to
//! the parent joint, an optional [`Constraint`] and a modification stamp.
//! They live inside a [`Chain`](crate::chain::Chain) arena and are addressed
//! by [`JointId`]; only the chain mutates them, so every change is stamped.

use std::fmt;
use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};

use kinema_core::math::Pose;

use crate::constraint::Constraint;

/// Index of a joint inside its chain arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointId(pub(crate) usize);

impl JointId {
    /// Position of the joint in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A rigid-body node with a local pose relative to its parent.
#[derive(Debug, Clone)]
pub struct Joint {
    name: String,
    translation: Vector3<f32>,
    rotation: UnitQuaternion<f32>,
    scale: f32,
    parent: Option<JointId>,
    constraint: Option<Arc<Constraint>>,
    last_modified: u64,
}

impl Joint {
    pub(crate) fn new(
        name: String,
        parent: Option<JointId>,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        stamp: u64,
    ) -> Self {
        Self {
            name,
            translation,
            rotation,
            scale: 1.0,
            parent,
            constraint: None,
            last_modified: stamp,
        }
    }

    /// A detached joint with the given local pose, for evaluating
    /// constraints outside a chain.
    #[must_use]
    pub fn detached(translation: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self::new(String::new(), None, translation, rotation, 0)
    }

    /// Human-readable name (may be empty).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Translation relative to the parent frame.
    pub const fn translation(&self) -> &Vector3<f32> {
        &self.translation
    }

    /// Rotation relative to the parent frame.
    pub const fn rotation(&self) -> &UnitQuaternion<f32> {
        &self.rotation
    }

    /// Uniform scale applied to children translations.
    pub const fn scale(&self) -> f32 {
        self.scale
    }

    /// Parent joint, `None` for a root (attached to the reference frame).
    pub const fn parent(&self) -> Option<JointId> {
        self.parent
    }

    /// Motion constraint, if any.
    pub fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_deref()
    }

    /// Stamp of the last mutation of this joint.
    pub const fn last_modified(&self) -> u64 {
        self.last_modified
    }

    /// Local pose relative to the parent frame.
    #[must_use]
    pub fn local_pose(&self) -> Pose {
        Pose {
            position: self.translation,
            orientation: self.rotation,
            scale: self.scale,
        }
    }

    pub(crate) fn set_translation(&mut self, translation: Vector3<f32>, stamp: u64) {
        self.translation = translation;
        self.last_modified = stamp;
    }

    pub(crate) fn set_rotation(&mut self, rotation: UnitQuaternion<f32>, stamp: u64) {
        self.rotation = rotation;
        self.last_modified = stamp;
    }

    pub(crate) fn set_scale(&mut self, scale: f32, stamp: u64) {
        self.scale = scale;
        self.last_modified = stamp;
    }

    pub(crate) fn set_constraint(&mut self, constraint: Option<Arc<Constraint>>) {
        self.constraint = constraint;
    }
}
