//! Joint arena.
//!
//! A [`Chain`] stores its joints in a contiguous `Vec` where every parent
//! precedes its children, so index order is a valid root-to-tip traversal.
//! Roots hang off an external reference frame. Every structural or pose
//! mutation advances a single logical clock and stamps the touched joint;
//! [`ChainCache`](crate::cache::ChainCache) compares those stamps to decide
//! what to recompute.

use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector3};

use kinema_core::error::ChainError;
use kinema_core::math::Pose;

use crate::constraint::Constraint;
use crate::joint::{Joint, JointId};

/// Ordered tree of joints plus designated end-effectors.
#[derive(Debug, Clone)]
pub struct Chain {
    joints: Vec<Joint>,
    effectors: Vec<JointId>,
    reference: Pose,
    reference_modified: u64,
    clock: u64,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(Pose::identity())
    }
}

impl Chain {
    /// Create an empty chain whose roots are expressed in `reference`.
    #[must_use]
    pub fn new(reference: Pose) -> Self {
        Self {
            joints: Vec::new(),
            effectors: Vec::new(),
            reference,
            reference_modified: 0,
            clock: 0,
        }
    }

    /// Number of joints.
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// Whether the chain has no joints.
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Current value of the logical modification clock.
    pub const fn clock(&self) -> u64 {
        self.clock
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Append a joint attached directly to the reference frame.
    pub fn push_root(
        &mut self,
        name: impl Into<String>,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) -> JointId {
        let stamp = self.tick();
        let id = JointId(self.joints.len());
        self.joints
            .push(Joint::new(name.into(), None, translation, rotation, stamp));
        id
    }

    /// Append a joint below `parent`.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `parent` is not in this chain.
    pub fn push_child(
        &mut self,
        parent: JointId,
        name: impl Into<String>,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) -> Result<JointId, ChainError> {
        self.joint(parent)?;
        let stamp = self.tick();
        let id = JointId(self.joints.len());
        self.joints.push(Joint::new(
            name.into(),
            Some(parent),
            translation,
            rotation,
            stamp,
        ));
        Ok(id)
    }

    /// Build a chain from `(name, parent index, translation, rotation)`
    /// records, the shape a loader produces.
    ///
    /// # Errors
    ///
    /// [`ChainError::ParentOutOfOrder`] when a parent index does not precede
    /// its child.
    pub fn from_records<N: Into<String>>(
        reference: Pose,
        records: impl IntoIterator<Item = (N, Option<usize>, Vector3<f32>, UnitQuaternion<f32>)>,
    ) -> Result<Self, ChainError> {
        let mut chain = Self::new(reference);
        for (name, parent, translation, rotation) in records {
            match parent {
                None => {
                    chain.push_root(name, translation, rotation);
                }
                Some(parent) if parent < chain.len() => {
                    chain.push_child(JointId(parent), name, translation, rotation)?;
                }
                Some(parent) => {
                    return Err(ChainError::ParentOutOfOrder {
                        joint: chain.len(),
                        parent,
                    });
                }
            }
        }
        Ok(chain)
    }

    /// Attach a constraint to a joint. Constraints do not move the joint,
    /// so the clock is left alone.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in this chain.
    pub fn set_constraint(
        &mut self,
        id: JointId,
        constraint: impl Into<Constraint>,
    ) -> Result<(), ChainError> {
        self.set_shared_constraint(id, Some(Arc::new(constraint.into())))
    }

    /// Attach (or with `None`, remove) a constraint shared with other chains.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in this chain.
    pub fn set_shared_constraint(
        &mut self,
        id: JointId,
        constraint: Option<Arc<Constraint>>,
    ) -> Result<(), ChainError> {
        self.joint_mut(id)?.set_constraint(constraint);
        Ok(())
    }

    /// Designate the end-effectors.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] for an id outside the chain.
    pub fn set_effectors(&mut self, effectors: Vec<JointId>) -> Result<(), ChainError> {
        for &id in &effectors {
            self.joint(id)?;
        }
        self.effectors = effectors;
        Ok(())
    }

    /// Designated end-effectors, in insertion order.
    pub fn effectors(&self) -> &[JointId] {
        &self.effectors
    }

    // -----------------------------------------------------------------------
    // Access
    // -----------------------------------------------------------------------

    /// Look up a joint.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in this chain.
    pub fn joint(&self, id: JointId) -> Result<&Joint, ChainError> {
        self.joints
            .get(id.0)
            .ok_or(ChainError::UnknownJoint(id.0))
    }

    fn joint_mut(&mut self, id: JointId) -> Result<&mut Joint, ChainError> {
        self.joints
            .get_mut(id.0)
            .ok_or(ChainError::UnknownJoint(id.0))
    }

    /// All joints in arena (root-first) order.
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Ids of all joints in arena order.
    pub fn ids(&self) -> impl Iterator<Item = JointId> + '_ {
        (0..self.joints.len()).map(JointId)
    }

    /// Find a joint by name.
    pub fn find(&self, name: &str) -> Option<JointId> {
        self.joints
            .iter()
            .position(|j| j.name() == name)
            .map(JointId)
    }

    /// The external frame every root joint is expressed in.
    pub const fn reference(&self) -> &Pose {
        &self.reference
    }

    /// Stamp of the last reference-frame change.
    pub const fn reference_modified(&self) -> u64 {
        self.reference_modified
    }

    // -----------------------------------------------------------------------
    // Stamped mutation
    // -----------------------------------------------------------------------

    /// Move the external reference frame.
    pub fn set_reference(&mut self, reference: Pose) {
        self.reference = reference;
        self.reference_modified = self.tick();
    }

    /// Replace a joint's local rotation.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in this chain.
    pub fn set_local_rotation(
        &mut self,
        id: JointId,
        rotation: UnitQuaternion<f32>,
    ) -> Result<(), ChainError> {
        self.joint(id)?;
        let stamp = self.tick();
        self.joints[id.0].set_rotation(rotation, stamp);
        Ok(())
    }

    /// Replace a joint's local translation.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in this chain.
    pub fn set_local_translation(
        &mut self,
        id: JointId,
        translation: Vector3<f32>,
    ) -> Result<(), ChainError> {
        self.joint(id)?;
        let stamp = self.tick();
        self.joints[id.0].set_translation(translation, stamp);
        Ok(())
    }

    /// Replace a joint's uniform scale.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in this chain.
    pub fn set_scale(&mut self, id: JointId, scale: f32) -> Result<(), ChainError> {
        self.joint(id)?;
        let stamp = self.tick();
        self.joints[id.0].set_scale(scale, stamp);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Topology
    // -----------------------------------------------------------------------

    /// Ids from the root down to `id`, inclusive.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in this chain.
    pub fn path_to(&self, id: JointId) -> Result<Vec<JointId>, ChainError> {
        let mut path = vec![id];
        let mut cursor = self.joint(id)?.parent();
        while let Some(parent) = cursor {
            path.push(parent);
            cursor = self.joints[parent.0].parent();
        }
        path.reverse();
        Ok(path)
    }

    /// Whether `ancestor` lies strictly above `descendant`.
    pub fn is_ancestor(&self, ancestor: JointId, descendant: JointId) -> bool {
        let mut cursor = self.joints.get(descendant.0).and_then(Joint::parent);
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            // Parents precede children: nothing above `ancestor` can match.
            if parent.0 < ancestor.0 {
                return false;
            }
            cursor = self.joints[parent.0].parent();
        }
        false
    }

    /// All joints strictly below `id`, in arena order.
    pub fn descendants(&self, id: JointId) -> Vec<JointId> {
        (id.0 + 1..self.joints.len())
            .map(JointId)
            .filter(|&d| self.is_ancestor(id, d))
            .collect()
    }

    /// Upper bound on how far `effector` can get from the root joint of its
    /// path: the sum of the scaled link lengths along it.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `effector` is not in this chain.
    pub fn max_reach(&self, effector: JointId) -> Result<f32, ChainError> {
        let path = self.path_to(effector)?;
        let mut scale = self.joints[path[0].0].scale() * self.reference.scale;
        let mut reach = 0.0;
        for id in path.iter().skip(1) {
            let joint = &self.joints[id.0];
            reach += joint.translation().norm() * scale;
            scale *= joint.scale();
        }
        Ok(reach)
    }

    /// World pose of `id` recomputed from scratch by composing every
    /// ancestor's local pose onto the reference frame.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in this chain.
    pub fn world_pose_uncached(&self, id: JointId) -> Result<Pose, ChainError> {
        let path = self.path_to(id)?;
        Ok(path.iter().fold(self.reference, |world, j| {
            world.compose(&self.joints[j.0].local_pose())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Hinge;
    use approx::assert_relative_eq;

    fn arm() -> (Chain, [JointId; 3]) {
        let mut chain = Chain::default();
        let a = chain.push_root("base", Vector3::zeros(), UnitQuaternion::identity());
        let b = chain
            .push_child(a, "elbow", Vector3::x(), UnitQuaternion::identity())
            .unwrap();
        let c = chain
            .push_child(b, "tip", Vector3::x() * 2.0, UnitQuaternion::identity())
            .unwrap();
        (chain, [a, b, c])
    }

    #[test]
    fn push_child_rejects_unknown_parent() {
        let mut chain = Chain::default();
        let err = chain
            .push_child(JointId(3), "x", Vector3::zeros(), UnitQuaternion::identity())
            .unwrap_err();
        assert_eq!(err, ChainError::UnknownJoint(3));
    }

    #[test]
    fn from_records_checks_order() {
        let ok = Chain::from_records(
            Pose::identity(),
            [
                ("a", None, Vector3::zeros(), UnitQuaternion::identity()),
                ("b", Some(0), Vector3::x(), UnitQuaternion::identity()),
            ],
        )
        .unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok.find("b"), Some(JointId(1)));

        let err = Chain::from_records(
            Pose::identity(),
            [
                ("a", None, Vector3::zeros(), UnitQuaternion::identity()),
                ("b", Some(1), Vector3::x(), UnitQuaternion::identity()),
            ],
        )
        .unwrap_err();
        assert_eq!(err, ChainError::ParentOutOfOrder { joint: 1, parent: 1 });
    }

    #[test]
    fn mutations_advance_clock_and_stamp() {
        let (mut chain, [_, b, _]) = arm();
        let before = chain.clock();
        chain
            .set_local_rotation(b, UnitQuaternion::from_euler_angles(0.0, 0.0, 0.1))
            .unwrap();
        assert_eq!(chain.clock(), before + 1);
        assert_eq!(chain.joint(b).unwrap().last_modified(), chain.clock());

        chain.set_reference(Pose::from_position(Vector3::y()));
        assert_eq!(chain.reference_modified(), chain.clock());
    }

    #[test]
    fn constraints_do_not_advance_clock() {
        let (mut chain, [a, _, _]) = arm();
        let before = chain.clock();
        chain
            .set_constraint(a, Hinge::new(Vector3::z(), -1.0, 1.0).unwrap())
            .unwrap();
        assert_eq!(chain.clock(), before);
        assert!(chain.joint(a).unwrap().constraint().is_some());
    }

    #[test]
    fn topology_queries() {
        let (chain, [a, b, c]) = arm();
        assert_eq!(chain.path_to(c).unwrap(), vec![a, b, c]);
        assert!(chain.is_ancestor(a, c));
        assert!(chain.is_ancestor(b, c));
        assert!(!chain.is_ancestor(c, a));
        assert!(!chain.is_ancestor(b, b));
        assert_eq!(chain.descendants(a), vec![b, c]);
        assert_relative_eq!(chain.max_reach(c).unwrap(), 3.0);
    }

    #[test]
    fn effectors_must_exist() {
        let (mut chain, [_, _, c]) = arm();
        assert!(chain.set_effectors(vec![JointId(9)]).is_err());
        chain.set_effectors(vec![c]).unwrap();
        assert_eq!(chain.effectors(), &[c]);
    }

    #[test]
    fn uncached_pose_composes_reference_and_scale() {
        let (mut chain, [_, b, c]) = arm();
        chain.set_reference(Pose::from_position(Vector3::new(0.0, 0.0, 1.0)));
        chain
            .set_local_rotation(
                b,
                UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2),
            )
            .unwrap();
        chain.set_scale(b, 0.5).unwrap();
        let tip = chain.world_pose_uncached(c).unwrap();
        assert_relative_eq!(tip.position, Vector3::new(1.0, 1.0, 1.0), epsilon = 1e-5);
    }
}
