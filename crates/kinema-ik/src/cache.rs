//! Lazily refreshed world poses over a [`Chain`].
//!
//! Each joint has a [`NodeInformation`] entry holding its cached world pose,
//! the index of its parent entry and two stamps of the chain clock:
//!
//! - `last_processed`: when the entry was last confirmed up to date,
//! - `last_recomputed`: when its world pose last actually changed.
//!
//! An entry is valid iff `last_processed == chain.clock()`. A read walks up
//! to the nearest valid ancestor and then back down, recomputing only nodes
//! whose joint was stamped after their last check or whose parent was
//! recomputed after it. The mutators update the touched entry and the
//! caller-supplied dependents in place instead of walking.

use nalgebra::{UnitQuaternion, Vector3};
use tracing::trace;

use kinema_core::error::ChainError;
use kinema_core::math::Pose;

use crate::chain::Chain;
use crate::joint::{Joint, JointId};

/// Cache entry for one joint.
#[derive(Debug, Clone, Copy)]
pub struct NodeInformation {
    world: Pose,
    parent: Option<usize>,
    last_processed: u64,
    last_recomputed: u64,
}

impl NodeInformation {
    /// Cached world pose; may be stale, read through [`ChainCache`].
    pub const fn world(&self) -> &Pose {
        &self.world
    }

    /// Clock value at which this entry was last confirmed.
    pub const fn last_processed(&self) -> u64 {
        self.last_processed
    }

    /// Clock value at which this entry's world pose last changed.
    pub const fn last_recomputed(&self) -> u64 {
        self.last_recomputed
    }
}

/// A chain together with its world-pose cache.
///
/// All pose mutation of a cached chain must go through this type; it owns
/// the chain so the cache cannot be bypassed.
#[derive(Debug, Clone)]
pub struct ChainCache {
    chain: Chain,
    entries: Vec<NodeInformation>,
    constraints_enabled: bool,
    recomputations: u64,
}

impl ChainCache {
    pub fn new(chain: Chain) -> Self {
        let entries = chain
            .joints()
            .iter()
            .map(|joint| NodeInformation {
                world: Pose::identity(),
                parent: joint.parent().map(JointId::index),
                last_processed: 0,
                last_recomputed: 0,
            })
            .collect();
        Self {
            chain,
            entries,
            constraints_enabled: true,
            recomputations: 0,
        }
    }

    /// The underlying chain (read-only).
    pub const fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Give the chain back, dropping the cache.
    pub fn into_chain(self) -> Chain {
        self.chain
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw entry for `id`, without refreshing it.
    pub fn entry(&self, id: JointId) -> Option<&NodeInformation> {
        self.entries.get(id.index())
    }

    /// Whether mutators route deltas through joint constraints.
    pub const fn constraints_enabled(&self) -> bool {
        self.constraints_enabled
    }

    /// Globally enable or disable constraints for this cache's mutators.
    pub fn set_constraints_enabled(&mut self, enabled: bool) {
        self.constraints_enabled = enabled;
    }

    /// Number of world poses recomputed by lazy refreshes so far.
    pub const fn recomputations(&self) -> u64 {
        self.recomputations
    }

    // -----------------------------------------------------------------------
    // Lazy reads
    // -----------------------------------------------------------------------

    /// Cached world pose of `id`, refreshed if stale.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in the chain.
    pub fn pose(&mut self, id: JointId) -> Result<Pose, ChainError> {
        self.check(id)?;
        self.refresh(id.index());
        Ok(self.entries[id.index()].world)
    }

    /// Cached world position of `id`.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in the chain.
    pub fn position(&mut self, id: JointId) -> Result<Vector3<f32>, ChainError> {
        self.pose(id).map(|p| p.position)
    }

    /// Cached world orientation of `id`.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in the chain.
    pub fn orientation(&mut self, id: JointId) -> Result<UnitQuaternion<f32>, ChainError> {
        self.pose(id).map(|p| p.orientation)
    }

    /// World pose of the frame `id` hangs from: its parent joint or the
    /// reference frame.
    fn parent_pose(&mut self, index: usize) -> Pose {
        match self.entries[index].parent {
            Some(parent) => {
                self.refresh(parent);
                self.entries[parent].world
            }
            None => *self.chain.reference(),
        }
    }

    fn check(&self, id: JointId) -> Result<&Joint, ChainError> {
        self.chain.joint(id)
    }

    fn refresh(&mut self, index: usize) {
        let clock = self.chain.clock();
        if self.entries[index].last_processed == clock {
            return;
        }

        let mut path = Vec::new();
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            if self.entries[i].last_processed == clock {
                break;
            }
            path.push(i);
            cursor = self.entries[i].parent;
        }

        let joints = self.chain.joints();
        for &i in path.iter().rev() {
            let entry = self.entries[i];
            let joint = &joints[i];
            let (parent_pose, parent_changed) = match entry.parent {
                Some(p) => (self.entries[p].world, self.entries[p].last_recomputed),
                None => (*self.chain.reference(), self.chain.reference_modified()),
            };
            let stale = joint.last_modified() > entry.last_processed
                || parent_changed > entry.last_processed;
            if stale {
                self.entries[i].world = parent_pose.compose(&joint.local_pose());
                self.entries[i].last_recomputed = clock;
                self.recomputations += 1;
            }
            self.entries[i].last_processed = clock;
        }
        trace!(joint = index, walked = path.len(), "refreshed cache path");
    }

    // -----------------------------------------------------------------------
    // Pass-through mutation (lazy invalidation)
    // -----------------------------------------------------------------------

    /// Replace a local rotation without constraint routing; dependents are
    /// refreshed lazily on the next read.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in the chain.
    pub fn set_local_rotation(
        &mut self,
        id: JointId,
        rotation: UnitQuaternion<f32>,
    ) -> Result<(), ChainError> {
        self.chain.set_local_rotation(id, rotation)
    }

    /// Replace a local translation without constraint routing.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in the chain.
    pub fn set_local_translation(
        &mut self,
        id: JointId,
        translation: Vector3<f32>,
    ) -> Result<(), ChainError> {
        self.chain.set_local_translation(id, translation)
    }

    /// Replace a joint's uniform scale.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `id` is not in the chain.
    pub fn set_scale(&mut self, id: JointId, scale: f32) -> Result<(), ChainError> {
        self.chain.set_scale(id, scale)
    }

    /// Move the external reference frame.
    pub fn set_reference(&mut self, reference: Pose) {
        self.chain.set_reference(reference);
    }

    /// Copy every joint's local rotation and translation from `other`, a
    /// cache over a chain with the same topology. Only joints that differ
    /// are stamped.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `other` has more joints than `self`.
    pub fn copy_locals_from(&mut self, other: &Self) -> Result<(), ChainError> {
        for (i, source) in other.chain.joints().iter().enumerate() {
            let id = JointId(i);
            let joint = self.chain.joint(id)?;
            let rotation_differs = joint.rotation() != source.rotation();
            let translation_differs = joint.translation() != source.translation();
            if rotation_differs {
                self.chain.set_local_rotation(id, *source.rotation())?;
            }
            if translation_differs {
                self.chain.set_local_translation(id, *source.translation())?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutators with in-place cache update
    // -----------------------------------------------------------------------

    fn check_dependents(&self, id: JointId, dependents: &[JointId]) -> Result<(), ChainError> {
        self.check(id)?;
        for &dependent in dependents {
            self.check(dependent)?;
            if !self.chain.is_ancestor(id, dependent) {
                return Err(ChainError::NotADescendant {
                    joint: id.index(),
                    dependent: dependent.index(),
                });
            }
        }
        Ok(())
    }

    /// Post-multiply a rotation delta onto the joint's local rotation.
    ///
    /// The delta goes through the joint constraint when `use_constraint` is
    /// set and constraints are enabled; the applied (possibly constrained)
    /// delta is returned. The joint's entry and every entry in `dependents`
    /// (which must be descendants) are updated without a tree walk.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] or [`ChainError::NotADescendant`].
    pub fn rotate_and_update_cache(
        &mut self,
        id: JointId,
        delta: &UnitQuaternion<f32>,
        use_constraint: bool,
        dependents: &[JointId],
    ) -> Result<UnitQuaternion<f32>, ChainError> {
        self.check_dependents(id, dependents)?;
        let index = id.index();
        self.refresh(index);
        for dependent in dependents {
            self.refresh(dependent.index());
        }

        let joint = self.check(id)?;
        let applied = match joint.constraint() {
            Some(constraint) if use_constraint && self.constraints_enabled => {
                constraint.constrain_rotation(delta, joint)
            }
            _ => *delta,
        };
        let rotation = joint.rotation() * applied;
        self.chain.set_local_rotation(id, rotation)?;
        let stamp = self.chain.clock();

        let old = self.entries[index].world;
        let orientation = old.orientation * applied;
        let world_delta = orientation * old.orientation.inverse();
        self.stamp_entry(index, stamp, |world| world.orientation = orientation);
        for dependent in dependents {
            self.stamp_entry(dependent.index(), stamp, |world| {
                world.position = old.position + world_delta * (world.position - old.position);
                world.orientation = world_delta * world.orientation;
            });
        }
        Ok(applied)
    }

    /// Add a translation delta, expressed in the parent frame, to the
    /// joint's local translation. Returns the applied delta.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] or [`ChainError::NotADescendant`].
    pub fn translate_and_update_cache(
        &mut self,
        id: JointId,
        delta: &Vector3<f32>,
        use_constraint: bool,
        dependents: &[JointId],
    ) -> Result<Vector3<f32>, ChainError> {
        self.check_dependents(id, dependents)?;
        let index = id.index();
        self.refresh(index);
        for dependent in dependents {
            self.refresh(dependent.index());
        }
        let parent = self.parent_pose(index);

        let joint = self.check(id)?;
        let applied = match joint.constraint() {
            Some(constraint) if use_constraint && self.constraints_enabled => {
                constraint.constrain_translation(delta)
            }
            _ => *delta,
        };
        let translation = joint.translation() + applied;
        self.chain.set_local_translation(id, translation)?;
        let stamp = self.chain.clock();

        let world_delta = parent.orientation * (applied * parent.scale);
        self.stamp_entry(index, stamp, |world| world.position += world_delta);
        for dependent in dependents {
            self.stamp_entry(dependent.index(), stamp, |world| {
                world.position += world_delta;
            });
        }
        Ok(applied)
    }

    /// Move the joint so its world position becomes `position`, via a
    /// translation delta. Returns the applied local delta, which differs
    /// from the requested one when a constraint intervenes.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] or [`ChainError::NotADescendant`].
    pub fn set_position_with_cache(
        &mut self,
        id: JointId,
        position: &Vector3<f32>,
        use_constraint: bool,
        dependents: &[JointId],
    ) -> Result<Vector3<f32>, ChainError> {
        self.check_dependents(id, dependents)?;
        let parent = self.parent_pose(id.index());
        let local = parent.inverse_transform_point(position);
        let delta = local - self.check(id)?.translation();
        self.translate_and_update_cache(id, &delta, use_constraint, dependents)
    }

    /// Turn the joint so its world orientation becomes `orientation`, via a
    /// rotation delta. Returns the applied local delta.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] or [`ChainError::NotADescendant`].
    pub fn set_orientation_with_cache(
        &mut self,
        id: JointId,
        orientation: &UnitQuaternion<f32>,
        use_constraint: bool,
        dependents: &[JointId],
    ) -> Result<UnitQuaternion<f32>, ChainError> {
        self.check_dependents(id, dependents)?;
        let parent = self.parent_pose(id.index());
        let local = parent.orientation.inverse() * orientation;
        let delta = self.check(id)?.rotation().inverse() * local;
        self.rotate_and_update_cache(id, &delta, use_constraint, dependents)
    }

    fn stamp_entry(&mut self, index: usize, stamp: u64, update: impl FnOnce(&mut Pose)) {
        let entry = &mut self.entries[index];
        update(&mut entry.world);
        entry.last_processed = stamp;
        entry.last_recomputed = stamp;
    }
}
