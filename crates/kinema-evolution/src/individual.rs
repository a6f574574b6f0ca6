//! One candidate solution: a private copy of the chain and its fitness.

use nalgebra::{UnitQuaternion, Vector3};

use kinema_core::error::ChainError;
use kinema_core::math::{euler_angles, from_euler};
use kinema_ik::cache::ChainCache;
use kinema_ik::joint::JointId;
use kinema_ik::solver::max_distance;
use kinema_ik::solver::target::TargetSet;

/// A cloned chain with the joints the operators may touch.
///
/// Fitness is the largest effector-to-goal distance, so lower is better
/// under the default objective. It is `NaN` until [`evaluate`](Self::evaluate)
/// runs.
#[derive(Debug, Clone)]
pub struct Individual {
    cache: ChainCache,
    genes: Vec<JointId>,
    fitness: f32,
}

impl Individual {
    /// Wrap a cache. The genes are every joint above an effector.
    pub fn new(cache: ChainCache) -> Self {
        let chain = cache.chain();
        let genes = chain
            .ids()
            .filter(|&id| {
                chain
                    .effectors()
                    .iter()
                    .any(|&effector| chain.is_ancestor(id, effector))
            })
            .collect();
        Self {
            cache,
            genes,
            fitness: f32::NAN,
        }
    }

    pub const fn cache(&self) -> &ChainCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ChainCache {
        &mut self.cache
    }

    /// Joints the operators perturb, in arena order.
    pub fn genes(&self) -> &[JointId] {
        &self.genes
    }

    pub const fn fitness(&self) -> f32 {
        self.fitness
    }

    /// Recompute fitness against `targets` and return it.
    pub fn evaluate(&mut self, targets: &TargetSet) -> f32 {
        self.fitness = max_distance(&mut self.cache, targets);
        self.fitness
    }

    /// Euler angles of a gene's local rotation.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `gene` is not in the chain.
    pub fn angles(&self, gene: JointId) -> Result<Vector3<f32>, ChainError> {
        Ok(euler_angles(self.cache.chain().joint(gene)?.rotation()))
    }

    /// Move a gene towards the rotation given by `angles`, through its
    /// constraint. Returns the applied local delta.
    ///
    /// # Errors
    ///
    /// [`ChainError::UnknownJoint`] if `gene` is not in the chain.
    pub fn set_angles(
        &mut self,
        gene: JointId,
        angles: &Vector3<f32>,
    ) -> Result<UnitQuaternion<f32>, ChainError> {
        let current = *self.cache.chain().joint(gene)?.rotation();
        let delta = current.inverse() * from_euler(angles);
        self.fitness = f32::NAN;
        self.cache.rotate_and_update_cache(gene, &delta, true, &[])
    }
}
