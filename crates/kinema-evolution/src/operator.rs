//! Variation operators.
//!
//! Operators work on Euler angles of the genes (the joints above an
//! effector) and write results back through each joint's constraint, so
//! children never leave the feasible set.
//!
//! Every operator takes an explicit `&mut R: Rng` so that a seeded
//! generator reproduces a run exactly.

use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use kinema_core::config::MutationConfig;
use kinema_core::error::{EvolutionError, KinemaError};

use crate::individual::Individual;

/// Variation operator with static dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operator {
    /// Add `U(-max_delta, max_delta)` to each Euler angle of one random gene.
    UniformMutation { max_delta: f32 },
    /// Add `N(0, std²)` to each Euler angle of one random gene.
    GaussianMutation { std: f32 },
    /// Per gene, a random convex combination of the parents' Euler angles.
    ConvexCombination { parents: usize },
}

impl From<MutationConfig> for Operator {
    fn from(config: MutationConfig) -> Self {
        match config {
            MutationConfig::Uniform { max_delta } => Self::UniformMutation { max_delta },
            MutationConfig::Gaussian { std } => Self::GaussianMutation { std },
        }
    }
}

impl Operator {
    /// Number of parents [`apply`](Self::apply) expects.
    pub const fn arity(&self) -> usize {
        match self {
            Self::UniformMutation { .. } | Self::GaussianMutation { .. } => 1,
            Self::ConvexCombination { parents } => *parents,
        }
    }

    /// Produce one child. The child starts as a copy of the first parent
    /// and is left unevaluated.
    ///
    /// # Errors
    ///
    /// [`EvolutionError::ParentCount`] when `parents` does not match
    /// [`arity`](Self::arity); chain errors if the parents do not share a
    /// topology.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        parents: &[&Individual],
        rng: &mut R,
    ) -> Result<Individual, KinemaError> {
        let expected = self.arity();
        let [first, ..] = parents else {
            return Err(EvolutionError::ParentCount { expected, got: 0 }.into());
        };
        if parents.len() != expected {
            return Err(EvolutionError::ParentCount {
                expected,
                got: parents.len(),
            }
            .into());
        }
        let mut child = (*first).clone();
        match *self {
            Self::UniformMutation { max_delta } => {
                let delta = Vector3::from_fn(|_, _| {
                    if max_delta > 0.0 {
                        rng.gen_range(-max_delta..=max_delta)
                    } else {
                        0.0
                    }
                });
                perturb(&mut child, &delta, rng)?;
            }
            Self::GaussianMutation { std } => {
                let delta = gaussian(std, rng);
                perturb(&mut child, &delta, rng)?;
            }
            Self::ConvexCombination { .. } => {
                let mut weights: Vec<f32> = parents.iter().map(|_| rng.r#gen::<f32>()).collect();
                let total: f32 = weights.iter().sum();
                if total > 0.0 {
                    weights.iter_mut().for_each(|w| *w /= total);
                } else {
                    weights.fill(1.0 / parents.len() as f32);
                }
                for &gene in first.genes() {
                    let mut angles = Vector3::zeros();
                    for (parent, w) in parents.iter().zip(&weights) {
                        angles += parent.angles(gene)? * *w;
                    }
                    child.set_angles(gene, &angles)?;
                }
            }
        }
        Ok(child)
    }
}

/// Add `delta` to the Euler angles of one randomly chosen gene.
fn perturb<R: Rng + ?Sized>(
    child: &mut Individual,
    delta: &Vector3<f32>,
    rng: &mut R,
) -> Result<(), KinemaError> {
    if child.genes().is_empty() {
        return Ok(());
    }
    let gene = child.genes()[rng.gen_range(0..child.genes().len())];
    let angles = child.angles(gene)? + delta;
    child.set_angles(gene, &angles)?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation)] // intentional f64→f32 for rand_distr
fn gaussian<R: Rng + ?Sized>(std: f32, rng: &mut R) -> Vector3<f32> {
    match Normal::new(0.0, f64::from(std)) {
        Ok(dist) if std > 0.0 => Vector3::from_fn(|_, _| dist.sample(rng) as f32),
        _ => Vector3::zeros(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinema_core::math::rotation_angle;
    use kinema_core::seed::seeded_rng;
    use kinema_ik::cache::ChainCache;
    use kinema_ik::chain::Chain;
    use kinema_ik::constraint::Hinge;
    use kinema_ik::joint::JointId;
    use nalgebra::UnitQuaternion;

    fn arm() -> Individual {
        let mut chain = Chain::default();
        let base = chain.push_root("base", Vector3::zeros(), UnitQuaternion::identity());
        let mid = chain
            .push_child(base, "mid", Vector3::x(), UnitQuaternion::identity())
            .unwrap();
        let tip = chain
            .push_child(mid, "tip", Vector3::x(), UnitQuaternion::identity())
            .unwrap();
        chain.set_effectors(vec![tip]).unwrap();
        Individual::new(ChainCache::new(chain))
    }

    fn changed_genes(a: &Individual, b: &Individual) -> Vec<JointId> {
        a.genes()
            .iter()
            .copied()
            .filter(|&g| (a.angles(g).unwrap() - b.angles(g).unwrap()).norm() > 1e-6)
            .collect()
    }

    #[test]
    fn from_config() {
        assert_eq!(
            Operator::from(MutationConfig::default()),
            Operator::UniformMutation { max_delta: 0.3 }
        );
        assert_eq!(Operator::ConvexCombination { parents: 3 }.arity(), 3);
    }

    #[test]
    fn mutation_touches_one_gene_within_bound() {
        let parent = arm();
        let mut rng = seeded_rng(1);
        let op = Operator::UniformMutation { max_delta: 0.2 };
        for _ in 0..20 {
            let child = op.apply(&[&parent], &mut rng).unwrap();
            let changed = changed_genes(&parent, &child);
            assert!(changed.len() <= 1);
            for gene in changed {
                let angles = child.angles(gene).unwrap();
                assert!(angles.amax() <= 0.2 + 1e-5, "{angles:?}");
            }
        }
    }

    #[test]
    fn gaussian_mutation_is_reproducible() {
        let parent = arm();
        let op = Operator::GaussianMutation { std: 0.1 };
        let a = op.apply(&[&parent], &mut seeded_rng(4)).unwrap();
        let b = op.apply(&[&parent], &mut seeded_rng(4)).unwrap();
        assert!(changed_genes(&a, &b).is_empty());
        assert_eq!(changed_genes(&parent, &a).len(), 1);
    }

    #[test]
    fn zero_std_is_identity() {
        let parent = arm();
        let child = Operator::GaussianMutation { std: 0.0 }
            .apply(&[&parent], &mut seeded_rng(2))
            .unwrap();
        assert!(changed_genes(&parent, &child).is_empty());
    }

    #[test]
    fn mutation_respects_constraint() {
        let mut chain = Chain::default();
        let base = chain.push_root("base", Vector3::zeros(), UnitQuaternion::identity());
        let tip = chain
            .push_child(base, "tip", Vector3::x(), UnitQuaternion::identity())
            .unwrap();
        chain.set_effectors(vec![tip]).unwrap();
        chain
            .set_constraint(base, Hinge::new(Vector3::z(), -0.1, 0.1).unwrap())
            .unwrap();
        let parent = Individual::new(ChainCache::new(chain));
        let mut rng = seeded_rng(8);
        let op = Operator::UniformMutation { max_delta: 1.0 };
        for _ in 0..10 {
            let child = op.apply(&[&parent], &mut rng).unwrap();
            let rotation = child.cache().chain().joint(base).unwrap().rotation();
            assert!(rotation_angle(rotation) <= 0.1 + 1e-4);
        }
    }

    #[test]
    fn convex_combination_lies_between_parents() {
        let a = arm();
        let mut b = arm();
        let gene = b.genes()[0];
        b.set_angles(gene, &Vector3::new(0.0, 0.0, 1.0)).unwrap();
        let op = Operator::ConvexCombination { parents: 2 };
        let child = op.apply(&[&a, &b], &mut seeded_rng(6)).unwrap();
        let yaw = child.angles(gene).unwrap().z;
        assert!((0.0..=1.0).contains(&yaw), "yaw {yaw}");
        assert!(changed_genes(&a, &child).len() <= 1);
    }

    #[test]
    fn wrong_parent_count() {
        let a = arm();
        let err = Operator::ConvexCombination { parents: 2 }
            .apply(&[&a], &mut seeded_rng(0))
            .unwrap_err();
        assert!(matches!(
            err,
            KinemaError::Evolution(EvolutionError::ParentCount {
                expected: 2,
                got: 1
            })
        ));
    }
}
