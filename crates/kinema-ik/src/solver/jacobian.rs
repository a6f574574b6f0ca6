//! Jacobian-transpose solver.
//!
//! Each iteration stacks one 3-row block per goal (effector position error)
//! and one column per joint that is an ancestor of at least one goal
//! effector. Column `j` of block `k` is `axis_j × (e_k − p_j)`, the linear
//! velocity of effector `k` under a unit rotation of joint `j`. The step is
//! `δ = Jᵗe`, scaled by `(e · JJᵗe) / |JJᵗe|²`, the optimal length along
//! that direction for the linearized problem. A step is kept only if it
//! lowers the summed squared error; otherwise it is halved and retried.
//!
//! The step is skipped when `|JJᵗe|² <= singular_threshold · |e|²`. If the
//! chain is then stretched past a goal (an arm pointing away from it, as in
//! a straight chain aimed at a point on its own axis) every joint is bent
//! by [`SINGULAR_NUDGE`] to leave the singular pose. Otherwise the pose is
//! a local optimum and the burst ends as a stall.
//!
//! Steps are applied to a working copy of the chain; [`Solver::update`]
//! copies the result into the live chain.

use nalgebra::{DMatrix, DVector, Unit, UnitQuaternion, Vector3};
use tracing::{debug, trace, warn};

use kinema_core::config::SolverConfig;
use kinema_core::error::{ChainError, ConfigError};
use kinema_core::math::{Pose, any_orthogonal};

use super::target::TargetSet;
use super::{Solver, SolverState, is_degenerate, max_distance};
use crate::cache::ChainCache;
use crate::chain::Chain;
use crate::joint::JointId;

const AXIS_EPSILON: f32 = 1e-6;

/// Bend, in radians, applied to every joint to leave a singular pose.
pub const SINGULAR_NUDGE: f32 = 0.1;

/// Step halvings tried before an iteration counts as a stall.
const MAX_HALVINGS: u32 = 4;

/// One goal block: effector, its position before the step, clamped error.
type Block = (JointId, Vector3<f32>, Vector3<f32>);

/// Rotational Jacobian-transpose IK over every effector of a chain.
#[derive(Debug, Clone)]
pub struct JacobianTransposeSolver {
    state: SolverState,
    live: ChainCache,
    work: ChainCache,
    targets: TargetSet,
    /// Joints contributing to at least one effector, in arena order.
    joints: Vec<JointId>,
    /// Max reach per effector, parallel to the chain's effector list.
    reach: Vec<(JointId, f32)>,
    last_error: f32,
}

impl JacobianTransposeSolver {
    /// Bind a solver to `chain`. Goals start unset.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if `config` fails validation.
    pub fn new(chain: Chain, config: SolverConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let targets = TargetSet::for_chain(&chain);
        let joints = chain
            .ids()
            .filter(|&j| chain.effectors().iter().any(|&e| chain.is_ancestor(j, e)))
            .collect();
        let reach = chain
            .effectors()
            .iter()
            .map(|&e| (e, chain.max_reach(e).unwrap_or(0.0)))
            .collect();
        let live = ChainCache::new(chain);
        Ok(Self {
            state: SolverState::new(config),
            work: live.clone(),
            live,
            targets,
            joints,
            reach,
            last_error: f32::INFINITY,
        })
    }

    /// Error measured on the working copy at the last iteration.
    pub const fn last_iteration_error(&self) -> f32 {
        self.last_error
    }

    fn reach_of(&self, effector: JointId) -> f32 {
        self.reach
            .iter()
            .find(|(e, _)| *e == effector)
            .map_or(0.0, |(_, r)| *r)
    }

    /// Goal position error per active goal, clamped to
    /// `error_clamp_factor × max_reach`, plus the unclamped worst distance.
    fn errors(&mut self) -> Result<(Vec<Block>, f32), ChainError> {
        let factor = self.state.config().error_clamp_factor;
        let goals: Vec<(JointId, Vector3<f32>)> = self
            .targets
            .active()
            .map(|(e, g)| (e, g.position))
            .collect();
        let mut out = Vec::with_capacity(goals.len());
        let mut worst = 0.0f32;
        for (effector, goal) in goals {
            let position = self.work.position(effector)?;
            let mut error = goal - position;
            let distance = error.norm();
            worst = worst.max(distance);
            let limit = factor * self.reach_of(effector);
            if distance > limit {
                error *= if distance > 0.0 { limit / distance } else { 0.0 };
            }
            out.push((effector, position, error));
        }
        Ok((out, worst))
    }

    /// World-space rotation axis used for joint `j`.
    fn axis_for(
        &mut self,
        joint: JointId,
        pivot: &Vector3<f32>,
        blocks: &[Block],
    ) -> Result<Unit<Vector3<f32>>, ChainError> {
        let orientation = self.work.orientation(joint)?;
        if let Some(axis) = self
            .work
            .chain()
            .joint(joint)?
            .constraint()
            .and_then(|c| c.rotation_axis())
        {
            return Ok(orientation * axis);
        }
        let chain = self.work.chain();
        let mut sum = Vector3::zeros();
        let mut lever = Vector3::zeros();
        for (effector, position, error) in blocks {
            if chain.is_ancestor(joint, *effector) {
                let arm = position - pivot;
                sum += arm.cross(&(arm + error));
                lever += arm;
            }
        }
        Ok(Unit::try_new(sum, AXIS_EPSILON).unwrap_or_else(|| {
            Unit::try_new(lever, AXIS_EPSILON)
                .map_or_else(Vector3::z_axis, |lever| any_orthogonal(&lever))
        }))
    }

    fn step(&mut self) -> Result<bool, ChainError> {
        let config = self.state.config().clone();
        let (blocks, distance) = self.errors()?;
        self.last_error = distance;
        if distance <= config.max_error {
            debug!(error = distance, "target reached");
            return Ok(true);
        }

        let rows = 3 * blocks.len();
        let cols = self.joints.len();
        let mut jacobian = DMatrix::<f32>::zeros(rows, cols);
        let mut error = DVector::<f32>::zeros(rows);
        for (k, (_, _, e)) in blocks.iter().enumerate() {
            error.fixed_rows_mut::<3>(3 * k).copy_from(e);
        }

        let joints = self.joints.clone();
        let mut axes = Vec::with_capacity(cols);
        for (c, &joint) in joints.iter().enumerate() {
            let pivot = self.work.position(joint)?;
            let orientation = self.work.orientation(joint)?;
            let axis = self.axis_for(joint, &pivot, &blocks)?;
            for (k, (effector, position, _)) in blocks.iter().enumerate() {
                if self.work.chain().is_ancestor(joint, *effector) {
                    let column = axis.cross(&(position - pivot));
                    jacobian.fixed_view_mut::<3, 1>(3 * k, c).copy_from(&column);
                }
            }
            // Local axes are taken at the pre-step pose.
            axes.push(Unit::new_normalize(orientation.inverse() * axis.into_inner()));
        }

        let delta = jacobian.transpose() * &error;
        let jjte = &jacobian * &delta;
        let denominator = jjte.dot(&jjte);
        if denominator <= config.singular_threshold * error.norm_squared() {
            return self.leave_singular_pose(&joints, &axes, &blocks);
        }
        let mut scale = error.dot(&jjte) / denominator;

        let before = squared_error(&mut self.work, &self.targets);
        let snapshot = self.work.clone();
        let mut accepted = false;
        for _ in 0..=MAX_HALVINGS {
            for (c, &joint) in joints.iter().enumerate() {
                let angle = delta[c] * scale;
                if angle.abs() <= f32::EPSILON {
                    continue;
                }
                let local = UnitQuaternion::from_axis_angle(&axes[c], angle);
                self.work.rotate_and_update_cache(joint, &local, true, &[])?;
            }
            if squared_error(&mut self.work, &self.targets) < before {
                accepted = true;
                break;
            }
            self.work.clone_from(&snapshot);
            scale *= 0.5;
        }
        if !accepted {
            self.last_error = distance;
            debug!(error = distance, "no improving step, stalled");
            return Ok(true);
        }

        let mut moved = 0.0f32;
        for (effector, old, _) in &blocks {
            moved = moved.max((self.work.position(*effector)? - old).norm());
        }
        let after = max_distance(&mut self.work, &self.targets);
        self.last_error = after;
        trace!(error = after, moved, scale, "jacobian iteration");

        if after <= config.max_error {
            debug!(error = after, "target reached");
            return Ok(true);
        }
        if moved <= config.min_distance {
            debug!(moved, error = after, "stalled");
            return Ok(true);
        }
        Ok(false)
    }

    /// Near-singular branch: the step is skipped. Bends every joint by
    /// [`SINGULAR_NUDGE`] when some goal lies back along a lever arm, and
    /// ends the burst otherwise.
    fn leave_singular_pose(
        &mut self,
        joints: &[JointId],
        axes: &[Unit<Vector3<f32>>],
        blocks: &[Block],
    ) -> Result<bool, ChainError> {
        let mut folded = false;
        for &joint in joints {
            let pivot = self.work.position(joint)?;
            let chain = self.work.chain();
            folded |= blocks.iter().any(|(effector, position, error)| {
                chain.is_ancestor(joint, *effector) && (position - pivot).dot(error) < 0.0
            });
        }
        if !folded {
            debug!(error = self.last_error, "near-singular Jacobian at a local optimum");
            return Ok(true);
        }
        for (&joint, axis) in joints.iter().zip(axes) {
            let nudge = UnitQuaternion::from_axis_angle(axis, SINGULAR_NUDGE);
            self.work.rotate_and_update_cache(joint, &nudge, true, &[])?;
        }
        self.last_error = max_distance(&mut self.work, &self.targets);
        debug!(error = self.last_error, "near-singular Jacobian, pose nudged");
        Ok(false)
    }
}

/// Sum of squared effector-to-goal distances, the quantity a transpose
/// step descends.
fn squared_error(cache: &mut ChainCache, targets: &TargetSet) -> f32 {
    let mut sum = 0.0;
    for (effector, goal) in targets.active() {
        if let Ok(position) = cache.position(effector) {
            sum += (goal.position - position).norm_squared();
        }
    }
    sum
}

impl Solver for JacobianTransposeSolver {
    fn name(&self) -> &'static str {
        "jacobian"
    }

    fn state(&self) -> &SolverState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SolverState {
        &mut self.state
    }

    fn changed(&mut self) -> bool {
        let config = self.state.config();
        let reference = *self.live.chain().reference();
        self.targets
            .changed(&reference, &config.change_policy, config.change_tolerance)
    }

    fn reset(&mut self) {
        self.work.clone_from(&self.live);
        self.targets.snapshot(self.live.chain().reference());
        self.last_error = f32::INFINITY;
    }

    fn iterate(&mut self) -> bool {
        if is_degenerate(self.name(), &self.live, &self.targets) {
            return true;
        }
        match self.step() {
            Ok(done) => done,
            Err(err) => {
                warn!(%err, "jacobian iteration aborted");
                true
            }
        }
    }

    fn update(&mut self) {
        if let Err(err) = self.live.copy_locals_from(&self.work) {
            warn!(%err, "failed to commit jacobian step");
        }
    }

    fn error(&mut self) -> f32 {
        max_distance(&mut self.live, &self.targets)
    }

    fn set_target(&mut self, effector: JointId, target: Option<Pose>) -> Result<(), ChainError> {
        self.targets.set(effector, target)
    }

    fn live(&self) -> &ChainCache {
        &self.live
    }

    fn live_mut(&mut self) -> &mut ChainCache {
        &mut self.live
    }
}
