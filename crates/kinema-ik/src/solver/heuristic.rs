//! Heuristic local-search solver.
//!
//! A [`Context`] pairs the live chain with a working copy and blends two
//! per-joint corrections: the rotation that swings the effector towards the
//! goal position, and the rotation that turns the effector onto the goal
//! orientation. `orientation_weight` interpolates between them (slerp) and
//! also weights the error: `(1 − w) · distance + w · angle`.
//!
//! Joints are visited tip to root ([`HeuristicKind::Ccd`]), root to tip
//! ([`HeuristicKind::Forward`]) or both ([`HeuristicKind::BackAndForth`]).
//! The working copy is committed only when it beats the live chain.

use nalgebra::{Unit, UnitQuaternion};
use tracing::{debug, trace, warn};

use kinema_core::config::{HeuristicConfig, HeuristicKind, SolverConfig};
use kinema_core::error::{ChainError, ConfigError};
use kinema_core::math::Pose;

use super::target::TargetSet;
use super::{Solver, SolverState, is_degenerate, max_distance};
use crate::cache::ChainCache;
use crate::chain::Chain;
use crate::constraint::swing_between;
use crate::joint::JointId;

const DIRECTION_EPSILON: f32 = 1e-6;

/// Live chain, working copy and the goal of one effector.
#[derive(Debug, Clone)]
pub struct Context {
    live: ChainCache,
    work: ChainCache,
    targets: TargetSet,
    orientation_weight: f32,
}

impl Context {
    pub fn new(chain: Chain, orientation_weight: f32) -> Self {
        let targets = TargetSet::for_chain(&chain);
        let live = ChainCache::new(chain);
        Self {
            work: live.clone(),
            live,
            targets,
            orientation_weight: orientation_weight.clamp(0.0, 1.0),
        }
    }

    pub const fn live(&self) -> &ChainCache {
        &self.live
    }

    pub fn live_mut(&mut self) -> &mut ChainCache {
        &mut self.live
    }

    pub const fn work(&self) -> &ChainCache {
        &self.work
    }

    pub fn work_mut(&mut self) -> &mut ChainCache {
        &mut self.work
    }

    pub const fn orientation_weight(&self) -> f32 {
        self.orientation_weight
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut TargetSet {
        &mut self.targets
    }

    /// The first effector that has a goal.
    fn goal(&self) -> Option<(JointId, Pose)> {
        self.targets.active().next().map(|(e, g)| (e, *g))
    }

    /// Weighted error of the working copy.
    pub fn work_error(&mut self) -> f32 {
        weighted_error(&self.targets, self.orientation_weight, &mut self.work)
    }

    /// Weighted error of the live chain.
    pub fn live_error(&mut self) -> f32 {
        weighted_error(&self.targets, self.orientation_weight, &mut self.live)
    }

    /// Discard working progress.
    pub fn restart(&mut self) {
        self.work.clone_from(&self.live);
    }

    /// Copy the working copy into the live chain if its weighted error is
    /// lower; otherwise restart from the live chain. Returns whether it
    /// committed.
    ///
    /// # Errors
    ///
    /// Propagates [`ChainError`] when the two chains differ in topology.
    pub fn commit_if_better(&mut self) -> Result<bool, ChainError> {
        let work = self.work_error();
        let live = self.live_error();
        if work < live {
            self.live.copy_locals_from(&self.work)?;
            Ok(true)
        } else {
            self.restart();
            Ok(false)
        }
    }

    /// Rotate `joint` of the working copy by the weighted blend of the
    /// position and orientation corrections.
    fn align(&mut self, joint: JointId, effector: JointId, goal: &Pose) -> Result<(), ChainError> {
        let pivot = self.work.position(joint)?;
        let frame = self.work.orientation(joint)?;
        let tip = self.work.pose(effector)?;

        let to_tip = Unit::try_new(tip.position - pivot, DIRECTION_EPSILON);
        let to_goal = Unit::try_new(goal.position - pivot, DIRECTION_EPSILON);
        let reach = match (to_tip, to_goal) {
            (Some(from), Some(to)) => swing_between(&from, &to),
            _ => UnitQuaternion::identity(),
        };
        let turn = goal.orientation * tip.orientation.inverse();

        let w = self.orientation_weight;
        let world = if w <= 0.0 {
            reach
        } else if w >= 1.0 {
            turn
        } else {
            reach
                .try_slerp(&turn, w, DIRECTION_EPSILON)
                .unwrap_or(if w < 0.5 { reach } else { turn })
        };
        let local = frame.inverse() * world * frame;
        self.work.rotate_and_update_cache(joint, &local, true, &[])?;
        Ok(())
    }
}

/// `(1 − w) · distance + w · angle` of the first goal; zero without one.
fn weighted_error(targets: &TargetSet, weight: f32, cache: &mut ChainCache) -> f32 {
    let Some((effector, goal)) = targets.active().next() else {
        return 0.0;
    };
    let Ok(pose) = cache.pose(effector) else {
        return f32::INFINITY;
    };
    (1.0 - weight) * (goal.position - pose.position).norm() + weight * pose.angle_to(goal)
}

/// Joint visiting order for one sweep.
fn visit_order(kind: HeuristicKind, ancestors: &[JointId]) -> Vec<JointId> {
    match kind {
        HeuristicKind::Ccd => ancestors.iter().rev().copied().collect(),
        HeuristicKind::Forward => ancestors.to_vec(),
        HeuristicKind::BackAndForth => ancestors
            .iter()
            .rev()
            .chain(ancestors.iter().skip(1))
            .copied()
            .collect(),
    }
}

/// Sweeping local-search solver over a [`Context`].
#[derive(Debug, Clone)]
pub struct HeuristicSolver {
    state: SolverState,
    context: Context,
    heuristic: HeuristicKind,
}

impl HeuristicSolver {
    /// # Errors
    ///
    /// [`ConfigError`] if either configuration fails validation.
    pub fn new(
        chain: Chain,
        config: SolverConfig,
        heuristic: &HeuristicConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        heuristic.validate()?;
        Ok(Self {
            state: SolverState::new(config),
            context: Context::new(chain, heuristic.orientation_weight),
            heuristic: heuristic.heuristic,
        })
    }

    pub const fn context(&self) -> &Context {
        &self.context
    }

    pub const fn heuristic(&self) -> HeuristicKind {
        self.heuristic
    }

    fn sweep(&mut self) -> Result<bool, ChainError> {
        let Some((effector, goal)) = self.context.goal() else {
            return Ok(true);
        };
        let mut ancestors = self.context.work.chain().path_to(effector)?;
        ancestors.pop();

        let before = self.context.work_error();
        for joint in visit_order(self.heuristic, &ancestors) {
            self.context.align(joint, effector, &goal)?;
        }
        let after = self.context.work_error();
        trace!(before, after, "heuristic sweep");

        let config = self.state.config();
        if after <= config.max_error {
            debug!(error = after, "target reached");
            return Ok(true);
        }
        if before - after <= config.min_distance {
            debug!(error = after, "stalled");
            return Ok(true);
        }
        Ok(false)
    }
}

impl Solver for HeuristicSolver {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn state(&self) -> &SolverState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SolverState {
        &mut self.state
    }

    fn changed(&mut self) -> bool {
        let config = self.state.config();
        let reference = *self.context.live.chain().reference();
        self.context
            .targets
            .changed(&reference, &config.change_policy, config.change_tolerance)
    }

    fn reset(&mut self) {
        self.context.restart();
        let reference = *self.context.live.chain().reference();
        self.context.targets.snapshot(&reference);
    }

    fn iterate(&mut self) -> bool {
        if is_degenerate(self.name(), &self.context.live, &self.context.targets) {
            return true;
        }
        self.sweep().unwrap_or_else(|err| {
            warn!(%err, "heuristic sweep aborted");
            true
        })
    }

    fn update(&mut self) {
        match self.context.commit_if_better() {
            Ok(committed) => trace!(committed, "heuristic update"),
            Err(err) => warn!(%err, "failed to commit heuristic step"),
        }
    }

    fn error(&mut self) -> f32 {
        max_distance(&mut self.context.live, &self.context.targets)
    }

    fn set_target(&mut self, effector: JointId, target: Option<Pose>) -> Result<(), ChainError> {
        self.context.targets.set(effector, target)
    }

    fn live(&self) -> &ChainCache {
        &self.context.live
    }

    fn live_mut(&mut self) -> &mut ChainCache {
        &mut self.context.live
    }
}
