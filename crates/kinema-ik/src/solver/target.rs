//! Per-effector goals and change detection.

use kinema_core::config::ChangePolicy;
use kinema_core::error::ChainError;
use kinema_core::math::{Pose, orientation_eq, position_eq};

use crate::chain::Chain;
use crate::joint::JointId;

/// Goals for every end-effector of a chain. A goal may be absent, in which
/// case that effector is ignored.
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    effectors: Vec<JointId>,
    goals: Vec<Option<Pose>>,
    seen_goals: Vec<Option<Pose>>,
    seen_reference: Option<Pose>,
}

impl TargetSet {
    /// One empty slot per designated effector of `chain`.
    pub fn for_chain(chain: &Chain) -> Self {
        let n = chain.effectors().len();
        Self {
            effectors: chain.effectors().to_vec(),
            goals: vec![None; n],
            seen_goals: vec![None; n],
            seen_reference: None,
        }
    }

    fn slot(&self, effector: JointId) -> Result<usize, ChainError> {
        self.effectors
            .iter()
            .position(|&e| e == effector)
            .ok_or(ChainError::NotAnEffector(effector.index()))
    }

    /// Set or clear the goal of `effector`.
    ///
    /// # Errors
    ///
    /// [`ChainError::NotAnEffector`] if `effector` was not designated on the
    /// chain.
    pub fn set(&mut self, effector: JointId, goal: Option<Pose>) -> Result<(), ChainError> {
        let slot = self.slot(effector)?;
        self.goals[slot] = goal;
        Ok(())
    }

    /// Current goal of `effector`.
    pub fn get(&self, effector: JointId) -> Option<&Pose> {
        self.slot(effector)
            .ok()
            .and_then(|slot| self.goals[slot].as_ref())
    }

    /// `(effector, goal)` pairs with a goal set.
    pub fn active(&self) -> impl Iterator<Item = (JointId, &Pose)> + '_ {
        self.effectors
            .iter()
            .zip(&self.goals)
            .filter_map(|(&e, goal)| goal.as_ref().map(|g| (e, g)))
    }

    /// Whether no effector has a goal.
    pub fn is_empty(&self) -> bool {
        self.goals.iter().all(Option::is_none)
    }

    /// Compare the goals and the chain reference frame against the snapshot
    /// taken by the last [`snapshot`](Self::snapshot).
    ///
    /// Only components enabled in `policy` count. Setting or clearing a goal
    /// always counts as a change. The snapshot is left untouched, so a goal
    /// drifting by less than `tolerance` per call still registers once its
    /// total drift exceeds `tolerance`.
    pub fn changed(&self, reference: &Pose, policy: &ChangePolicy, tolerance: f32) -> bool {
        let goals = self
            .goals
            .iter()
            .zip(&self.seen_goals)
            .any(|(goal, seen)| match (goal, seen) {
                (Some(goal), Some(seen)) => pose_differs(goal, seen, policy, tolerance),
                (None, None) => false,
                _ => true,
            });
        goals
            || (policy.reference
                && self
                    .seen_reference
                    .is_some_and(|seen| !seen.approx_eq(reference, tolerance)))
    }

    /// Record the current goals and `reference` as the baseline for
    /// [`changed`](Self::changed). Solvers take it on every reset.
    pub fn snapshot(&mut self, reference: &Pose) {
        self.seen_goals.clone_from(&self.goals);
        self.seen_reference = Some(*reference);
    }
}

fn pose_differs(a: &Pose, b: &Pose, policy: &ChangePolicy, tolerance: f32) -> bool {
    (policy.position && !position_eq(&a.position, &b.position, tolerance))
        || (policy.orientation && !orientation_eq(&a.orientation, &b.orientation, tolerance))
        || (policy.scale && (a.scale - b.scale).abs() > tolerance)
}
