//! Drive several independent solvers from one external tick.

use tracing::debug;

use super::Solver;

/// Solvers ticked in insertion order. They share no state, so the order
/// has no effect on the result.
#[derive(Default)]
pub struct SolverSet {
    solvers: Vec<Box<dyn Solver>>,
}

impl SolverSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a solver; returns its index.
    pub fn push(&mut self, solver: Box<dyn Solver>) -> usize {
        self.solvers.push(solver);
        self.solvers.len() - 1
    }

    pub fn len(&self) -> usize {
        self.solvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solvers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Solver> {
        self.solvers.get(index).map(|s| &**s)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Solver + 'static)> {
        self.solvers.get_mut(index).map(|s| &mut **s)
    }

    /// Call `solve()` once on every solver. Returns, per solver, whether it
    /// has nothing left to do.
    pub fn tick(&mut self) -> Vec<bool> {
        let done: Vec<bool> = self.solvers.iter_mut().map(|s| s.solve()).collect();
        debug!(
            solvers = done.len(),
            finished = done.iter().filter(|d| **d).count(),
            "tick"
        );
        done
    }

    /// Tick until every solver is done or `max_ticks` is reached. Returns
    /// the number of ticks run.
    pub fn run(&mut self, max_ticks: usize) -> usize {
        for tick in 1..=max_ticks {
            if self.tick().into_iter().all(|d| d) {
                return tick;
            }
        }
        max_ticks
    }

    /// Current error of every solver.
    pub fn errors(&mut self) -> Vec<f32> {
        self.solvers.iter_mut().map(|s| s.error()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::joint::JointId;
    use crate::solver::heuristic::HeuristicSolver;
    use crate::solver::jacobian::JacobianTransposeSolver;
    use kinema_core::config::{HeuristicConfig, SolverConfig};
    use kinema_core::math::Pose;
    use nalgebra::{UnitQuaternion, Vector3};

    fn two_link() -> (Chain, JointId) {
        let bend = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.4);
        let mut chain = Chain::default();
        let base = chain.push_root("base", Vector3::zeros(), bend);
        let mid = chain.push_child(base, "mid", Vector3::x(), bend).unwrap();
        let tip = chain
            .push_child(mid, "tip", Vector3::x(), UnitQuaternion::identity())
            .unwrap();
        chain.set_effectors(vec![tip]).unwrap();
        (chain, tip)
    }

    #[test]
    fn ticks_every_solver_until_done() {
        let config = SolverConfig {
            iterations_per_tick: 2.0,
            max_iterations: 20,
            ..SolverConfig::default()
        };
        let goal = Pose::from_position(Vector3::new(1.2, 0.9, 0.0));

        let (chain, tip) = two_link();
        let mut jacobian = JacobianTransposeSolver::new(chain, config.clone()).unwrap();
        jacobian.set_target(tip, Some(goal)).unwrap();
        let (chain, tip) = two_link();
        let mut heuristic = HeuristicSolver::new(chain, config, &HeuristicConfig::default()).unwrap();
        heuristic.set_target(tip, Some(goal)).unwrap();

        let mut set = SolverSet::new();
        assert_eq!(set.push(Box::new(jacobian)), 0);
        assert_eq!(set.push(Box::new(heuristic)), 1);

        let ticks = set.run(100);
        assert!(ticks <= 10);
        assert!(set.tick().into_iter().all(|d| d));
        assert!(set.get(1).is_some_and(|s| s.state().iterations() == 20));
    }

    #[test]
    fn empty_set_is_trivially_done() {
        let mut set = SolverSet::new();
        assert!(set.is_empty());
        assert_eq!(set.run(5), 1);
        assert!(set.errors().is_empty());
    }
}
