//! Iterative solver contract and the shared tick-driven state machine.
//!
//! A concrete solver implements four hooks:
//!
//! - [`Solver::changed`] reports whether the goals moved since the last reset,
//! - [`Solver::reset`] snapshots the live chain into solver-private state,
//! - [`Solver::iterate`] performs one step and returns `true` once done,
//! - [`Solver::update`] commits the buffered result to the live chain.
//!
//! [`Solver::solve`] drives them once per external tick with a fractional
//! iteration budget. Once an iteration reports completion the iteration
//! counter is pinned to `max_iterations`, so further ticks do no work until
//! the goals change or a reset is forced.

pub mod driver;
pub mod heuristic;
pub mod jacobian;
pub mod target;

use tracing::{debug, trace, warn};

use kinema_core::config::SolverConfig;
use kinema_core::error::ChainError;
use kinema_core::math::Pose;

use crate::cache::ChainCache;
use crate::joint::JointId;
use target::TargetSet;

/// Coarse lifecycle of a solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Freshly reset, no iteration run yet.
    #[default]
    Idle,
    /// Budget left; iterating across ticks.
    Iterating,
    /// Termination reached or iterations exhausted; idle until reset.
    Converged,
}

/// Bookkeeping shared by every solver.
#[derive(Debug, Clone)]
pub struct SolverState {
    config: SolverConfig,
    iterations: u32,
    budget: f32,
    force_reset: bool,
    phase: Phase,
    total_iterations: u64,
}

impl SolverState {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            iterations: 0,
            budget: 0.0,
            force_reset: false,
            phase: Phase::Idle,
            total_iterations: 0,
        }
    }

    pub const fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Iterations since the last reset (pinned to the maximum once done).
    pub const fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Every `iterate()` call made over the solver's lifetime.
    pub const fn total_iterations(&self) -> u64 {
        self.total_iterations
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Unspent fractional iteration budget.
    pub const fn budget(&self) -> f32 {
        self.budget
    }

    fn exhausted(&self) -> bool {
        self.iterations >= self.config.max_iterations
    }
}

/// Iterative IK solver.
pub trait Solver {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn state(&self) -> &SolverState;

    fn state_mut(&mut self) -> &mut SolverState;

    /// Whether the goals changed since the last reset.
    fn changed(&mut self) -> bool;

    /// Drop solver-private progress and resynchronize with the live chain.
    fn reset(&mut self);

    /// One step. Returns `true` when the termination condition holds.
    fn iterate(&mut self) -> bool;

    /// Commit buffered progress to the live chain.
    fn update(&mut self);

    /// Current distance of the live chain's effectors to their goals.
    fn error(&mut self) -> f32;

    /// Set or clear the goal of one end-effector.
    ///
    /// # Errors
    ///
    /// [`ChainError::NotAnEffector`] for a joint not designated as an
    /// effector of the solver's chain.
    fn set_target(&mut self, effector: JointId, target: Option<Pose>) -> Result<(), ChainError>;

    /// The live chain, for reading world poses.
    fn live(&self) -> &ChainCache;

    /// Mutable live chain. Mutating it does not reset the solver by itself;
    /// call [`Solver::force_reset`] afterwards.
    fn live_mut(&mut self) -> &mut ChainCache;

    /// Run one tick. Returns `true` when the solver has nothing left to do
    /// (converged, or iterations exhausted) after this call.
    fn solve(&mut self) -> bool {
        let changed = self.changed();
        let forced = std::mem::take(&mut self.state_mut().force_reset);
        if changed || forced {
            self.reset();
            let state = self.state_mut();
            state.iterations = 0;
            state.phase = Phase::Idle;
            debug!(solver = self.name(), changed, forced, "solver reset");
        }

        if self.state().exhausted() {
            return true;
        }

        let per_tick = self.state().config.iterations_per_tick;
        self.state_mut().budget += per_tick;
        while self.state().budget >= 1.0 && !self.state().exhausted() {
            let state = self.state_mut();
            state.budget -= 1.0;
            state.iterations += 1;
            state.total_iterations += 1;
            state.phase = Phase::Iterating;
            if self.iterate() {
                let state = self.state_mut();
                state.iterations = state.config.max_iterations;
                debug!(solver = self.name(), "iteration burst terminated");
                break;
            }
        }
        if self.state().exhausted() {
            self.state_mut().phase = Phase::Converged;
        }

        self.update();
        trace!(
            solver = self.name(),
            iterations = self.state().iterations,
            budget = self.state().budget,
            "tick done"
        );
        self.state().exhausted()
    }

    /// Request a reset on the next [`Solver::solve`].
    fn force_reset(&mut self) {
        self.state_mut().force_reset = true;
    }

    fn set_max_error(&mut self, max_error: f32) {
        self.state_mut().config.max_error = max_error;
    }

    fn set_max_iterations(&mut self, max_iterations: u32) {
        self.state_mut().config.max_iterations = max_iterations;
    }

    fn set_iterations_per_tick(&mut self, iterations_per_tick: f32) {
        self.state_mut().config.iterations_per_tick = iterations_per_tick;
    }
}

/// Whether there is anything to solve; logs why not.
pub fn is_degenerate(name: &str, live: &ChainCache, targets: &TargetSet) -> bool {
    if live.len() < 2 {
        warn!(solver = name, joints = live.len(), "chain too short to solve");
        return true;
    }
    if targets.is_empty() {
        debug!(solver = name, "no target set");
        return true;
    }
    false
}

/// Largest effector-to-goal distance over all goals of `cache`.
pub fn max_distance(cache: &mut ChainCache, targets: &TargetSet) -> f32 {
    let mut worst = 0.0f32;
    for (effector, goal) in targets.active() {
        if let Ok(position) = cache.position(effector) {
            worst = worst.max((goal.position - position).norm());
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use nalgebra::{UnitQuaternion, Vector3};

    /// Counts hook calls; converges after `finish_after` iterations.
    struct Scripted {
        state: SolverState,
        live: ChainCache,
        changes: Vec<bool>,
        resets: u32,
        updates: u32,
        finish_after: Option<u64>,
    }

    impl Scripted {
        fn new(config: SolverConfig, finish_after: Option<u64>) -> Self {
            let mut chain = Chain::default();
            chain.push_root("root", Vector3::zeros(), UnitQuaternion::identity());
            Self {
                state: SolverState::new(config),
                live: ChainCache::new(chain),
                changes: Vec::new(),
                resets: 0,
                updates: 0,
                finish_after,
            }
        }
    }

    impl Solver for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn state(&self) -> &SolverState {
            &self.state
        }
        fn state_mut(&mut self) -> &mut SolverState {
            &mut self.state
        }
        fn changed(&mut self) -> bool {
            self.changes.pop().unwrap_or(false)
        }
        fn reset(&mut self) {
            self.resets += 1;
        }
        fn iterate(&mut self) -> bool {
            self.finish_after
                .is_some_and(|n| self.state.total_iterations >= n)
        }
        fn update(&mut self) {
            self.updates += 1;
        }
        fn error(&mut self) -> f32 {
            0.0
        }
        fn set_target(&mut self, effector: JointId, _: Option<Pose>) -> Result<(), ChainError> {
            Err(ChainError::NotAnEffector(effector.index()))
        }
        fn live(&self) -> &ChainCache {
            &self.live
        }
        fn live_mut(&mut self) -> &mut ChainCache {
            &mut self.live
        }
    }

    fn config(max_iterations: u32, iterations_per_tick: f32) -> SolverConfig {
        SolverConfig {
            max_iterations,
            iterations_per_tick,
            ..SolverConfig::default()
        }
    }

    #[test]
    fn whole_budget_per_tick() {
        let mut solver = Scripted::new(config(10, 4.0), None);
        assert!(!solver.solve());
        assert_eq!(solver.state().iterations(), 4);
        assert!(!solver.solve());
        assert!(solver.solve());
        assert_eq!(solver.state().iterations(), 10);
        assert_eq!(solver.state().phase(), Phase::Converged);
        assert_eq!(solver.updates, 3);
    }

    #[test]
    fn fractional_budget_spreads_iterations() {
        let mut solver = Scripted::new(config(10, 1.0 / 3.0), None);
        let mut per_tick = Vec::new();
        for _ in 0..6 {
            let before = solver.state().total_iterations();
            solver.solve();
            per_tick.push(solver.state().total_iterations() - before);
        }
        assert_eq!(per_tick.iter().sum::<u64>(), 2);
        assert_eq!(per_tick[0], 0);
    }

    #[test]
    fn convergence_pins_counter_and_stops_work() {
        let mut solver = Scripted::new(config(50, 5.0), Some(2));
        assert!(solver.solve());
        assert_eq!(solver.state().total_iterations(), 2);
        assert_eq!(solver.state().iterations(), 50);
        for _ in 0..5 {
            assert!(solver.solve());
        }
        assert_eq!(solver.state().total_iterations(), 2);
    }

    #[test]
    fn change_and_force_reset_restart() {
        let mut solver = Scripted::new(config(3, 3.0), None);
        assert!(solver.solve());
        assert_eq!(solver.resets, 0);

        solver.changes.push(true);
        assert!(solver.solve());
        assert_eq!(solver.resets, 1);
        assert_eq!(solver.state().total_iterations(), 6);

        solver.force_reset();
        solver.solve();
        assert_eq!(solver.resets, 2);
        solver.solve();
        assert_eq!(solver.resets, 2);
    }

    #[test]
    fn setters_reach_config() {
        let mut solver = Scripted::new(SolverConfig::default(), None);
        solver.set_max_error(0.5);
        solver.set_max_iterations(7);
        solver.set_iterations_per_tick(2.5);
        let config = solver.state().config();
        assert_eq!(config.max_error, 0.5);
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.iterations_per_tick, 2.5);
    }
}
