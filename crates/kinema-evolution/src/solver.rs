//! Genetic solver: one generation per iteration of the shared state machine.
//!
//! ```text
//! reset ─► seed population around the live chain
//! iterate ─► select parents ─► crossover / mutation ─► evaluate ─► (μ + λ) truncation
//! update ─► commit the best individual when it beats the live chain
//! ```

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace, warn};

use kinema_core::config::{EvolutionConfig, SolverConfig};
use kinema_core::error::{ChainError, ConfigError, EvolutionError, KinemaError};
use kinema_core::math::Pose;
use kinema_core::seed::seeded_rng;
use kinema_ik::cache::ChainCache;
use kinema_ik::chain::Chain;
use kinema_ik::joint::JointId;
use kinema_ik::solver::target::TargetSet;
use kinema_ik::solver::{Solver, SolverState, is_degenerate, max_distance};

use crate::individual::Individual;
use crate::operator::Operator;
use crate::population::Population;
use crate::selection::Selection;

const CROSSOVER_PARENTS: usize = 2;

#[derive(Debug, Clone)]
pub struct GeneticSolver {
    state: SolverState,
    config: EvolutionConfig,
    live: ChainCache,
    targets: TargetSet,
    population: Population,
    selection: Selection,
    mutation: Operator,
    crossover: Operator,
    rng: ChaCha8Rng,
    generations: u64,
}

impl GeneticSolver {
    /// Build a solver whose random source is seeded from `evolution.seed`.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if either configuration fails validation.
    pub fn new(
        chain: Chain,
        config: SolverConfig,
        evolution: EvolutionConfig,
    ) -> Result<Self, ConfigError> {
        let rng = seeded_rng(evolution.seed);
        Self::with_rng(chain, config, evolution, rng)
    }

    /// Build a solver drawing from an explicit generator, for callers that
    /// derive per-solver streams from a [`SeedTree`](kinema_core::seed::SeedTree).
    ///
    /// # Errors
    ///
    /// [`ConfigError`] if either configuration fails validation.
    pub fn with_rng(
        chain: Chain,
        config: SolverConfig,
        evolution: EvolutionConfig,
        rng: ChaCha8Rng,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        evolution.validate()?;
        let targets = TargetSet::for_chain(&chain);
        Ok(Self {
            state: SolverState::new(config),
            selection: evolution.selection.into(),
            mutation: evolution.mutation.into(),
            crossover: Operator::ConvexCombination {
                parents: CROSSOVER_PARENTS,
            },
            config: evolution,
            live: ChainCache::new(chain),
            targets,
            population: Population::default(),
            rng,
            generations: 0,
        })
    }

    pub const fn evolution_config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub const fn population(&self) -> &Population {
        &self.population
    }

    /// Generations bred since the last reset.
    pub const fn generations(&self) -> u64 {
        self.generations
    }

    /// Fitness of the best individual, if a population exists.
    pub fn best_fitness(&self) -> Option<f32> {
        self.population
            .best(self.config.objective)
            .map(Individual::fitness)
    }

    fn breed(&mut self) -> Result<Individual, KinemaError> {
        let fitness = self.population.fitness();
        let objective = self.config.objective;
        let replacement = self.config.replacement;
        let pairs = fitness.len() >= CROSSOVER_PARENTS || replacement;
        let crossover = pairs && self.rng.gen_bool(f64::from(self.config.crossover_probability));

        let mut child = if crossover {
            let picks = self.selection.choose(
                &fitness,
                CROSSOVER_PARENTS,
                replacement,
                objective,
                &mut self.rng,
            )?;
            let parents: Vec<&Individual> = picks
                .iter()
                .filter_map(|&i| self.population.get(i))
                .collect();
            self.crossover.apply(&parents, &mut self.rng)?
        } else {
            let picks = self
                .selection
                .choose(&fitness, 1, replacement, objective, &mut self.rng)?;
            let parent = picks
                .first()
                .and_then(|&i| self.population.get(i))
                .ok_or(EvolutionError::EmptyPopulation)?;
            parent.clone()
        };
        if self.rng.gen_bool(f64::from(self.config.mutation_probability)) {
            child = self.mutation.apply(&[&child], &mut self.rng)?;
        }
        child.evaluate(&self.targets);
        Ok(child)
    }

    fn generation(&mut self) -> Result<bool, KinemaError> {
        if self.population.is_empty() {
            self.seed_population()?;
        }
        let size = self.config.population_size;
        let mut children = Vec::with_capacity(size);
        for _ in 0..size {
            children.push(self.breed()?);
        }
        self.population.extend(children);
        self.population.truncate(size, self.config.objective);
        self.generations += 1;

        let best = self.best_fitness().unwrap_or(f32::INFINITY);
        trace!(generation = self.generations, best, "generation bred");
        if best <= self.state.config().max_error {
            debug!(error = best, generation = self.generations, "target reached");
            return Ok(true);
        }
        Ok(false)
    }

    fn seed_population(&mut self) -> Result<(), KinemaError> {
        self.population = Population::seed(
            &self.live,
            self.config.population_size,
            &self.mutation,
            &self.targets,
            &mut self.rng,
        )?;
        self.generations = 0;
        Ok(())
    }
}

impl Solver for GeneticSolver {
    fn name(&self) -> &'static str {
        "genetic"
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
        self.targets.snapshot(self.live.chain().reference());
        if let Err(err) = self.seed_population() {
            warn!(%err, "failed to seed population");
            self.population = Population::default();
        }
    }

    fn iterate(&mut self) -> bool {
        if is_degenerate(self.name(), &self.live, &self.targets) {
            return true;
        }
        self.generation().unwrap_or_else(|err| {
            warn!(%err, "generation aborted");
            true
        })
    }

    fn update(&mut self) {
        let objective = self.config.objective;
        let Some(best) = self.population.best(objective) else {
            return;
        };
        let live = max_distance(&mut self.live, &self.targets);
        if !objective.better(best.fitness(), live) {
            return;
        }
        match self.live.copy_locals_from(best.cache()) {
            Ok(()) => trace!(fitness = best.fitness(), live, "committed best individual"),
            Err(err) => warn!(%err, "failed to commit best individual"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use kinema_core::config::{Objective, SelectionConfig};
    use nalgebra::{UnitQuaternion, Vector3};

    fn arm() -> (Chain, JointId) {
        let bend = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3);
        let mut chain = Chain::default();
        let base = chain.push_root("base", Vector3::zeros(), bend);
        let mid = chain.push_child(base, "mid", Vector3::x(), bend).unwrap();
        let tip = chain
            .push_child(mid, "tip", Vector3::x(), UnitQuaternion::identity())
            .unwrap();
        chain.set_effectors(vec![tip]).unwrap();
        (chain, tip)
    }

    fn config(iterations: u32) -> SolverConfig {
        SolverConfig {
            max_iterations: iterations,
            iterations_per_tick: iterations as f32,
            ..SolverConfig::default()
        }
    }

    fn solver(seed: u64) -> (GeneticSolver, JointId) {
        let (chain, tip) = arm();
        let evolution = EvolutionConfig {
            population_size: 12,
            seed,
            ..EvolutionConfig::default()
        };
        let mut solver = GeneticSolver::new(chain, config(30), evolution).unwrap();
        solver
            .set_target(tip, Some(Pose::from_position(Vector3::new(1.0, 1.2, 0.0))))
            .unwrap();
        (solver, tip)
    }

    #[test]
    fn rejects_invalid_config() {
        let (chain, _) = arm();
        let evolution = EvolutionConfig {
            population_size: 1,
            ..EvolutionConfig::default()
        };
        assert!(GeneticSolver::new(chain, SolverConfig::default(), evolution).is_err());
    }

    #[test]
    fn population_size_is_constant() {
        let (mut solver, _) = solver(1);
        solver.solve();
        assert_eq!(solver.population().len(), 12);
        assert!(solver.generations() > 0);
    }

    #[test]
    fn error_never_increases() {
        let (mut solver, _) = solver(2);
        let initial = solver.error();
        let mut last = initial;
        solver.set_iterations_per_tick(1.0);
        for _ in 0..30 {
            solver.solve();
            let error = solver.error();
            assert!(error <= last + 1e-6);
            last = error;
        }
        assert!(last < initial);
    }

    #[test]
    fn same_seed_same_result() {
        let (mut a, tip) = solver(7);
        let (mut b, _) = solver(7);
        a.solve();
        b.solve();
        let pa = a.live_mut().position(tip).unwrap();
        let pb = b.live_mut().position(tip).unwrap();
        assert!((pa - pb).norm() < 1e-6);
        assert_eq!(a.best_fitness(), b.best_fitness());
    }

    #[test]
    fn every_selection_strategy_runs() {
        for selection in [
            SelectionConfig::Uniform,
            SelectionConfig::Roulette,
            SelectionConfig::Ranking {
                exponential: Some(0.8),
            },
            SelectionConfig::Elitism {
                elite_share: 0.1,
                middle_share: 0.7,
            },
        ] {
            let (chain, tip) = arm();
            let evolution = EvolutionConfig {
                population_size: 8,
                selection,
                replacement: false,
                ..EvolutionConfig::default()
            };
            let mut solver = GeneticSolver::new(chain, config(5), evolution).unwrap();
            solver
                .set_target(tip, Some(Pose::from_position(Vector3::new(0.5, 1.5, 0.0))))
                .unwrap();
            let initial = solver.error();
            assert!(solver.solve());
            assert_eq!(solver.population().len(), 8);
            assert!(solver.error() <= initial, "{selection:?}");
        }
    }

    #[test]
    fn maximize_objective_moves_away() {
        let (chain, tip) = arm();
        let evolution = EvolutionConfig {
            objective: Objective::Maximize,
            ..EvolutionConfig::default()
        };
        let mut solver = GeneticSolver::new(chain, config(10), evolution).unwrap();
        solver
            .set_target(tip, Some(Pose::from_position(Vector3::new(1.0, 1.2, 0.0))))
            .unwrap();
        let initial = solver.error();
        solver.solve();
        assert!(solver.error() >= initial);
    }

    #[test]
    fn no_target_is_a_no_op() {
        let (chain, _) = arm();
        let mut solver =
            GeneticSolver::new(chain, config(10), EvolutionConfig::default()).unwrap();
        assert!(solver.solve());
        assert_eq!(solver.generations(), 0);
    }
}
