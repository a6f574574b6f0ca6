//! Genetic solver against the shared fixtures.

use kinema_core::config::{EvolutionConfig, MutationConfig, SelectionConfig, SolverConfig};
use kinema_core::seed::SeedTree;
use kinema_evolution::prelude::*;
use kinema_ik::prelude::*;
use kinema_test_utils::{branched_tree, goal, hinged_arm, planar_arm};

fn generations(count: u32) -> SolverConfig {
    SolverConfig {
        max_iterations: count,
        iterations_per_tick: 10.0,
        ..SolverConfig::default()
    }
}

#[test]
fn improves_planar_arm_over_ticks() {
    let (chain, tip) = planar_arm(3, 0.3);
    let evolution = EvolutionConfig {
        population_size: 24,
        seed: 17,
        ..EvolutionConfig::default()
    };
    let mut solver = GeneticSolver::new(chain, generations(60), evolution).unwrap();
    solver.set_target(tip, Some(goal(1.5, 1.0, 0.0))).unwrap();
    let initial = solver.error();

    let mut set = SolverSet::new();
    set.push(Box::new(solver));
    let ticks = set.run(10);
    assert!(ticks <= 6);
    let error = set.errors()[0];
    assert!(error < initial, "{error} vs {initial}");
}

#[test]
fn hinge_limits_survive_evolution() {
    let limit = 0.4;
    let (chain, tip) = hinged_arm(3, 0.2, limit);
    let evolution = EvolutionConfig {
        mutation: MutationConfig::Gaussian { std: 0.5 },
        seed: 5,
        ..EvolutionConfig::default()
    };
    let mut solver = GeneticSolver::new(chain, generations(20), evolution).unwrap();
    solver.set_target(tip, Some(goal(-1.0, 1.0, 0.5))).unwrap();
    while !solver.solve() {}
    for individual in solver.population().iter() {
        let chain = individual.cache().chain();
        for &gene in individual.genes() {
            let rotation = chain.joint(gene).unwrap().rotation();
            assert!(kinema_core::math::rotation_angle(rotation) <= limit + 1e-4);
        }
    }
}

#[test]
fn two_effectors_share_one_fitness() {
    let (chain, [left, right]) = branched_tree();
    let evolution = EvolutionConfig {
        selection: SelectionConfig::Ranking { exponential: None },
        seed: 9,
        ..EvolutionConfig::default()
    };
    let mut solver = GeneticSolver::new(chain, generations(30), evolution).unwrap();
    solver.set_target(left, Some(goal(3.0, 1.5, 0.0))).unwrap();
    solver.set_target(right, Some(goal(3.2, -1.0, 0.0))).unwrap();
    let initial = solver.error();
    while !solver.solve() {}
    let best = solver.best_fitness().unwrap();
    assert!(best <= initial);
    assert!((solver.error() - best).abs() < 1e-5);
}

#[test]
fn seed_tree_streams_are_reproducible() {
    let tree = SeedTree::new(2024);
    let run = |index: usize| {
        let (chain, tip) = planar_arm(2, 0.4);
        let mut solver = GeneticSolver::with_rng(
            chain,
            generations(10),
            EvolutionConfig::default(),
            tree.solver_rng(index),
        )
        .unwrap();
        solver.set_target(tip, Some(goal(0.5, 1.5, 0.0))).unwrap();
        while !solver.solve() {}
        solver.live_mut().position(tip).unwrap()
    };
    assert!((run(0) - run(0)).norm() < 1e-6);
}
