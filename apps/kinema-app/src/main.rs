//! Kinema inverse kinematics CLI.
//!
//! Provides two modes of operation:
//! - `run`: build a demo arm, drive one solver tick by tick towards a target
//!   and print the error after every tick
//! - `info`: print workspace crate versions and default configuration

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::{UnitQuaternion, Vector3};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kinema_core::prelude::*;
use kinema_evolution::GeneticSolver;
use kinema_ik::prelude::*;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Kinema inverse kinematics toolkit.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a demo arm towards a target.
    Run {
        /// Solver to drive.
        #[arg(short, long, value_enum, default_value_t = SolverKind::Jacobian)]
        solver: SolverKind,

        /// Target position as `x,y,z`.
        #[arg(short, long, value_parser = parse_vector, default_value = "1.5,1.0,0.0")]
        target: Vector3<f32>,

        /// Maximum number of ticks.
        #[arg(long, default_value_t = 100)]
        ticks: usize,

        /// Number of unit links in the demo arm.
        #[arg(short, long, default_value_t = 3)]
        links: usize,

        /// Hinge limit in radians for every joint; unconstrained if absent.
        #[arg(long)]
        hinge: Option<f32>,

        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed for the genetic solver (overrides the configuration).
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print crate information.
    Info,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SolverKind {
    Jacobian,
    Heuristic,
    Genetic,
}

fn parse_vector(s: &str) -> Result<Vector3<f32>, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(Vector3::new(*x, *y, *z)),
        _ => Err(format!("expected x,y,z, got {} values", parts.len())),
    }
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

/// A planar arm of `links` unit links, slightly curled, with an optional
/// z-axis hinge on every moving joint.
fn demo_arm(links: usize, hinge: Option<f32>) -> Result<(Chain, JointId), KinemaError> {
    let links = links.max(1);
    let turn = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.3);
    let mut chain = Chain::default();
    let mut last = chain.push_root("base", Vector3::zeros(), turn);
    for i in 1..=links {
        let rotation = if i == links { UnitQuaternion::identity() } else { turn };
        last = chain.push_child(last, format!("link{i}"), Vector3::x(), rotation)?;
    }
    if let Some(limit) = hinge {
        let ids: Vec<_> = chain.ids().filter(|&id| id != last).collect();
        for id in ids {
            chain.set_constraint(id, Hinge::new(Vector3::z(), -limit, limit)?)?;
        }
    }
    chain.set_effectors(vec![last])?;
    Ok((chain, last))
}

fn build_solver(
    kind: SolverKind,
    chain: Chain,
    config: &KinemaConfig,
) -> Result<Box<dyn Solver>, KinemaError> {
    let solver: Box<dyn Solver> = match kind {
        SolverKind::Jacobian => Box::new(JacobianTransposeSolver::new(
            chain,
            config.solver.clone(),
        )?),
        SolverKind::Heuristic => Box::new(HeuristicSolver::new(
            chain,
            config.solver.clone(),
            &config.heuristic,
        )?),
        SolverKind::Genetic => Box::new(GeneticSolver::new(
            chain,
            config.solver.clone(),
            config.evolution.clone(),
        )?),
    };
    Ok(solver)
}

fn run_solve(
    kind: SolverKind,
    target: Vector3<f32>,
    ticks: usize,
    links: usize,
    hinge: Option<f32>,
    config: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<(), KinemaError> {
    let mut config = match config {
        Some(path) => KinemaConfig::from_file(path)?,
        None => KinemaConfig::default(),
    };
    if let Some(seed) = seed {
        config.evolution.seed = seed;
    }

    let (chain, tip) = demo_arm(links, hinge)?;
    let reach = chain.max_reach(tip)?;
    info!(?kind, links, reach, target = ?target, "solving");

    let mut solver = build_solver(kind, chain, &config)?;
    solver.set_target(tip, Some(Pose::from_position(target)))?;
    let mut set = SolverSet::new();
    set.push(solver);

    let mut done = false;
    let mut tick = 0;
    while tick < ticks && !done {
        tick += 1;
        done = set.tick().into_iter().all(|d| d);
        println!("tick {tick}: error={:.5}", set.errors()[0]);
    }

    let solver = set.get_mut(0).ok_or(ChainError::Empty)?;
    let position = solver.live_mut().position(tip)?;
    println!(
        "\n{}: {} after {tick} ticks ({} iterations), effector at ({:.3}, {:.3}, {:.3})",
        solver.name(),
        if done { "done" } else { "unfinished" },
        solver.state().total_iterations(),
        position.x,
        position.y,
        position.z,
    );
    Ok(())
}

fn run_info() {
    let config = KinemaConfig::default();
    println!("kinema v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  kinema-core      {}", env!("CARGO_PKG_VERSION"));
    println!("  kinema-ik        {}", env!("CARGO_PKG_VERSION"));
    println!("  kinema-evolution {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("defaults:");
    println!(
        "  solver: max_error={} max_iterations={} iterations_per_tick={}",
        config.solver.max_error, config.solver.max_iterations, config.solver.iterations_per_tick
    );
    println!("  heuristic: {:?}", config.heuristic.heuristic);
    println!(
        "  evolution: population={} selection={:?}",
        config.evolution.population_size, config.evolution.selection
    );
    println!();
    println!("edition: 2024");
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Run {
            solver,
            target,
            ticks,
            links,
            hinge,
            config,
            seed,
        }) => run_solve(solver, target, ticks, links, hinge, config, seed),
        Some(Commands::Info) => {
            run_info();
            Ok(())
        }
        None => run_solve(
            SolverKind::Jacobian,
            Vector3::new(1.5, 1.0, 0.0),
            100,
            3,
            None,
            None,
            None,
        ),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_vectors() {
        assert_eq!(
            parse_vector("1, -2.5,0").unwrap(),
            Vector3::new(1.0, -2.5, 0.0)
        );
        assert!(parse_vector("1,2").is_err());
        assert!(parse_vector("a,b,c").is_err());
    }

    #[test]
    fn demo_arm_layout() {
        let (chain, tip) = demo_arm(4, Some(0.5)).unwrap();
        assert_eq!(chain.len(), 5);
        assert_eq!(chain.effectors(), &[tip]);
        assert!(chain.joint(tip).unwrap().constraint().is_none());
        assert!((chain.max_reach(tip).unwrap() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::try_parse_from([
            "kinema", "run", "--solver", "genetic", "--target", "1,1,0", "--seed", "3",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Run {
                solver: SolverKind::Genetic,
                seed: Some(3),
                ..
            })
        ));
    }

    #[test]
    fn every_solver_builds() {
        for kind in [SolverKind::Jacobian, SolverKind::Heuristic, SolverKind::Genetic] {
            let (chain, tip) = demo_arm(3, None).unwrap();
            let mut solver = build_solver(kind, chain, &KinemaConfig::default()).unwrap();
            solver
                .set_target(tip, Some(Pose::from_position(Vector3::new(1.0, 1.0, 0.0))))
                .unwrap();
            solver.solve();
            assert!(solver.error().is_finite());
        }
    }
}
