//! Shared foundations for the kinema inverse kinematics crates.
//!
//! - [`math`]: [`Pose`](math::Pose) and rotation helpers over `nalgebra`.
//! - [`error`]: the error taxonomy (`thiserror`).
//! - [`config`]: TOML-loadable solver settings.
//! - [`seed`]: deterministic seeding of every random source.

pub mod config;
pub mod error;
pub mod math;
pub mod seed;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::{
        ChangePolicy, EvolutionConfig, HeuristicConfig, HeuristicKind, KinemaConfig,
        MutationConfig, Objective, SelectionConfig, SolverConfig,
    };
    pub use crate::error::{
        ChainError, ConfigError, ConstraintError, EvolutionError, KinemaError,
    };
    pub use crate::math::Pose;
    pub use crate::seed::{SeedTree, seeded_rng};
}
