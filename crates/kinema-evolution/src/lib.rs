//! Evolutionary inverse kinematics.
//!
//! Candidate poses are [`Individual`]s: private copies of the chain whose
//! fitness is the effector distance to the goals. A [`Population`] evolves
//! through [`Selection`] and variation [`Operator`]s, and the
//! [`GeneticSolver`] runs one generation per iteration of the shared
//! [`Solver`](kinema_ik::Solver) state machine.
//!
//! Every random choice draws from one seeded `ChaCha8Rng`, so a run is
//! reproducible from [`EvolutionConfig::seed`](kinema_core::config::EvolutionConfig::seed).

pub mod individual;
pub mod operator;
pub mod population;
pub mod selection;
pub mod solver;

pub use individual::Individual;
pub use operator::Operator;
pub use population::Population;
pub use selection::Selection;
pub use solver::GeneticSolver;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::individual::Individual;
    pub use crate::operator::Operator;
    pub use crate::population::Population;
    pub use crate::selection::Selection;
    pub use crate::solver::GeneticSolver;
}
