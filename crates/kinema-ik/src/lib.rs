//! Cached kinematic chains and iterative inverse kinematics.
//!
//! # Architecture
//!
//! ```text
//! Chain (joint arena) ──► ChainCache ──► Solver::solve() per tick ──► local transforms
//!                                        ├─ JacobianTransposeSolver
//!                                        └─ HeuristicSolver (Context)
//! ```
//!
//! A [`Chain`] is built once through its construction API (the loader
//! boundary). Solvers own the chain inside a [`ChainCache`], which keeps
//! lazily refreshed world poses and applies constrained deltas. Renderers
//! read world poses back through [`ChainCache::pose`].

pub mod cache;
pub mod chain;
pub mod constraint;
pub mod joint;
pub mod solver;

pub use cache::{ChainCache, NodeInformation};
pub use chain::Chain;
pub use constraint::Constraint;
pub use joint::{Joint, JointId};
pub use solver::{Phase, Solver, SolverState};

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::cache::ChainCache;
    pub use crate::chain::Chain;
    pub use crate::constraint::{
        AxisPlane, BallAndSocket, Constraint, Freedom, Hinge, PlanarPolygon,
    };
    pub use crate::joint::{Joint, JointId};
    pub use crate::solver::driver::SolverSet;
    pub use crate::solver::heuristic::{Context, HeuristicSolver};
    pub use crate::solver::jacobian::JacobianTransposeSolver;
    pub use crate::solver::target::TargetSet;
    pub use crate::solver::{Phase, Solver, SolverState};
}
