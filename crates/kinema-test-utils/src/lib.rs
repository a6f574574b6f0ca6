//! Shared test fixtures and utilities for kinema crates.
//!
//! Provides deterministic RNG setup and a few ready-made chains (planar
//! arms, hinged arms, a two-effector tree) for solver tests.

pub mod chains;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use chains::{branched_tree, goal, hinged_arm, planar_arm};
pub use rng::{deterministic_angles, random_rotations, seeded_rng};
