//! Reproducible random inputs for solver and cache tests.

use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Test generator; the same stream the solvers use for a given seed.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    kinema_core::seed::seeded_rng(seed)
}

/// `count` angles in `[-limit, limit)`.
pub fn deterministic_angles(count: usize, limit: f32, seed: u64) -> Vec<f32> {
    let mut rng = seeded_rng(seed);
    (0..count).map(|_| rng.gen_range(-limit..limit)).collect()
}

/// `count` rotations about random axes, each by at most `max_angle`.
pub fn random_rotations(count: usize, max_angle: f32, seed: u64) -> Vec<UnitQuaternion<f32>> {
    let mut rng = seeded_rng(seed);
    (0..count)
        .map(|_| {
            let axis = Vector3::from_fn(|_, _| rng.gen_range(-1.0..1.0));
            let angle = rng.gen_range(-max_angle..max_angle);
            UnitQuaternion::from_scaled_axis(axis.normalize() * angle)
        })
        .collect()
}
