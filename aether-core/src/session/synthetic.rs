//! Placeholder cloud streamed when a cycle completes without images.

use std::f64::consts::{PI, TAU};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::point::{Point, clamp_channel};

/// Fixed seed so every placeholder cycle streams the same cloud.
const PLACEHOLDER_SEED: u64 = 0x0AE7_4E55;

/// A reproducible shell of `count` points between radius 0.5 and 1.0,
/// coloured by position.
#[must_use]
pub fn placeholder_cloud(count: usize) -> Vec<Point> {
    let mut rng = ChaCha8Rng::seed_from_u64(PLACEHOLDER_SEED);
    (0..count)
        .map(|_| {
            let theta = rng.gen_range(0.0..TAU);
            let phi = rng.gen_range(0.0..=PI);
            let radius = rng.gen_range(0.5..=1.0);

            let x = radius * phi.sin() * theta.cos();
            let y = radius * phi.sin() * theta.sin();
            let z = radius * phi.cos();
            let channel = |v: f64| clamp_channel(Some((v + 1.0) * 127.5));
            Point::new(x, y, z, channel(x), channel(y), channel(z))
        })
        .collect()
}
