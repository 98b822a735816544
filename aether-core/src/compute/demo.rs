//! Development backend that arranges image samples on a ring.
//!
//! No model is involved: each image becomes a vertical panel of points facing
//! the origin, positioned by upload index and coloured from the raw file
//! bytes. Output is deterministic for a given set of files.

use std::f64::consts::TAU;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use super::{Accelerator, Reconstructor};
use crate::error::BackendError;
use crate::point::{DEFAULT_CHANNEL, Point};

/// Ring radius in scene units.
const RING_RADIUS: f64 = 2.0;

/// Side of the virtual sampling grid laid over each file's bytes.
const GRID: u32 = 128;

/// Deterministic stand-in for a real reconstruction model.
#[derive(Debug, Clone)]
pub struct DemoReconstructor {
    points_per_image: usize,
    init_delay: Duration,
}

impl DemoReconstructor {
    /// `init_delay` simulates model loading during startup.
    #[must_use]
    pub const fn new(points_per_image: usize, init_delay: Duration) -> Self {
        Self {
            points_per_image,
            init_delay,
        }
    }

    fn panel(&self, index: usize, total: usize, bytes: &[u8]) -> Vec<Point> {
        #[allow(clippy::cast_precision_loss)]
        let angle = (index as f64 / total as f64) * TAU;
        let (sin, cos) = angle.sin_cos();
        let mut rng = ChaCha8Rng::seed_from_u64(index as u64);

        (0..self.points_per_image)
            .map(|_| {
                let u = rng.gen_range(0..GRID);
                let v = rng.gen_range(0..GRID);
                let (r, g, b) = sample_colour(bytes, u, v);
                let across = f64::from(u) / f64::from(GRID) - 0.5;
                let up = f64::from(v) / f64::from(GRID) - 0.5;
                Point::new(
                    RING_RADIUS * cos + across * cos,
                    up * 2.0,
                    RING_RADIUS * sin + across * sin,
                    r,
                    g,
                    b,
                )
            })
            .collect()
    }
}

/// Reads an RGB triple from the byte cell under grid position `(u, v)`.
fn sample_colour(bytes: &[u8], u: u32, v: u32) -> (u8, u8, u8) {
    if bytes.len() < 3 {
        return (DEFAULT_CHANNEL, DEFAULT_CHANNEL, DEFAULT_CHANNEL);
    }
    let cell = (v * GRID + u) as usize;
    let triples = bytes.len() / 3;
    let at = (cell % triples) * 3;
    (bytes[at], bytes[at + 1], bytes[at + 2])
}

impl Reconstructor for DemoReconstructor {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn initialize(&self) -> Result<(), BackendError> {
        if !self.init_delay.is_zero() {
            debug!(delay_ms = self.init_delay.as_millis(), "Simulating model load");
            thread::sleep(self.init_delay);
        }
        Ok(())
    }

    fn reconstruct(&self, images: &[PathBuf]) -> Result<Vec<Point>, BackendError> {
        let mut points = Vec::with_capacity(images.len() * self.points_per_image);
        for (index, path) in images.iter().enumerate() {
            let bytes = std::fs::read(path).map_err(|e| {
                BackendError::new(format!("cannot read image {}: {e}", path.display()))
            })?;
            points.extend(self.panel(index, images.len(), &bytes));
        }
        Ok(points)
    }

    fn supports_concurrent_invocation(&self) -> bool {
        true
    }

    fn accelerator(&self) -> Accelerator {
        Accelerator::Cpu
    }
}
