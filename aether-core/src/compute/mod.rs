//! Compute gateway around the opaque reconstruction resource.
//!
//! The reconstruction algorithm itself is not part of this crate. It sits
//! behind [`Reconstructor`], which exposes a one-time `initialize` and a
//! blocking `reconstruct`. [`ComputeGateway`] owns the initialization
//! lifecycle, gates work on readiness, validates input, and serializes
//! invocations for backends that are not safe to call concurrently.

mod accelerator;
mod command;
mod demo;
mod gateway;

use std::path::PathBuf;

pub use accelerator::{Accelerator, AcceleratorPreference, cuda_available};
pub use command::CommandReconstructor;
pub use demo::DemoReconstructor;
pub use gateway::ComputeGateway;

use crate::error::BackendError;
use crate::point::Point;

/// Minimum number of images a reconstruction accepts.
pub const MIN_IMAGES: usize = 2;

/// An opaque, slow, fallible reconstruction resource.
///
/// Both methods block and are always called off the async runtime's
/// connection-serving threads.
pub trait Reconstructor: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    /// Expensive one-time setup such as fetching and loading model weights.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource is unavailable.
    fn initialize(&self) -> Result<(), BackendError>;

    /// Reconstructs a point cloud from the images at `images`, in upload order.
    ///
    /// # Errors
    ///
    /// Returns an error carrying the cause when the computation fails.
    fn reconstruct(&self, images: &[PathBuf]) -> Result<Vec<Point>, BackendError>;

    /// Whether `reconstruct` may run on several threads at once.
    fn supports_concurrent_invocation(&self) -> bool {
        false
    }

    /// Accelerator the backend runs on.
    fn accelerator(&self) -> Accelerator {
        Accelerator::Cpu
    }
}
