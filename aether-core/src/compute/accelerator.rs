//! Accelerator detection for the health probe and backend environment.

use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// NVIDIA kernel driver marker present when a CUDA-capable device is loaded.
const NVIDIA_DRIVER_PROC: &str = "/proc/driver/nvidia/version";

/// Accelerator the reconstruction backend runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    /// NVIDIA CUDA device
    Cuda,
    /// No accelerator; CPU execution
    Cpu,
}

impl Accelerator {
    /// Whether a hardware accelerator is in use.
    #[must_use]
    pub const fn is_accelerated(self) -> bool {
        matches!(self, Self::Cuda)
    }

    /// Short lowercase name, e.g. `"cuda"`.
    #[must_use]
    pub const fn kind(self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        }
    }
}

/// Operator preference from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceleratorPreference {
    /// Use CUDA when a device is detected
    #[default]
    Auto,
    /// Always report CUDA
    Cuda,
    /// Never use an accelerator
    None,
}

impl AcceleratorPreference {
    /// Resolves the preference against the host.
    #[must_use]
    pub fn resolve(self) -> Accelerator {
        match self {
            Self::Auto if cuda_available() => Accelerator::Cuda,
            Self::Auto | Self::None => Accelerator::Cpu,
            Self::Cuda => Accelerator::Cuda,
        }
    }
}

static CUDA_AVAILABLE: OnceLock<bool> = OnceLock::new();

/// Checks once whether a CUDA device is visible to this process and caches the answer.
#[must_use]
pub fn cuda_available() -> bool {
    *CUDA_AVAILABLE.get_or_init(|| {
        let visible = std::env::var("CUDA_VISIBLE_DEVICES").ok();
        let available = probe_cuda(Path::new(NVIDIA_DRIVER_PROC), visible.as_deref());
        if available {
            tracing::info!("CUDA device detected");
        } else {
            tracing::warn!("No CUDA device detected, reconstruction will run on CPU");
        }
        available
    })
}

fn probe_cuda(driver_marker: &Path, visible_devices: Option<&str>) -> bool {
    let hidden = matches!(
        visible_devices.map(str::trim),
        Some("" | "-1" | "none" | "NoDevFiles")
    );
    !hidden && driver_marker.exists()
}
