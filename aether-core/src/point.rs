//! Coloured 3D points.
//!
//! [`Point`] is the strict in-memory form streamed to clients and fed to the
//! PLY writer. [`RawPoint`] is the permissive form accepted from clients on
//! export: any field may be missing and colour channels may fall outside
//! `0..=255`. Normalisation clamps rather than rejects.

use serde::{Deserialize, Serialize};

/// Channel value used when a colour component is missing.
pub const DEFAULT_CHANNEL: u8 = 128;

/// A 3D coordinate with an 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
}

impl Point {
    /// Creates a point from coordinates and colour.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64, r: u8, g: u8, b: u8) -> Self {
        Self { x, y, z, r, g, b }
    }
}

/// Client-supplied point with optional, unbounded fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    /// X coordinate, `0.0` when absent
    #[serde(default)]
    pub x: Option<f64>,
    /// Y coordinate, `0.0` when absent
    #[serde(default)]
    pub y: Option<f64>,
    /// Z coordinate, `0.0` when absent
    #[serde(default)]
    pub z: Option<f64>,
    /// Red channel, any range
    #[serde(default)]
    pub r: Option<f64>,
    /// Green channel, any range
    #[serde(default)]
    pub g: Option<f64>,
    /// Blue channel, any range
    #[serde(default)]
    pub b: Option<f64>,
}

impl RawPoint {
    /// Normalises into a [`Point`]: missing coordinates become `0.0`, missing
    /// channels become [`DEFAULT_CHANNEL`], and present channels are truncated
    /// toward zero and clamped into `0..=255`.
    #[must_use]
    pub fn normalize(&self) -> Point {
        Point {
            x: self.x.unwrap_or(0.0),
            y: self.y.unwrap_or(0.0),
            z: self.z.unwrap_or(0.0),
            r: clamp_channel(self.r),
            g: clamp_channel(self.g),
            b: clamp_channel(self.b),
        }
    }
}

impl From<RawPoint> for Point {
    fn from(raw: RawPoint) -> Self {
        raw.normalize()
    }
}

impl From<Point> for RawPoint {
    fn from(point: Point) -> Self {
        Self {
            x: Some(point.x),
            y: Some(point.y),
            z: Some(point.z),
            r: Some(f64::from(point.r)),
            g: Some(f64::from(point.g)),
            b: Some(f64::from(point.b)),
        }
    }
}

/// Clamps an arbitrary channel value into a byte. `None` and NaN map to the default.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_channel(value: Option<f64>) -> u8 {
    match value {
        Some(v) if !v.is_nan() => v.trunc().clamp(0.0, 255.0) as u8,
        _ => DEFAULT_CHANNEL,
    }
}
