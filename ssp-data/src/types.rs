//! Core data types shared by the projection kernels and the pipeline.
//!
//! These are CPU-side representations. The GPU uniform layout derived from
//! [`ProjectionParams`] lives in ssp-gpu.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lut::LookupEntry;
use crate::maps::INVALID_POSITION;

/// Errors raised when raw buffers do not fit the depth grid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("Buffer size mismatch: expected {expected} elements, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Depth grid must be non-empty (got {width}x{height})")]
    EmptyGrid { width: u32, height: u32 },
}

/// Fixed pixel layout over which depth samples and the lookup table are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthGrid {
    pub width: u32,
    pub height: u32,
}

impl DepthGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of depth pixels (and required lookup entries).
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Byte length of a raw depth frame (one little-endian u16 per pixel).
    pub fn depth_frame_len(&self) -> usize {
        self.pixel_count() * std::mem::size_of::<u16>()
    }

    /// Byte length of an RGBA8 color frame aligned to this grid.
    pub fn color_frame_len(&self) -> usize {
        self.pixel_count() * 4
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.pixel_count() == 0 {
            return Err(DataError::EmptyGrid {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

impl Default for DepthGrid {
    /// Azure Kinect NFOV unbinned depth mode.
    fn default() -> Self {
        Self::new(640, 576)
    }
}

/// Inclusive `[min, max]` range on one axis.
///
/// Serialized as a two element array; a `null` bound means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[Option<f32>; 2]", into = "[Option<f32>; 2]")]
pub struct ThresholdRange {
    pub min: f32,
    pub max: f32,
}

impl ThresholdRange {
    pub const UNBOUNDED: Self = Self {
        min: f32::NEG_INFINITY,
        max: f32::INFINITY,
    };

    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Boundary values are inside. NaN is never inside.
    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

impl Default for ThresholdRange {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl From<[Option<f32>; 2]> for ThresholdRange {
    fn from([min, max]: [Option<f32>; 2]) -> Self {
        Self {
            min: min.unwrap_or(f32::NEG_INFINITY),
            max: max.unwrap_or(f32::INFINITY),
        }
    }
}

impl From<ThresholdRange> for [Option<f32>; 2] {
    fn from(range: ThresholdRange) -> Self {
        let finite = |v: f32| v.is_finite().then_some(v);
        [finite(range.min), finite(range.max)]
    }
}

/// Axis-aligned inclusive bounding volume used to discard projected points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThresholdBox {
    pub x: ThresholdRange,
    pub y: ThresholdRange,
    pub z: ThresholdRange,
}

impl ThresholdBox {
    pub fn new(x: ThresholdRange, y: ThresholdRange, z: ThresholdRange) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        self.x.contains(p.x) && self.y.contains(p.y) && self.z.contains(p.z)
    }
}

/// Everything a projection kernel needs besides the depth samples and the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    pub grid: DepthGrid,
    pub threshold: ThresholdBox,
    /// Multiplier from raw depth units into threshold-box units
    /// (1.0 keeps sensor units, 0.001 turns millimetres into metres).
    pub depth_scale: f32,
}

impl ProjectionParams {
    pub fn new(grid: DepthGrid, threshold: ThresholdBox, depth_scale: f32) -> Self {
        Self {
            grid,
            threshold,
            depth_scale,
        }
    }
}

/// Project one depth sample through its lookup entry.
///
/// Returns `(x, y, z, 1.0)` for a kept point and [`INVALID_POSITION`] when the
/// sample is a "no return" (0) or lands outside the threshold box.
#[inline]
pub fn project_sample(depth: u16, lut: LookupEntry, params: &ProjectionParams) -> [f32; 4] {
    if depth == 0 {
        return INVALID_POSITION;
    }
    let z = depth as f32 * params.depth_scale;
    let p = Vec3::new(lut.x * z, lut.y * z, z);
    if !params.threshold.contains(p) {
        return INVALID_POSITION;
    }
    [p.x, p.y, p.z, 1.0]
}

/// Sensor pose carried alongside the point cloud.
///
/// Configured but never applied to positions; consumers decide what to do
/// with it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub translation: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
}

impl Pose {
    pub fn new(translation: Vec3, rotation: Vec3) -> Self {
        Self {
            translation,
            rotation,
        }
    }
}

/// A colored point produced by fusing the position and color maps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub position: Vec3,
    /// RGBA8 color.
    pub color: [u8; 4],
}

impl Point {
    pub fn new(position: Vec3, color: [u8; 4]) -> Self {
        Self { position, color }
    }

    /// A white point at the given position.
    pub fn white(position: Vec3) -> Self {
        Self {
            position,
            color: [255; 4],
        }
    }
}
