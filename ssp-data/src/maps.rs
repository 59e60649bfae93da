//! Per-pixel output maps published to the point cloud sink.

use glam::Vec3;
use image::RgbaImage;

use crate::types::{DataError, DepthGrid};

/// Sentinel written for pixels without a usable 3D position.
///
/// The `w` channel is the validity flag: 1.0 for kept points, 0.0 otherwise.
pub const INVALID_POSITION: [f32; 4] = [f32::NAN, f32::NAN, f32::NAN, 0.0];

/// One 3D point (or the invalid sentinel) per depth pixel.
///
/// Same layout as the RGBA32F position texture consumed by point cloud
/// renderers: `(x, y, z, valid)`.
#[derive(Debug, Clone)]
pub struct PositionMap {
    grid: DepthGrid,
    positions: Vec<[f32; 4]>,
}

impl PositionMap {
    /// A map where every pixel is invalid.
    pub fn invalid(grid: DepthGrid) -> Self {
        Self {
            grid,
            positions: vec![INVALID_POSITION; grid.pixel_count()],
        }
    }

    pub fn from_raw(grid: DepthGrid, positions: Vec<[f32; 4]>) -> Result<Self, DataError> {
        if positions.len() != grid.pixel_count() {
            return Err(DataError::SizeMismatch {
                expected: grid.pixel_count(),
                actual: positions.len(),
            });
        }
        Ok(Self { grid, positions })
    }

    /// Rebuild a map from tightly packed `vec4<f32>` bytes (GPU readback).
    pub fn from_bytes(grid: DepthGrid, bytes: &[u8]) -> Result<Self, DataError> {
        let expected = grid.pixel_count() * std::mem::size_of::<[f32; 4]>();
        if bytes.len() != expected {
            return Err(DataError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let positions = bytes
            .chunks_exact(std::mem::size_of::<[f32; 4]>())
            .map(bytemuck::pod_read_unaligned::<[f32; 4]>)
            .collect();
        Ok(Self { grid, positions })
    }

    pub fn grid(&self) -> DepthGrid {
        self.grid
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn raw(&self) -> &[[f32; 4]] {
        &self.positions
    }

    pub fn raw_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.positions
    }

    /// Byte view, stable for bit-exact comparisons (NaN included).
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.positions
            .get(index)
            .is_some_and(|p| p[3] != 0.0)
    }

    /// Position of a kept pixel, `None` for invalid or out-of-range indices.
    pub fn position(&self, index: usize) -> Option<Vec3> {
        let p = self.positions.get(index)?;
        (p[3] != 0.0).then(|| Vec3::new(p[0], p[1], p[2]))
    }

    pub fn valid_count(&self) -> usize {
        self.positions.iter().filter(|p| p[3] != 0.0).count()
    }
}

/// One RGBA8 color per pixel, aligned to the depth grid.
#[derive(Debug, Clone)]
pub struct ColorMap {
    image: RgbaImage,
}

impl ColorMap {
    /// Wrap raw RGBA8 bytes. Fails unless `bytes.len() == width * height * 4`.
    pub fn from_rgba(grid: DepthGrid, bytes: Vec<u8>) -> Result<Self, DataError> {
        let expected = grid.color_frame_len();
        let actual = bytes.len();
        RgbaImage::from_raw(grid.width, grid.height, bytes)
            .filter(|_| actual == expected)
            .map(|image| Self { image })
            .ok_or(DataError::SizeMismatch { expected, actual })
    }

    pub fn grid(&self) -> DepthGrid {
        DepthGrid::new(self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Color of the pixel at linear index `index` (row-major).
    pub fn pixel(&self, index: usize) -> Option<[u8; 4]> {
        let offset = index.checked_mul(4)?;
        let bytes = self.image.as_raw().get(offset..offset.checked_add(4)?)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_map_has_no_points() {
        let map = PositionMap::invalid(DepthGrid::new(4, 4));
        assert_eq!(map.len(), 16);
        assert_eq!(map.valid_count(), 0);
        assert_eq!(map.position(0), None);
        assert!(!map.is_valid(99));
    }

    #[test]
    fn test_position_lookup() {
        let grid = DepthGrid::new(2, 1);
        let map = PositionMap::from_raw(grid, vec![[1.0, 2.0, 3.0, 1.0], INVALID_POSITION])
            .unwrap();
        assert_eq!(map.position(0), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert!(map.is_valid(0));
        assert!(!map.is_valid(1));
        assert_eq!(map.valid_count(), 1);
    }

    #[test]
    fn test_position_map_size_checked() {
        let err = PositionMap::from_raw(DepthGrid::new(2, 2), vec![INVALID_POSITION; 3]);
        assert_eq!(
            err.unwrap_err(),
            DataError::SizeMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_bytes_round_trip_keeps_sentinel() {
        let grid = DepthGrid::new(2, 1);
        let map = PositionMap::from_raw(grid, vec![[1.0, 2.0, 3.0, 1.0], INVALID_POSITION])
            .unwrap();
        let copy = PositionMap::from_bytes(grid, map.as_bytes()).unwrap();
        assert_eq!(copy.as_bytes(), map.as_bytes());
    }

    #[test]
    fn test_color_map_requires_exact_length() {
        let grid = DepthGrid::new(2, 2);
        assert!(ColorMap::from_rgba(grid, vec![0; 16]).is_ok());
        assert_eq!(
            ColorMap::from_rgba(grid, vec![0; 20]).unwrap_err(),
            DataError::SizeMismatch {
                expected: 16,
                actual: 20
            }
        );
        assert!(ColorMap::from_rgba(grid, vec![0; 12]).is_err());
    }

    #[test]
    fn test_color_pixel_access() {
        let grid = DepthGrid::new(2, 1);
        let map = ColorMap::from_rgba(grid, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(map.pixel(1), Some([5, 6, 7, 8]));
        assert_eq!(map.pixel(2), None);
        assert_eq!(map.pixel(usize::MAX / 4), None);
        assert_eq!(map.pixel(usize::MAX), None);
    }
}
