use ssp_data::{ColorMap, DepthGrid};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("Color buffer has {actual} bytes, expected {expected} (RGBA8 on the depth grid)")]
    BufferSizeMismatch { expected: usize, actual: usize },
}

/// Builds a [`ColorMap`] aligned to the depth grid from raw RGBA8 bytes.
///
/// The color stream is expected to arrive already resized to the depth grid.
/// Any other length is rejected instead of being read misaligned.
#[derive(Debug, Clone, Copy)]
pub struct ColorComposer {
    grid: DepthGrid,
}

impl ColorComposer {
    pub fn new(grid: DepthGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> DepthGrid {
        self.grid
    }

    /// Copy `samples` into a new color map.
    pub fn compose(&self, samples: &[u8]) -> Result<ColorMap, ComposeError> {
        let expected = self.grid.color_frame_len();
        if samples.len() != expected {
            return Err(ComposeError::BufferSizeMismatch {
                expected,
                actual: samples.len(),
            });
        }
        ColorMap::from_rgba(self.grid, samples.to_vec()).map_err(|_| {
            ComposeError::BufferSizeMismatch {
                expected,
                actual: samples.len(),
            }
        })
    }
}
