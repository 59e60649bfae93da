//! Pipeline configuration.
//!
//! Keys are PascalCase in JSON and every key is optional:
//!
//! ```json
//! {
//!     "Host": "192.168.1.20",
//!     "HostPort": 9999,
//!     "LutName": "NFOV_UNBINNED",
//!     "ThresholdZ": [500.0, 3000.0],
//!     "ThresholdX": [null, 1500.0],
//!     "DebugLog": false
//! }
//! ```

use glam::Vec3;
use serde::{Deserialize, Serialize};
use ssp_capture::Endpoint;
use ssp_data::{DepthGrid, Pose, ProjectionParams, ThresholdBox, ThresholdRange};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Threshold{axis} has min {min} greater than max {max}")]
    InvalidThreshold { axis: char, min: f32, max: f32 },
    #[error("DepthScale must be finite and positive, got {0}")]
    InvalidDepthScale(f32),
    #[error("Depth grid must be non-empty (got {width}x{height})")]
    EmptyGrid { width: u32, height: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PipelineConfig {
    pub host: String,
    pub host_port: u16,
    pub poll_timeout_ms: u64,
    /// Lookup table asset name, without the `.txt` extension.
    pub lut_name: String,
    pub lut_directory: PathBuf,
    pub depth_width: u32,
    pub depth_height: u32,
    /// Raw depth units to threshold units (1.0 keeps sensor millimetres).
    pub depth_scale: f32,
    pub threshold_x: ThresholdRange,
    pub threshold_y: ThresholdRange,
    pub threshold_z: ThresholdRange,
    /// Passed to the sink as part of the pose; never applied to positions.
    pub translation: Vec3,
    /// Euler angles in degrees, pass-through like `translation`.
    pub rotation: Vec3,
    /// Per-tick progress logging.
    pub debug_log: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let grid = DepthGrid::default();
        Self {
            host: "localhost".to_string(),
            host_port: 9999,
            poll_timeout_ms: 1,
            lut_name: "NFOV_UNBINNED".to_string(),
            lut_directory: PathBuf::from("luts"),
            depth_width: grid.width,
            depth_height: grid.height,
            depth_scale: 1.0,
            threshold_x: ThresholdRange::UNBOUNDED,
            threshold_y: ThresholdRange::UNBOUNDED,
            threshold_z: ThresholdRange::UNBOUNDED,
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            debug_log: true,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&source)
    }

    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, range) in [
            ('X', self.threshold_x),
            ('Y', self.threshold_y),
            ('Z', self.threshold_z),
        ] {
            if !range.is_ordered() {
                return Err(ConfigError::InvalidThreshold {
                    axis,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        if !(self.depth_scale.is_finite() && self.depth_scale > 0.0) {
            return Err(ConfigError::InvalidDepthScale(self.depth_scale));
        }
        if self.grid().validate().is_err() {
            return Err(ConfigError::EmptyGrid {
                width: self.depth_width,
                height: self.depth_height,
            });
        }
        Ok(())
    }

    pub fn grid(&self) -> DepthGrid {
        DepthGrid::new(self.depth_width, self.depth_height)
    }

    pub fn threshold(&self) -> ThresholdBox {
        ThresholdBox::new(self.threshold_x, self.threshold_y, self.threshold_z)
    }

    pub fn projection_params(&self) -> ProjectionParams {
        ProjectionParams::new(self.grid(), self.threshold(), self.depth_scale)
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.translation, self.rotation)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(
            self.host.clone(),
            self.host_port,
            Duration::from_millis(self.poll_timeout_ms),
        )
    }

    /// `<LutDirectory>/<LutName>.txt`
    pub fn lut_path(&self) -> PathBuf {
        self.lut_directory.join(format!("{}.txt", self.lut_name))
    }
}
