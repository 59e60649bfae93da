//! SSP Data Crate
//!
//! GPU-agnostic data model for the sensor stream pipeline: the depth grid,
//! the per-pixel 2D to 3D lookup table, the threshold box and the position
//! and color maps produced every tick.

pub mod lut;
pub mod maps;
pub mod types;

pub use lut::{LookupEntry, LookupTable, ParsedLut, TableLoadError, parse_lookup_entries};
pub use maps::{ColorMap, INVALID_POSITION, PositionMap};
pub use types::{
    DataError, DepthGrid, Point, Pose, ProjectionParams, ThresholdBox, ThresholdRange,
    project_sample,
};
