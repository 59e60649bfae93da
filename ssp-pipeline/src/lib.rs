//! SSP Pipeline Crate
//!
//! Turns raw depth and color frames from a sensor stream into a colored point
//! cloud, one tick at a time.
//!
//! ## Modules
//!
//! - [`projector`]: depth to position kernels (CPU reference and GPU)
//! - [`composer`]: color map composition
//! - [`sink`]: the point cloud consumer interface and in-memory sink
//! - [`config`]: JSON configuration
//! - [`pipeline`]: the `FramePipeline` state machine

pub mod composer;
pub mod config;
pub mod pipeline;
pub mod projector;
pub mod sink;

pub use composer::{ColorComposer, ComposeError};
pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{FramePipeline, PipelineState, PipelineStats, SetupError, TickOutcome};
pub use projector::{CpuDepthProjector, KernelError, ProjectionKernel};
pub use sink::{PointCloud, PointCloudSink};
