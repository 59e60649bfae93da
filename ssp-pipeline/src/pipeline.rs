//! Tick-driven frame pipeline.
//!
//! ```text
//! Uninitialized --init--> Ready --start--> Running --shutdown--> Closed
//! ```
//!
//! A failed `init` or `start` leaves the pipeline in `Ready` for good: the
//! fault is logged once and every later tick is a no-op.

use crate::composer::{ColorComposer, ComposeError};
use crate::config::PipelineConfig;
use crate::projector::{KernelError, ProjectionKernel};
use crate::sink::PointCloudSink;
use ssp_capture::{CaptureError, FrameSource};
use ssp_data::{
    DataError, DepthGrid, LookupTable, ProjectionParams, TableLoadError, ThresholdBox,
};
use std::path::Path;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Running,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Lookup table error: {0}")]
    Table(#[from] TableLoadError),
    #[error("Projection kernel unavailable: {0}")]
    Kernel(#[from] KernelError),
    #[error("Frame source error: {0}")]
    Connection(#[from] CaptureError),
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },
    #[error("Pipeline is inert after an earlier setup failure: {0}")]
    Faulted(String),
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The pipeline is not running.
    Inactive,
    /// The source had nothing new.
    NoFrame,
    /// A frame was consumed; flags say which maps were published.
    Processed { depth: bool, color: bool },
}

/// Counters for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub ticks: u64,
    pub empty_polls: u64,
    pub depth_dispatches: u64,
    pub color_compositions: u64,
    pub depth_abandoned: u64,
    pub color_abandoned: u64,
}

/// Orchestrates poll, projection, composition and publishing.
///
/// Generic over the frame source `S`, the projection kernel `K` and the sink
/// `T` receiving `K::Output`.
pub struct FramePipeline<S, K, T> {
    state: PipelineState,
    setup_fault: Option<String>,
    // Field order matters on drop: the source is released before the kernel.
    source: Option<S>,
    kernel: Option<K>,
    composer: ColorComposer,
    sink: T,
    params: ProjectionParams,
    debug_log: bool,
    depth_staging: Vec<u16>,
    stats: PipelineStats,
}

impl<S, K, T> FramePipeline<S, K, T>
where
    S: FrameSource,
    K: ProjectionKernel,
    T: PointCloudSink<K::Output>,
{
    pub fn new(params: ProjectionParams, sink: T) -> Self {
        Self {
            state: PipelineState::Uninitialized,
            setup_fault: None,
            source: None,
            kernel: None,
            composer: ColorComposer::new(params.grid),
            sink,
            params,
            debug_log: true,
            depth_staging: Vec::with_capacity(params.grid.pixel_count()),
            stats: PipelineStats::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig, sink: T) -> Self {
        Self::new(config.projection_params(), sink).with_debug_log(config.debug_log)
    }

    /// Toggle per-tick progress logging.
    pub fn with_debug_log(mut self, enabled: bool) -> Self {
        self.debug_log = enabled;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The setup failure that made this pipeline inert, if any.
    pub fn setup_fault(&self) -> Option<&str> {
        self.setup_fault.as_deref()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn params(&self) -> &ProjectionParams {
        &self.params
    }

    pub fn grid(&self) -> DepthGrid {
        self.params.grid
    }

    /// Takes effect from the next tick.
    pub fn set_threshold(&mut self, threshold: ThresholdBox) {
        self.params.threshold = threshold;
    }

    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    pub fn kernel(&self) -> Option<&K> {
        self.kernel.as_ref()
    }

    pub fn sink(&self) -> &T {
        &self.sink
    }

    pub fn into_sink(self) -> T {
        self.sink
    }

    /// Parse the lookup table text and create the kernel around it.
    pub fn init<F>(&mut self, lut_source: &str, make_kernel: F) -> Result<(), SetupError>
    where
        F: FnOnce(LookupTable) -> Result<K, KernelError>,
    {
        self.check_state("init", PipelineState::Uninitialized)?;
        let table = LookupTable::load(lut_source, self.params.grid);
        self.install(table, make_kernel)
    }

    /// Like [`init`](Self::init), reading the table from a text asset.
    pub fn init_from_path<P, F>(&mut self, lut_path: P, make_kernel: F) -> Result<(), SetupError>
    where
        P: AsRef<Path>,
        F: FnOnce(LookupTable) -> Result<K, KernelError>,
    {
        self.check_state("init", PipelineState::Uninitialized)?;
        let table = LookupTable::from_path(lut_path, self.params.grid);
        self.install(table, make_kernel)
    }

    #[tracing::instrument(skip_all, fields(width = self.params.grid.width, height = self.params.grid.height))]
    fn install<F>(
        &mut self,
        table: Result<LookupTable, TableLoadError>,
        make_kernel: F,
    ) -> Result<(), SetupError>
    where
        F: FnOnce(LookupTable) -> Result<K, KernelError>,
    {
        // Whatever happens next, the pipeline has left Uninitialized.
        self.state = PipelineState::Ready;

        let kernel = table
            .map_err(SetupError::from)
            .and_then(|table| make_kernel(table).map_err(SetupError::from));
        match kernel {
            Ok(kernel) => {
                self.kernel = Some(kernel);
                info!("Pipeline ready");
                Ok(())
            }
            Err(e) => Err(self.fault(e)),
        }
    }

    /// Connect the frame source and enter `Running`.
    pub fn start<C>(&mut self, connect: C) -> Result<(), SetupError>
    where
        C: FnOnce() -> Result<S, CaptureError>,
    {
        self.check_state("start", PipelineState::Ready)?;
        match connect() {
            Ok(source) => {
                self.source = Some(source);
                self.state = PipelineState::Running;
                info!("Pipeline running");
                Ok(())
            }
            Err(e) => Err(self.fault(e.into())),
        }
    }

    /// Run one poll/process/publish cycle.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != PipelineState::Running {
            return TickOutcome::Inactive;
        }
        let (Some(source), Some(kernel)) = (self.source.as_mut(), self.kernel.as_mut()) else {
            return TickOutcome::Inactive;
        };

        self.stats.ticks += 1;
        let Some(frame) = source.poll() else {
            self.stats.empty_polls += 1;
            return TickOutcome::NoFrame;
        };
        if frame.is_empty() {
            self.stats.empty_polls += 1;
            return TickOutcome::NoFrame;
        }

        if self.debug_log {
            debug!(
                depth = frame.depth.is_some(),
                color = frame.color.is_some(),
                "Updating maps"
            );
        }

        let mut depth_published = false;
        if let Some(bytes) = frame.depth {
            let projected = decode_depth(bytes, self.params.grid, &mut self.depth_staging)
                .map_err(KernelError::from)
                .and_then(|()| kernel.dispatch(&self.depth_staging, &self.params));
            match projected {
                Ok(map) => {
                    self.sink.set_position_map(map);
                    self.stats.depth_dispatches += 1;
                    depth_published = true;
                    if self.debug_log {
                        debug!("Set depth");
                    }
                }
                Err(e) => {
                    self.stats.depth_abandoned += 1;
                    warn!(error = %e, "Depth branch abandoned for this tick");
                }
            }
        }

        let mut color_published = false;
        if let Some(bytes) = frame.color {
            match self.composer.compose(bytes) {
                Ok(map) => {
                    self.sink.set_color_map(map);
                    self.stats.color_compositions += 1;
                    color_published = true;
                    if self.debug_log {
                        debug!("Set colour");
                    }
                }
                Err(e @ ComposeError::BufferSizeMismatch { .. }) => {
                    self.stats.color_abandoned += 1;
                    warn!(error = %e, "Color branch abandoned for this tick");
                }
            }
        }

        TickOutcome::Processed {
            depth: depth_published,
            color: color_published,
        }
    }

    /// Close the source, then wait for in-flight dispatches, then release the
    /// kernel. Idempotent; the pipeline ends `Closed` from any state.
    pub fn shutdown(&mut self) -> Result<(), KernelError> {
        if self.state == PipelineState::Closed {
            return Ok(());
        }

        if let Some(mut source) = self.source.take() {
            source.close();
        }
        let waited = match self.kernel.as_mut() {
            Some(kernel) => kernel.wait_idle(),
            None => Ok(()),
        };
        self.kernel = None;
        self.state = PipelineState::Closed;

        info!(
            ticks = self.stats.ticks,
            depth_dispatches = self.stats.depth_dispatches,
            color_compositions = self.stats.color_compositions,
            "Pipeline closed"
        );
        waited
    }

    fn check_state(
        &self,
        operation: &'static str,
        expected: PipelineState,
    ) -> Result<(), SetupError> {
        if let Some(fault) = &self.setup_fault {
            return Err(SetupError::Faulted(fault.clone()));
        }
        if self.state != expected {
            return Err(SetupError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Record a setup failure. Only the first one is logged.
    fn fault(&mut self, e: SetupError) -> SetupError {
        if self.setup_fault.is_none() {
            error!(error = %e, "Pipeline setup failed, staying inert");
            self.setup_fault = Some(e.to_string());
        }
        e
    }
}

/// Copy little-endian u16 samples out of the source-owned buffer.
fn decode_depth(bytes: &[u8], grid: DepthGrid, staging: &mut Vec<u16>) -> Result<(), DataError> {
    if bytes.len() != grid.depth_frame_len() {
        return Err(DataError::SizeMismatch {
            expected: grid.depth_frame_len(),
            actual: bytes.len(),
        });
    }
    staging.clear();
    staging.extend(
        bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]])),
    );
    Ok(())
}
