//! Depth projection kernels.

use ssp_data::{DataError, DepthGrid, LookupTable, PositionMap, ProjectionParams, project_sample};
use ssp_gpu::{GpuDepthProjector, GpuError, GpuPositionMap};
use std::num::NonZeroUsize;
use std::thread;

/// Errors raised by a kernel for a single dispatch.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("Kernel input rejected: {0}")]
    Data(#[from] DataError),
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Parallel transform from depth samples to a position map.
///
/// Every pixel is independent. Implementations may split the work however
/// they like and may return before the output is complete, as long as the
/// output handle stays valid for the consumer.
pub trait ProjectionKernel {
    /// What a dispatch hands to the sink.
    type Output;

    /// Project one depth frame. `depth` holds one sample per grid pixel.
    fn dispatch(
        &mut self,
        depth: &[u16],
        params: &ProjectionParams,
    ) -> Result<Self::Output, KernelError>;

    /// Block until every earlier dispatch has finished.
    fn wait_idle(&mut self) -> Result<(), KernelError>;
}

/// Reference kernel on the host. Rows are split across scoped worker threads;
/// the dispatch completes before it returns.
pub struct CpuDepthProjector {
    lut: LookupTable,
    workers: usize,
}

impl CpuDepthProjector {
    pub fn new(lut: LookupTable) -> Self {
        let workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self { lut, workers }
    }

    /// Cap the number of worker threads (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn grid(&self) -> DepthGrid {
        self.lut.grid()
    }

    pub fn lookup_table(&self) -> &LookupTable {
        &self.lut
    }
}

impl ProjectionKernel for CpuDepthProjector {
    type Output = PositionMap;

    fn dispatch(
        &mut self,
        depth: &[u16],
        params: &ProjectionParams,
    ) -> Result<PositionMap, KernelError> {
        let grid = self.lut.grid();
        if params.grid != grid || depth.len() != grid.pixel_count() {
            return Err(DataError::SizeMismatch {
                expected: grid.pixel_count(),
                actual: depth.len(),
            }
            .into());
        }

        let mut map = PositionMap::invalid(grid);
        let width = grid.width as usize;
        let rows_per_worker = (grid.height as usize).div_ceil(self.workers).max(1);
        let chunk = (rows_per_worker * width).max(1);

        thread::scope(|scope| {
            for ((out, samples), lut) in map
                .raw_mut()
                .chunks_mut(chunk)
                .zip(depth.chunks(chunk))
                .zip(self.lut.entries().chunks(chunk))
            {
                scope.spawn(move || {
                    for ((p, &d), &entry) in out.iter_mut().zip(samples).zip(lut) {
                        *p = project_sample(d, entry, params);
                    }
                });
            }
        });

        Ok(map)
    }

    fn wait_idle(&mut self) -> Result<(), KernelError> {
        Ok(())
    }
}

impl ProjectionKernel for GpuDepthProjector {
    type Output = GpuPositionMap;

    fn dispatch(
        &mut self,
        depth: &[u16],
        params: &ProjectionParams,
    ) -> Result<GpuPositionMap, KernelError> {
        Ok(GpuDepthProjector::dispatch(self, depth, params)?)
    }

    fn wait_idle(&mut self) -> Result<(), KernelError> {
        Ok(GpuDepthProjector::wait_idle(self)?)
    }
}
