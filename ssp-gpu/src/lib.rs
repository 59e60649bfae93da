//! SSP GPU Crate
//!
//! wgpu plumbing for the depth projection kernel: headless device bootstrap,
//! buffer and pipeline builders, the embedded WGSL kernel and the
//! double-buffered [`GpuDepthProjector`].

use std::sync::Arc;
use tracing::info;

pub use wgpu;

pub mod builder;
pub mod pipeline;
pub mod projection;
pub mod readback;
pub mod shaders;

pub use builder::{
    BindGroupBuildError, BindGroupLayoutBuilder, BindingType, BufferBuildError, BufferBuilder,
    BufferUsage,
};
pub use pipeline::{ComputePipelineBuilder, PipelineBuildError};
pub use projection::{GpuDepthProjector, GpuPositionMap, ProjectionUniforms};
pub use readback::read_buffer;

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("Request Adapter Error: {0}")]
    RequestAdapterError(#[from] wgpu::RequestAdapterError),
    #[error("Request Device Error: {0}")]
    RequestDeviceError(#[from] wgpu::RequestDeviceError),
    #[error("Buffer map error: {0}")]
    BufferMapError(#[from] wgpu::BufferAsyncError),
    #[error("Device poll error: {0}")]
    PollError(#[from] wgpu::PollError),
    #[error("Buffer build error: {0}")]
    BufferBuildError(#[from] BufferBuildError),
    #[error("Bind group build error: {0}")]
    BindGroupBuildError(#[from] BindGroupBuildError),
    #[error("Pipeline build error: {0}")]
    PipelineBuildError(#[from] PipelineBuildError),
    #[error("Data error: {0}")]
    DataError(#[from] ssp_data::DataError),
    #[error("Buffer mapping callback was dropped")]
    MapCallbackDropped,
}

/// Headless device + queue shared by compute kernels and readers.
#[derive(Clone)]
pub struct GpuContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    pub async fn new(label: &str) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::from_env_or_default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                ..Default::default()
            })
            .await?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                ..Default::default()
            })
            .await?;

        let adapter_info = adapter.get_info();
        info!(
            adapter_name = %adapter_info.name,
            adapter_backend = ?adapter_info.backend,
            "GPU device created for {}",
            label
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
        })
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Start building a buffer on this device.
    pub fn create_buffer(&self) -> BufferBuilder<'_> {
        BufferBuilder::new(&self.device)
    }

    /// Block until all submitted work has finished.
    pub fn wait_idle(&self) -> Result<(), GpuError> {
        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::GpuContext;
    use pollster::FutureExt;

    /// A device for GPU tests, or `None` on machines without an adapter.
    pub(crate) fn test_context() -> Option<GpuContext> {
        match GpuContext::new("ssp_gpu_test").block_on() {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                eprintln!("Skipping GPU test: {}", e);
                None
            }
        }
    }
}
