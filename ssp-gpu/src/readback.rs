//! Blocking GPU to host copies.

use crate::GpuError;
use crate::builder::{BufferBuilder, BufferUsage};
use std::sync::mpsc;

/// Copy the whole of `source` into host memory. Blocks until the copy lands.
///
/// `source` needs `COPY_SRC` usage. A fresh staging buffer is used for each
/// call, so this is for inspection and tests rather than per-frame work.
pub fn read_buffer(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
) -> Result<Vec<u8>, GpuError> {
    let size = source.size();
    let staging = BufferBuilder::new(device)
        .label("readback_staging")
        .size(size)
        .usage(BufferUsage::Readback)
        .build()?;

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback_encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    device.poll(wgpu::PollType::wait_indefinitely())?;

    receiver
        .recv()
        .map_err(|_| GpuError::MapCallbackDropped)??;

    let data = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(data)
}
