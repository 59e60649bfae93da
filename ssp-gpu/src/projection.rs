//! GPU depth projection kernel.
//!
//! Owns every device resource the kernel needs. Output positions alternate
//! between two buffers so a dispatch never writes the buffer handed out by
//! the previous one.

use crate::builder::{BindGroupLayoutBuilder, BindingType, BufferBuilder, BufferUsage};
use crate::pipeline::ComputePipelineBuilder;
use crate::readback::read_buffer;
use crate::{GpuContext, GpuError, shaders};
use ssp_data::{DataError, DepthGrid, LookupTable, PositionMap, ProjectionParams};
use std::sync::Arc;
use tracing::{info, trace};

const OUTPUT_SLOTS: usize = 2;

/// Uniform block of the depth transfer kernel. Layout matches `Params` in
/// `depth_transfer.wgsl` (48 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ProjectionUniforms {
    pub width: u32,
    pub height: u32,
    pub depth_scale: f32,
    /// Bit pattern of the NaN written into invalid positions.
    pub invalid_bits: u32,
    pub threshold_x: [f32; 2],
    pub threshold_y: [f32; 2],
    pub threshold_z: [f32; 2],
    _padding: [f32; 2],
}

impl ProjectionUniforms {
    /// Unbounded threshold sides are uploaded as infinities, so a coordinate
    /// that overflows to infinity still passes an open side.
    pub fn from_params(params: &ProjectionParams) -> Self {
        let range = |r: ssp_data::ThresholdRange| [r.min, r.max];
        Self {
            width: params.grid.width,
            height: params.grid.height,
            depth_scale: params.depth_scale,
            invalid_bits: f32::NAN.to_bits(),
            threshold_x: range(params.threshold.x),
            threshold_y: range(params.threshold.y),
            threshold_z: range(params.threshold.z),
            _padding: [0.0; 2],
        }
    }
}

struct OutputSlot {
    positions: Arc<wgpu::Buffer>,
    bind_group: wgpu::BindGroup,
}

/// Positions written by one dispatch, still resident on the device.
///
/// The buffer is rewritten two dispatches later; read it back before then.
#[derive(Debug, Clone)]
pub struct GpuPositionMap {
    buffer: Arc<wgpu::Buffer>,
    grid: DepthGrid,
    slot: usize,
}

impl GpuPositionMap {
    /// `vec4<f32>` per pixel, usable as a storage binding by renderers.
    pub fn buffer(&self) -> &Arc<wgpu::Buffer> {
        &self.buffer
    }

    pub fn grid(&self) -> DepthGrid {
        self.grid
    }

    /// Which of the double-buffered outputs holds this map.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Copy the positions back to the host. Blocks on the device.
    pub fn read_back(&self, ctx: &GpuContext) -> Result<PositionMap, GpuError> {
        let bytes = read_buffer(ctx.device(), ctx.queue(), &self.buffer)?;
        Ok(PositionMap::from_bytes(self.grid, &bytes)?)
    }
}

/// Depth to position projection on the GPU.
pub struct GpuDepthProjector {
    ctx: GpuContext,
    grid: DepthGrid,
    pipeline: wgpu::ComputePipeline,
    uniform_buffer: wgpu::Buffer,
    depth_buffer: wgpu::Buffer,
    _lut_buffer: wgpu::Buffer,
    slots: Vec<OutputSlot>,
    next_slot: usize,
    upload: Vec<u8>,
    dispatches: u64,
}

impl GpuDepthProjector {
    /// Upload the lookup table and allocate all per-grid resources.
    pub fn new(ctx: &GpuContext, lut: &LookupTable) -> Result<Self, GpuError> {
        let grid = lut.grid();
        grid.validate()?;
        let device = ctx.device();
        let pixel_count = grid.pixel_count() as u64;

        let layout = BindGroupLayoutBuilder::new(device)
            .label("depth_transfer_layout")
            .buffer(0, BindingType::Uniform)
            .buffer(1, BindingType::StorageRead)
            .buffer(2, BindingType::StorageRead)
            .buffer(3, BindingType::StorageWrite)
            .build()?;

        let pipeline = ComputePipelineBuilder::new(device)
            .with_label("depth_transfer_pipeline")
            .with_shader(shaders::DEPTH_TRANSFER)
            .with_entry_point(shaders::DEPTH_TRANSFER_ENTRY)
            .with_bind_group_layout(&layout)
            .build()?;

        let uniform_buffer = BufferBuilder::new(device)
            .label("depth_transfer_params")
            .size(std::mem::size_of::<ProjectionUniforms>() as u64)
            .usage(BufferUsage::Uniform)
            .build()?;

        let lut_buffer = BufferBuilder::new(device)
            .label("depth_transfer_lut")
            .with_pod_data(lut.entries())
            .usage(BufferUsage::Storage { read_only: true })
            .build()?;

        // Two u16 samples per u32 word.
        let depth_buffer = BufferBuilder::new(device)
            .label("depth_transfer_depth")
            .size(pixel_count.div_ceil(2) * 4)
            .usage(BufferUsage::Storage { read_only: true })
            .build()?;

        let mut slots = Vec::with_capacity(OUTPUT_SLOTS);
        for index in 0..OUTPUT_SLOTS {
            let positions = BufferBuilder::new(device)
                .label(format!("depth_transfer_positions_{}", index))
                .size(pixel_count * std::mem::size_of::<[f32; 4]>() as u64)
                .usage(BufferUsage::Storage { read_only: false })
                .build()?;

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("depth_transfer_bind_group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: lut_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: depth_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: positions.as_entire_binding(),
                    },
                ],
            });

            slots.push(OutputSlot {
                positions: Arc::new(positions),
                bind_group,
            });
        }

        info!(
            width = grid.width,
            height = grid.height,
            adapter = %ctx.adapter_info().name,
            "GPU depth projector ready"
        );

        Ok(Self {
            ctx: ctx.clone(),
            grid,
            pipeline,
            uniform_buffer,
            depth_buffer,
            _lut_buffer: lut_buffer,
            slots,
            next_slot: 0,
            upload: Vec::with_capacity(grid.depth_frame_len() + 2),
            dispatches: 0,
        })
    }

    pub fn grid(&self) -> DepthGrid {
        self.grid
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Number of dispatches submitted so far.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// Submit one projection. Returns as soon as the work is queued.
    pub fn dispatch(
        &mut self,
        depth: &[u16],
        params: &ProjectionParams,
    ) -> Result<GpuPositionMap, GpuError> {
        let expected = self.grid.pixel_count();
        if params.grid != self.grid || depth.len() != expected {
            return Err(DataError::SizeMismatch {
                expected,
                actual: depth.len(),
            }
            .into());
        }

        self.upload.clear();
        self.upload.extend(depth.iter().flat_map(|d| d.to_le_bytes()));
        self.upload.resize(self.depth_buffer.size() as usize, 0);

        let uniforms = ProjectionUniforms::from_params(params);
        let queue = self.ctx.queue();
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        queue.write_buffer(&self.depth_buffer, 0, &self.upload);

        let slot_index = self.next_slot;
        let slot = &self.slots[slot_index];
        let (groups_x, groups_y) = workgroup_grid(
            expected as u32,
            self.ctx.device().limits().max_compute_workgroups_per_dimension,
        );

        let mut encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("depth_transfer_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("depth_transfer_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &slot.bind_group, &[]);
            pass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        queue.submit(std::iter::once(encoder.finish()));

        self.next_slot = (self.next_slot + 1) % self.slots.len();
        self.dispatches += 1;
        trace!(slot = slot_index, groups_x, groups_y, "Depth transfer submitted");

        Ok(GpuPositionMap {
            buffer: slot.positions.clone(),
            grid: self.grid,
            slot: slot_index,
        })
    }

    /// Block until every submitted dispatch has completed.
    pub fn wait_idle(&self) -> Result<(), GpuError> {
        self.ctx.wait_idle()
    }
}

/// Workgroup counts covering `invocations`, folded into a second dimension
/// once the first exceeds `max_per_dimension`.
fn workgroup_grid(invocations: u32, max_per_dimension: u32) -> (u32, u32) {
    let groups = invocations.div_ceil(shaders::DEPTH_TRANSFER_WORKGROUP_SIZE).max(1);
    if groups <= max_per_dimension {
        (groups, 1)
    } else {
        (max_per_dimension, groups.div_ceil(max_per_dimension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;
    use ssp_data::{LookupEntry, ThresholdBox, ThresholdRange, project_sample};

    fn ramp_table(grid: DepthGrid) -> LookupTable {
        let entries = (0..grid.pixel_count())
            .map(|i| LookupEntry::new(i as f32 * 0.001 - 0.004, 0.002 - i as f32 * 0.0005))
            .collect();
        LookupTable::new(grid, entries).unwrap()
    }

    fn assert_matches_cpu(
        gpu: &PositionMap,
        depth: &[u16],
        lut: &LookupTable,
        params: &ProjectionParams,
    ) {
        for (i, (&d, &entry)) in depth.iter().zip(lut.entries()).enumerate() {
            let expected = project_sample(d, entry, params);
            let actual = gpu.raw()[i];
            assert_eq!(actual[3], expected[3], "validity of pixel {}", i);
            if expected[3] == 0.0 {
                assert!(actual[0].is_nan(), "pixel {} should carry NaN", i);
            } else {
                for axis in 0..3 {
                    if expected[axis].is_infinite() {
                        assert_eq!(actual[axis], expected[axis], "pixel {} axis {}", i, axis);
                        continue;
                    }
                    assert!(
                        (actual[axis] - expected[axis]).abs() <= 1e-4 * expected[axis].abs().max(1.0),
                        "pixel {} axis {}: {} vs {}",
                        i,
                        axis,
                        actual[axis],
                        expected[axis]
                    );
                }
            }
        }
    }

    #[test]
    fn test_uniforms_layout() {
        assert_eq!(std::mem::size_of::<ProjectionUniforms>(), 48);

        let params = ProjectionParams::new(DepthGrid::new(4, 4), ThresholdBox::default(), 0.001);
        let uniforms = ProjectionUniforms::from_params(&params);
        assert_eq!(uniforms.threshold_z, [f32::NEG_INFINITY, f32::INFINITY]);
        assert!(f32::from_bits(uniforms.invalid_bits).is_nan());
    }

    #[test]
    fn test_workgroup_grid_folds_large_dispatches() {
        assert_eq!(workgroup_grid(16, 65535), (1, 1));
        assert_eq!(workgroup_grid(368_640, 65535), (5760, 1));
        assert_eq!(workgroup_grid(64 * 70_000, 65535), (65535, 2));
    }

    #[test]
    fn test_reference_scenario() {
        let Some(ctx) = test_context() else { return };

        let grid = DepthGrid::new(4, 4);
        let lut = LookupTable::new(grid, vec![LookupEntry::new(0.001, 0.002); 16]).unwrap();
        let mut projector = GpuDepthProjector::new(&ctx, &lut).unwrap();

        let mut depth = vec![0u16; 16];
        depth[5] = 1000;
        let params = ProjectionParams::new(grid, ThresholdBox::default(), 1.0);

        let map = projector.dispatch(&depth, &params).unwrap();
        let positions = map.read_back(&ctx).unwrap();
        assert_eq!(positions.raw()[5], [1.0, 2.0, 1000.0, 1.0]);
        assert_eq!(positions.valid_count(), 1);
    }

    #[test]
    fn test_matches_cpu_with_thresholds_and_odd_grid() {
        let Some(ctx) = test_context() else { return };

        let grid = DepthGrid::new(5, 3);
        let lut = ramp_table(grid);
        let mut projector = GpuDepthProjector::new(&ctx, &lut).unwrap();

        let depth: Vec<u16> = (0..15).map(|i| (i * 137 % 2000) as u16).collect();
        let threshold = ThresholdBox::new(
            ThresholdRange::new(-1.5, 1.5),
            ThresholdRange::UNBOUNDED,
            ThresholdRange::new(100.0, 1500.0),
        );
        let params = ProjectionParams::new(grid, threshold, 1.0);

        let positions = projector
            .dispatch(&depth, &params)
            .unwrap()
            .read_back(&ctx)
            .unwrap();
        assert_matches_cpu(&positions, &depth, &lut, &params);
    }

    #[test]
    fn test_open_box_keeps_overflowing_coordinates() {
        let Some(ctx) = test_context() else { return };

        let grid = DepthGrid::new(2, 1);
        let lut = LookupTable::new(
            grid,
            vec![LookupEntry::new(1e37, 0.0), LookupEntry::new(-1e37, 0.5)],
        )
        .unwrap();
        let mut projector = GpuDepthProjector::new(&ctx, &lut).unwrap();
        let params = ProjectionParams::new(grid, ThresholdBox::default(), 1.0);
        let depth = [1000, 1000];

        let positions = projector
            .dispatch(&depth, &params)
            .unwrap()
            .read_back(&ctx)
            .unwrap();
        assert_eq!(positions.raw()[0], [f32::INFINITY, 0.0, 1000.0, 1.0]);
        assert_eq!(positions.raw()[1], [f32::NEG_INFINITY, 500.0, 1000.0, 1.0]);
        assert_matches_cpu(&positions, &depth, &lut, &params);
    }

    #[test]
    fn test_outputs_alternate_between_slots() {
        let Some(ctx) = test_context() else { return };

        let grid = DepthGrid::new(4, 4);
        let lut = ramp_table(grid);
        let mut projector = GpuDepthProjector::new(&ctx, &lut).unwrap();
        let params = ProjectionParams::new(grid, ThresholdBox::default(), 1.0);

        let first = projector.dispatch(&[500; 16], &params).unwrap();
        let second = projector.dispatch(&[900; 16], &params).unwrap();
        assert_ne!(first.slot(), second.slot());
        assert!(!Arc::ptr_eq(first.buffer(), second.buffer()));

        // The earlier output survives the later dispatch.
        projector.wait_idle().unwrap();
        let first_positions = first.read_back(&ctx).unwrap();
        assert_eq!(first_positions.raw()[0][2], 500.0);
        let second_positions = second.read_back(&ctx).unwrap();
        assert_eq!(second_positions.raw()[0][2], 900.0);

        let third = projector.dispatch(&[100; 16], &params).unwrap();
        assert_eq!(third.slot(), first.slot());
        assert_eq!(projector.dispatches(), 3);
    }

    #[test]
    fn test_dispatch_rejects_wrong_size() {
        let Some(ctx) = test_context() else { return };

        let grid = DepthGrid::new(4, 4);
        let mut projector = GpuDepthProjector::new(&ctx, &ramp_table(grid)).unwrap();
        let params = ProjectionParams::new(grid, ThresholdBox::default(), 1.0);

        let result = projector.dispatch(&[1; 15], &params);
        assert!(matches!(
            result,
            Err(GpuError::DataError(DataError::SizeMismatch { expected: 16, actual: 15 }))
        ));
        assert_eq!(projector.dispatches(), 0);
    }
}
