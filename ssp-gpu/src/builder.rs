//! High-level builder APIs for creating GPU resources
//!
//! These builders provide a simpler, more ergonomic API compared to
//! directly using wgpu descriptors.

use bytemuck;

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Uniform buffer, rewritten from the host
    Uniform,
    /// Storage buffer (read-only inputs are host-writable, read-write outputs are copyable)
    Storage { read_only: bool },
    /// Host-visible staging buffer for readback
    Readback,
}

impl BufferUsage {
    fn to_wgpu(&self) -> wgpu::BufferUsages {
        match self {
            BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            BufferUsage::Storage { read_only: true } => {
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
            }
            BufferUsage::Storage { read_only: false } => {
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC
            }
            BufferUsage::Readback => wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        }
    }
}

/// Builder for creating GPU buffers
pub struct BufferBuilder<'a> {
    device: &'a wgpu::Device,
    label: Option<String>,
    size: Option<u64>,
    data: Option<&'a [u8]>,
    usage: BufferUsage,
}

impl<'a> BufferBuilder<'a> {
    pub fn new(device: &'a wgpu::Device) -> Self {
        Self {
            device,
            label: None,
            size: None,
            data: None,
            usage: BufferUsage::Storage { read_only: true },
        }
    }

    /// Set the buffer label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set buffer size (for empty buffers)
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set buffer data (for initialized buffers)
    pub fn with_data(mut self, data: &'a [u8]) -> Self {
        self.data = Some(data);
        self
    }

    /// Set buffer data from a slice of Pod types
    pub fn with_pod_data<T: bytemuck::Pod>(mut self, data: &'a [T]) -> Self {
        self.data = Some(bytemuck::cast_slice(data));
        self
    }

    /// Set buffer usage
    pub fn usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn build(self) -> Result<wgpu::Buffer, BufferBuildError> {
        use wgpu::util::DeviceExt;

        let buffer = if let Some(data) = self.data {
            if data.is_empty() {
                return Err(BufferBuildError::Empty);
            }
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: self.label.as_deref(),
                contents: data,
                usage: self.usage.to_wgpu(),
            })
        } else if let Some(size) = self.size {
            if size == 0 {
                return Err(BufferBuildError::Empty);
            }
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: self.label.as_deref(),
                size,
                usage: self.usage.to_wgpu(),
                mapped_at_creation: false,
            })
        } else {
            return Err(BufferBuildError::MissingSizeOrData);
        };

        Ok(buffer)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BufferBuildError {
    #[error("Buffer must have either size or data")]
    MissingSizeOrData,
    #[error("Buffer must not be empty")]
    Empty,
}

/// Binding type for compute bind groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    Uniform,
    StorageRead,
    StorageWrite,
}

impl BindingType {
    fn to_wgpu_binding_type(&self) -> wgpu::BindingType {
        let ty = match self {
            BindingType::Uniform => wgpu::BufferBindingType::Uniform,
            BindingType::StorageRead => wgpu::BufferBindingType::Storage { read_only: true },
            BindingType::StorageWrite => wgpu::BufferBindingType::Storage { read_only: false },
        };
        wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        }
    }
}

/// Builder for compute-stage bind group layouts
pub struct BindGroupLayoutBuilder<'a> {
    device: &'a wgpu::Device,
    label: Option<String>,
    entries: Vec<(u32, BindingType)>,
}

impl<'a> BindGroupLayoutBuilder<'a> {
    pub fn new(device: &'a wgpu::Device) -> Self {
        Self {
            device,
            label: None,
            entries: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Add a buffer binding visible to compute shaders
    pub fn buffer(mut self, binding: u32, binding_type: BindingType) -> Self {
        self.entries.push((binding, binding_type));
        self
    }

    pub fn build(self) -> Result<wgpu::BindGroupLayout, BindGroupBuildError> {
        if self.entries.is_empty() {
            return Err(BindGroupBuildError::NoEntries);
        }

        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = self
            .entries
            .iter()
            .map(|(binding, binding_type)| wgpu::BindGroupLayoutEntry {
                binding: *binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: binding_type.to_wgpu_binding_type(),
                count: None,
            })
            .collect();

        Ok(self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: self.label.as_deref(),
                entries: &layout_entries,
            }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BindGroupBuildError {
    #[error("No bindings added to bind group")]
    NoEntries,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_context;

    #[test]
    fn test_buffer_builder_with_data() {
        let Some(ctx) = test_context() else { return };

        let data: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let buffer = BufferBuilder::new(ctx.device())
            .label("test_buffer")
            .with_data(&data)
            .build()
            .expect("Failed to build buffer");

        assert_eq!(buffer.size(), 16);
    }

    #[test]
    fn test_buffer_builder_with_size() {
        let Some(ctx) = test_context() else { return };

        let buffer = ctx
            .create_buffer()
            .label("empty_buffer")
            .size(1024)
            .usage(BufferUsage::Uniform)
            .build()
            .expect("Failed to build buffer");

        assert_eq!(buffer.size(), 1024);
        assert!(buffer.usage().contains(wgpu::BufferUsages::UNIFORM));
    }

    #[test]
    fn test_buffer_builder_missing_size_or_data() {
        let Some(ctx) = test_context() else { return };

        let result = BufferBuilder::new(ctx.device()).build();
        assert!(matches!(result, Err(BufferBuildError::MissingSizeOrData)));

        let result = BufferBuilder::new(ctx.device()).size(0).build();
        assert!(matches!(result, Err(BufferBuildError::Empty)));
    }

    #[test]
    fn test_bind_group_layout_builder_no_entries() {
        let Some(ctx) = test_context() else { return };

        let result = BindGroupLayoutBuilder::new(ctx.device()).build();
        assert!(matches!(result, Err(BindGroupBuildError::NoEntries)));
    }

    #[test]
    fn test_buffer_usage_conversion() {
        assert!(BufferUsage::Uniform.to_wgpu().contains(wgpu::BufferUsages::UNIFORM));
        assert!(BufferUsage::Uniform.to_wgpu().contains(wgpu::BufferUsages::COPY_DST));
        assert!(
            BufferUsage::Storage { read_only: true }
                .to_wgpu()
                .contains(wgpu::BufferUsages::COPY_DST)
        );
        assert!(
            BufferUsage::Storage { read_only: false }
                .to_wgpu()
                .contains(wgpu::BufferUsages::COPY_SRC)
        );
        assert_eq!(
            BufferUsage::Readback.to_wgpu(),
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST
        );
    }

    #[test]
    fn test_binding_type_conversion() {
        match BindingType::StorageRead.to_wgpu_binding_type() {
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                ..
            } => assert!(read_only),
            _ => panic!("Expected Storage binding type"),
        }

        match BindingType::Uniform.to_wgpu_binding_type() {
            wgpu::BindingType::Buffer { ty, .. } => {
                assert_eq!(ty, wgpu::BufferBindingType::Uniform);
            }
            _ => panic!("Expected Buffer binding type"),
        }
    }
}
