/// Builder for creating compute pipelines
pub struct ComputePipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: Option<String>,
    shader_source: Option<&'a str>,
    entry_point: &'a str,
    bind_group_layouts: Vec<&'a wgpu::BindGroupLayout>,
}

impl<'a> ComputePipelineBuilder<'a> {
    pub fn new(device: &'a wgpu::Device) -> Self {
        Self {
            device,
            label: None,
            shader_source: None,
            entry_point: "main",
            bind_group_layouts: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// WGSL source of the compute shader
    pub fn with_shader(mut self, source: &'a str) -> Self {
        self.shader_source = Some(source);
        self
    }

    pub fn with_entry_point(mut self, entry_point: &'a str) -> Self {
        self.entry_point = entry_point;
        self
    }

    pub fn with_bind_group_layout(mut self, layout: &'a wgpu::BindGroupLayout) -> Self {
        self.bind_group_layouts.push(layout);
        self
    }

    pub fn build(self) -> Result<wgpu::ComputePipeline, PipelineBuildError> {
        let source = self
            .shader_source
            .ok_or(PipelineBuildError::MissingComputeShader)?;
        if self.entry_point.is_empty() {
            return Err(PipelineBuildError::MissingEntryPoint);
        }

        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: self.label.as_deref(),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: self.label.as_deref(),
                bind_group_layouts: &self.bind_group_layouts,
                push_constant_ranges: &[],
            });

        Ok(self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: self.label.as_deref(),
                layout: Some(&layout),
                module: &shader,
                entry_point: Some(self.entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            }))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineBuildError {
    #[error("Compute shader is required")]
    MissingComputeShader,
    #[error("Entry point must not be empty")]
    MissingEntryPoint,
}
