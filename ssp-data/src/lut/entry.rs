//! Lookup table entry layout

/// Per-pixel factor turning a scalar depth into an X/Y offset.
///
/// `#[repr(C)]` so the table uploads to the GPU as `array<vec2<f32>>`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LookupEntry {
    pub x: f32,
    pub y: f32,
}

impl LookupEntry {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}
