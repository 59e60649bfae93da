//! Shader source code embedded at compile time.
//!
//! WGSL sources are embedded with `include_str!`, so they're available as
//! static string constants.

/// Depth to 3D projection kernel - lookup table multiply + threshold clip.
pub const DEPTH_TRANSFER: &str = include_str!("../shaders/depth_transfer.wgsl");

/// Entry point of [`DEPTH_TRANSFER`].
pub const DEPTH_TRANSFER_ENTRY: &str = "main";

/// Invocations per workgroup in [`DEPTH_TRANSFER`].
pub const DEPTH_TRANSFER_WORKGROUP_SIZE: u32 = 64;
