//! The boundary between the composer and the GPU rendering context.
//!
//! The composer never talks to a graphics API directly. Everything it needs (render
//! targets, lookup textures, compiled programs, full-screen draws and clears) goes
//! through the [`RenderDevice`] trait, addressed by opaque slotmap handles.
//!
//! Two devices ship with the crate:
//!
//! - [`WgpuDevice`]: the real thing, backed by wgpu. Renders to a window surface or to a
//!   headless offscreen "screen".
//! - [`SoftwareDevice`]: a CPU reference device that evaluates the structural stage list
//!   of each program with caller-registered kernels. It validates every program's WGSL
//!   with naga, which makes it suitable for headless tests of the whole pipeline.
//!
//! # Frame protocol
//!
//! ```text
//! begin_frame ──▶ draw / clear ... ──▶ end_frame      (success: present)
//!                                  └─▶ abort_frame    (failure: discard)
//! ```

mod software;
mod wgpu_device;

use std::any::Any;

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::shader::ProgramSource;

pub use software::{DeviceStats, Kernel, KernelInput, SoftwareDevice};
pub use wgpu_device::WgpuDevice;

slotmap::new_key_type! {
    /// Handle to a render target (color or depth/stencil) owned by a device.
    pub struct TargetId;
    /// Handle to a sampled lookup texture owned by a device.
    pub struct TextureId;
    /// Handle to a compiled program owned by a device.
    pub struct ProgramId;
}

/// How the values stored in a buffer are encoded.
///
/// Every render target carries its color space explicitly; there is no process-wide
/// default. A program writing to an [`ColorSpace::Srgb`] target encodes its output in
/// the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    /// Linear values; either stored as-is or encoded by the hardware (`*Srgb` formats).
    #[default]
    Linear,
    /// Values must be sRGB-encoded by the program before they are stored.
    Srgb,
}

/// Describes a render target to allocate.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDescriptor {
    /// Debug label (visible in GPU debuggers).
    pub label: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format. Depth/stencil formats produce depth targets.
    pub format: wgpu::TextureFormat,
    /// Encoding of the stored values.
    pub color_space: ColorSpace,
}

impl TargetDescriptor {
    /// A linear color target.
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
            color_space: ColorSpace::Linear,
        }
    }

    /// Sets the color space of the target.
    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// Returns `true` if this describes a depth/stencil target.
    pub fn is_depth(&self) -> bool {
        self.format.is_depth_stencil_format()
    }

    /// Returns `true` if `other` can stand in for `self` without reallocation.
    pub fn is_compatible(&self, other: &TargetDescriptor) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.format == other.format
            && self.color_space == other.color_space
    }
}

/// Describes a sampled lookup texture (e.g. a color grading LUT).
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    /// Debug label.
    pub label: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format of the uploaded data.
    pub format: wgpu::TextureFormat,
}

/// Where a draw or clear writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderOutput {
    /// The display (window surface or headless screen).
    Screen,
    /// An offscreen render target.
    Target(TargetId),
}

/// A single full-screen draw of a compiled program.
///
/// Binding layout of every program:
///
/// | Binding | Resource |
/// |---------|----------|
/// | 0 | uniform block (`uniforms`) |
/// | 1 | input color texture |
/// | 2 | linear clamp sampler |
/// | 3 | depth texture (if the program reads depth) |
/// | 4 | velocity texture (if the program reads velocity) |
/// | 5.. | custom textures, in `textures` order |
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    /// Debug label (usually the pass name).
    pub label: &'a str,
    /// Program to run.
    pub program: ProgramId,
    /// Destination.
    pub output: RenderOutput,
    /// Primary color input. `None` binds a black dummy texture.
    pub input: Option<TargetId>,
    /// Shared depth buffer.
    pub depth: Option<TargetId>,
    /// Shared velocity buffer.
    pub velocity: Option<TargetId>,
    /// Custom textures, in program binding order.
    pub textures: &'a [TextureId],
    /// Raw uniform block, laid out as described by the program's [`ProgramSource`].
    pub uniforms: &'a [u8],
}

/// The rendering context the composer orchestrates.
///
/// Implementations own every GPU object and hand out handles. All methods are called
/// from the single thread driving the render loop.
pub trait RenderDevice {
    /// Size of the display in pixels.
    fn screen_size(&self) -> (u32, u32);

    /// Color space expected by values written to `output`.
    fn color_space(&self, output: RenderOutput) -> ColorSpace;

    /// Allocates a render target.
    fn create_target(&mut self, desc: &TargetDescriptor) -> Result<TargetId>;

    /// Destroys a render target. Unknown handles are ignored.
    fn destroy_target(&mut self, id: TargetId);

    /// Uploads a lookup texture. `data` is tightly packed rows of `desc.format` texels.
    fn create_texture(&mut self, desc: &TextureDescriptor, data: &[u8]) -> Result<TextureId>;

    /// Destroys a lookup texture. Unknown handles are ignored.
    fn destroy_texture(&mut self, id: TextureId);

    /// Compiles an assembled program.
    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId>;

    /// Destroys a compiled program. Unknown handles are ignored.
    fn destroy_program(&mut self, id: ProgramId);

    /// Starts a frame (acquires the display image).
    fn begin_frame(&mut self) -> Result<()>;

    /// Records and submits one full-screen draw.
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()>;

    /// Clears the color of `output` (when `color` is set) and the depth of `depth`.
    fn clear(&mut self, output: RenderOutput, color: Option<Vec4>, depth: Option<TargetId>)
    -> Result<()>;

    /// Finishes the frame and presents the display image.
    fn end_frame(&mut self) -> Result<()>;

    /// Discards a frame that failed part-way. The display image is not presented.
    fn abort_frame(&mut self) {}

    /// Downcast support, so callbacks can reach the concrete device.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
