//! Passes: the scheduling units of an [`EffectComposer`](crate::EffectComposer).
//!
//! A pass consumes one buffer and produces another (or the display). The composer
//! decides which buffers those are from the flags every pass carries:
//!
//! - `needs_swap`: the pass reads its input and writes a different buffer. After it
//!   runs, the composer's ping-pong roles flip.
//! - no swap: the pass works in place on the current buffer (or reads nothing).
//! - an explicit output: the pass writes a caller-owned target and the ping-pong
//!   buffers are left alone.
//!
//! # Frame phases
//!
//! Every frame runs in two phases. [`Pass::prepare`] runs for every enabled pass before
//! the first draw; it compiles programs and uploads textures, so that any configuration,
//! compilation or allocation failure surfaces before anything was rendered.
//! [`Pass::render`] then issues the draws.

mod clear;
mod copy;
mod effect_pass;
mod lambda;

use std::any::Any;

use bitflags::bitflags;

use crate::device::{ColorSpace, RenderDevice, RenderOutput, TargetId};
use crate::error::Result;
use crate::shader::{FrameUniforms, ProgramCache};

pub use clear::ClearPass;
pub use copy::CopyPass;
pub use effect_pass::EffectPass;
pub use lambda::LambdaPass;

bitflags! {
    /// Auxiliary buffers a pass reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Attachments: u8 {
        const DEPTH = 1 << 0;
        const VELOCITY = 1 << 1;
    }
}

/// State every pass carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassFlags {
    pub enabled: bool,
    pub needs_swap: bool,
    pub requirements: Attachments,
}

impl PassFlags {
    /// Enabled, swapping, no attachments.
    pub fn swapping() -> Self {
        Self {
            enabled: true,
            needs_swap: true,
            requirements: Attachments::empty(),
        }
    }

    /// Enabled, in place, no attachments.
    pub fn in_place() -> Self {
        Self {
            enabled: true,
            needs_swap: false,
            requirements: Attachments::empty(),
        }
    }
}

/// Buffers assigned to a pass for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassIo {
    /// The buffer to read, if the pass reads one.
    pub input: Option<TargetId>,
    pub output: RenderOutput,
    /// Encoding expected by `output`.
    pub output_color_space: ColorSpace,
    pub depth: Option<TargetId>,
    pub velocity: Option<TargetId>,
}

/// Timing, size and camera values of the frame being rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Size of the internal buffers.
    pub width: u32,
    pub height: u32,
    /// Seconds since the composer's first frame.
    pub time: f32,
    /// Seconds since the previous frame.
    pub delta: f32,
    pub frame_index: u64,
    pub camera_near: f32,
    pub camera_far: f32,
}

impl FrameInfo {
    pub fn uniforms(&self) -> FrameUniforms {
        let (w, h) = (self.width.max(1) as f32, self.height.max(1) as f32);
        FrameUniforms {
            resolution: [w, h],
            texel_size: [1.0 / w, 1.0 / h],
            time: self.time,
            delta: self.delta,
            camera_near: self.camera_near,
            camera_far: self.camera_far,
        }
    }
}

/// What a pass gets to work with while preparing or rendering.
pub struct PassContext<'a> {
    pub device: &'a mut dyn RenderDevice,
    pub programs: &'a mut ProgramCache,
    pub frame: &'a FrameInfo,
}

/// A stage of the post-processing chain.
pub trait Pass: Any {
    fn name(&self) -> &str;

    fn flags(&self) -> &PassFlags;

    fn flags_mut(&mut self) -> &mut PassFlags;

    fn is_enabled(&self) -> bool {
        self.flags().enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.flags_mut().enabled = enabled;
    }

    fn needs_swap(&self) -> bool {
        self.flags().needs_swap
    }

    fn requirements(&self) -> Attachments {
        self.flags().requirements
    }

    /// A caller-owned target this pass always writes to, bypassing the ping-pong
    /// buffers.
    fn explicit_output(&self) -> Option<TargetId> {
        None
    }

    /// Receives the size of the internal buffers.
    fn set_size(&mut self, _width: u32, _height: u32) {}

    /// Compiles and uploads whatever `render` will need. Issues no draws.
    fn prepare(&mut self, _ctx: &mut PassContext<'_>, _io: &PassIo) -> Result<()> {
        Ok(())
    }

    /// Issues the pass's draws.
    fn render(&mut self, ctx: &mut PassContext<'_>, io: &PassIo) -> Result<()>;

    /// Drops references into the program cache. Called when the pass leaves a composer.
    fn release(&mut self, _programs: &mut ProgramCache) {}

    /// Destroys resources the pass allocated itself.
    fn dispose(&mut self, _device: &mut dyn RenderDevice) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
