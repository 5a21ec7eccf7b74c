use std::any::Any;

use glam::Vec4;

use super::{Attachments, Pass, PassContext, PassFlags, PassIo};
use crate::error::Result;

/// Clears the current buffer and, optionally, the shared depth buffer.
///
/// Works in place. Typically the first pass, ahead of a [`LambdaPass`](super::LambdaPass)
/// that draws the scene.
pub struct ClearPass {
    flags: PassFlags,
    color: Option<Vec4>,
}

impl ClearPass {
    /// Clears color to `color`.
    pub fn new(color: Vec4) -> Self {
        Self {
            flags: PassFlags::in_place(),
            color: Some(color),
        }
    }

    /// Clears depth to 1.0 as well.
    pub fn with_depth(mut self) -> Self {
        self.flags.requirements |= Attachments::DEPTH;
        self
    }

    /// Clears only the depth buffer.
    pub fn depth_only() -> Self {
        Self {
            flags: PassFlags {
                requirements: Attachments::DEPTH,
                ..PassFlags::in_place()
            },
            color: None,
        }
    }

    pub fn set_color(&mut self, color: Option<Vec4>) {
        self.color = color;
    }
}

impl Pass for ClearPass {
    fn name(&self) -> &str {
        "clear"
    }

    fn flags(&self) -> &PassFlags {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut PassFlags {
        &mut self.flags
    }

    fn render(&mut self, ctx: &mut PassContext<'_>, io: &PassIo) -> Result<()> {
        ctx.device.clear(io.output, self.color, io.depth)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
