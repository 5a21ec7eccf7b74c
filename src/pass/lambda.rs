use std::any::Any;

use super::{Attachments, Pass, PassContext, PassFlags, PassIo};
use crate::error::Result;

type Callback = Box<dyn FnMut(&mut PassContext<'_>, &PassIo) -> Result<()>>;

/// A pass that runs a caller-supplied closure.
///
/// The closure gets the device and the buffers the composer assigned, so it can draw
/// the scene into the input buffer, read back an intermediate result, or issue any
/// other device work. It runs in place unless [`swapping`](Self::swapping) is set.
///
/// ```
/// use postfx::{LambdaPass, Pass};
///
/// let pass = LambdaPass::new("scene", |ctx, io| {
///     ctx.device.clear(io.output, Some(glam::Vec4::new(0.1, 0.2, 0.3, 1.0)), None)
/// });
/// assert!(!pass.needs_swap());
/// ```
pub struct LambdaPass {
    name: String,
    flags: PassFlags,
    callback: Callback,
}

impl LambdaPass {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: FnMut(&mut PassContext<'_>, &PassIo) -> Result<()> + 'static,
    {
        Self {
            name: name.into(),
            flags: PassFlags::in_place(),
            callback: Box::new(callback),
        }
    }

    /// The closure reads `io.input` and writes a different `io.output`.
    pub fn swapping(mut self) -> Self {
        self.flags.needs_swap = true;
        self
    }

    pub fn with_requirements(mut self, requirements: Attachments) -> Self {
        self.flags.requirements = requirements;
        self
    }
}

impl Pass for LambdaPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> &PassFlags {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut PassFlags {
        &mut self.flags
    }

    fn render(&mut self, ctx: &mut PassContext<'_>, io: &PassIo) -> Result<()> {
        (self.callback)(ctx, io)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
