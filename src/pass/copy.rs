use std::any::Any;

use super::{Pass, PassContext, PassFlags, PassIo};
use crate::device::{ColorSpace, DrawCall, RenderOutput, TargetId};
use crate::error::{FxError, Result};
use crate::shader::{AssembleOptions, CompilationToken, ProgramCache, ProgramKey, ProgramSource};

/// Copies its input unchanged.
///
/// By default the copy goes to the next ping-pong buffer (or the display when it is the
/// last pass). With [`CopyPass::to_target`] it writes a caller-owned target instead and
/// leaves the ping-pong buffers alone, which is how a snapshot of an intermediate
/// result is taken.
pub struct CopyPass {
    name: String,
    flags: PassFlags,
    target: Option<TargetId>,
    program: Option<(ProgramKey, CompilationToken)>,
}

impl CopyPass {
    pub fn new() -> Self {
        Self {
            name: "copy".to_string(),
            flags: PassFlags::swapping(),
            target: None,
            program: None,
        }
    }

    /// A copy into `target`.
    pub fn to_target(target: TargetId) -> Self {
        Self {
            name: "copy".to_string(),
            flags: PassFlags::in_place(),
            target: Some(target),
            program: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for CopyPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for CopyPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> &PassFlags {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut PassFlags {
        &mut self.flags
    }

    fn explicit_output(&self) -> Option<TargetId> {
        self.target
    }

    fn prepare(&mut self, ctx: &mut PassContext<'_>, io: &PassIo) -> Result<()> {
        let options = AssembleOptions {
            encode_srgb: io.output_color_space == ColorSpace::Srgb,
        };
        let key = ProgramKey::passthrough(&options);
        if self.program.map(|(k, _)| k) != Some(key) {
            let label = self.name.clone();
            let token = ctx
                .programs
                .acquire(&mut *ctx.device, key, || Ok(ProgramSource::passthrough(&label, &options)))?;
            if let Some((old_key, old_token)) = self.program.replace((key, token)) {
                ctx.programs.release(old_key, old_token);
            }
        }
        Ok(())
    }

    fn render(&mut self, ctx: &mut PassContext<'_>, io: &PassIo) -> Result<()> {
        let program = self
            .program
            .and_then(|(key, token)| ctx.programs.get(key, token))
            .ok_or_else(|| FxError::config(format!("pass '{}'", self.name), "rendered before it was prepared"))?;
        let id = program.id;
        let uniforms = program.source.encode_uniforms(&ctx.frame.uniforms(), &[]);

        if io.input.is_some() && io.output == io.input.map_or(RenderOutput::Screen, RenderOutput::Target) {
            return Err(FxError::config(
                format!("pass '{}'", self.name),
                "input and output are the same buffer",
            ));
        }

        ctx.device.draw(&DrawCall {
            label: &self.name,
            program: id,
            output: io.output,
            input: io.input,
            depth: None,
            velocity: None,
            textures: &[],
            uniforms: &uniforms,
        })
    }

    fn release(&mut self, programs: &mut ProgramCache) {
        if let Some((key, token)) = self.program.take() {
            programs.release(key, token);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
