//! The merging pass: many effects, one program, one draw.

use std::any::Any;

use super::{Attachments, Pass, PassContext, PassFlags, PassIo};
use crate::device::{ColorSpace, DrawCall, RenderDevice, TextureId};
use crate::effect::{Effect, EffectAttributes, check_merge};
use crate::error::{FxError, Result};
use crate::shader::{AssembleOptions, CompilationToken, ProgramCache, ProgramKey, assemble};

/// A pass that merges an ordered list of compatible effects into a single program.
///
/// The program is derived data. It is rebuilt lazily, during the first frame after the
/// set, order or structure of the enabled effects changed; any number of toggles
/// between two frames costs at most one compilation. Uniform and opacity changes never
/// recompile.
///
/// # Example
///
/// ```
/// use postfx::{EffectPass, effects};
///
/// let mut pass = EffectPass::new("grading");
/// pass.add_effect(effects::brightness_contrast(0.05, 0.1)).unwrap();
/// pass.add_effect(effects::vignette(0.4, 0.6)).unwrap();
/// assert_eq!(pass.effects().len(), 2);
/// ```
#[derive(Debug)]
pub struct EffectPass {
    name: String,
    flags: PassFlags,
    effects: Vec<Effect>,
    program: Option<(ProgramKey, CompilationToken)>,
    size: (u32, u32),
    skip_when_idle: bool,
}

impl EffectPass {
    /// Creates a pass without effects. It must receive at least one before it renders.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: PassFlags::swapping(),
            effects: Vec::new(),
            program: None,
            size: (1, 1),
            skip_when_idle: false,
        }
    }

    /// Creates a pass from `effects`, failing if they cannot be merged or two of them
    /// share a name.
    pub fn with_effects(name: impl Into<String>, effects: Vec<Effect>) -> Result<Self> {
        let mut pass = Self::new(name);
        for effect in effects {
            pass.add_effect(effect)?;
        }
        Ok(pass)
    }

    /// Makes the pass step aside, instead of failing the frame, while none of its
    /// effects is active.
    ///
    /// [`EffectComposer::add_effects`](crate::EffectComposer::add_effects) builds its
    /// passes this way, so an effect grouped while disabled can be switched on later.
    pub fn skip_when_idle(mut self) -> Self {
        self.skip_when_idle = true;
        self
    }

    /// Appends an effect.
    ///
    /// Fails with a configuration error, leaving the pass unchanged, if the effect
    /// cannot share a program with the effects already present.
    pub fn add_effect(&mut self, effect: Effect) -> Result<()> {
        let index = self.effects.len();
        self.insert_effect(index, effect)
    }

    /// Inserts an effect at `index` (clamped to the list length).
    ///
    /// Effect names are unique within a pass.
    pub fn insert_effect(&mut self, index: usize, mut effect: Effect) -> Result<()> {
        let index = index.min(self.effects.len());
        if self.effect(effect.name()).is_some() {
            return Err(FxError::config(
                self.context(),
                format!("an effect named '{}' is already present", effect.name()),
            ));
        }
        {
            let mut refs: Vec<&Effect> = self.effects.iter().collect();
            refs.insert(index, &effect);
            check_merge(&self.context(), &refs)?;
        }
        effect.set_size(self.size.0, self.size.1);
        self.effects.insert(index, effect);
        Ok(())
    }

    /// Removes the effect called `name` and hands it back.
    ///
    /// The effect keeps any lookup textures it uploaded; call [`Effect::dispose`] on it
    /// if it will not be used again.
    pub fn remove_effect(&mut self, name: &str) -> Option<Effect> {
        let index = self.effects.iter().position(|e| e.name() == name)?;
        Some(self.effects.remove(index))
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn effect(&self, name: &str) -> Option<&Effect> {
        self.effects.iter().find(|e| e.name() == name)
    }

    /// Mutable access to an effect. Structural changes take effect on the next frame.
    pub fn effect_mut(&mut self, name: &str) -> Option<&mut Effect> {
        self.effects.iter_mut().find(|e| e.name() == name)
    }

    /// Token of the compilation behind the current program, once one was compiled.
    pub fn compilation_token(&self) -> Option<CompilationToken> {
        self.program.map(|(_, token)| token)
    }

    /// Structural key of the current program.
    pub fn program_key(&self) -> Option<ProgramKey> {
        self.program.map(|(key, _)| key)
    }

    fn context(&self) -> String {
        format!("pass '{}'", self.name)
    }

    fn active(&self) -> Vec<&Effect> {
        self.effects.iter().filter(|e| e.is_active()).collect()
    }
}

impl Pass for EffectPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> &PassFlags {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut PassFlags {
        &mut self.flags
    }

    fn is_enabled(&self) -> bool {
        self.flags.enabled && !(self.skip_when_idle && !self.effects.iter().any(|e| e.is_active()))
    }

    /// Union of the attachments of the active effects.
    fn requirements(&self) -> Attachments {
        let mut attachments = self.flags.requirements;
        for effect in self.active() {
            let attributes = effect.attributes();
            if attributes.contains(EffectAttributes::DEPTH) {
                attachments |= Attachments::DEPTH;
            }
            if attributes.contains(EffectAttributes::VELOCITY) {
                attachments |= Attachments::VELOCITY;
            }
        }
        attachments
    }

    fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        for effect in &mut self.effects {
            effect.set_size(width, height);
        }
    }

    fn prepare(&mut self, ctx: &mut PassContext<'_>, io: &PassIo) -> Result<()> {
        let options = AssembleOptions {
            encode_srgb: io.output_color_space == ColorSpace::Srgb,
        };

        let acquired = {
            let active = self.active();
            if active.is_empty() {
                return Err(FxError::config(self.context(), "no enabled effects"));
            }
            let key = ProgramKey::for_effects(&active, &options);
            if self.program_key() != Some(key) {
                let token = ctx
                    .programs
                    .acquire(&mut *ctx.device, key, || assemble(&self.name, &active, &options))?;
                Some((key, token))
            } else {
                None
            }
        };

        if let Some(program) = acquired {
            if let Some((old_key, old_token)) = self.program.replace(program) {
                ctx.programs.release(old_key, old_token);
            }
        }

        for effect in self.effects.iter_mut().filter(|e| e.is_active()) {
            effect.upload_textures(&mut *ctx.device)?;
        }
        Ok(())
    }

    fn render(&mut self, ctx: &mut PassContext<'_>, io: &PassIo) -> Result<()> {
        let Some((key, token)) = self.program else {
            return Err(FxError::config(self.context(), "rendered before it was prepared"));
        };

        let active = self.active();
        let textures: Vec<TextureId> = active.iter().flat_map(|e| e.texture_handles()).flatten().collect();

        let Some(program) = ctx.programs.get(key, token) else {
            return Err(FxError::config(self.context(), "program is no longer cached"));
        };
        let id = program.id;
        let uniforms = program.source.encode_uniforms(&ctx.frame.uniforms(), &active);

        ctx.device.draw(&DrawCall {
            label: &self.name,
            program: id,
            output: io.output,
            input: io.input,
            depth: io.depth,
            velocity: io.velocity,
            textures: &textures,
            uniforms: &uniforms,
        })
    }

    fn release(&mut self, programs: &mut ProgramCache) {
        if let Some((key, token)) = self.program.take() {
            programs.release(key, token);
        }
    }

    fn dispose(&mut self, device: &mut dyn RenderDevice) {
        for effect in &mut self.effects {
            effect.dispose(device);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
