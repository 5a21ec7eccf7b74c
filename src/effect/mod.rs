//! Effects: pluggable per-pixel color transforms with declared resource needs.
//!
//! An [`Effect`] never renders by itself. It is a description (a WGSL fragment, a set of
//! uniforms, attachment requirements and a blend mode) that an
//! [`EffectPass`](crate::EffectPass) merges with its siblings into one program.
//!
//! # Shader Fragment
//!
//! The fragment must define a `transform` function. Its signature grows with the
//! attachments the effect requests:
//!
//! ```wgsl
//! // no attributes
//! fn transform(color: vec4f, uv: vec2f) -> vec4f
//! // EffectAttributes::DEPTH
//! fn transform(color: vec4f, uv: vec2f, depth: f32) -> vec4f
//! // EffectAttributes::DEPTH | EffectAttributes::VELOCITY
//! fn transform(color: vec4f, uv: vec2f, depth: f32, velocity: vec2f) -> vec4f
//! ```
//!
//! Uniforms, defines and custom textures are referenced by their bare names; every effect
//! also sees the implicit uniforms `opacity` and `texel_size`, plus the shared builtins
//! `fx_resolution()`, `fx_texel_size()`, `fx_time()`, `fx_delta()`,
//! `fx_sample_input(uv)`, `fx_linearize_depth(d)` and the sampler `fx_sampler`.
//!
//! # Example
//!
//! ```
//! use postfx::{BlendFunction, Effect};
//!
//! let tint = Effect::new("tint", r#"
//!     fn transform(color: vec4f, uv: vec2f) -> vec4f {
//!         return vec4f(color.rgb * tint, color.a);
//!     }
//! "#)
//! .unwrap()
//! .with_uniform("tint", glam::Vec3::new(1.0, 0.9, 0.8))
//! .with_blend(BlendFunction::Normal);
//!
//! assert_eq!(tint.name(), "tint");
//! ```
//!
//! # Recompilation Contract
//!
//! Uniform values, opacity and resolution scale are per-frame parameters. Everything
//! else (code, attributes, depth packing, blend function, defines, uniform layout,
//! textures, enabled state) is structural: changing it bumps [`Effect::revision`] and the
//! owning pass recompiles once, on its next frame.

mod blend;
mod compat;

use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use glam::{Vec2, Vec3, Vec4};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::device::{RenderDevice, TextureDescriptor, TextureId};
use crate::error::{FxError, Result};
use crate::shader::rename;

pub use blend::{BlendFunction, BlendMode};
pub use compat::{can_join, check_merge, merge_conflict};

/// Uniform names every effect gets implicitly.
pub const IMPLICIT_UNIFORMS: [&str; 2] = ["opacity", "texel_size"];

bitflags! {
    /// Requirements and capabilities declared by an effect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EffectAttributes: u8 {
        /// Reads the shared scene depth buffer.
        const DEPTH = 1 << 0;
        /// Reads the shared velocity buffer.
        const VELOCITY = 1 << 1;
        /// Samples neighboring texels of its own input; must run in a dedicated pass.
        const CONVOLUTION = 1 << 2;
    }
}

/// How depth reaches an effect's `transform`.
///
/// Two depth consumers can only share a pass if they agree on the packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DepthPacking {
    /// The raw, non-linear depth buffer value in `[0, 1]`.
    #[default]
    Raw,
    /// View-space distance, linearized with the composer's camera planes.
    Linear,
}

/// Type of a uniform slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
}

impl UniformKind {
    /// The WGSL type name.
    pub fn wgsl_type(self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Vec2 => "vec2f",
            Self::Vec3 => "vec3f",
            Self::Vec4 => "vec4f",
        }
    }
}

/// Value of a uniform. Every uniform occupies one 16-byte slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Float,
            Self::Vec2(_) => UniformKind::Vec2,
            Self::Vec3(_) => UniformKind::Vec3,
            Self::Vec4(_) => UniformKind::Vec4,
        }
    }

    /// The value padded to a full slot.
    pub fn to_slot(&self) -> [f32; 4] {
        match *self {
            Self::Float(v) => [v, 0.0, 0.0, 0.0],
            Self::Vec2(v) => [v.x, v.y, 0.0, 0.0],
            Self::Vec3(v) => [v.x, v.y, v.z, 0.0],
            Self::Vec4(v) => v.to_array(),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<Vec3> for UniformValue {
    fn from(v: Vec3) -> Self {
        Self::Vec3(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

/// A named uniform binding of an effect.
#[derive(Debug, Clone, PartialEq)]
pub struct Uniform {
    pub name: String,
    pub value: UniformValue,
}

/// A lookup texture owned by an effect.
///
/// The data is uploaded lazily the first time the owning pass prepares a frame, and
/// released by [`Effect::dispose`].
#[derive(Debug, Clone)]
pub struct EffectTexture {
    name: String,
    desc: TextureDescriptor,
    data: Vec<u8>,
    handle: Option<TextureId>,
}

impl EffectTexture {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.desc
    }

    /// Device handle, once uploaded.
    pub fn handle(&self) -> Option<TextureId> {
        self.handle
    }
}

/// Token identifying the structural state of an effect.
///
/// Returned by every setter that forces recompilation; compare tokens to detect that
/// an effect changed since a pass last compiled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(pub u64);

/// A pluggable per-pixel color transform.
#[derive(Debug, Clone)]
pub struct Effect {
    name: String,
    source: String,
    source_hash: u64,
    attributes: EffectAttributes,
    depth_packing: DepthPacking,
    blend: BlendMode,
    uniforms: Vec<Uniform>,
    defines: Vec<(String, String)>,
    textures: Vec<EffectTexture>,
    enabled: bool,
    resolution_scale: f32,
    size: (u32, u32),
    revision: Revision,
}

impl Effect {
    /// Creates an effect from a WGSL fragment defining `fn transform`.
    ///
    /// Fails with a configuration error if `transform` is missing or the fragment
    /// declares names in the reserved `fx` namespace.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let source = source.into();
        validate_source(&name, &source)?;
        Ok(Self::from_checked(name, source))
    }

    /// Builds an effect from a fragment already known to pass [`Effect::new`]'s checks.
    pub(crate) fn from_checked(name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        let source = source.into();
        Self {
            source_hash: hash_str(&source),
            name,
            source,
            attributes: EffectAttributes::empty(),
            depth_packing: DepthPacking::Raw,
            blend: BlendMode::default(),
            uniforms: Vec::new(),
            defines: Vec::new(),
            textures: Vec::new(),
            enabled: true,
            resolution_scale: 1.0,
            size: (1, 1),
            revision: Revision(0),
        }
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_attributes(mut self, attributes: EffectAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_depth_packing(mut self, packing: DepthPacking) -> Self {
        self.depth_packing = packing;
        self
    }

    pub fn with_blend(mut self, function: BlendFunction) -> Self {
        self.blend.function = function;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.blend.opacity = opacity;
        self
    }

    /// Declares a uniform. Declaring an existing name replaces it.
    pub fn with_uniform(mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Self {
        self.declare_uniform(name, value);
        self
    }

    /// Adds a compile-time constant, emitted as `const NAME = value;`.
    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_define(name, value);
        self
    }

    /// Attaches a lookup texture the fragment can sample by `name`.
    pub fn with_texture(mut self, name: impl Into<String>, desc: TextureDescriptor, data: Vec<u8>) -> Self {
        let name = name.into();
        self.textures.retain(|t| t.name != name);
        self.textures.push(EffectTexture {
            name,
            desc,
            data,
            handle: None,
        });
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn attributes(&self) -> EffectAttributes {
        self.attributes
    }

    pub fn depth_packing(&self) -> DepthPacking {
        self.depth_packing
    }

    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    pub fn uniforms(&self) -> &[Uniform] {
        &self.uniforms
    }

    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.uniforms.iter().find(|u| u.name == name).map(|u| u.value)
    }

    pub fn defines(&self) -> &[(String, String)] {
        &self.defines
    }

    pub fn textures(&self) -> &[EffectTexture] {
        &self.textures
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn resolution_scale(&self) -> f32 {
        self.resolution_scale
    }

    /// Current structural revision.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Size of one texel at this effect's resolution scale.
    pub fn texel_size(&self) -> Vec2 {
        let w = (self.size.0 as f32 * self.resolution_scale).max(1.0);
        let h = (self.size.1 as f32 * self.resolution_scale).max(1.0);
        Vec2::new(1.0 / w, 1.0 / h)
    }

    /// Returns `true` if this effect contributes to a program.
    pub fn is_active(&self) -> bool {
        self.enabled && self.blend.function != BlendFunction::Skip
    }

    // ========================================================================
    // Per-frame parameters (never recompile)
    // ========================================================================

    /// Updates the value of a declared uniform.
    ///
    /// A value of the same kind is a parameter change. A value of a different kind
    /// changes the uniform layout and bumps the revision.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) -> Result<()> {
        let value = value.into();
        let Some(uniform) = self.uniforms.iter_mut().find(|u| u.name == name) else {
            return Err(FxError::config(
                format!("effect '{}'", self.name),
                format!("no uniform named '{name}'"),
            ));
        };
        let relayout = uniform.value.kind() != value.kind();
        uniform.value = value;
        if relayout {
            self.bump();
        }
        Ok(())
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.blend.opacity = opacity;
    }

    pub fn set_resolution_scale(&mut self, scale: f32) {
        self.resolution_scale = scale;
    }

    /// Receives the size of the buffers this effect operates on.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.size = (width.max(1), height.max(1));
    }

    // ========================================================================
    // Structural changes (bump the revision)
    // ========================================================================

    /// Declares (or re-declares) a uniform.
    pub fn declare_uniform(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) -> Revision {
        let name = name.into();
        let value = value.into();
        match self.uniforms.iter_mut().find(|u| u.name == name) {
            Some(existing) if existing.value.kind() == value.kind() => {
                existing.value = value;
                return self.revision;
            }
            Some(existing) => existing.value = value,
            None => self.uniforms.push(Uniform { name, value }),
        }
        self.bump()
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Revision {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.bump();
        }
        self.revision
    }

    pub fn set_blend_function(&mut self, function: BlendFunction) -> Revision {
        if self.blend.function != function {
            self.blend.function = function;
            self.bump();
        }
        self.revision
    }

    pub fn set_attributes(&mut self, attributes: EffectAttributes) -> Revision {
        if self.attributes != attributes {
            self.attributes = attributes;
            self.bump();
        }
        self.revision
    }

    /// Sets or clears a single attribute.
    pub fn set_attribute(&mut self, attribute: EffectAttributes, on: bool) -> Revision {
        let mut attributes = self.attributes;
        attributes.set(attribute, on);
        self.set_attributes(attributes)
    }

    pub fn set_depth_packing(&mut self, packing: DepthPacking) -> Revision {
        if self.depth_packing != packing {
            self.depth_packing = packing;
            self.bump();
        }
        self.revision
    }

    pub fn set_define(&mut self, name: impl Into<String>, value: impl Into<String>) -> Revision {
        let name = name.into();
        let value = value.into();
        match self.defines.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) if *v == value => return self.revision,
            Some((_, v)) => *v = value,
            None => self.defines.push((name, value)),
        }
        self.bump()
    }

    pub fn remove_define(&mut self, name: &str) -> Revision {
        let before = self.defines.len();
        self.defines.retain(|(n, _)| n != name);
        if self.defines.len() != before {
            self.bump();
        }
        self.revision
    }

    /// Replaces the shader fragment.
    pub fn set_source(&mut self, source: impl Into<String>) -> Result<Revision> {
        let source = source.into();
        validate_source(&self.name, &source)?;
        if source != self.source {
            self.source_hash = hash_str(&source);
            self.source = source;
            self.bump();
        }
        Ok(self.revision)
    }

    fn bump(&mut self) -> Revision {
        self.revision.0 += 1;
        self.revision
    }

    // ========================================================================
    // Validation, identity, GPU resources
    // ========================================================================

    /// Checks uniform, define and texture names.
    pub fn validate(&self) -> Result<()> {
        let context = || format!("effect '{}'", self.name);
        let mut seen: Vec<&str> = Vec::new();

        let names = self
            .uniforms
            .iter()
            .map(|u| u.name.as_str())
            .chain(self.defines.iter().map(|(n, _)| n.as_str()))
            .chain(self.textures.iter().map(|t| t.name.as_str()));

        for name in names {
            if !rename::is_identifier(name) {
                return Err(FxError::config(context(), format!("'{name}' is not a valid identifier")));
            }
            if is_reserved(name) || IMPLICIT_UNIFORMS.contains(&name) {
                return Err(FxError::config(context(), format!("'{name}' is a reserved name")));
            }
            if seen.contains(&name) {
                return Err(FxError::config(context(), format!("'{name}' is declared twice")));
            }
            seen.push(name);
        }

        for texture in &self.textures {
            let expected = texture_byte_len(&texture.desc);
            if texture.data.len() != expected {
                return Err(FxError::config(
                    context(),
                    format!(
                        "texture '{}' has {} bytes, expected {expected}",
                        texture.name,
                        texture.data.len()
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Feeds everything that determines the compiled program into `state`.
    pub fn hash_structure<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.source_hash.hash(state);
        self.attributes.hash(state);
        self.depth_packing.hash(state);
        self.blend.function.hash(state);
        for uniform in &self.uniforms {
            uniform.name.hash(state);
            uniform.value.kind().hash(state);
        }
        self.defines.hash(state);
        for texture in &self.textures {
            texture.name.hash(state);
        }
    }

    /// Uploads lookup textures that are not on the device yet.
    pub fn upload_textures(&mut self, device: &mut dyn RenderDevice) -> Result<()> {
        for texture in &mut self.textures {
            if texture.handle.is_none() {
                let handle = device.create_texture(&texture.desc, &texture.data)?;
                log::debug!("effect '{}': uploaded texture '{}'", self.name, texture.name);
                texture.handle = Some(handle);
            }
        }
        Ok(())
    }

    /// Device handles of all lookup textures, in declaration order.
    ///
    /// Entries are `None` until [`upload_textures`](Self::upload_textures) ran.
    pub fn texture_handles(&self) -> impl Iterator<Item = Option<TextureId>> + '_ {
        self.textures.iter().map(|t| t.handle)
    }

    /// Releases the GPU resources this effect allocated itself.
    pub fn dispose(&mut self, device: &mut dyn RenderDevice) {
        for texture in &mut self.textures {
            if let Some(handle) = texture.handle.take() {
                device.destroy_texture(handle);
            }
        }
    }
}

/// Returns `true` for names in the reserved `fx` namespace.
pub(crate) fn is_reserved(name: &str) -> bool {
    name == "fx" || name.starts_with("fx_") || name == "fs" || name == "vs"
}

fn validate_source(name: &str, source: &str) -> Result<()> {
    let context = || format!("effect '{name}'");
    if !rename::declares_function(source, "transform") {
        return Err(FxError::config(context(), "shader fragment does not define `fn transform`"));
    }
    if let Some(reserved) = rename::declared_identifiers(source).into_iter().find(|n| is_reserved(n)) {
        return Err(FxError::config(
            context(),
            format!("'{reserved}' is in the reserved fx namespace"),
        ));
    }
    Ok(())
}

fn texture_byte_len(desc: &TextureDescriptor) -> usize {
    let texel = desc.format.block_copy_size(None).unwrap_or(4) as usize;
    desc.width as usize * desc.height as usize * texel
}

fn hash_str(s: &str) -> u64 {
    let mut hasher = FxHasher::default();
    s.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSTHROUGH: &str = "fn transform(color: vec4f, uv: vec2f) -> vec4f { return color; }";

    #[test]
    fn missing_transform_is_rejected() {
        let err = Effect::new("broken", "fn main() {}").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn unicode_comments_are_accepted() {
        let src = "/* café */ fn transform(color: vec4f, uv: vec2f) -> vec4f { return color; }";
        let effect = Effect::new("unicode", src).unwrap();
        assert_eq!(effect.source(), src);
    }

    #[test]
    fn reserved_declarations_are_rejected() {
        let src = "fn fx_helper() -> f32 { return 1.0; }\nfn transform(color: vec4f, uv: vec2f) -> vec4f { return color; }";
        assert!(Effect::new("sneaky", src).unwrap_err().is_configuration());
    }

    #[test]
    fn parameter_changes_keep_revision() {
        let mut effect = Effect::new("e", PASSTHROUGH).unwrap().with_uniform("gain", 1.0);
        let before = effect.revision();
        effect.set_uniform("gain", 2.0).unwrap();
        effect.set_opacity(0.5);
        effect.set_resolution_scale(0.5);
        assert_eq!(effect.revision(), before);
        assert_eq!(effect.uniform("gain"), Some(UniformValue::Float(2.0)));
    }

    #[test]
    fn structural_changes_bump_revision() {
        let mut effect = Effect::new("e", PASSTHROUGH).unwrap();
        let r0 = effect.revision();
        let r1 = effect.set_attribute(EffectAttributes::DEPTH, true);
        assert!(r1 > r0);
        // Setting the same value again is not a change.
        assert_eq!(effect.set_attribute(EffectAttributes::DEPTH, true), r1);
        let r2 = effect.set_blend_function(BlendFunction::Add);
        assert!(r2 > r1);
        let r3 = effect.set_define("TAPS", "4");
        assert!(r3 > r2);
        assert!(effect.set_enabled(false) > r3);
    }

    #[test]
    fn changing_uniform_kind_is_structural() {
        let mut effect = Effect::new("e", PASSTHROUGH).unwrap().with_uniform("gain", 1.0);
        let before = effect.revision();
        effect.set_uniform("gain", Vec2::ONE).unwrap();
        assert!(effect.revision() > before);
    }

    #[test]
    fn unknown_uniform_is_a_configuration_error() {
        let mut effect = Effect::new("e", PASSTHROUGH).unwrap();
        assert!(effect.set_uniform("missing", 1.0).unwrap_err().is_configuration());
    }

    #[test]
    fn validate_rejects_reserved_and_duplicate_names() {
        let effect = Effect::new("e", PASSTHROUGH).unwrap().with_uniform("opacity", 1.0);
        assert!(effect.validate().is_err());

        let effect = Effect::new("e", PASSTHROUGH)
            .unwrap()
            .with_uniform("amount", 1.0)
            .with_define("amount", "2.0");
        assert!(effect.validate().is_err());

        let effect = Effect::new("e", PASSTHROUGH).unwrap().with_uniform("amount", 1.0);
        assert!(effect.validate().is_ok());
    }

    #[test]
    fn texel_size_follows_resolution_scale() {
        let mut effect = Effect::new("e", PASSTHROUGH).unwrap();
        effect.set_size(200, 100);
        assert_eq!(effect.texel_size(), Vec2::new(1.0 / 200.0, 1.0 / 100.0));
        effect.set_resolution_scale(0.5);
        assert_eq!(effect.texel_size(), Vec2::new(1.0 / 100.0, 1.0 / 50.0));
    }
}
