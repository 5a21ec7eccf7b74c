//! Program assembly and caching.
//!
//! - [`assemble`] turns an ordered list of effects into one WGSL program. It is a pure
//!   function of the effects' structure and never touches a device.
//! - [`ProgramCache`] compiles assembled programs on a device, keyed on the structural
//!   [`ProgramKey`], and shares them between passes.
//! - [`validate_program`] checks assembled WGSL offline with naga.
//! - [`rename`] is the scanner that gives every merged effect its own identifier
//!   namespace.

mod assemble;
mod cache;
pub mod rename;
mod validate;

use bytemuck::{Pod, Zeroable};

use crate::effect::{BlendFunction, DepthPacking, EffectAttributes, UniformKind};
use crate::error::FxError;

pub use assemble::{AssembleOptions, assemble};
pub use cache::{CachedProgram, CompilationToken, ProgramCache, ProgramKey};
pub use validate::validate_program;

/// Size of one uniform slot in bytes.
pub const SLOT_SIZE: usize = 16;

/// Per-frame values at the start of every program's uniform block.
///
/// Mirrors the leading members of the WGSL `FxUniforms` struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub resolution: [f32; 2],
    pub texel_size: [f32; 2],
    pub time: f32,
    pub delta: f32,
    pub camera_near: f32,
    pub camera_far: f32,
}

/// Byte size of [`FrameUniforms`].
pub const FRAME_UNIFORMS_SIZE: usize = std::mem::size_of::<FrameUniforms>();

/// A user uniform's location inside the uniform block.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformSlot {
    pub name: String,
    pub offset: usize,
    pub kind: UniformKind,
}

/// One merged effect, as seen by a compiled program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramStage {
    /// Name of the effect this stage was assembled from.
    pub effect: String,
    pub blend: BlendFunction,
    pub attributes: EffectAttributes,
    pub depth_packing: DepthPacking,
    /// Byte offset of the implicit `opacity` uniform.
    pub opacity_offset: usize,
    /// Byte offset of the implicit `texel_size` uniform.
    pub texel_size_offset: usize,
    pub uniforms: Vec<UniformSlot>,
    /// Names of the stage's custom textures, in binding order.
    pub textures: Vec<String>,
    /// Compile-time constants, as `(name, value)`.
    pub defines: Vec<(String, String)>,
}

/// Optional bindings a program declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProgramBindings {
    /// Binding 3: shared depth texture.
    pub depth: bool,
    /// Binding 4: shared velocity texture.
    pub velocity: bool,
    /// Number of custom textures, bound from 5 onwards.
    pub textures: u32,
}

/// An assembled program: WGSL source plus the structure it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    /// Label of the pass the program was assembled for.
    pub label: String,
    /// Complete WGSL module with `vs` and `fs` entry points.
    pub wgsl: String,
    /// Merged effects, in execution order. Empty for a plain copy.
    pub stages: Vec<ProgramStage>,
    pub bindings: ProgramBindings,
    /// Size of the uniform block in bytes.
    pub uniform_size: usize,
    /// Whether `fs` sRGB-encodes its output.
    pub encode_srgb: bool,
}

impl ProgramSource {
    /// Names of the merged effects, in execution order.
    pub fn effect_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.effect.clone()).collect()
    }

    /// Whether `other` compiles to the same program. The label is not compared.
    pub fn same_program(&self, other: &ProgramSource) -> bool {
        self.wgsl == other.wgsl
            && self.stages == other.stages
            && self.bindings == other.bindings
            && self.uniform_size == other.uniform_size
            && self.encode_srgb == other.encode_srgb
    }

    /// Builds a compilation error for this program.
    pub fn compilation_error(&self, message: impl Into<String>) -> FxError {
        FxError::Compilation {
            pass: self.label.clone(),
            effects: self.effect_names(),
            message: message.into(),
            wgsl: self.wgsl.clone(),
        }
    }

    /// Reads an `f32` at `offset` from a uniform block laid out for this program.
    pub fn read_f32(block: &[u8], offset: usize) -> f32 {
        block
            .get(offset..offset + 4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .unwrap_or(0.0)
    }

    /// Reads a full slot at `offset`.
    pub fn read_slot(block: &[u8], offset: usize) -> [f32; 4] {
        [
            Self::read_f32(block, offset),
            Self::read_f32(block, offset + 4),
            Self::read_f32(block, offset + 8),
            Self::read_f32(block, offset + 12),
        ]
    }
}
