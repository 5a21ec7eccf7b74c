//! Merges effect fragments into one WGSL program.
//!
//! The generated module has a fixed skeleton:
//!
//! ```text
//! struct FxUniforms      frame values, then one 16-byte slot per effect uniform
//! bindings 0..=4         uniforms, input, sampler, [depth], [velocity]
//! bindings 5..           custom textures of all stages
//! vs                     full-screen triangle
//! fx_* builtins          helpers effect code may call
//! fx_blend_*             the blend functions in use
//! e{i}_* code            each effect, renamed into its own namespace
//! fs                     color = blend_i(color, transform_i(color, uv, ...), opacity_i)
//! ```
//!
//! Assembly is deterministic: the same ordered effect structure always yields the same
//! source, byte for byte.

use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use super::{
    FRAME_UNIFORMS_SIZE, FrameUniforms, ProgramBindings, ProgramSource, ProgramStage, SLOT_SIZE,
    UniformSlot, rename,
};
use crate::effect::{BlendFunction, DepthPacking, Effect, EffectAttributes, check_merge};
use crate::error::{FxError, Result};

/// Options that select a program variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AssembleOptions {
    /// Encode the final color from linear to sRGB before writing it.
    pub encode_srgb: bool,
}

const HEADER: &str = r#"struct FxVertexOutput {
    @builtin(position) position: vec4f,
    @location(0) uv: vec2f,
}
"#;

const VERTEX: &str = r#"
@vertex
fn vs(@builtin(vertex_index) index: u32) -> FxVertexOutput {
    let x = f32((index << 1u) & 2u);
    let y = f32(index & 2u);
    var result: FxVertexOutput;
    result.position = vec4f(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    result.uv = vec2f(x, 1.0 - y);
    return result;
}
"#;

const BUILTINS: &str = r#"
fn fx_resolution() -> vec2f {
    return fx.resolution;
}

fn fx_texel_size() -> vec2f {
    return fx.texel_size;
}

fn fx_time() -> f32 {
    return fx.time;
}

fn fx_delta() -> f32 {
    return fx.delta;
}

fn fx_sample_input(uv: vec2f) -> vec4f {
    return textureSampleLevel(fx_input, fx_sampler, uv, 0.0);
}

fn fx_linearize_depth(depth: f32) -> f32 {
    let near = fx.camera_near;
    let far = fx.camera_far;
    return near * far / max(far - depth * (far - near), 1e-6);
}

fn fx_linear_to_srgb(color: vec4f) -> vec4f {
    let c = clamp(color.rgb, vec3f(0.0), vec3f(1.0));
    let lo = c * 12.92;
    let hi = 1.055 * pow(c, vec3f(1.0 / 2.4)) - 0.055;
    return vec4f(select(hi, lo, c <= vec3f(0.0031308)), color.a);
}
"#;

const READ_DEPTH: &str = r#"
fn fx_read_depth(uv: vec2f) -> f32 {
    let size = vec2i(textureDimensions(fx_depth));
    let coord = clamp(vec2i(uv * vec2f(size)), vec2i(0), size - vec2i(1));
    return textureLoad(fx_depth, coord, 0);
}
"#;

const READ_VELOCITY: &str = r#"
fn fx_read_velocity(uv: vec2f) -> vec2f {
    return textureSampleLevel(fx_velocity, fx_sampler, uv, 0.0).xy;
}
"#;

/// Assembles the program for the active effects of `effects`, in order.
///
/// Disabled effects and effects blending with [`BlendFunction::Skip`] are left out.
/// Fails with a configuration error if nothing is left or the effects cannot be merged.
pub fn assemble(label: &str, effects: &[&Effect], options: &AssembleOptions) -> Result<ProgramSource> {
    let active: Vec<&Effect> = effects.iter().copied().filter(|e| e.is_active()).collect();
    if active.is_empty() {
        return Err(FxError::config(
            format!("pass '{label}'"),
            "no enabled effects to merge",
        ));
    }
    check_merge(&format!("pass '{label}'"), &active)?;
    for effect in &active {
        effect.validate()?;
    }

    let layout = Layout::new(&active);

    let mut wgsl = String::with_capacity(4096);
    wgsl.push_str(HEADER);
    write_uniform_block(&mut wgsl, &active);
    write_bindings(&mut wgsl, &active, &layout.bindings);
    wgsl.push_str(VERTEX);
    wgsl.push_str(BUILTINS);
    if layout.bindings.depth {
        wgsl.push_str(READ_DEPTH);
    }
    if layout.bindings.velocity {
        wgsl.push_str(READ_VELOCITY);
    }

    let mut blends: Vec<BlendFunction> = Vec::new();
    for effect in &active {
        let function = effect.blend().function;
        if !blends.contains(&function) {
            blends.push(function);
        }
    }
    for function in &blends {
        wgsl.push('\n');
        wgsl.push_str(&function.wgsl());
    }

    for (i, effect) in active.iter().enumerate() {
        let _ = write!(wgsl, "\n// effect {i}: {}\n", effect.name());
        for (name, value) in effect.defines() {
            let _ = writeln!(wgsl, "const e{i}_{name} = {value};");
        }
        wgsl.push_str(&rename::rename_identifiers(effect.source(), &namespace(i, effect)));
        wgsl.push('\n');
    }

    write_fragment(&mut wgsl, &active, &layout, options);

    log::debug!(
        "assembled program '{label}' from {} effect(s), {} bytes of WGSL",
        active.len(),
        wgsl.len()
    );

    Ok(ProgramSource {
        label: label.to_string(),
        wgsl,
        stages: layout.stages,
        bindings: layout.bindings,
        uniform_size: layout.uniform_size,
        encode_srgb: options.encode_srgb,
    })
}

impl ProgramSource {
    /// A program that copies its input to the output unchanged.
    pub fn passthrough(label: &str, options: &AssembleOptions) -> Self {
        let mut wgsl = String::new();
        wgsl.push_str(HEADER);
        write_uniform_block(&mut wgsl, &[]);
        write_bindings(&mut wgsl, &[], &ProgramBindings::default());
        wgsl.push_str(VERTEX);
        wgsl.push_str(BUILTINS);
        write_fragment(&mut wgsl, &[], &Layout::new(&[]), options);

        Self {
            label: label.to_string(),
            wgsl,
            stages: Vec::new(),
            bindings: ProgramBindings::default(),
            uniform_size: FRAME_UNIFORMS_SIZE,
            encode_srgb: options.encode_srgb,
        }
    }

    /// Encodes the uniform block for a frame.
    ///
    /// `effects` are the effects the program was assembled from; inactive ones are
    /// skipped so the rest line up with [`stages`](Self::stages).
    pub fn encode_uniforms(&self, frame: &FrameUniforms, effects: &[&Effect]) -> Vec<u8> {
        let mut block = vec![0u8; self.uniform_size];
        block[..FRAME_UNIFORMS_SIZE].copy_from_slice(bytemuck::bytes_of(frame));

        let active = effects.iter().filter(|e| e.is_active());
        for (stage, effect) in self.stages.iter().zip(active) {
            write_slot(&mut block, stage.opacity_offset, [effect.blend().opacity, 0.0, 0.0, 0.0]);
            let texel = effect.texel_size();
            write_slot(&mut block, stage.texel_size_offset, [texel.x, texel.y, 0.0, 0.0]);
            for slot in &stage.uniforms {
                if let Some(value) = effect.uniform(&slot.name) {
                    write_slot(&mut block, slot.offset, value.to_slot());
                }
            }
        }

        block
    }
}

fn write_slot(block: &mut [u8], offset: usize, value: [f32; 4]) {
    if let Some(dst) = block.get_mut(offset..offset + SLOT_SIZE) {
        dst.copy_from_slice(bytemuck::cast_slice(&value));
    }
}

/// Offsets and bindings derived from the active effects.
struct Layout {
    stages: Vec<ProgramStage>,
    bindings: ProgramBindings,
    uniform_size: usize,
}

impl Layout {
    fn new(active: &[&Effect]) -> Self {
        let mut offset = FRAME_UNIFORMS_SIZE;
        let mut next_slot = || {
            let at = offset;
            offset += SLOT_SIZE;
            at
        };

        let mut bindings = ProgramBindings::default();
        let mut stages = Vec::with_capacity(active.len());

        for effect in active {
            let attributes = effect.attributes();
            bindings.depth |= attributes.contains(EffectAttributes::DEPTH);
            bindings.velocity |= attributes.contains(EffectAttributes::VELOCITY);
            bindings.textures += effect.textures().len() as u32;

            let opacity_offset = next_slot();
            let texel_size_offset = next_slot();
            let uniforms = effect
                .uniforms()
                .iter()
                .map(|u| UniformSlot {
                    name: u.name.clone(),
                    offset: next_slot(),
                    kind: u.value.kind(),
                })
                .collect();

            stages.push(ProgramStage {
                effect: effect.name().to_string(),
                blend: effect.blend().function,
                attributes,
                depth_packing: effect.depth_packing(),
                opacity_offset,
                texel_size_offset,
                uniforms,
                textures: effect.textures().iter().map(|t| t.name().to_string()).collect(),
                defines: effect.defines().to_vec(),
            });
        }

        Self {
            stages,
            bindings,
            uniform_size: offset,
        }
    }
}

/// Identifier map that moves effect `i` into its own namespace.
fn namespace(i: usize, effect: &Effect) -> FxHashMap<String, String> {
    let mut map = FxHashMap::default();
    for name in crate::effect::IMPLICIT_UNIFORMS {
        map.insert(name.to_string(), format!("fx.e{i}_{name}"));
    }
    for uniform in effect.uniforms() {
        map.insert(uniform.name.clone(), format!("fx.e{i}_{}", uniform.name));
    }
    for (name, _) in effect.defines() {
        map.insert(name.clone(), format!("e{i}_{name}"));
    }
    for texture in effect.textures() {
        map.insert(texture.name().to_string(), format!("e{i}_{}", texture.name()));
    }
    // Local declarations shadow uniforms of the same name.
    for name in rename::declared_identifiers(effect.source()) {
        map.insert(name.clone(), format!("e{i}_{name}"));
    }
    map
}

fn write_uniform_block(wgsl: &mut String, active: &[&Effect]) {
    wgsl.push_str(
        "\nstruct FxUniforms {\n    \
         resolution: vec2f,\n    \
         texel_size: vec2f,\n    \
         time: f32,\n    \
         delta: f32,\n    \
         camera_near: f32,\n    \
         camera_far: f32,\n",
    );
    for (i, effect) in active.iter().enumerate() {
        let _ = writeln!(wgsl, "    @align(16) e{i}_opacity: f32,");
        let _ = writeln!(wgsl, "    @align(16) e{i}_texel_size: vec2f,");
        for uniform in effect.uniforms() {
            let _ = writeln!(
                wgsl,
                "    @align(16) e{i}_{}: {},",
                uniform.name,
                uniform.value.kind().wgsl_type()
            );
        }
    }
    wgsl.push_str("}\n");
}

fn write_bindings(wgsl: &mut String, active: &[&Effect], bindings: &ProgramBindings) {
    wgsl.push_str(
        "\n@group(0) @binding(0) var<uniform> fx: FxUniforms;\n\
         @group(0) @binding(1) var fx_input: texture_2d<f32>;\n\
         @group(0) @binding(2) var fx_sampler: sampler;\n",
    );
    if bindings.depth {
        wgsl.push_str("@group(0) @binding(3) var fx_depth: texture_depth_2d;\n");
    }
    if bindings.velocity {
        wgsl.push_str("@group(0) @binding(4) var fx_velocity: texture_2d<f32>;\n");
    }
    let mut binding = 5;
    for (i, effect) in active.iter().enumerate() {
        for texture in effect.textures() {
            let _ = writeln!(
                wgsl,
                "@group(0) @binding({binding}) var e{i}_{}: texture_2d<f32>;",
                texture.name()
            );
            binding += 1;
        }
    }
}

fn write_fragment(wgsl: &mut String, active: &[&Effect], layout: &Layout, options: &AssembleOptions) {
    wgsl.push_str(
        "\n@fragment\nfn fs(vertex: FxVertexOutput) -> @location(0) vec4f {\n    \
         let uv = vertex.uv;\n    \
         var color = fx_sample_input(uv);\n",
    );

    if layout.bindings.depth {
        wgsl.push_str("    let depth = fx_read_depth(uv);\n");
        let linear = active.iter().any(|e| {
            e.attributes().contains(EffectAttributes::DEPTH) && e.depth_packing() == DepthPacking::Linear
        });
        if linear {
            wgsl.push_str("    let linear_depth = fx_linearize_depth(depth);\n");
        }
    }
    if layout.bindings.velocity {
        wgsl.push_str("    let velocity = fx_read_velocity(uv);\n");
    }

    for (i, effect) in active.iter().enumerate() {
        let attributes = effect.attributes();
        let mut args = String::from("color, uv");
        if attributes.contains(EffectAttributes::DEPTH) {
            args.push_str(match effect.depth_packing() {
                DepthPacking::Raw => ", depth",
                DepthPacking::Linear => ", linear_depth",
            });
        }
        if attributes.contains(EffectAttributes::VELOCITY) {
            args.push_str(", velocity");
        }
        let _ = writeln!(
            wgsl,
            "    color = {}(color, e{i}_transform({args}), fx.e{i}_opacity);",
            effect.blend().function.wgsl_fn()
        );
    }

    if options.encode_srgb {
        wgsl.push_str("    return fx_linear_to_srgb(color);\n}\n");
    } else {
        wgsl.push_str("    return color;\n}\n");
    }
}
