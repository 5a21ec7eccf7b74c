//! Stock effects.
//!
//! Each constructor returns a ready-to-use [`Effect`] whose WGSL lives next to this file.
//! [`register_kernels`] installs the matching CPU kernels on a [`SoftwareDevice`], so the
//! same effects can run headless.
//!
//! | Effect | Attributes | Uniforms |
//! |--------|------------|----------|
//! | [`vignette`] | | `vignette_offset`, `vignette_darkness` |
//! | [`brightness_contrast`] | | `brightness`, `contrast` |
//! | [`tone_mapping`] | | `exposure`; define `MODE` |
//! | [`box_blur`] | convolution | `blur_radius` |
//! | [`depth_fog`] | depth (linear) | `fog_color`, `fog_density` |
//! | [`color_lut`] | | texture `lut` |
//! | [`motion_blur`] | velocity, convolution | `motion_strength` |
//! | [`gradient`] | | `gradient_top`, `gradient_bottom` |

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::device::{KernelInput, SoftwareDevice, TextureDescriptor};
use crate::effect::{BlendFunction, DepthPacking, Effect, EffectAttributes};

const VIGNETTE: &str = include_str!("shaders/vignette.wgsl");
const BRIGHTNESS_CONTRAST: &str = include_str!("shaders/brightness_contrast.wgsl");
const TONE_MAPPING: &str = include_str!("shaders/tone_mapping.wgsl");
const BOX_BLUR: &str = include_str!("shaders/box_blur.wgsl");
const DEPTH_FOG: &str = include_str!("shaders/depth_fog.wgsl");
const COLOR_LUT: &str = include_str!("shaders/color_lut.wgsl");
const MOTION_BLUR: &str = include_str!("shaders/motion_blur.wgsl");
const GRADIENT: &str = include_str!("shaders/gradient.wgsl");

/// Samples taken along the velocity by [`motion_blur`].
const MOTION_SAMPLES: i32 = 8;

/// Tone mapping operator, selected at compile time through the `MODE` define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToneMapping {
    /// `x / (1 + x)`.
    #[default]
    Reinhard,
    /// Narkowicz's fit of the ACES filmic curve.
    Aces,
}

impl ToneMapping {
    fn define(self) -> &'static str {
        match self {
            Self::Reinhard => "0",
            Self::Aces => "1",
        }
    }
}

pub fn vignette(offset: f32, darkness: f32) -> Effect {
    Effect::from_checked("vignette", VIGNETTE)
        .with_uniform("vignette_offset", offset)
        .with_uniform("vignette_darkness", darkness)
}

/// Shifts brightness, then scales contrast around mid grey. Both default to 0.
pub fn brightness_contrast(brightness: f32, contrast: f32) -> Effect {
    Effect::from_checked("brightness_contrast", BRIGHTNESS_CONTRAST)
        .with_uniform("brightness", brightness)
        .with_uniform("contrast", contrast)
}

/// Maps HDR input into `[0, 1]`. Exposure starts at 1 and can be changed with
/// `set_uniform("exposure", ..)`; switching the operator is a structural change.
pub fn tone_mapping(mode: ToneMapping) -> Effect {
    Effect::from_checked("tone_mapping", TONE_MAPPING)
        .with_uniform("exposure", 1.0)
        .with_define("MODE", mode.define())
}

/// Box blur over a `(2 * radius + 1)^2` window.
///
/// Reads neighboring pixels of its input, so it always gets a pass of its own.
pub fn box_blur(radius: u32) -> Effect {
    Effect::from_checked("box_blur", BOX_BLUR)
        .with_attributes(EffectAttributes::CONVOLUTION)
        .with_uniform("blur_radius", radius as f32)
}

/// Exponential fog over linearized depth. Needs a depth buffer written by the scene.
pub fn depth_fog(color: Vec3, density: f32) -> Effect {
    Effect::from_checked("depth_fog", DEPTH_FOG)
        .with_attributes(EffectAttributes::DEPTH)
        .with_depth_packing(DepthPacking::Linear)
        .with_uniform("fog_color", color)
        .with_uniform("fog_density", density)
}

/// Remaps each channel through a one-row `Rgba8Unorm` curve.
///
/// Entry `k` of `curve` is the output for input `k / (len - 1)`. Curves with fewer than
/// two entries are replaced by the identity.
pub fn color_lut(curve: &[[u8; 4]]) -> Effect {
    let curve: Vec<[u8; 4]> = if curve.len() < 2 {
        vec![[0, 0, 0, 255], [255, 255, 255, 255]]
    } else {
        curve.to_vec()
    };
    let desc = TextureDescriptor {
        label: "color lut".into(),
        width: curve.len() as u32,
        height: 1,
        format: wgpu::TextureFormat::Rgba8Unorm,
    };
    Effect::from_checked("color_lut", COLOR_LUT).with_texture(
        "lut",
        desc,
        curve.into_iter().flatten().collect(),
    )
}

/// Blurs along the velocity buffer written by the scene.
pub fn motion_blur(strength: f32) -> Effect {
    Effect::from_checked("motion_blur", MOTION_BLUR)
        .with_attributes(EffectAttributes::VELOCITY | EffectAttributes::CONVOLUTION)
        .with_uniform("motion_strength", strength)
}

/// Procedural vertical gradient that replaces its input.
pub fn gradient(top: Vec3, bottom: Vec3) -> Effect {
    Effect::from_checked("gradient", GRADIENT)
        .with_blend(BlendFunction::Set)
        .with_uniform("gradient_top", top)
        .with_uniform("gradient_bottom", bottom)
}

/// Registers CPU kernels for every stock effect.
pub fn register_kernels(device: &mut SoftwareDevice) {
    device.register_kernel("vignette", |input| {
        let coord = (input.uv - Vec2::splat(0.5)) * input.uniform_f32("vignette_offset");
        let shade = coord.dot(coord).clamp(0.0, 1.0);
        let edge = Vec3::splat(1.0 - input.uniform_f32("vignette_darkness"));
        input.color.truncate().lerp(edge, shade).extend(input.color.w)
    });

    device.register_kernel("brightness_contrast", |input| {
        let rgb = input.color.truncate() + Vec3::splat(input.uniform_f32("brightness"));
        let contrast = 1.0 + input.uniform_f32("contrast");
        ((rgb - Vec3::splat(0.5)) * contrast + Vec3::splat(0.5)).extend(input.color.w)
    });

    device.register_kernel("tone_mapping", |input| {
        let hdr = input.color.truncate().max(Vec3::ZERO) * input.uniform_f32("exposure");
        let mapped = match input.define("MODE") {
            Some("1") => aces(hdr),
            _ => hdr / (Vec3::ONE + hdr),
        };
        mapped.extend(input.color.w)
    });

    device.register_kernel("box_blur", |input| {
        let radius = input.uniform_f32("blur_radius").max(0.0) as i32;
        let texel = input.texel();
        let mut sum = Vec4::ZERO;
        for j in -radius..=radius {
            for i in -radius..=radius {
                sum += input.sample(input.uv + Vec2::new(i as f32, j as f32) * texel);
            }
        }
        let taps = (2 * radius + 1) * (2 * radius + 1);
        sum / taps as f32
    });

    device.register_kernel("depth_fog", |input| {
        let amount = (1.0 - (-input.depth * input.uniform_f32("fog_density")).exp()).clamp(0.0, 1.0);
        let fog = input.uniform("fog_color").truncate();
        input.color.truncate().lerp(fog, amount).extend(input.color.w)
    });

    device.register_kernel("color_lut", |input| {
        let c = input.color;
        Vec4::new(
            lut_lookup(input, c.x).x,
            lut_lookup(input, c.y).y,
            lut_lookup(input, c.z).z,
            c.w,
        )
    });

    device.register_kernel("motion_blur", |input| {
        let stride = input.velocity * input.uniform_f32("motion_strength");
        let mut sum = Vec4::ZERO;
        for i in 0..MOTION_SAMPLES {
            let t = i as f32 / (MOTION_SAMPLES - 1) as f32 - 0.5;
            sum += input.sample(input.uv + stride * t);
        }
        sum / MOTION_SAMPLES as f32
    });

    device.register_kernel("gradient", |input| {
        let top = input.uniform("gradient_top").truncate();
        let bottom = input.uniform("gradient_bottom").truncate();
        top.lerp(bottom, input.uv.y).extend(1.0)
    });
}

fn aces(x: Vec3) -> Vec3 {
    let (a, b, c, d, e) = (2.51, 0.03, 2.43, 0.59, 0.14);
    ((x * (a * x + Vec3::splat(b))) / (x * (c * x + Vec3::splat(d)) + Vec3::splat(e)))
        .clamp(Vec3::ZERO, Vec3::ONE)
}

fn lut_lookup(input: &KernelInput<'_>, value: f32) -> Vec4 {
    let size = input.texture_size("lut").map_or(2.0, |(w, _)| w as f32);
    let u = value.clamp(0.0, 1.0) * (size - 1.0) / size + 0.5 / size;
    input.texture("lut", Vec2::new(u, 0.5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{AssembleOptions, assemble, validate_program};

    fn all() -> Vec<Effect> {
        vec![
            vignette(1.0, 0.5),
            brightness_contrast(0.1, 0.2),
            tone_mapping(ToneMapping::Aces),
            box_blur(2),
            depth_fog(Vec3::splat(0.7), 0.05),
            color_lut(&[[0, 0, 0, 255], [128, 128, 128, 255], [255, 255, 255, 255]]),
            motion_blur(1.0),
            gradient(Vec3::X, Vec3::Z),
        ]
    }

    #[test]
    fn stock_sources_pass_effect_checks() {
        for effect in all() {
            Effect::new(effect.name(), effect.source()).unwrap();
            effect.validate().unwrap();
        }
    }

    #[test]
    fn every_stock_effect_assembles_to_valid_wgsl() {
        for effect in all() {
            let program = assemble(effect.name(), &[&effect], &AssembleOptions::default()).unwrap();
            validate_program(&program).unwrap_or_else(|e| panic!("{}: {e}\n{}", effect.name(), program.wgsl));
        }
    }

    #[test]
    fn tone_mapping_operators_agree_at_zero_and_saturate() {
        assert_eq!(aces(Vec3::ZERO), Vec3::ZERO);
        assert!(aces(Vec3::splat(100.0)).abs_diff_eq(Vec3::ONE, 1e-6));
    }

    #[test]
    fn short_lut_falls_back_to_identity() {
        let effect = color_lut(&[]);
        assert_eq!(effect.textures()[0].descriptor().width, 2);
    }
}
