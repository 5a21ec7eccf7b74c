//! A CPU reference implementation of [`RenderDevice`].
//!
//! Programs are not executed from their WGSL. Instead every [`ProgramStage`] is
//! evaluated with a [`Kernel`] registered under the stage's effect name, and the stage
//! outputs are combined with [`BlendFunction::apply`], the CPU twin of the generated
//! blend code. The WGSL is still validated with naga at compile time, so a program that
//! runs here is also a program the GPU would accept.

use std::any::Any;

use glam::{Vec2, Vec4};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use super::{
    ColorSpace, DrawCall, ProgramId, RenderDevice, RenderOutput, TargetDescriptor, TargetId,
    TextureDescriptor, TextureId,
};
use crate::effect::{BlendFunction, DepthPacking, EffectAttributes};
use crate::error::{FxError, Result};
use crate::shader::{FrameUniforms, ProgramSource, ProgramStage, validate_program};

/// Per-pixel function standing in for an effect's `transform`.
pub type Kernel = Box<dyn Fn(&KernelInput<'_>) -> Vec4>;

/// Everything a kernel can read for one pixel.
pub struct KernelInput<'a> {
    /// The accumulated color entering this stage.
    pub color: Vec4,
    pub uv: Vec2,
    /// Depth in the stage's packing; zero if the stage does not read depth.
    pub depth: f32,
    /// Zero if the stage does not read velocity.
    pub velocity: Vec2,
    pub frame: &'a FrameUniforms,
    stage: &'a ProgramStage,
    uniforms: &'a [u8],
    input: Option<&'a Image>,
    textures: &'a [Option<&'a Image>],
}

impl KernelInput<'_> {
    /// Raw slot of a uniform, including the implicit `opacity` and `texel_size`.
    pub fn uniform(&self, name: &str) -> Vec4 {
        let offset = match name {
            "opacity" => Some(self.stage.opacity_offset),
            "texel_size" => Some(self.stage.texel_size_offset),
            _ => self.stage.uniforms.iter().find(|u| u.name == name).map(|u| u.offset),
        };
        offset
            .map(|o| Vec4::from_array(ProgramSource::read_slot(self.uniforms, o)))
            .unwrap_or(Vec4::ZERO)
    }

    pub fn uniform_f32(&self, name: &str) -> f32 {
        self.uniform(name).x
    }

    /// Value of one of the stage's defines.
    pub fn define(&self, name: &str) -> Option<&str> {
        self.stage
            .defines
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The stage's texel size.
    pub fn texel(&self) -> Vec2 {
        self.uniform("texel_size").truncate().truncate()
    }

    /// Samples the pass input, like `fx_sample_input`.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        self.input.map_or(Vec4::ZERO, |image| image.sample(uv))
    }

    /// Size of one of the stage's custom textures.
    pub fn texture_size(&self, name: &str) -> Option<(u32, u32)> {
        self.stage
            .textures
            .iter()
            .position(|t| t == name)
            .and_then(|i| self.textures.get(i).copied().flatten())
            .map(|image| (image.width, image.height))
    }

    /// Samples one of the stage's custom textures.
    pub fn texture(&self, name: &str, uv: Vec2) -> Vec4 {
        self.stage
            .textures
            .iter()
            .position(|t| t == name)
            .and_then(|i| self.textures.get(i).copied().flatten())
            .map_or(Vec4::ZERO, |image| image.sample(uv))
    }
}

/// A CPU-side image.
#[derive(Debug, Clone)]
struct Image {
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    color_space: ColorSpace,
    pixels: Vec<Vec4>,
}

impl Image {
    fn new(width: u32, height: u32, format: wgpu::TextureFormat, color_space: ColorSpace) -> Self {
        let fill = if format.is_depth_stencil_format() { Vec4::ONE } else { Vec4::ZERO };
        Self {
            width,
            height,
            format,
            color_space,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    fn fetch(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.pixels[self.index(x, y)]
    }

    /// Bilinear, clamp-to-edge.
    fn sample(&self, uv: Vec2) -> Vec4 {
        let (x0, tx) = texel_coord(uv.x, self.width);
        let (y0, ty) = texel_coord(uv.y, self.height);
        let top = self.fetch(x0, y0).lerp(self.fetch(x0 + 1, y0), tx);
        let bottom = self.fetch(x0, y0 + 1).lerp(self.fetch(x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }

    /// Nearest texel, like `textureLoad` with a clamped coordinate.
    fn load(&self, uv: Vec2) -> Vec4 {
        let x = (uv.x * self.width as f32) as i64;
        let y = (uv.y * self.height as f32) as i64;
        self.fetch(x, y)
    }

    fn store(&mut self, x: u32, y: u32, value: Vec4) {
        let value = if is_unorm(self.format) {
            value.clamp(Vec4::ZERO, Vec4::ONE)
        } else {
            value
        };
        let i = self.index(x, y);
        self.pixels[i] = value;
    }
}

/// Integer texel and interpolation weight of a normalized coordinate.
///
/// Weights within `1e-4` of a texel center snap to it, so sampling at exact pixel
/// centers reproduces the source bit for bit.
fn texel_coord(u: f32, size: u32) -> (i64, f32) {
    let f = u * size as f32 - 0.5;
    let base = f.floor();
    let t = f - base;
    if t < 1e-4 {
        (base as i64, 0.0)
    } else if t > 1.0 - 1e-4 {
        (base as i64 + 1, 0.0)
    } else {
        (base as i64, t)
    }
}

fn is_unorm(format: wgpu::TextureFormat) -> bool {
    use wgpu::TextureFormat as F;
    matches!(
        format,
        F::R8Unorm | F::Rg8Unorm | F::Rgba8Unorm | F::Rgba8UnormSrgb | F::Bgra8Unorm | F::Bgra8UnormSrgb
    )
}

pub(super) fn linear_to_srgb(color: Vec4) -> Vec4 {
    let encode = |c: f32| {
        let c = c.clamp(0.0, 1.0);
        if c <= 0.0031308 {
            c * 12.92
        } else {
            1.055 * c.powf(1.0 / 2.4) - 0.055
        }
    };
    Vec4::new(encode(color.x), encode(color.y), encode(color.z), color.w)
}

fn linearize_depth(depth: f32, frame: &FrameUniforms) -> f32 {
    let (near, far) = (frame.camera_near, frame.camera_far);
    near * far / (far - depth * (far - near)).max(1e-6)
}

/// Decodes tightly packed texels into colors.
fn decode_texels(desc: &TextureDescriptor, data: &[u8]) -> Option<Vec<Vec4>> {
    use wgpu::TextureFormat as F;
    let count = desc.width as usize * desc.height as usize;
    let pixels: Vec<Vec4> = match desc.format {
        F::Rgba8Unorm | F::Rgba8UnormSrgb => data
            .chunks_exact(4)
            .map(|c| Vec4::new(c[0] as f32, c[1] as f32, c[2] as f32, c[3] as f32) / 255.0)
            .collect(),
        F::Bgra8Unorm | F::Bgra8UnormSrgb => data
            .chunks_exact(4)
            .map(|c| Vec4::new(c[2] as f32, c[1] as f32, c[0] as f32, c[3] as f32) / 255.0)
            .collect(),
        F::R8Unorm => data.iter().map(|&v| Vec4::new(v as f32 / 255.0, 0.0, 0.0, 1.0)).collect(),
        F::Rgba32Float => data
            .chunks_exact(16)
            .map(|c| Vec4::from_array(bytemuck::pod_read_unaligned::<[f32; 4]>(c)))
            .collect(),
        _ => return None,
    };
    (pixels.len() == count).then_some(pixels)
}

/// Counters of device work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub frames: u64,
    pub aborted_frames: u64,
    pub draws: u64,
    pub clears: u64,
    pub compilations: u64,
    pub target_allocations: u64,
}

/// CPU device for headless runs and tests.
pub struct SoftwareDevice {
    screen: Image,
    back: Option<Image>,
    targets: SlotMap<TargetId, Image>,
    textures: SlotMap<TextureId, Image>,
    programs: SlotMap<ProgramId, ProgramSource>,
    kernels: FxHashMap<String, Kernel>,
    target_budget: Option<usize>,
    stats: DeviceStats,
}

impl SoftwareDevice {
    /// A device with a linear `width` x `height` screen.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: Image::new(width, height, wgpu::TextureFormat::Rgba8UnormSrgb, ColorSpace::Linear),
            back: None,
            targets: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            kernels: FxHashMap::default(),
            target_budget: None,
            stats: DeviceStats::default(),
        }
    }

    /// Makes the screen expect sRGB-encoded values, like a non-sRGB surface format.
    pub fn with_screen_color_space(mut self, color_space: ColorSpace) -> Self {
        self.screen.color_space = color_space;
        self.screen.format = match color_space {
            ColorSpace::Linear => wgpu::TextureFormat::Rgba8UnormSrgb,
            ColorSpace::Srgb => wgpu::TextureFormat::Rgba8Unorm,
        };
        self
    }

    /// Registers the kernel evaluating effects called `effect`.
    pub fn register_kernel<F>(&mut self, effect: impl Into<String>, kernel: F)
    where
        F: Fn(&KernelInput<'_>) -> Vec4 + 'static,
    {
        self.kernels.insert(effect.into(), Box::new(kernel));
    }

    /// Caps the number of live render targets. Allocations beyond it fail with
    /// [`FxError::ResourceExhaustion`].
    pub fn set_target_budget(&mut self, budget: Option<usize>) {
        self.target_budget = budget;
    }

    /// Resizes the screen, discarding its content.
    pub fn resize_screen(&mut self, width: u32, height: u32) {
        self.screen = Image::new(width, height, self.screen.format, self.screen.color_space);
    }

    /// Fills a color target with one value per pixel, row by row from the top.
    pub fn write_color(&mut self, target: TargetId, pixels: &[Vec4]) -> Result<()> {
        let image = self.target_image_mut(target)?;
        if pixels.len() != image.pixels.len() {
            return Err(FxError::config(
                "software device",
                format!("expected {} pixels, got {}", image.pixels.len(), pixels.len()),
            ));
        }
        image.pixels.copy_from_slice(pixels);
        Ok(())
    }

    /// Fills a color target with a single color.
    pub fn fill_color(&mut self, target: TargetId, color: Vec4) -> Result<()> {
        let image = self.target_image_mut(target)?;
        image.pixels.fill(color);
        Ok(())
    }

    /// Fills a depth target, row by row from the top.
    pub fn write_depth(&mut self, target: TargetId, depth: &[f32]) -> Result<()> {
        let pixels: Vec<Vec4> = depth.iter().map(|&d| Vec4::new(d, 0.0, 0.0, 1.0)).collect();
        self.write_color(target, &pixels)
    }

    /// Pixels of a target.
    pub fn read_target(&self, target: TargetId) -> Option<&[Vec4]> {
        self.targets.get(target).map(|i| i.pixels.as_slice())
    }

    /// Pixels of the last presented frame.
    pub fn screen_pixels(&self) -> &[Vec4] {
        &self.screen.pixels
    }

    pub fn screen_pixel(&self, x: u32, y: u32) -> Vec4 {
        self.screen.pixels[self.screen.index(x, y)]
    }

    pub fn target_size(&self, target: TargetId) -> Option<(u32, u32)> {
        self.targets.get(target).map(|i| (i.width, i.height))
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Sizes of all live targets.
    pub fn target_sizes(&self) -> Vec<(u32, u32)> {
        self.targets.values().map(|i| (i.width, i.height)).collect()
    }

    pub fn program(&self, id: ProgramId) -> Option<&ProgramSource> {
        self.programs.get(id)
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    fn target_image_mut(&mut self, target: TargetId) -> Result<&mut Image> {
        self.targets
            .get_mut(target)
            .ok_or_else(|| FxError::config("software device", "unknown render target"))
    }

    fn output_image(&self, output: RenderOutput) -> Option<&Image> {
        match output {
            RenderOutput::Screen => self.back.as_ref(),
            RenderOutput::Target(id) => self.targets.get(id),
        }
    }
}

impl RenderDevice for SoftwareDevice {
    fn screen_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn color_space(&self, output: RenderOutput) -> ColorSpace {
        match output {
            RenderOutput::Screen => self.screen.color_space,
            RenderOutput::Target(id) => self.targets.get(id).map_or(ColorSpace::Linear, |i| i.color_space),
        }
    }

    fn create_target(&mut self, desc: &TargetDescriptor) -> Result<TargetId> {
        if let Some(budget) = self.target_budget {
            if self.targets.len() >= budget {
                return Err(FxError::exhausted(
                    desc.label.clone(),
                    format!("target budget of {budget} reached"),
                ));
            }
        }
        self.stats.target_allocations += 1;
        Ok(self
            .targets
            .insert(Image::new(desc.width, desc.height, desc.format, desc.color_space)))
    }

    fn destroy_target(&mut self, id: TargetId) {
        self.targets.remove(id);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor, data: &[u8]) -> Result<TextureId> {
        let pixels = decode_texels(desc, data).ok_or_else(|| {
            FxError::config(
                format!("texture '{}'", desc.label),
                format!("cannot decode {} bytes of {:?}", data.len(), desc.format),
            )
        })?;
        let mut image = Image::new(desc.width, desc.height, desc.format, ColorSpace::Linear);
        image.pixels = pixels;
        Ok(self.textures.insert(image))
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(id);
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        validate_program(source)?;
        if let Some(stage) = source.stages.iter().find(|s| !self.kernels.contains_key(&s.effect)) {
            return Err(source.compilation_error(format!(
                "no kernel registered for effect '{}'",
                stage.effect
            )));
        }
        self.stats.compilations += 1;
        Ok(self.programs.insert(source.clone()))
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(id);
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.back = Some(self.screen.clone());
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let context = || format!("pass '{}'", call.label);
        let program = self
            .programs
            .get(call.program)
            .ok_or_else(|| FxError::config(context(), "unknown program"))?;
        if call.uniforms.len() < program.uniform_size {
            return Err(FxError::config(
                context(),
                format!("uniform block is {} bytes, program needs {}", call.uniforms.len(), program.uniform_size),
            ));
        }
        if let (Some(input), RenderOutput::Target(output)) = (call.input, call.output) {
            if input == output {
                return Err(FxError::config(context(), "input and output are the same buffer"));
            }
        }

        let frame: FrameUniforms =
            bytemuck::pod_read_unaligned(&call.uniforms[..std::mem::size_of::<FrameUniforms>()]);
        let (width, height) = {
            let out = self
                .output_image(call.output)
                .ok_or_else(|| FxError::config(context(), "output is not available"))?;
            (out.width, out.height)
        };
        let encode = program.encode_srgb;

        let input = call.input.and_then(|id| self.targets.get(id));
        let depth = call.depth.and_then(|id| self.targets.get(id));
        let velocity = call.velocity.and_then(|id| self.targets.get(id));
        let textures: Vec<Option<&Image>> = call.textures.iter().map(|id| self.textures.get(*id)).collect();

        let mut result = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let uv = Vec2::new((x as f32 + 0.5) / width as f32, (y as f32 + 0.5) / height as f32);
                let raw_depth = depth.map_or(1.0, |d| d.load(uv).x);
                let motion = velocity.map_or(Vec2::ZERO, |v| v.sample(uv).truncate().truncate());

                let mut color = input.map_or(Vec4::ZERO, |i| i.sample(uv));
                let mut texture_base = 0;
                for stage in &program.stages {
                    let stage_textures = textures
                        .get(texture_base..texture_base + stage.textures.len())
                        .unwrap_or(&[]);
                    texture_base += stage.textures.len();

                    let reads_depth = stage.attributes.contains(EffectAttributes::DEPTH);
                    let kernel_input = KernelInput {
                        color,
                        uv,
                        depth: match (reads_depth, stage.depth_packing) {
                            (false, _) => 0.0,
                            (true, DepthPacking::Raw) => raw_depth,
                            (true, DepthPacking::Linear) => linearize_depth(raw_depth, &frame),
                        },
                        velocity: if stage.attributes.contains(EffectAttributes::VELOCITY) {
                            motion
                        } else {
                            Vec2::ZERO
                        },
                        frame: &frame,
                        stage,
                        uniforms: call.uniforms,
                        input,
                        textures: stage_textures,
                    };
                    let Some(kernel) = self.kernels.get(&stage.effect) else {
                        return Err(program.compilation_error(format!(
                            "no kernel registered for effect '{}'",
                            stage.effect
                        )));
                    };
                    let out = kernel(&kernel_input);
                    let opacity = ProgramSource::read_f32(call.uniforms, stage.opacity_offset);
                    color = match stage.blend {
                        BlendFunction::Skip => color,
                        function => function.apply(color, out, opacity),
                    };
                }
                if encode {
                    color = linear_to_srgb(color);
                }
                result.push(color);
            }
        }

        let output = match call.output {
            RenderOutput::Screen => self.back.as_mut(),
            RenderOutput::Target(id) => self.targets.get_mut(id),
        }
        .ok_or_else(|| FxError::config(context(), "output is not available"))?;
        for (i, color) in result.into_iter().enumerate() {
            let (x, y) = ((i as u32) % width, (i as u32) / width);
            output.store(x, y, color);
        }
        self.stats.draws += 1;
        Ok(())
    }

    fn clear(&mut self, output: RenderOutput, color: Option<Vec4>, depth: Option<TargetId>) -> Result<()> {
        if let Some(color) = color {
            let image = match output {
                RenderOutput::Screen => self.back.as_mut(),
                RenderOutput::Target(id) => self.targets.get_mut(id),
            };
            let image = image.ok_or_else(|| FxError::config("clear", "output is not available"))?;
            let color = if image.color_space == ColorSpace::Srgb {
                linear_to_srgb(color)
            } else {
                color
            };
            image.pixels.fill(color);
        }
        if let Some(depth) = depth {
            self.target_image_mut(depth)?.pixels.fill(Vec4::ONE);
        }
        self.stats.clears += 1;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if let Some(back) = self.back.take() {
            self.screen = back;
        }
        self.stats.frames += 1;
        Ok(())
    }

    fn abort_frame(&mut self) {
        self.back = None;
        self.stats.aborted_frames += 1;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_at_pixel_centers_is_exact() {
        let mut image = Image::new(3, 2, wgpu::TextureFormat::Rgba16Float, ColorSpace::Linear);
        for (i, p) in image.pixels.iter_mut().enumerate() {
            *p = Vec4::splat(i as f32 * 0.1);
        }
        for y in 0..2 {
            for x in 0..3 {
                let uv = Vec2::new((x as f32 + 0.5) / 3.0, (y as f32 + 0.5) / 2.0);
                assert_eq!(image.sample(uv), image.pixels[y * 3 + x]);
            }
        }
    }

    #[test]
    fn unorm_targets_clamp() {
        let mut image = Image::new(1, 1, wgpu::TextureFormat::Rgba8Unorm, ColorSpace::Linear);
        image.store(0, 0, Vec4::new(1.5, -0.5, 0.5, 1.0));
        assert_eq!(image.pixels[0], Vec4::new(1.0, 0.0, 0.5, 1.0));
    }

    #[test]
    fn srgb_encoding_matches_reference_points() {
        let encoded = linear_to_srgb(Vec4::new(0.0, 1.0, 0.0031308, 0.5));
        assert_eq!(encoded.x, 0.0);
        assert!((encoded.y - 1.0).abs() < 1e-6);
        assert!((encoded.z - 0.0031308 * 12.92).abs() < 1e-6);
        assert_eq!(encoded.w, 0.5);
    }

    #[test]
    fn target_budget_exhausts() {
        let mut device = SoftwareDevice::new(2, 2);
        device.set_target_budget(Some(1));
        let desc = TargetDescriptor::new("t", 2, 2, wgpu::TextureFormat::Rgba8Unorm);
        device.create_target(&desc).unwrap();
        assert!(device.create_target(&desc).unwrap_err().is_resource_exhaustion());
    }
}
