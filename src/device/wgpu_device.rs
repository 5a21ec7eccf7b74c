//! [`RenderDevice`] backed by wgpu.
//!
//! Every draw is recorded into its own command encoder and submitted right away, which
//! keeps the device stateless between calls: a failed pass leaves nothing half-recorded
//! behind it.

use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;

use glam::Vec4;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use winit::window::Window;

use super::software::linear_to_srgb;
use super::{
    ColorSpace, DrawCall, ProgramId, RenderDevice, RenderOutput, TargetDescriptor, TargetId,
    TextureDescriptor, TextureId,
};
use crate::error::{FxError, Result};
use crate::shader::{FRAME_UNIFORMS_SIZE, ProgramBindings, ProgramSource, validate_program};

/// Format of the headless screen.
const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

struct GpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// Depth-only view for sampling; `None` for color targets.
    sample_view: Option<wgpu::TextureView>,
    format: wgpu::TextureFormat,
    color_space: ColorSpace,
}

struct GpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct GpuProgram {
    label: String,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: FxHashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    bindings: ProgramBindings,
}

enum Screen {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        frame: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    },
    Headless {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

/// Fallback resources bound when a program's binding has nothing attached.
struct Dummies {
    color: wgpu::TextureView,
    depth: wgpu::TextureView,
}

/// A wgpu rendering context driving either a window surface or an offscreen screen.
///
/// ```no_run
/// use std::sync::Arc;
/// use postfx::{ComposerConfig, EffectComposer, WgpuDevice};
///
/// # fn run(window: Arc<winit::window::Window>) -> postfx::Result<()> {
/// let mut device = WgpuDevice::new(window)?;
/// let mut composer = EffectComposer::new(&mut device, ComposerConfig::default())?;
/// composer.render(&mut device, 1.0 / 60.0)?;
/// # Ok(())
/// # }
/// ```
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    screen: Screen,
    width: u32,
    height: u32,
    sampler: wgpu::Sampler,
    dummies: Dummies,
    targets: SlotMap<TargetId, GpuTarget>,
    textures: SlotMap<TextureId, GpuTexture>,
    programs: SlotMap<ProgramId, GpuProgram>,
}

impl WgpuDevice {
    /// Creates a device presenting to `window`.
    ///
    /// Prefers an sRGB surface format so that linear program output is encoded by the
    /// hardware. On surfaces without one, programs writing to the screen encode their
    /// output themselves.
    pub fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = request_device(&adapter)?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| FxError::config("surface", "adapter reports no surface formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            "surface configured: {}x{} {:?}",
            config.width,
            config.height,
            config.format
        );

        let (width, height) = (config.width, config.height);
        Ok(Self::from_parts(
            device,
            queue,
            Screen::Window {
                surface,
                config,
                frame: None,
            },
            width,
            height,
        ))
    }

    /// Creates a device whose screen is an offscreen `Rgba8UnormSrgb` texture.
    ///
    /// Useful for tests and batch rendering; read the result back with
    /// [`read_screen`](Self::read_screen).
    pub fn headless(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(FxError::config("headless screen", "size must be non-zero"));
        }
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;
        let (device, queue) = request_device(&adapter)?;
        let (texture, view) = create_headless_screen(&device, width, height);
        Ok(Self::from_parts(
            device,
            queue,
            Screen::Headless { texture, view },
            width,
            height,
        ))
    }

    fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
        screen: Screen,
        width: u32,
        height: u32,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("postfx linear clamp sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let dummy = |label: &str, format: wgpu::TextureFormat| {
            device
                .create_texture(&texture_descriptor(
                    label,
                    1,
                    1,
                    format,
                    wgpu::TextureUsages::TEXTURE_BINDING,
                ))
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        let dummies = Dummies {
            color: dummy("postfx dummy color", wgpu::TextureFormat::Rgba8Unorm),
            depth: dummy("postfx dummy depth", wgpu::TextureFormat::Depth32Float),
        };

        Self {
            device,
            queue,
            screen,
            width,
            height,
            sampler,
            dummies,
            targets: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            programs: SlotMap::with_key(),
        }
    }

    /// The underlying wgpu device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// The underlying wgpu queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Format of the screen.
    pub fn screen_format(&self) -> wgpu::TextureFormat {
        match &self.screen {
            Screen::Window { config, .. } => config.format,
            Screen::Headless { .. } => HEADLESS_FORMAT,
        }
    }

    /// View of a render target, for callbacks that record their own wgpu work.
    pub fn target_view(&self, id: TargetId) -> Option<&wgpu::TextureView> {
        self.targets.get(id).map(|t| &t.view)
    }

    /// Number of live render targets.
    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    /// Number of live compiled programs.
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Resizes the screen. Zero sizes are ignored (minimized windows report them).
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        match &mut self.screen {
            Screen::Window { surface, config, .. } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Screen::Headless { texture, view } => {
                (*texture, *view) = create_headless_screen(&self.device, width, height);
            }
        }
    }

    /// Copies the headless screen back to the CPU.
    pub fn read_screen(&self) -> Result<image::RgbaImage> {
        let Screen::Headless { texture, .. } = &self.screen else {
            return Err(FxError::config("read_screen", "only headless screens can be read back"));
        };

        let unpadded = self.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("postfx screen readback"),
            size: u64::from(padded) * u64::from(self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("postfx readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            extent(self.width, self.height),
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let mapped = loop {
            self.device
                .poll(wgpu::PollType::Poll)
                .map_err(|e| FxError::exhausted("screen readback", e.to_string()))?;
            match rx.try_recv() {
                Ok(result) => break result,
                Err(mpsc::TryRecvError::Empty) => std::thread::yield_now(),
                Err(mpsc::TryRecvError::Disconnected) => {
                    return Err(FxError::exhausted("screen readback", "map callback dropped"));
                }
            }
        };
        mapped.map_err(|e| FxError::exhausted("screen readback", e.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded * self.height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();

        image::RgbaImage::from_raw(self.width, self.height, pixels)
            .ok_or_else(|| FxError::config("read_screen", "readback size mismatch"))
    }

    /// Writes the headless screen to a PNG file.
    pub fn save_screenshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = self.read_screen()?;
        image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    fn output_view(&self, output: RenderOutput) -> Result<(&wgpu::TextureView, wgpu::TextureFormat)> {
        match output {
            RenderOutput::Screen => match &self.screen {
                Screen::Window { config, frame, .. } => frame
                    .as_ref()
                    .map(|(_, view)| (view, config.format))
                    .ok_or_else(|| FxError::config("screen", "no frame in flight")),
                Screen::Headless { view, .. } => Ok((view, HEADLESS_FORMAT)),
            },
            RenderOutput::Target(id) => {
                let target = self
                    .targets
                    .get(id)
                    .ok_or_else(|| FxError::config("render output", "unknown target"))?;
                if target.sample_view.is_some() {
                    return Err(FxError::config("render output", "cannot draw into a depth target"));
                }
                Ok((&target.view, target.format))
            }
        }
    }

    fn color_view(&self, id: Option<TargetId>, context: &str) -> Result<&wgpu::TextureView> {
        match id {
            None => Ok(&self.dummies.color),
            Some(id) => match self.targets.get(id) {
                Some(t) if t.sample_view.is_none() => Ok(&t.view),
                Some(_) => Err(FxError::config(context, "expected a color target")),
                None => Err(FxError::config(context, "unknown target")),
            },
        }
    }

    fn depth_view(&self, id: Option<TargetId>) -> Result<&wgpu::TextureView> {
        match id {
            None => Ok(&self.dummies.depth),
            Some(id) => self
                .targets
                .get(id)
                .and_then(|t| t.sample_view.as_ref())
                .ok_or_else(|| FxError::config("depth input", "expected a depth target")),
        }
    }

    /// Ensures a pipeline for `format` exists, reporting pipeline errors as compilation
    /// errors.
    fn ensure_pipeline(&mut self, id: ProgramId, format: wgpu::TextureFormat) -> Result<()> {
        let program = self
            .programs
            .get_mut(id)
            .ok_or_else(|| FxError::config("draw", "unknown program"))?;
        if program.pipelines.contains_key(&format) {
            return Ok(());
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = create_pipeline(&self.device, program, format);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FxError::Compilation {
                pass: program.label.clone(),
                effects: Vec::new(),
                message: error.to_string(),
                wgsl: String::new(),
            });
        }
        log::debug!("created pipeline for '{}' ({format:?})", program.label);
        program.pipelines.insert(format, pipeline);
        Ok(())
    }

    fn submit_pass(
        &self,
        label: &str,
        color: Option<(&wgpu::TextureView, wgpu::LoadOp<wgpu::Color>)>,
        depth: Option<(&wgpu::TextureView, bool)>,
        draw: Option<(&wgpu::RenderPipeline, &wgpu::BindGroup)>,
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let color_attachment = color.map(|(view, load)| wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            });
            let depth_attachment =
                depth.map(|(view, stencil)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: stencil.then_some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                });
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[color_attachment],
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some((pipeline, bind_group)) = draw {
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

impl RenderDevice for WgpuDevice {
    fn screen_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn color_space(&self, output: RenderOutput) -> ColorSpace {
        match output {
            RenderOutput::Screen if self.screen_format().is_srgb() => ColorSpace::Linear,
            RenderOutput::Screen => ColorSpace::Srgb,
            RenderOutput::Target(id) => self
                .targets
                .get(id)
                .map_or(ColorSpace::Linear, |t| t.color_space),
        }
    }

    fn create_target(&mut self, desc: &TargetDescriptor) -> Result<TargetId> {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&texture_descriptor(
            &desc.label,
            desc.width,
            desc.height,
            desc.format,
            usage,
        ));
        let invalid = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = oom {
            return Err(FxError::exhausted(desc.label.clone(), error.to_string()));
        }
        if let Some(error) = invalid {
            return Err(FxError::config(format!("target '{}'", desc.label), error.to_string()));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sample_view = desc.is_depth().then(|| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&desc.label),
                aspect: wgpu::TextureAspect::DepthOnly,
                ..Default::default()
            })
        });
        log::debug!(
            "allocated target '{}' {}x{} {:?}",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        Ok(self.targets.insert(GpuTarget {
            texture,
            view,
            sample_view,
            format: desc.format,
            color_space: desc.color_space,
        }))
    }

    fn destroy_target(&mut self, id: TargetId) {
        if let Some(target) = self.targets.remove(id) {
            target.texture.destroy();
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor, data: &[u8]) -> Result<TextureId> {
        let context = || format!("texture '{}'", desc.label);
        let filterable = matches!(
            desc.format.sample_type(None, Some(self.device.features())),
            Some(wgpu::TextureSampleType::Float { filterable: true })
        );
        if !filterable {
            return Err(FxError::config(
                context(),
                format!("{:?} cannot be sampled with a filtering sampler", desc.format),
            ));
        }
        let block = desc.format.block_copy_size(None).unwrap_or(0);
        let expected = desc.width as usize * desc.height as usize * block as usize;
        if data.len() != expected {
            return Err(FxError::config(
                context(),
                format!("expected {expected} bytes, got {}", data.len()),
            ));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&texture_descriptor(
            &desc.label,
            desc.width,
            desc.height,
            desc.format,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        ));
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(FxError::exhausted(desc.label.clone(), error.to_string()));
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(desc.width * block),
                rows_per_image: Some(desc.height),
            },
            extent(desc.width, desc.height),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(self.textures.insert(GpuTexture {
            _texture: texture,
            view,
        }))
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(id);
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        validate_program(source)?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&source.label),
            source: wgpu::ShaderSource::Wgsl(source.wgsl.as_str().into()),
        });
        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&source.label),
                entries: &layout_entries(&source.bindings),
            });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&source.label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let uniform_size = source.uniform_size.max(FRAME_UNIFORMS_SIZE).next_multiple_of(16);
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&source.label),
            size: uniform_size as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut program = GpuProgram {
            label: source.label.clone(),
            module,
            bind_group_layout,
            pipeline_layout,
            pipelines: FxHashMap::default(),
            uniform_buffer,
            bindings: source.bindings,
        };
        // The screen format is the most common output; building it now surfaces
        // pipeline errors at compile time.
        let format = self.screen_format();
        let pipeline = create_pipeline(&self.device, &program, format);
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(source.compilation_error(error.to_string()));
        }
        program.pipelines.insert(format, pipeline);

        log::debug!("compiled program '{}' ({:?})", source.label, source.effect_names());
        Ok(self.programs.insert(program))
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(id);
    }

    fn begin_frame(&mut self) -> Result<()> {
        let Screen::Window {
            surface,
            config,
            frame,
        } = &mut self.screen
        else {
            return Ok(());
        };
        let texture = match surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost; reconfiguring");
                surface.configure(&self.device, config);
                surface.get_current_texture()?
            }
            Err(error) => return Err(error.into()),
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        *frame = Some((texture, view));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<()> {
        let (_, format) = self.output_view(call.output)?;
        self.ensure_pipeline(call.program, format)?;

        let context = format!("pass '{}'", call.label);
        let program = self
            .programs
            .get(call.program)
            .ok_or_else(|| FxError::config(context.as_str(), "unknown program"))?;
        if call.textures.len() != program.bindings.textures as usize {
            return Err(FxError::config(
                context,
                format!(
                    "program binds {} textures, draw supplies {}",
                    program.bindings.textures,
                    call.textures.len()
                ),
            ));
        }
        if call.input.is_some() && call.input.map(RenderOutput::Target) == Some(call.output) {
            return Err(FxError::config(context, "input and output are the same buffer"));
        }

        self.queue
            .write_buffer(&program.uniform_buffer, 0, call.uniforms);

        let input = self.color_view(call.input, &context)?;
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: program.uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(input),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            },
        ];
        if program.bindings.depth {
            entries.push(wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(self.depth_view(call.depth)?),
            });
        }
        if program.bindings.velocity {
            entries.push(wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::TextureView(
                    self.color_view(call.velocity, &context)?,
                ),
            });
        }
        for (i, id) in call.textures.iter().enumerate() {
            let view = self
                .textures
                .get(*id)
                .map(|t| &t.view)
                .ok_or_else(|| FxError::config(context.as_str(), "unknown texture"))?;
            entries.push(wgpu::BindGroupEntry {
                binding: 5 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(call.label),
            layout: &program.bind_group_layout,
            entries: &entries,
        });
        let pipeline = program
            .pipelines
            .get(&format)
            .ok_or_else(|| FxError::config(context.as_str(), "missing pipeline"))?;
        let (view, _) = self.output_view(call.output)?;
        self.submit_pass(
            call.label,
            Some((view, wgpu::LoadOp::Clear(wgpu::Color::BLACK))),
            None,
            Some((pipeline, &bind_group)),
        );
        Ok(())
    }

    fn clear(&mut self, output: RenderOutput, color: Option<Vec4>, depth: Option<TargetId>) -> Result<()> {
        let color = match color {
            Some(value) => {
                let value = match self.color_space(output) {
                    ColorSpace::Srgb => linear_to_srgb(value),
                    ColorSpace::Linear => value,
                };
                let (view, _) = self.output_view(output)?;
                let clear = wgpu::Color {
                    r: f64::from(value.x),
                    g: f64::from(value.y),
                    b: f64::from(value.z),
                    a: f64::from(value.w),
                };
                Some((view, wgpu::LoadOp::Clear(clear)))
            }
            None => None,
        };
        let depth = match depth {
            Some(id) => {
                let target = self
                    .targets
                    .get(id)
                    .filter(|t| t.sample_view.is_some())
                    .ok_or_else(|| FxError::config("clear", "expected a depth target"))?;
                Some((&target.view, target.format.has_stencil_aspect()))
            }
            None => None,
        };
        if color.is_none() && depth.is_none() {
            return Ok(());
        }
        self.submit_pass("postfx clear", color, depth, None);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if let Screen::Window { frame, .. } = &mut self.screen {
            if let Some((texture, _view)) = frame.take() {
                texture.present();
            }
        }
        Ok(())
    }

    fn abort_frame(&mut self) {
        if let Screen::Window { frame, .. } = &mut self.screen {
            if frame.take().is_some() {
                log::warn!("frame aborted; surface texture discarded");
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    let info = adapter.get_info();
    log::info!("using adapter '{}' ({:?})", info.name, info.backend);
    Ok(pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("postfx device"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: Default::default(),
        trace: Default::default(),
        experimental_features: Default::default(),
    }))?)
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn texture_descriptor<'a>(
    label: &'a str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> wgpu::TextureDescriptor<'a> {
    wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    }
}

fn create_headless_screen(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&texture_descriptor(
        "postfx headless screen",
        width,
        height,
        HEADLESS_FORMAT,
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
    ));
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn layout_entries(bindings: &ProgramBindings) -> Vec<wgpu::BindGroupLayoutEntry> {
    let color = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    };

    let mut entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        color(1),
        wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ];
    if bindings.depth {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 3,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }
    if bindings.velocity {
        entries.push(color(4));
    }
    entries.extend((0..bindings.textures).map(|i| color(5 + i)));
    entries
}

fn create_pipeline(
    device: &wgpu::Device,
    program: &GpuProgram,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&program.label),
        layout: Some(&program.pipeline_layout),
        vertex: wgpu::VertexState {
            module: &program.module,
            entry_point: Some("vs"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.module,
            entry_point: Some("fs"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
