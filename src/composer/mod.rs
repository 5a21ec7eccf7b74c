//! The top-level orchestrator.
//!
//! [`EffectComposer`] owns an ordered list of passes, the ping-pong buffer pair, and the
//! shared depth and velocity buffers, and drives one frame at a time:
//!
//! ```text
//! render(device, delta)
//!   ├─ allocate depth / velocity if a pass needs them
//!   ├─ plan: assign input and output buffers to every enabled pass
//!   ├─ prepare: compile programs, upload textures        (no draws yet)
//!   ├─ execute: begin_frame, pass.render ..., end_frame
//!   └─ commit: flip ping-pong roles, advance time, collect unused programs
//! ```
//!
//! Nothing is committed until the whole frame succeeded, so a failing frame leaves the
//! composer exactly as it was and the next `render` can retry.
//!
//! # Example
//!
//! ```
//! use postfx::{EffectComposer, ComposerConfig, SoftwareDevice, effects};
//!
//! let mut device = SoftwareDevice::new(64, 64);
//! effects::register_kernels(&mut device);
//!
//! let mut composer = EffectComposer::new(&mut device, ComposerConfig::default()).unwrap();
//! composer
//!     .add_effects(vec![effects::vignette(0.3, 0.5), effects::tone_mapping(effects::ToneMapping::Aces)])
//!     .unwrap();
//! composer.render(&mut device, 1.0 / 60.0).unwrap();
//! ```

mod schedule;

use slotmap::SlotMap;

use crate::config::ComposerConfig;
use crate::device::{ColorSpace, RenderDevice, RenderOutput, TargetDescriptor, TargetId};
use crate::effect::{Effect, can_join};
use crate::error::{FxError, Result};
use crate::pass::{Attachments, EffectPass, FrameInfo, Pass, PassContext};
use crate::pool::{BufferHandle, RenderTargetPool};
use crate::shader::ProgramCache;

pub use schedule::{PassSummary, Schedule, ScheduleParams, plan};

slotmap::new_key_type! {
    /// Handle to a pass owned by a composer.
    pub struct PassId;
}

/// Orchestrates a chain of passes over a pair of ping-pong buffers.
pub struct EffectComposer {
    config: ComposerConfig,
    passes: SlotMap<PassId, Box<dyn Pass>>,
    order: Vec<PassId>,
    pool: RenderTargetPool,
    programs: ProgramCache,
    buffers: [BufferHandle; 2],
    depth: Option<BufferHandle>,
    velocity: Option<BufferHandle>,
    read: usize,
    viewport: (u32, u32),
    final_target: Option<TargetId>,
    time: f32,
    frame_index: u64,
    grouped: usize,
    disposed: bool,
}

impl EffectComposer {
    /// Creates a composer sized to the device's screen.
    pub fn new(device: &mut dyn RenderDevice, config: ComposerConfig) -> Result<Self> {
        validate_scale(config.resolution_scale)?;
        let viewport = device.screen_size();
        if viewport.0 == 0 || viewport.1 == 0 {
            return Err(FxError::config(
                "composer",
                format!("invalid screen size {}x{}", viewport.0, viewport.1),
            ));
        }

        let (width, height) = scaled(viewport, config.resolution_scale);
        let mut pool = RenderTargetPool::new();
        let format = config.precision.format();
        let a = pool.acquire(device, &TargetDescriptor::new("composer ping", width, height, format))?;
        let b = match pool.acquire(device, &TargetDescriptor::new("composer pong", width, height, format)) {
            Ok(b) => b,
            Err(err) => {
                pool.clear(device);
                return Err(err);
            }
        };

        let mut composer = Self {
            config,
            passes: SlotMap::with_key(),
            order: Vec::new(),
            pool,
            programs: ProgramCache::new(),
            buffers: [a, b],
            depth: None,
            velocity: None,
            read: 0,
            viewport,
            final_target: None,
            time: 0.0,
            frame_index: 0,
            grouped: 0,
            disposed: false,
        };

        if composer.config.depth_buffer {
            if let Err(err) = composer.ensure_depth(device) {
                composer.pool.clear(device);
                return Err(err);
            }
        }

        log::info!("composer created at {width}x{height} ({:?})", composer.config.precision);
        Ok(composer)
    }

    // ========================================================================
    // Pass list
    // ========================================================================

    /// Appends a pass. Passes run in insertion order.
    pub fn add_pass(&mut self, pass: impl Pass) -> PassId {
        let index = self.order.len();
        self.insert_pass(index, pass)
    }

    /// Inserts a pass at `index` (clamped to the list length).
    pub fn insert_pass(&mut self, index: usize, pass: impl Pass) -> PassId {
        let mut pass: Box<dyn Pass> = Box::new(pass);
        let (width, height) = self.buffer_size();
        pass.set_size(width, height);
        let id = self.passes.insert(pass);
        self.order.insert(index.min(self.order.len()), id);
        id
    }

    /// Removes a pass and hands it back.
    ///
    /// Its references into the program cache are dropped; programs nobody else uses
    /// are destroyed at the end of the next frame.
    pub fn remove_pass(&mut self, id: PassId) -> Option<Box<dyn Pass>> {
        let mut pass = self.passes.remove(id)?;
        self.order.retain(|p| *p != id);
        pass.release(&mut self.programs);
        Some(pass)
    }

    /// Moves a pass to position `index`.
    pub fn move_pass(&mut self, id: PassId, index: usize) -> Result<()> {
        let Some(from) = self.order.iter().position(|p| *p == id) else {
            return Err(FxError::config("composer", "no such pass"));
        };
        self.order.remove(from);
        self.order.insert(index.min(self.order.len()), id);
        Ok(())
    }

    /// Groups `effects` into as few [`EffectPass`]es as merge compatibility allows and
    /// appends them.
    ///
    /// Effects keep their order. An effect that cannot join the current group (a
    /// convolution, or a depth consumer with a different packing) starts a new pass.
    /// Grouping looks at declared attributes, so disabled effects are placed as if they
    /// were enabled; a pass whose effects are all disabled is skipped.
    pub fn add_effects(&mut self, effects: Vec<Effect>) -> Result<Vec<PassId>> {
        let mut groups: Vec<Vec<Effect>> = Vec::new();
        for effect in effects {
            let joins = groups.last().is_some_and(|group| {
                let refs: Vec<&Effect> = group.iter().collect();
                can_join(&refs, &effect)
            });
            match groups.last_mut() {
                Some(group) if joins => group.push(effect),
                _ => groups.push(vec![effect]),
            }
        }

        let mut passes = Vec::with_capacity(groups.len());
        for group in groups {
            let pass = EffectPass::with_effects(format!("effects {}", self.grouped), group)?.skip_when_idle();
            self.grouped += 1;
            passes.push(pass);
        }
        if passes.len() > 1 {
            log::debug!("composer: effects grouped into {} passes", passes.len());
        }
        Ok(passes.into_iter().map(|p| self.add_pass(p)).collect())
    }

    /// Pass ids in execution order.
    pub fn pass_ids(&self) -> &[PassId] {
        &self.order
    }

    pub fn pass(&self, id: PassId) -> Option<&dyn Pass> {
        self.passes.get(id).map(|p| p.as_ref())
    }

    pub fn pass_mut(&mut self, id: PassId) -> Option<&mut (dyn Pass + 'static)> {
        self.passes.get_mut(id).map(|pass| &mut **pass)
    }

    /// The pass `id` as its concrete type.
    pub fn pass_as<T: Pass>(&self, id: PassId) -> Option<&T> {
        self.passes.get(id)?.as_any().downcast_ref()
    }

    pub fn pass_as_mut<T: Pass>(&mut self, id: PassId) -> Option<&mut T> {
        self.passes.get_mut(id)?.as_any_mut().downcast_mut()
    }

    // ========================================================================
    // Size and settings
    // ========================================================================

    /// Resizes the internal buffers to match a `width` x `height` viewport and
    /// propagates the new buffer size to every pass.
    pub fn set_size(&mut self, device: &mut dyn RenderDevice, width: u32, height: u32) -> Result<()> {
        self.ensure_live()?;
        if width == 0 || height == 0 {
            return Err(FxError::config("composer", format!("invalid size {width}x{height}")));
        }
        self.resize((width, height), self.config.resolution_scale, device)
    }

    /// Changes the size of the internal buffers relative to the viewport.
    pub fn set_resolution_scale(&mut self, device: &mut dyn RenderDevice, scale: f32) -> Result<()> {
        self.ensure_live()?;
        validate_scale(scale)?;
        self.resize(self.viewport, scale, device)
    }

    fn resize(&mut self, viewport: (u32, u32), scale: f32, device: &mut dyn RenderDevice) -> Result<()> {
        let (width, height) = scaled(viewport, scale);
        self.pool.resize_all(device, width, height)?;
        self.viewport = viewport;
        self.config.resolution_scale = scale;
        for pass in self.passes.values_mut() {
            pass.set_size(width, height);
        }
        log::info!(
            "composer resized to {}x{} (buffers {width}x{height})",
            viewport.0,
            viewport.1
        );
        Ok(())
    }

    /// Renders the last pass into `target` instead of the display.
    pub fn set_final_target(&mut self, target: Option<TargetId>) {
        self.final_target = target;
    }

    pub fn set_auto_render_to_screen(&mut self, enabled: bool) {
        self.config.auto_render_to_screen = enabled;
    }

    /// Near and far planes used to linearize depth.
    pub fn set_camera_planes(&mut self, near: f32, far: f32) {
        self.config.camera_near = near;
        self.config.camera_far = far;
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Size of the viewport.
    pub fn size(&self) -> (u32, u32) {
        self.viewport
    }

    /// Size of the internal buffers.
    pub fn buffer_size(&self) -> (u32, u32) {
        scaled(self.viewport, self.config.resolution_scale)
    }

    // ========================================================================
    // Buffers
    // ========================================================================

    /// The buffer the next frame starts from. Scene rendering writes here.
    pub fn input_target(&self) -> Option<TargetId> {
        self.pool.target(self.buffers[self.read])
    }

    /// The other ping-pong buffer.
    pub fn output_target(&self) -> Option<TargetId> {
        self.pool.target(self.buffers[1 - self.read])
    }

    pub fn depth_target(&self) -> Option<TargetId> {
        self.depth.and_then(|h| self.pool.target(h))
    }

    pub fn velocity_target(&self) -> Option<TargetId> {
        self.velocity.and_then(|h| self.pool.target(h))
    }

    /// Returns the shared depth buffer, allocating it if needed.
    pub fn ensure_depth(&mut self, device: &mut dyn RenderDevice) -> Result<TargetId> {
        self.ensure_live()?;
        let (width, height) = self.buffer_size();
        let desc = TargetDescriptor::new("composer depth", width, height, self.config.depth_format());
        attachment(&mut self.pool, &mut self.depth, device, &desc)
    }

    /// Returns the shared velocity buffer, allocating it if needed.
    pub fn ensure_velocity(&mut self, device: &mut dyn RenderDevice) -> Result<TargetId> {
        self.ensure_live()?;
        let (width, height) = self.buffer_size();
        let desc = TargetDescriptor::new("composer velocity", width, height, self.config.velocity_format());
        attachment(&mut self.pool, &mut self.velocity, device, &desc)
    }

    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Renders one frame.
    ///
    /// `delta` is the time in seconds since the previous frame. On error the frame is
    /// discarded and the composer state is unchanged.
    pub fn render(&mut self, device: &mut dyn RenderDevice, delta: f32) -> Result<()> {
        self.ensure_live()?;

        let enabled: Vec<PassId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.passes[*id].is_enabled())
            .collect();
        if enabled.is_empty() {
            log::warn!("composer: no enabled passes, nothing rendered");
            return Ok(());
        }

        let summaries: Vec<PassSummary> = enabled
            .iter()
            .map(|id| {
                let pass = &self.passes[*id];
                PassSummary {
                    needs_swap: pass.needs_swap(),
                    explicit_output: pass.explicit_output(),
                    requirements: pass.requirements(),
                }
            })
            .collect();

        let required = summaries
            .iter()
            .fold(Attachments::empty(), |acc, s| acc | s.requirements);
        if required.contains(Attachments::DEPTH) {
            self.ensure_depth(device)?;
        }
        if required.contains(Attachments::VELOCITY) {
            self.ensure_velocity(device)?;
        }

        let (Some(a), Some(b)) = (self.pool.target(self.buffers[0]), self.pool.target(self.buffers[1])) else {
            return Err(FxError::config("composer", "ping-pong buffers are missing"));
        };
        let params = ScheduleParams {
            buffers: [a, b],
            read: self.read,
            final_output: self
                .config
                .auto_render_to_screen
                .then(|| self.final_target.map_or(RenderOutput::Screen, RenderOutput::Target)),
            depth: self.depth_target(),
            velocity: self.velocity_target(),
        };
        let schedule = plan(&summaries, &params, |output| match output {
            RenderOutput::Target(t) if t == a || t == b => ColorSpace::Linear,
            other => device.color_space(other),
        });

        let (width, height) = self.buffer_size();
        let frame = FrameInfo {
            width,
            height,
            time: self.time + delta,
            delta,
            frame_index: self.frame_index,
            camera_near: self.config.camera_near,
            camera_far: self.config.camera_far,
        };

        for (id, io) in enabled.iter().zip(&schedule.steps) {
            let mut ctx = PassContext {
                device: &mut *device,
                programs: &mut self.programs,
                frame: &frame,
            };
            self.passes[*id].prepare(&mut ctx, io)?;
        }

        self.pool.begin_frame();
        let result = self.execute(device, &enabled, &schedule, &frame);
        self.pool.end_frame();
        result?;

        self.read = schedule.read_after;
        self.time = frame.time;
        self.frame_index += 1;
        self.programs.collect(device);
        Ok(())
    }

    fn execute(
        &mut self,
        device: &mut dyn RenderDevice,
        enabled: &[PassId],
        schedule: &Schedule,
        frame: &FrameInfo,
    ) -> Result<()> {
        device.begin_frame()?;
        for (id, io) in enabled.iter().zip(&schedule.steps) {
            let mut ctx = PassContext {
                device: &mut *device,
                programs: &mut self.programs,
                frame,
            };
            if let Err(err) = self.passes[*id].render(&mut ctx, io) {
                device.abort_frame();
                return Err(err);
            }
        }
        device.end_frame()
    }

    // ========================================================================
    // Disposal
    // ========================================================================

    /// Releases every pass, program and buffer. Calling it again does nothing.
    pub fn dispose(&mut self, device: &mut dyn RenderDevice) {
        if self.disposed {
            return;
        }
        for id in std::mem::take(&mut self.order) {
            if let Some(mut pass) = self.passes.remove(id) {
                pass.release(&mut self.programs);
                pass.dispose(device);
            }
        }
        self.programs.clear(device);
        self.pool.clear(device);
        self.depth = None;
        self.velocity = None;
        self.disposed = true;
        log::debug!("composer disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            Err(FxError::config("composer", "used after dispose"))
        } else {
            Ok(())
        }
    }
}

fn attachment(
    pool: &mut RenderTargetPool,
    slot: &mut Option<BufferHandle>,
    device: &mut dyn RenderDevice,
    desc: &TargetDescriptor,
) -> Result<TargetId> {
    if let Some(target) = slot.and_then(|h| pool.target(h)) {
        return Ok(target);
    }
    let handle = pool.acquire(device, desc)?;
    *slot = Some(handle);
    pool.target(handle)
        .ok_or_else(|| FxError::exhausted(desc.label.clone(), "pool lost a fresh buffer"))
}

fn validate_scale(scale: f32) -> Result<()> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(FxError::config("composer", format!("invalid resolution scale {scale}")))
    }
}

fn scaled((width, height): (u32, u32), scale: f32) -> (u32, u32) {
    (
        ((width as f32 * scale).round() as u32).max(1),
        ((height as f32 * scale).round() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;
    use crate::pass::{ClearPass, CopyPass};

    fn composer(device: &mut SoftwareDevice) -> EffectComposer {
        EffectComposer::new(device, ComposerConfig::default()).unwrap()
    }

    #[test]
    fn zero_size_is_a_configuration_error() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut composer = composer(&mut device);
        assert!(composer.set_size(&mut device, 0, 4).unwrap_err().is_configuration());
        assert_eq!(composer.size(), (4, 4));
    }

    #[test]
    fn invalid_scale_is_rejected() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut composer = composer(&mut device);
        assert!(composer.set_resolution_scale(&mut device, 0.0).is_err());
        assert!(composer.set_resolution_scale(&mut device, f32::NAN).is_err());
        composer.set_resolution_scale(&mut device, 0.5).unwrap();
        assert_eq!(composer.buffer_size(), (2, 2));
    }

    #[test]
    fn passes_can_be_reordered_and_removed() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut composer = composer(&mut device);
        let clear = composer.add_pass(ClearPass::new(glam::Vec4::ZERO));
        let copy = composer.add_pass(CopyPass::new());
        composer.move_pass(copy, 0).unwrap();
        assert_eq!(composer.pass_ids(), &[copy, clear]);
        assert!(composer.pass_as::<CopyPass>(copy).is_some());
        assert!(composer.pass_as::<ClearPass>(copy).is_none());
        assert!(composer.remove_pass(clear).is_some());
        assert_eq!(composer.pass_ids(), &[copy]);
    }

    #[test]
    fn dispose_is_idempotent() {
        let mut device = SoftwareDevice::new(4, 4);
        let mut composer = composer(&mut device);
        composer.add_pass(CopyPass::new());
        composer.render(&mut device, 0.016).unwrap();
        composer.dispose(&mut device);
        composer.dispose(&mut device);
        assert!(composer.is_disposed());
        assert_eq!(device.live_targets(), 0);
        assert_eq!(device.live_programs(), 0);
        assert!(composer.render(&mut device, 0.016).unwrap_err().is_configuration());
    }

    #[test]
    fn scaled_sizes_never_reach_zero() {
        assert_eq!(scaled((3, 1), 0.1), (1, 1));
        assert_eq!(scaled((100, 50), 0.5), (50, 25));
    }
}
