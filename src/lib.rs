//! # postfx
//!
//! **Composable full-screen post-processing for wgpu.**
//!
//! Effects are small WGSL fragments defining one function,
//! `fn transform(color: vec4f, uv: vec2f) -> vec4f`. The [`EffectComposer`] merges
//! compatible effects into a single program per pass, runs the passes over a pair of
//! ping-pong buffers, and writes the last one to the screen.
//!
//! ## Quick Start
//!
//! ```
//! use postfx::*;
//!
//! // Any RenderDevice works; the software device runs headless.
//! let mut device = SoftwareDevice::new(320, 180);
//! effects::register_kernels(&mut device);
//!
//! let mut composer = EffectComposer::new(&mut device, ComposerConfig::default())?;
//! composer.add_effects(vec![
//!     effects::gradient(Vec3::new(0.1, 0.2, 0.4), Vec3::new(0.9, 0.6, 0.3)),
//!     effects::brightness_contrast(0.05, 0.1),
//!     effects::vignette(1.2, 0.6),
//! ])?;
//!
//! composer.render(&mut device, 1.0 / 60.0)?;
//! # Ok::<(), postfx::FxError>(())
//! ```
//!
//! ## Pieces
//!
//! - **Effects** ([`Effect`]) declare what they read (depth, velocity, neighboring pixels),
//!   their uniforms, defines, lookup textures and blend function.
//! - **Passes** ([`Pass`]) are the units the composer schedules: [`EffectPass`] runs merged
//!   effects, [`CopyPass`], [`ClearPass`] and [`LambdaPass`] cover the rest.
//! - **Devices** ([`RenderDevice`]) own the GPU objects. [`WgpuDevice`] renders for real,
//!   [`SoftwareDevice`] is a CPU reference used in tests.
//! - **Pool** ([`RenderTargetPool`]) owns the intermediate buffers and resizes them as a
//!   unit.

mod composer;
mod config;
pub mod device;
pub mod effect;
pub mod effects;
mod error;
pub mod pass;
mod pool;
pub mod shader;

pub use composer::{EffectComposer, PassId, PassSummary, Schedule, ScheduleParams, plan};
pub use config::{BufferPrecision, ComposerConfig};
pub use device::{
    ColorSpace, DeviceStats, DrawCall, Kernel, KernelInput, ProgramId, RenderDevice,
    RenderOutput, SoftwareDevice, TargetDescriptor, TargetId, TextureDescriptor, TextureId,
    WgpuDevice,
};
pub use effect::{
    BlendFunction, BlendMode, DepthPacking, Effect, EffectAttributes, EffectTexture, Revision,
    Uniform, UniformKind, UniformValue,
};
pub use error::{FxError, Result};
pub use pass::{
    Attachments, ClearPass, CopyPass, EffectPass, FrameInfo, LambdaPass, Pass, PassContext,
    PassFlags, PassIo,
};
pub use pool::{BufferHandle, RenderTargetPool};
pub use shader::{CompilationToken, ProgramCache, ProgramKey, ProgramSource};

// Re-export glam math types for convenience
pub use glam::{Vec2, Vec3, Vec4};
