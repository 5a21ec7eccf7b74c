//! Error types.
//!
//! Every fallible operation in the crate returns [`Result<T>`], an alias for
//! `std::result::Result<T, FxError>`. The variants follow the three failure families of
//! the pipeline:
//!
//! - [`FxError::Configuration`]: the caller asked for something that cannot work
//!   (empty effect list, incompatible effects in one pass, zero-sized viewport, ...).
//!   Reported synchronously; fatal to the operation but never to the composer.
//! - [`FxError::Compilation`]: the assembled shader was rejected by the device. Carries
//!   the merged source and the identities of the effects it was built from.
//! - [`FxError::ResourceExhaustion`]: a GPU allocation failed. Fatal for the current
//!   frame; composer state is left untouched so the next frame can retry.
//!
//! The remaining variants cover device creation and screenshots.

use thiserror::Error;

/// The main error type of the post-processing pipeline.
#[derive(Error, Debug)]
pub enum FxError {
    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    /// Invalid configuration of a pass, effect or the composer itself.
    #[error("configuration error in {context}: {reason}")]
    Configuration {
        /// The pass, effect or component that was misconfigured.
        context: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The merged shader program failed to compile.
    #[error("failed to compile program for pass '{pass}' (effects: {effects:?}): {message}")]
    Compilation {
        /// Name of the pass the program was assembled for.
        pass: String,
        /// Effects merged into the program, in execution order.
        effects: Vec<String>,
        /// Compiler diagnostic.
        message: String,
        /// The complete assembled WGSL source.
        wgsl: String,
    },

    /// A GPU resource could not be allocated.
    #[error("resource exhaustion while allocating {resource}: {reason}")]
    ResourceExhaustion {
        /// Label of the resource being allocated.
        resource: String,
        /// Device diagnostic.
        reason: String,
    },

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("failed to request wgpu adapter: {0}")]
    AdapterRequest(#[from] wgpu::RequestAdapterError),

    /// Failed to create the GPU device.
    #[error("failed to create wgpu device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Failed to create a presentation surface.
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    /// Failed to acquire the next surface texture.
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    /// Failed to encode a screenshot.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl FxError {
    /// Shorthand for a [`FxError::Configuration`] error.
    pub fn config(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`FxError::ResourceExhaustion`] error.
    pub fn exhausted(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceExhaustion {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for configuration errors.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` for compilation errors.
    pub fn is_compilation(&self) -> bool {
        matches!(self, Self::Compilation { .. })
    }

    /// Returns `true` for allocation failures.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, Self::ResourceExhaustion { .. })
    }
}

/// Alias for `Result<T, FxError>`.
pub type Result<T> = std::result::Result<T, FxError>;
