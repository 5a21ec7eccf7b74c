//! Composer configuration.

use serde::{Deserialize, Serialize};

/// Storage precision of the intermediate ping-pong buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BufferPrecision {
    /// 8 bits per channel (`Rgba8Unorm`). Values are clamped to `[0, 1]`.
    Low,
    /// 16-bit float per channel (`Rgba16Float`). Keeps HDR values between passes.
    #[default]
    Half,
}

impl BufferPrecision {
    pub fn format(self) -> wgpu::TextureFormat {
        match self {
            Self::Low => wgpu::TextureFormat::Rgba8Unorm,
            Self::Half => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

/// Settings of an [`EffectComposer`](crate::EffectComposer).
///
/// ```
/// use postfx::{BufferPrecision, ComposerConfig};
///
/// let config = ComposerConfig::new()
///     .precision(BufferPrecision::Low)
///     .resolution_scale(0.5)
///     .camera_planes(0.1, 500.0);
/// assert_eq!(config.resolution_scale, 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub precision: BufferPrecision,
    /// Allocate the shared depth buffer (as opposed to waiting for a pass to need it).
    pub depth_buffer: bool,
    /// Scale of the internal buffers relative to the viewport.
    pub resolution_scale: f32,
    /// Render the last enabled pass straight to the display.
    pub auto_render_to_screen: bool,
    pub camera_near: f32,
    pub camera_far: f32,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            precision: BufferPrecision::Half,
            depth_buffer: false,
            resolution_scale: 1.0,
            auto_render_to_screen: true,
            camera_near: 0.1,
            camera_far: 1000.0,
        }
    }
}

impl ComposerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn precision(mut self, precision: BufferPrecision) -> Self {
        self.precision = precision;
        self
    }

    pub fn depth_buffer(mut self, enabled: bool) -> Self {
        self.depth_buffer = enabled;
        self
    }

    pub fn resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale;
        self
    }

    pub fn auto_render_to_screen(mut self, enabled: bool) -> Self {
        self.auto_render_to_screen = enabled;
        self
    }

    pub fn camera_planes(mut self, near: f32, far: f32) -> Self {
        self.camera_near = near;
        self.camera_far = far;
        self
    }

    /// Format of the shared depth/stencil buffer.
    pub fn depth_format(&self) -> wgpu::TextureFormat {
        wgpu::TextureFormat::Depth24PlusStencil8
    }

    /// Format of the shared velocity buffer.
    pub fn velocity_format(&self) -> wgpu::TextureFormat {
        wgpu::TextureFormat::Rg16Float
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ComposerConfig = serde_json::from_str(r#"{ "precision": "Low" }"#).unwrap();
        assert_eq!(config.precision, BufferPrecision::Low);
        assert_eq!(config.resolution_scale, 1.0);
        assert!(config.auto_render_to_screen);
    }

    #[test]
    fn precision_selects_format() {
        assert_eq!(BufferPrecision::Low.format(), wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(BufferPrecision::Half.format(), wgpu::TextureFormat::Rgba16Float);
    }
}
