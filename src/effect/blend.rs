//! Blend functions used to combine an effect's output with the accumulated color.
//!
//! Inside a merged program every effect's contribution is blended into the running color
//! before the next effect sees it:
//!
//! ```text
//! color = blend(color, transform(color, uv, ...), opacity)
//! ```
//!
//! Each function exists twice: as WGSL emitted into assembled programs, and as a CPU
//! reference ([`BlendFunction::apply`]) used by the software device. Both follow the same
//! formula: `z = f(x.rgb, y.rgb)`, `rgb = mix(x.rgb, z, opacity * y.a)`,
//! `a = max(x.a, y.a)`. [`BlendFunction::Set`] ignores opacity and returns `y`.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// How an effect's output is combined with the color it received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendFunction {
    /// The effect is left out of the program entirely.
    Skip,
    /// Overwrites the accumulated color, ignoring opacity.
    Set,
    /// Standard alpha-weighted replacement.
    #[default]
    Normal,
    Add,
    Subtract,
    Multiply,
    Screen,
    Darken,
    Lighten,
    Difference,
    Exclusion,
    Divide,
    Average,
    Negation,
    Overlay,
    ColorDodge,
    ColorBurn,
    SoftLight,
    Reflect,
}

impl BlendFunction {
    /// All functions, in declaration order.
    pub const ALL: [BlendFunction; 19] = [
        Self::Skip,
        Self::Set,
        Self::Normal,
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Screen,
        Self::Darken,
        Self::Lighten,
        Self::Difference,
        Self::Exclusion,
        Self::Divide,
        Self::Average,
        Self::Negation,
        Self::Overlay,
        Self::ColorDodge,
        Self::ColorBurn,
        Self::SoftLight,
        Self::Reflect,
    ];

    /// Snake-case name used for the generated WGSL function.
    pub fn name(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Set => "set",
            Self::Normal => "normal",
            Self::Add => "add",
            Self::Subtract => "subtract",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
            Self::Difference => "difference",
            Self::Exclusion => "exclusion",
            Self::Divide => "divide",
            Self::Average => "average",
            Self::Negation => "negation",
            Self::Overlay => "overlay",
            Self::ColorDodge => "color_dodge",
            Self::ColorBurn => "color_burn",
            Self::SoftLight => "soft_light",
            Self::Reflect => "reflect",
        }
    }

    /// Name of the WGSL function implementing this blend.
    pub fn wgsl_fn(self) -> String {
        format!("fx_blend_{}", self.name())
    }

    /// WGSL expression of `z = f(x, y)` over `vec3f` operands named `x` and `y`.
    ///
    /// Returns `None` for [`Skip`](Self::Skip) and [`Set`](Self::Set), which are not
    /// expressed as a mix.
    fn wgsl_rgb(self) -> Option<&'static str> {
        Some(match self {
            Self::Skip | Self::Set => return None,
            Self::Normal => "y",
            Self::Add => "x + y",
            Self::Subtract => "max(x - y, vec3f(0.0))",
            Self::Multiply => "x * y",
            Self::Screen => "x + y - x * y",
            Self::Darken => "min(x, y)",
            Self::Lighten => "max(x, y)",
            Self::Difference => "abs(x - y)",
            Self::Exclusion => "x + y - 2.0 * x * y",
            Self::Divide => "x / max(y, vec3f(1e-5))",
            Self::Average => "(x + y) * 0.5",
            Self::Negation => "vec3f(1.0) - abs(vec3f(1.0) - x - y)",
            Self::Overlay => {
                "select(vec3f(1.0) - 2.0 * (vec3f(1.0) - x) * (vec3f(1.0) - y), 2.0 * x * y, x < vec3f(0.5))"
            }
            Self::ColorDodge => {
                "select(min(x / max(vec3f(1.0) - y, vec3f(1e-5)), vec3f(1.0)), y, y >= vec3f(1.0))"
            }
            Self::ColorBurn => {
                "select(max(vec3f(1.0) - (vec3f(1.0) - x) / max(y, vec3f(1e-5)), vec3f(0.0)), y, y <= vec3f(0.0))"
            }
            Self::SoftLight => "(vec3f(1.0) - 2.0 * y) * x * x + 2.0 * x * y",
            Self::Reflect => {
                "select(min(x * x / max(vec3f(1.0) - y, vec3f(1e-5)), vec3f(1.0)), y, y >= vec3f(1.0))"
            }
        })
    }

    /// Full WGSL definition of this blend function.
    pub fn wgsl(self) -> String {
        let name = self.wgsl_fn();
        match self.wgsl_rgb() {
            None => format!(
                "fn {name}(x: vec4f, y: vec4f, opacity: f32) -> vec4f {{\n    return y;\n}}\n"
            ),
            Some(expr) => format!(
                "fn {name}(base: vec4f, layer: vec4f, opacity: f32) -> vec4f {{\n    \
                 let x = base.rgb;\n    \
                 let y = layer.rgb;\n    \
                 let z = {expr};\n    \
                 return vec4f(mix(x, z, vec3f(opacity * layer.a)), max(base.a, layer.a));\n}}\n"
            ),
        }
    }

    /// CPU reference of the blend; the same formula as [`wgsl`](Self::wgsl).
    pub fn apply(self, base: Vec4, blend: Vec4, opacity: f32) -> Vec4 {
        if matches!(self, Self::Skip | Self::Set) {
            return blend;
        }
        let x = base.truncate();
        let y = blend.truncate();
        let z = self.rgb(x, y);
        let t = opacity * blend.w;
        (x + (z - x) * t).extend(base.w.max(blend.w))
    }

    fn rgb(self, x: Vec3, y: Vec3) -> Vec3 {
        let eps = Vec3::splat(1e-5);
        match self {
            Self::Skip | Self::Set | Self::Normal => y,
            Self::Add => x + y,
            Self::Subtract => (x - y).max(Vec3::ZERO),
            Self::Multiply => x * y,
            Self::Screen => x + y - x * y,
            Self::Darken => x.min(y),
            Self::Lighten => x.max(y),
            Self::Difference => (x - y).abs(),
            Self::Exclusion => x + y - 2.0 * x * y,
            Self::Divide => x / y.max(eps),
            Self::Average => (x + y) * 0.5,
            Self::Negation => Vec3::ONE - (Vec3::ONE - x - y).abs(),
            Self::Overlay => per_channel(x, y, |x, y| {
                if x < 0.5 {
                    2.0 * x * y
                } else {
                    1.0 - 2.0 * (1.0 - x) * (1.0 - y)
                }
            }),
            Self::ColorDodge => per_channel(x, y, |x, y| {
                if y >= 1.0 {
                    y
                } else {
                    (x / (1.0 - y).max(1e-5)).min(1.0)
                }
            }),
            Self::ColorBurn => per_channel(x, y, |x, y| {
                if y <= 0.0 {
                    y
                } else {
                    (1.0 - (1.0 - x) / y.max(1e-5)).max(0.0)
                }
            }),
            Self::SoftLight => (Vec3::ONE - 2.0 * y) * x * x + 2.0 * x * y,
            Self::Reflect => per_channel(x, y, |x, y| {
                if y >= 1.0 {
                    y
                } else {
                    (x * x / (1.0 - y).max(1e-5)).min(1.0)
                }
            }),
        }
    }
}

fn per_channel(x: Vec3, y: Vec3, f: impl Fn(f32, f32) -> f32) -> Vec3 {
    Vec3::new(f(x.x, y.x), f(x.y, y.y), f(x.z, y.z))
}

/// Blend descriptor of an effect: a function and an opacity.
///
/// Opacity is a per-frame parameter and never forces recompilation. Changing the
/// function does.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendMode {
    pub function: BlendFunction,
    pub opacity: f32,
}

impl BlendMode {
    pub fn new(function: BlendFunction) -> Self {
        Self {
            function,
            opacity: 1.0,
        }
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

impl Default for BlendMode {
    fn default() -> Self {
        Self::new(BlendFunction::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_full_opacity_replaces_rgb() {
        let out = BlendFunction::Normal.apply(Vec4::ONE, Vec4::new(0.2, 0.4, 0.6, 1.0), 1.0);
        assert_eq!(out, Vec4::new(0.2, 0.4, 0.6, 1.0));
    }

    #[test]
    fn zero_opacity_keeps_base() {
        let base = Vec4::new(0.3, 0.3, 0.3, 1.0);
        for f in BlendFunction::ALL {
            if matches!(f, BlendFunction::Skip | BlendFunction::Set) {
                continue;
            }
            let out = f.apply(base, Vec4::new(0.9, 0.1, 0.5, 1.0), 0.0);
            assert_eq!(out, base, "{f:?}");
        }
    }

    #[test]
    fn set_ignores_opacity() {
        let y = Vec4::new(0.1, 0.2, 0.3, 0.4);
        assert_eq!(BlendFunction::Set.apply(Vec4::ONE, y, 0.25), y);
    }

    #[test]
    fn half_opacity_add() {
        let out = BlendFunction::Add.apply(Vec4::new(0.2, 0.2, 0.2, 1.0), Vec4::new(0.4, 0.4, 0.4, 1.0), 0.5);
        assert!((out.x - 0.4).abs() < 1e-6);
        assert_eq!(out.w, 1.0);
    }

    #[test]
    fn screen_of_black_is_identity() {
        let x = Vec4::new(0.25, 0.5, 0.75, 1.0);
        let out = BlendFunction::Screen.apply(x, Vec4::new(0.0, 0.0, 0.0, 1.0), 1.0);
        assert_eq!(out, x);
    }

    #[test]
    fn every_function_has_a_distinct_wgsl_name() {
        let mut names: Vec<_> = BlendFunction::ALL.iter().map(|f| f.wgsl_fn()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), BlendFunction::ALL.len());
    }
}
