//! Merge compatibility between effects.
//!
//! Two rules decide whether effects can share one program and one draw:
//!
//! 1. An effect with [`EffectAttributes::CONVOLUTION`] samples neighboring texels of its
//!    own input. Merged behind another effect it would read the unprocessed buffer, so it
//!    must be the only active effect of its pass.
//! 2. Depth is shared-read, so any number of depth consumers may merge, provided they
//!    all request the same [`DepthPacking`].

use super::{DepthPacking, Effect, EffectAttributes};
use crate::error::{FxError, Result};

/// Describes why `effects` cannot be merged, or `None` if they can.
///
/// Only active effects are considered.
pub fn merge_conflict(effects: &[&Effect]) -> Option<String> {
    let active: Vec<&Effect> = effects.iter().copied().filter(|e| e.is_active()).collect();
    conflict(&active)
}

fn conflict(active: &[&Effect]) -> Option<String> {
    if active.len() > 1 {
        if let Some(solo) = active
            .iter()
            .find(|e| e.attributes().contains(EffectAttributes::CONVOLUTION))
        {
            return Some(format!(
                "convolution effect '{}' cannot share a pass with {} other effect(s)",
                solo.name(),
                active.len() - 1
            ));
        }
    }

    let mut packing: Option<(&str, DepthPacking)> = None;
    for effect in active.iter().filter(|e| e.attributes().contains(EffectAttributes::DEPTH)) {
        match packing {
            None => packing = Some((effect.name(), effect.depth_packing())),
            Some((first, p)) if p != effect.depth_packing() => {
                return Some(format!(
                    "depth consumers '{first}' ({p:?}) and '{}' ({:?}) disagree on depth packing",
                    effect.name(),
                    effect.depth_packing()
                ));
            }
            Some(_) => {}
        }
    }

    None
}

/// Returns `true` if `candidate` can join `group` without a conflict.
///
/// Judged on declared attributes, whether or not the effects are currently enabled,
/// so a group stays mergeable when any of its effects is switched on later.
pub fn can_join(group: &[&Effect], candidate: &Effect) -> bool {
    let mut all: Vec<&Effect> = group.to_vec();
    all.push(candidate);
    conflict(&all).is_none()
}

/// Fails with a configuration error naming `context` if `effects` cannot be merged.
pub fn check_merge(context: &str, effects: &[&Effect]) -> Result<()> {
    match merge_conflict(effects) {
        Some(reason) => Err(FxError::config(context, reason)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effect(name: &str) -> Effect {
        Effect::new(name, "fn transform(color: vec4f, uv: vec2f) -> vec4f { return color; }").unwrap()
    }

    fn depth(name: &str, packing: DepthPacking) -> Effect {
        Effect::new(
            name,
            "fn transform(color: vec4f, uv: vec2f, depth: f32) -> vec4f { return color; }",
        )
        .unwrap()
        .with_attributes(EffectAttributes::DEPTH)
        .with_depth_packing(packing)
    }

    #[test]
    fn depth_consumers_with_same_packing_merge() {
        let a = depth("fog", DepthPacking::Linear);
        let b = depth("outline", DepthPacking::Linear);
        assert!(merge_conflict(&[&a, &b]).is_none());
    }

    #[test]
    fn depth_consumers_with_different_packing_conflict() {
        let a = depth("fog", DepthPacking::Linear);
        let b = depth("outline", DepthPacking::Raw);
        assert!(check_merge("pass", &[&a, &b]).unwrap_err().is_configuration());
    }

    #[test]
    fn convolution_runs_alone() {
        let blur = effect("blur").with_attributes(EffectAttributes::CONVOLUTION);
        let tint = effect("tint");
        assert!(merge_conflict(&[&blur]).is_none());
        assert!(merge_conflict(&[&tint, &blur]).is_some());
        assert!(!can_join(&[&blur], &tint));
    }

    #[test]
    fn inactive_effects_do_not_conflict() {
        let mut blur = effect("blur").with_attributes(EffectAttributes::CONVOLUTION);
        blur.set_enabled(false);
        let tint = effect("tint");
        assert!(merge_conflict(&[&tint, &blur]).is_none());
    }

    #[test]
    fn grouping_ignores_enabled_state() {
        let mut blur = effect("blur").with_attributes(EffectAttributes::CONVOLUTION);
        blur.set_enabled(false);
        let tint = effect("tint");
        assert!(!can_join(&[&tint], &blur));
        assert!(!can_join(&[&blur], &tint));

        let mut fog = depth("fog", DepthPacking::Linear);
        fog.set_enabled(false);
        assert!(!can_join(&[&fog], &depth("outline", DepthPacking::Raw)));
    }
}
