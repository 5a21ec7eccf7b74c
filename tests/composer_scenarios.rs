//! End-to-end composer behavior on the software device.

use postfx::{
    ColorSpace, ComposerConfig, CopyPass, Effect, EffectAttributes, EffectComposer, EffectPass,
    FxError, LambdaPass, Pass, RenderDevice, RenderOutput, SoftwareDevice, TargetDescriptor, Vec3,
    Vec4, effects,
};

const W: u32 = 4;
const H: u32 = 4;

fn device() -> SoftwareDevice {
    let mut device = SoftwareDevice::new(W, H);
    device.register_kernel("identity", |input| input.color);
    device.register_kernel("scale", |input| {
        (input.color.truncate() * input.uniform_f32("factor")).extend(input.color.w)
    });
    device.register_kernel("offset", |input| {
        (input.color.truncate() + Vec3::splat(input.uniform_f32("amount"))).extend(input.color.w)
    });
    device.register_kernel("depth_probe", |input| Vec4::new(input.depth, input.depth, input.depth, 1.0));
    device.register_kernel("velocity_probe", |input| {
        Vec4::new(input.velocity.x, input.velocity.y, 0.0, 1.0)
    });
    effects::register_kernels(&mut device);
    device
}

fn identity() -> Effect {
    Effect::new("identity", "fn transform(color: vec4f, uv: vec2f) -> vec4f { return color; }").unwrap()
}

fn scale(factor: f32) -> Effect {
    Effect::new(
        "scale",
        "fn transform(color: vec4f, uv: vec2f) -> vec4f { return vec4f(color.rgb * factor, color.a); }",
    )
    .unwrap()
    .with_uniform("factor", factor)
}

fn offset(amount: f32) -> Effect {
    Effect::new(
        "offset",
        "fn transform(color: vec4f, uv: vec2f) -> vec4f { return vec4f(color.rgb + vec3f(amount), color.a); }",
    )
    .unwrap()
    .with_uniform("amount", amount)
}

fn depth_probe() -> Effect {
    Effect::new(
        "depth_probe",
        "fn transform(color: vec4f, uv: vec2f, depth: f32) -> vec4f { return vec4f(vec3f(depth), 1.0); }",
    )
    .unwrap()
    .with_attributes(EffectAttributes::DEPTH)
}

fn pattern(x: u32, y: u32) -> Vec4 {
    Vec4::new(x as f32 / W as f32, y as f32 / H as f32, 0.25, 1.0)
}

/// An in-place pass that writes `color(x, y)` into the buffer it is given.
fn scene(color: impl Fn(u32, u32) -> Vec4 + 'static) -> LambdaPass {
    LambdaPass::new("scene", move |ctx, io| {
        let RenderOutput::Target(target) = io.output else {
            return Err(FxError::config("scene", "expected an intermediate buffer"));
        };
        let device = ctx
            .device
            .as_any_mut()
            .downcast_mut::<SoftwareDevice>()
            .ok_or_else(|| FxError::config("scene", "expected the software device"))?;
        let (w, h) = device
            .target_size(target)
            .ok_or_else(|| FxError::config("scene", "unknown target"))?;
        let pixels: Vec<Vec4> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| color(x, y))
            .collect();
        device.write_color(target, &pixels)
    })
}

fn composer(device: &mut SoftwareDevice) -> EffectComposer {
    EffectComposer::new(device, ComposerConfig::default()).unwrap()
}

fn assert_close(actual: Vec4, expected: Vec4) {
    assert!(
        actual.abs_diff_eq(expected, 1e-4),
        "expected {expected:?}, got {actual:?}"
    );
}

fn assert_screen(device: &SoftwareDevice, expected: impl Fn(u32, u32) -> Vec4) {
    for y in 0..H {
        for x in 0..W {
            assert_close(device.screen_pixel(x, y), expected(x, y));
        }
    }
}

#[test]
fn identity_effect_leaves_the_image_unchanged() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(pattern));
    composer.add_pass(EffectPass::with_effects("identity", vec![identity()]).unwrap());

    composer.render(&mut device, 0.016).unwrap();

    assert_screen(&device, pattern);
}

#[test]
fn merged_effects_apply_in_order() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(|_, _| Vec4::ONE));
    let ids = composer.add_effects(vec![scale(0.5), offset(0.1)]).unwrap();
    assert_eq!(ids.len(), 1);

    composer.render(&mut device, 0.016).unwrap();
    assert_screen(&device, |_, _| Vec4::new(0.6, 0.6, 0.6, 1.0));
    assert_eq!(device.stats().draws, 1);
}

#[test]
fn reversed_order_gives_a_different_result() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(|_, _| Vec4::ONE));
    composer.add_effects(vec![offset(0.1), scale(0.5)]).unwrap();

    composer.render(&mut device, 0.016).unwrap();
    assert_screen(&device, |_, _| Vec4::new(0.55, 0.55, 0.55, 1.0));
}

#[test]
fn merged_pass_matches_sequential_passes() {
    let mut merged = device();
    let mut composer_a = composer(&mut merged);
    composer_a.add_pass(scene(pattern));
    composer_a
        .add_pass(EffectPass::with_effects("merged", vec![scale(0.5), offset(0.1)]).unwrap());
    composer_a.render(&mut merged, 0.016).unwrap();

    let mut sequential = device();
    let mut composer_b = composer(&mut sequential);
    composer_b.add_pass(scene(pattern));
    composer_b.add_pass(EffectPass::with_effects("first", vec![scale(0.5)]).unwrap());
    composer_b.add_pass(EffectPass::with_effects("second", vec![offset(0.1)]).unwrap());
    composer_b.render(&mut sequential, 0.016).unwrap();

    for (a, b) in merged.screen_pixels().iter().zip(sequential.screen_pixels()) {
        assert_close(*a, *b);
    }
    assert_eq!(merged.stats().draws, 1);
    assert_eq!(sequential.stats().draws, 2);
}

#[test]
fn removing_and_readding_a_depth_effect_recompiles() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(pattern));
    let id = composer.add_pass(
        EffectPass::with_effects("main", vec![scale(1.0), depth_probe()]).unwrap(),
    );

    composer.render(&mut device, 0.016).unwrap();
    let first = composer.pass_as::<EffectPass>(id).unwrap().compilation_token().unwrap();
    assert!(composer.depth_target().is_some());

    let removed = composer
        .pass_as_mut::<EffectPass>(id)
        .unwrap()
        .remove_effect("depth_probe")
        .unwrap();
    composer.render(&mut device, 0.016).unwrap();
    let second = composer.pass_as::<EffectPass>(id).unwrap().compilation_token().unwrap();
    assert_ne!(first, second);
    // The depth variant had no other users and was collected at the end of the frame.
    assert_eq!(device.live_programs(), 1);

    composer.pass_as_mut::<EffectPass>(id).unwrap().add_effect(removed).unwrap();
    composer.render(&mut device, 0.016).unwrap();
    let third = composer.pass_as::<EffectPass>(id).unwrap().compilation_token().unwrap();
    assert_ne!(second, third);
    assert_ne!(first, third);
    assert_eq!(composer.frame_index(), 3);
}

#[test]
fn parameter_changes_do_not_recompile() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(|_, _| Vec4::ONE));
    let id = composer.add_pass(EffectPass::with_effects("main", vec![scale(0.5)]).unwrap());
    composer.render(&mut device, 0.016).unwrap();
    let token = composer.pass_as::<EffectPass>(id).unwrap().compilation_token();

    let pass = composer.pass_as_mut::<EffectPass>(id).unwrap();
    pass.effect_mut("scale").unwrap().set_uniform("factor", 0.25).unwrap();
    pass.effect_mut("scale").unwrap().set_opacity(0.5);
    composer.render(&mut device, 0.016).unwrap();

    assert_eq!(composer.pass_as::<EffectPass>(id).unwrap().compilation_token(), token);
    assert_eq!(device.stats().compilations, 1);
    // 1 + (0.25 - 1) * 0.5
    assert_screen(&device, |_, _| Vec4::new(0.625, 0.625, 0.625, 1.0));
}

#[test]
fn empty_pass_is_a_configuration_error_and_state_survives() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(pattern));
    let empty = composer.add_pass(EffectPass::new("empty"));
    let input = composer.input_target();

    let err = composer.render(&mut device, 0.016).unwrap_err();
    assert!(err.is_configuration(), "{err}");
    assert_eq!(composer.frame_index(), 0);
    assert_eq!(composer.input_target(), input);
    assert_eq!(device.stats().frames, 0);

    composer
        .pass_as_mut::<EffectPass>(empty)
        .unwrap()
        .add_effect(identity())
        .unwrap();
    composer.render(&mut device, 0.016).unwrap();
    assert_eq!(composer.frame_index(), 1);
    assert_screen(&device, pattern);
}

#[test]
fn fully_disabled_pass_is_a_configuration_error() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(pattern));
    let id = composer.add_pass(EffectPass::with_effects("main", vec![identity()]).unwrap());
    composer
        .pass_as_mut::<EffectPass>(id)
        .unwrap()
        .effect_mut("identity")
        .unwrap()
        .set_enabled(false);

    assert!(composer.render(&mut device, 0.016).unwrap_err().is_configuration());

    composer.pass_mut(id).unwrap().set_enabled(false);
    composer.add_pass(CopyPass::new());
    composer.render(&mut device, 0.016).unwrap();
    assert_screen(&device, pattern);
}

#[test]
fn ping_pong_chain_shares_one_program() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(pattern));
    for name in ["a", "b", "c"] {
        composer.add_pass(EffectPass::with_effects(name, vec![scale(0.5)]).unwrap());
    }

    composer.render(&mut device, 0.016).unwrap();

    assert_screen(&device, |x, y| {
        let p = pattern(x, y);
        (p.truncate() * 0.125).extend(1.0)
    });
    assert_eq!(device.stats().compilations, 1);
    assert_eq!(device.stats().draws, 3);
}

#[test]
fn rendering_is_idempotent_for_identical_input() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(pattern));
    composer.add_effects(vec![scale(0.5), offset(0.2)]).unwrap();
    composer.add_pass(EffectPass::with_effects("again", vec![scale(2.0)]).unwrap());

    composer.render(&mut device, 0.016).unwrap();
    let first = device.screen_pixels().to_vec();
    composer.render(&mut device, 0.016).unwrap();

    assert_eq!(device.screen_pixels(), first.as_slice());
    assert_eq!(composer.frame_index(), 2);
}

#[test]
fn snapshot_pass_writes_its_own_target() {
    let mut device = device();
    let snapshot = device
        .create_target(&TargetDescriptor::new("snapshot", W, H, wgpu::TextureFormat::Rgba16Float))
        .unwrap();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(pattern));
    composer.add_pass(CopyPass::to_target(snapshot).with_name("snapshot"));
    composer.add_pass(EffectPass::with_effects("main", vec![scale(0.5)]).unwrap());

    composer.render(&mut device, 0.016).unwrap();

    let pixels = device.read_target(snapshot).unwrap();
    for y in 0..H {
        for x in 0..W {
            assert_close(pixels[(y * W + x) as usize], pattern(x, y));
        }
    }
    assert_screen(&device, |x, y| (pattern(x, y).truncate() * 0.5).extend(1.0));
}

#[test]
fn final_target_replaces_the_screen() {
    let mut device = device();
    let target = device
        .create_target(&TargetDescriptor::new("final", W, H, wgpu::TextureFormat::Rgba16Float))
        .unwrap();
    let mut composer = composer(&mut device);
    composer.set_final_target(Some(target));
    composer.add_pass(scene(|_, _| Vec4::ONE));
    composer.add_pass(EffectPass::with_effects("main", vec![scale(0.25)]).unwrap());

    composer.render(&mut device, 0.016).unwrap();

    assert_close(device.read_target(target).unwrap()[0], Vec4::new(0.25, 0.25, 0.25, 1.0));
    assert_eq!(device.screen_pixel(0, 0), Vec4::ZERO);
}

#[test]
fn srgb_screen_gets_encoded_output() {
    let mut device = device().with_screen_color_space(ColorSpace::Srgb);
    let mut composer = composer(&mut device);
    composer.add_pass(scene(|_, _| Vec4::new(0.5, 0.5, 0.5, 1.0)));
    composer.add_pass(EffectPass::with_effects("main", vec![identity()]).unwrap());

    composer.render(&mut device, 0.016).unwrap();

    let encoded = 1.055 * 0.5f32.powf(1.0 / 2.4) - 0.055;
    assert_screen(&device, |_, _| Vec4::new(encoded, encoded, encoded, 1.0));
}

#[test]
fn depth_is_wired_to_depth_effects() {
    let mut device = device();
    let mut composer = composer(&mut device);
    let depth = composer.ensure_depth(&mut device).unwrap();
    let values: Vec<f32> = (0..W * H).map(|i| i as f32 / (W * H) as f32).collect();
    device.write_depth(depth, &values).unwrap();

    composer.add_pass(EffectPass::with_effects("depth", vec![depth_probe()]).unwrap());
    composer.render(&mut device, 0.016).unwrap();

    assert_screen(&device, |x, y| {
        let d = values[(y * W + x) as usize];
        Vec4::new(d, d, d, 1.0)
    });
}

#[test]
fn velocity_is_allocated_lazily_and_wired() {
    let mut device = device();
    let mut composer = composer(&mut device);
    assert!(composer.velocity_target().is_none());

    let probe = Effect::new(
        "velocity_probe",
        "fn transform(color: vec4f, uv: vec2f, velocity: vec2f) -> vec4f { return vec4f(velocity, 0.0, 1.0); }",
    )
    .unwrap()
    .with_attributes(EffectAttributes::VELOCITY);
    composer.add_pass(EffectPass::with_effects("velocity", vec![probe]).unwrap());
    let velocity = composer.ensure_velocity(&mut device).unwrap();
    device.fill_color(velocity, Vec4::new(0.25, 0.5, 0.0, 0.0)).unwrap();

    composer.render(&mut device, 0.016).unwrap();

    assert_screen(&device, |_, _| Vec4::new(0.25, 0.5, 0.0, 1.0));
    assert_eq!(composer.velocity_target(), Some(velocity));
}

#[test]
fn resize_round_trip_leaks_nothing() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(|_, _| Vec4::ONE));
    composer.add_pass(EffectPass::with_effects("main", vec![scale(0.5)]).unwrap());
    composer.ensure_depth(&mut device).unwrap();

    composer.set_size(&mut device, 8, 6).unwrap();
    assert!(device.target_sizes().iter().all(|&size| size == (8, 6)));
    composer.render(&mut device, 0.016).unwrap();

    composer.set_size(&mut device, W, H).unwrap();
    assert_eq!(device.live_targets(), 3);
    assert!(!device.target_sizes().contains(&(8, 6)));
    composer.render(&mut device, 0.016).unwrap();
    assert_screen(&device, |_, _| Vec4::new(0.5, 0.5, 0.5, 1.0));
}

#[test]
fn resolution_scale_shrinks_buffers_only() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.set_resolution_scale(&mut device, 0.5).unwrap();
    composer.add_pass(scene(|_, _| Vec4::ONE));
    composer.add_pass(EffectPass::with_effects("main", vec![identity()]).unwrap());

    assert_eq!(composer.size(), (W, H));
    assert_eq!(composer.buffer_size(), (W / 2, H / 2));
    assert!(device.target_sizes().iter().all(|&size| size == (W / 2, H / 2)));

    composer.render(&mut device, 0.016).unwrap();
    assert_screen(&device, |_, _| Vec4::ONE);
}

#[test]
fn failed_resize_keeps_the_old_buffers() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(|_, _| Vec4::ONE));
    composer.add_pass(EffectPass::with_effects("main", vec![scale(0.5)]).unwrap());
    let before = (composer.input_target(), composer.output_target());

    device.set_target_budget(Some(3));
    let err = composer.set_size(&mut device, 8, 8).unwrap_err();
    assert!(err.is_resource_exhaustion(), "{err}");

    assert_eq!(composer.size(), (W, H));
    assert_eq!((composer.input_target(), composer.output_target()), before);
    assert_eq!(device.live_targets(), 2);
    assert!(device.target_sizes().iter().all(|&size| size == (W, H)));

    composer.render(&mut device, 0.016).unwrap();
    assert_screen(&device, |_, _| Vec4::new(0.5, 0.5, 0.5, 1.0));
}

#[test]
fn exhausted_attachment_fails_the_frame_without_committing() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(EffectPass::with_effects("depth", vec![depth_probe()]).unwrap());
    device.set_target_budget(Some(2));

    let err = composer.render(&mut device, 0.016).unwrap_err();
    assert!(err.is_resource_exhaustion());
    assert_eq!(composer.frame_index(), 0);
    assert!(composer.depth_target().is_none());

    device.set_target_budget(None);
    composer.render(&mut device, 0.016).unwrap();
    assert_eq!(composer.frame_index(), 1);
}

#[test]
fn broken_shader_reports_a_compilation_error() {
    let mut device = device();
    device.register_kernel("broken", |input| input.color);
    let mut composer = composer(&mut device);
    let broken = Effect::new(
        "broken",
        "fn transform(color: vec4f, uv: vec2f) -> vec4f { return colour; }",
    )
    .unwrap();
    composer.add_pass(scene(pattern));
    let id = composer.add_pass(EffectPass::with_effects("main", vec![identity(), broken]).unwrap());

    match composer.render(&mut device, 0.016).unwrap_err() {
        FxError::Compilation { pass, effects, wgsl, .. } => {
            assert_eq!(pass, "main");
            assert_eq!(effects, ["identity", "broken"]);
            assert!(wgsl.contains("fn e1_transform"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(device.stats().frames, 0);

    composer.pass_as_mut::<EffectPass>(id).unwrap().remove_effect("broken");
    composer.render(&mut device, 0.016).unwrap();
    assert_screen(&device, pattern);
}

#[test]
fn add_effects_splits_around_convolutions() {
    let mut device = device();
    let mut composer = composer(&mut device);
    let ids = composer
        .add_effects(vec![scale(0.5), effects::box_blur(1), offset(0.1)])
        .unwrap();
    assert_eq!(ids.len(), 3);

    let blur = composer.pass_as::<EffectPass>(ids[1]).unwrap();
    assert_eq!(blur.effects().len(), 1);
    assert_eq!(blur.effects()[0].name(), "box_blur");
}

#[test]
fn disabled_convolution_can_be_enabled_after_grouping() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(|_, _| Vec4::ONE));
    let mut blur = effects::box_blur(1);
    blur.set_enabled(false);
    let ids = composer.add_effects(vec![scale(0.5), blur]).unwrap();
    assert_eq!(ids.len(), 2);

    // The blur pass has nothing to do and steps aside.
    composer.render(&mut device, 0.016).unwrap();
    assert_eq!(device.stats().draws, 1);
    assert_screen(&device, |_, _| Vec4::new(0.5, 0.5, 0.5, 1.0));

    composer
        .pass_as_mut::<EffectPass>(ids[1])
        .unwrap()
        .effect_mut("box_blur")
        .unwrap()
        .set_enabled(true);
    composer.render(&mut device, 0.016).unwrap();
    assert_eq!(device.stats().draws, 3);
    assert_screen(&device, |_, _| Vec4::new(0.5, 0.5, 0.5, 1.0));
    assert_eq!(composer.frame_index(), 2);
}

#[test]
fn structural_changes_between_frames_compile_once() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(|_, _| Vec4::ONE));
    let id = composer.add_pass(EffectPass::with_effects("main", vec![scale(0.5), offset(0.1)]).unwrap());
    composer.render(&mut device, 0.016).unwrap();
    let before = composer.pass_as::<EffectPass>(id).unwrap().compilation_token();
    assert_eq!(device.stats().compilations, 1);

    let pass = composer.pass_as_mut::<EffectPass>(id).unwrap();
    for enabled in [false, true, false, true, false] {
        pass.effect_mut("offset").unwrap().set_enabled(enabled);
        pass.effect_mut("scale").unwrap().set_enabled(!enabled);
        pass.effect_mut("scale").unwrap().set_enabled(true);
    }
    assert_eq!(device.stats().compilations, 1);
    assert_eq!(pass.compilation_token(), before);

    composer.render(&mut device, 0.016).unwrap();
    let after = composer.pass_as::<EffectPass>(id).unwrap().compilation_token();
    assert_eq!(device.stats().compilations, 2);
    assert_ne!(after, before);
    assert_screen(&device, |_, _| Vec4::new(0.5, 0.5, 0.5, 1.0));

    composer.render(&mut device, 0.016).unwrap();
    assert_eq!(device.stats().compilations, 2);
    assert_eq!(composer.pass_as::<EffectPass>(id).unwrap().compilation_token(), after);
}

#[test]
fn stock_effects_run_on_the_software_device() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(|_, _| Vec4::new(0.25, 1.0, 3.0, 1.0)));
    composer
        .add_effects(vec![
            effects::tone_mapping(effects::ToneMapping::Reinhard),
            effects::color_lut(&[[255, 255, 255, 255], [0, 0, 0, 255]]),
        ])
        .unwrap();

    composer.render(&mut device, 0.016).unwrap();

    // Reinhard: 0.2, 0.5, 0.75; the LUT then inverts each channel.
    assert_screen(&device, |_, _| Vec4::new(0.8, 0.5, 0.25, 1.0));
    assert_eq!(device.live_textures(), 1);

    composer.dispose(&mut device);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.live_targets(), 0);
}

#[test]
fn box_blur_averages_neighbors() {
    let mut device = device();
    let mut composer = composer(&mut device);
    // A single lit pixel in the middle of a dark image.
    composer.add_pass(scene(|x, y| {
        if (x, y) == (1, 1) { Vec4::new(9.0, 9.0, 9.0, 1.0) } else { Vec4::new(0.0, 0.0, 0.0, 1.0) }
    }));
    composer.add_effects(vec![effects::box_blur(1)]).unwrap();

    composer.render(&mut device, 0.016).unwrap();

    assert_close(device.screen_pixel(0, 0), Vec4::new(1.0, 1.0, 1.0, 1.0));
    assert_close(device.screen_pixel(3, 3), Vec4::new(0.0, 0.0, 0.0, 1.0));
}

#[test]
fn gradient_replaces_its_input() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(scene(pattern));
    composer
        .add_effects(vec![effects::gradient(Vec3::ZERO, Vec3::ONE)])
        .unwrap();

    composer.render(&mut device, 0.016).unwrap();

    for y in 0..H {
        let v = (y as f32 + 0.5) / H as f32;
        assert_close(device.screen_pixel(0, y), Vec4::new(v, v, v, 1.0));
        assert_close(device.screen_pixel(3, y), Vec4::new(v, v, v, 1.0));
    }
}

#[test]
fn frame_uniforms_track_time() {
    let mut device = device();
    let mut composer = composer(&mut device);
    composer.add_pass(LambdaPass::new("probe", |ctx, _io| {
        assert_eq!(ctx.frame.width, W);
        assert!(ctx.frame.time >= ctx.frame.delta);
        assert_eq!(ctx.frame.uniforms().texel_size, [1.0 / W as f32, 1.0 / H as f32]);
        Ok(())
    }));
    composer.render(&mut device, 0.5).unwrap();
    composer.render(&mut device, 0.5).unwrap();
    assert_eq!(composer.frame_index(), 2);
}
