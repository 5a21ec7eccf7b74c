//! Demo: a procedural backdrop run through merged stock effects.
//!
//! ```text
//! postfx-demo                     open a window
//! postfx-demo --screenshot out.png   render one frame headless and save it
//! ```

use std::sync::Arc;
use std::time::Instant;

use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use postfx::{
    ComposerConfig, EffectComposer, EffectPass, PassId, RenderDevice, Vec3, WgpuDevice, effects,
};

struct Demo {
    composer: EffectComposer,
    grading: PassId,
}

impl Demo {
    fn new(device: &mut dyn RenderDevice) -> postfx::Result<Self> {
        let mut composer = EffectComposer::new(device, ComposerConfig::default())?;
        let passes = composer.add_effects(vec![
            effects::gradient(Vec3::new(0.05, 0.1, 0.3), Vec3::new(1.6, 0.9, 0.4)),
            effects::tone_mapping(effects::ToneMapping::Aces),
            effects::brightness_contrast(0.0, 0.15),
            effects::vignette(1.1, 0.7),
        ])?;
        log::info!("demo: {} effect pass(es)", passes.len());
        let grading = passes.last().copied().ok_or_else(|| {
            postfx::FxError::config("demo", "no passes were created")
        })?;
        Ok(Self { composer, grading })
    }

    fn animate(&mut self, time: f32) {
        let Some(pass) = self.composer.pass_as_mut::<EffectPass>(self.grading) else {
            return;
        };
        if let Some(vignette) = pass.effect_mut("vignette") {
            let darkness = 0.55 + 0.25 * (time * 0.8).sin();
            if let Err(err) = vignette.set_uniform("vignette_darkness", darkness) {
                log::warn!("demo: {err}");
            }
        }
    }
}

struct App {
    window: Option<Arc<Window>>,
    device: Option<WgpuDevice>,
    demo: Option<Demo>,
    start_time: Instant,
    last_frame: Instant,
}

impl Default for App {
    fn default() -> Self {
        Self {
            window: None,
            device: None,
            demo: None,
            start_time: Instant::now(),
            last_frame: Instant::now(),
        }
    }
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> postfx::Result<()> {
        let attributes = Window::default_attributes().with_title("postfx demo");
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => return Err(postfx::FxError::config("window", err.to_string())),
        };
        let mut device = WgpuDevice::new(window.clone())?;
        let demo = Demo::new(&mut device)?;

        self.window = Some(window);
        self.device = Some(device);
        self.demo = Some(demo);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            log::error!("demo: {err}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let (Some(device), Some(demo)) = (&mut self.device, &mut self.demo) {
                    demo.composer.dispose(device);
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let (Some(device), Some(demo)) = (&mut self.device, &mut self.demo) {
                    if size.width > 0 && size.height > 0 {
                        device.resize_surface(size.width, size.height);
                        if let Err(err) = demo.composer.set_size(device, size.width, size.height) {
                            log::warn!("demo: resize failed: {err}");
                        }
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let delta = now.duration_since(self.last_frame).as_secs_f32();
                self.last_frame = now;

                if let (Some(device), Some(demo)) = (&mut self.device, &mut self.demo) {
                    demo.animate(self.start_time.elapsed().as_secs_f32());
                    if let Err(err) = demo.composer.render(device, delta) {
                        log::warn!("demo: frame dropped: {err}");
                    }
                }

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => (),
        }
    }
}

fn screenshot(path: &str) -> postfx::Result<()> {
    let mut device = WgpuDevice::headless(1280, 720)?;
    let mut demo = Demo::new(&mut device)?;
    demo.animate(0.0);
    demo.composer.render(&mut device, 0.0)?;
    device.save_screenshot(path)?;
    demo.composer.dispose(&mut device);
    log::info!("demo: wrote {path}");
    Ok(())
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if let [_, flag, path] = args.as_slice() {
        if flag == "--screenshot" {
            if let Err(err) = screenshot(path) {
                log::error!("demo: {err}");
                std::process::exit(1);
            }
            return;
        }
    }

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            log::error!("demo: cannot create event loop: {err}");
            std::process::exit(1);
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::default();
    if let Err(err) = event_loop.run_app(&mut app) {
        log::error!("demo: {err}");
    }
}
