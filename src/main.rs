// =============================================================================
// SWAPFRAME - Minimal real-time Vulkan renderer
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, window, input)                          │
// │    └── Engine (per-frame sequence)                              │
// │          └── Renderer (scene, command buffers, render pass)     │
// │                └── Swapchain (images, frame sync)               │
// │                      └── DeviceContext (instance, GPU, queues)  │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Rebuild the swapchain if it went stale
// 2. Wait for this frame slot's fence
// 3. Acquire an image (and wait for whoever still uses it)
// 4. Record the scene into the image's command buffer
// 5. Submit, then present
//
// =============================================================================

mod backend;
mod config;
mod engine;
mod material;
mod renderer;
mod scene;
mod window;

use anyhow::Result;
use backend::DeviceContext;
use config::Config;
use engine::{Engine, FrameStatus};
use glam::Vec4;
use material::{FlatMaterial, Material};
use renderer::Renderer;
use scene::{MeshObject, Scene};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting swapframe");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Configured level unless RUST_LOG says otherwise
fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,

    // Dropped before the window it renders to
    engine: Option<Engine<Renderer>>,
    window: Option<Arc<Window>>,

    is_fullscreen: bool,
    /// Window has no area; don't render
    is_minimized: bool,
    /// Error that ended the event loop, returned from main
    fatal: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let now = Instant::now();
        Self {
            config,
            engine: None,
            window: None,
            is_fullscreen,
            is_minimized: false,
            fatal: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn init_vulkan(&self, window: Arc<Window>) -> Result<Engine<Renderer>> {
        log::info!("Initializing Vulkan...");

        // ── Scene first: shader files are the most likely thing to be missing
        let graphics = &self.config.graphics;
        let material: Rc<RefCell<dyn Material>> = Rc::new(RefCell::new(FlatMaterial::new(
            &graphics.shader_dir,
            Vec4::from_array(graphics.tint),
        )?));

        let mut scene = Scene::new();
        scene.add(Box::new(MeshObject::with_material(material)));

        // ── Instance, then a surface to pick the GPU against ────────────────
        let required_extensions = window::required_extensions(&window)?;
        let mut device = DeviceContext::new(&self.config.device_config(), &required_extensions)?;
        let surface = window::create_surface(&device, &window)?;

        if let Err(e) = device.create_device(surface) {
            unsafe { device.surface_loader().destroy_surface(surface, None) };
            return Err(e);
        }
        let device = Arc::new(device);

        // ── Renderer takes the surface; the chain is built on the first frame
        let renderer = Renderer::new(
            device,
            window,
            surface,
            scene,
            Vec4::from_array(graphics.clear_color),
        )?;

        log::info!("Vulkan initialized successfully!");
        Ok(Engine::new(renderer))
    }

    /// Stop the loop and remember why
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal: {:#}", error);
        self.fatal = Some(error);
        event_loop.exit();
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(ref engine) = self.engine {
            if let Err(e) = engine.wait_idle() {
                log::warn!("Wait idle on shutdown failed: {:#}", e);
            }
        }
        event_loop.exit();
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        let Some(ref window) = self.window else {
            return;
        };

        self.is_fullscreen = !self.is_fullscreen;
        if self.is_fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            log::info!("Entered fullscreen mode");
        } else {
            window.set_fullscreen(None);
            log::info!("Exited fullscreen mode");
        }

        if let Some(ref mut engine) = self.engine {
            engine.on_resize();
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = window::window_attributes(&self.config.window);
        let window = match event_loop.create_window(attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::anyhow!("Failed to create window: {}", e));
                return;
            }
        };

        match self.init_vulkan(Arc::clone(&window)) {
            Ok(engine) => self.engine = Some(engine),
            Err(e) => {
                self.fail(event_loop, e.context("Failed to initialize Vulkan"));
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.is_minimized = window::is_minimized(size);
                if let Some(ref mut engine) = self.engine {
                    engine.on_resize();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.is_minimized {
                    return;
                }
                let Some(ref mut engine) = self.engine else {
                    return;
                };

                match engine.render() {
                    Ok(FrameStatus::Presented) => self.update_fps(),
                    Ok(FrameStatus::Skipped) | Ok(FrameStatus::OutOfDate) => {}
                    Err(e) => self.fail(event_loop, e),
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if !event.state.is_pressed() {
                    return;
                }
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => {
                        log::info!("ESC pressed, exiting...");
                        self.shutdown(event_loop);
                    }
                    PhysicalKey::Code(KeyCode::F11) => self.toggle_fullscreen(),
                    _ => {}
                }
            }

            _ => {}
        }
    }

    /// Redraw continuously while there is something to draw into
    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(window::control_flow(self.is_minimized));
        if self.is_minimized {
            return;
        }
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            log::info!(
                "Cleaning up Vulkan resources after {} frames...",
                engine.frames_presented()
            );
            drop(engine);
        }
        log::info!("Cleanup complete");
    }
}
