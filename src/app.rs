use std::time::Instant;

use glam::Vec3;
use shamble_runtime::{
    AssetLoader, BasicWorld, DemoConfig, FrameStatus, Graphics, RcWindow, RuntimeEvent,
    ViewportSize, create_graphics,
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

enum State {
    Ready(Box<ReadyState>),
    Init(Option<EventLoopProxy<RuntimeEvent>>),
}

struct ReadyState {
    gfx: Graphics,
    world: BasicWorld,
    overlay: DebugOverlay,
}

/// Numbers shown in the debug window, sampled before each frame.
struct OverlayStats {
    fps: f32,
    target: Vec3,
    mixers: usize,
    pending_loads: usize,
    sample_count: u32,
}

struct DebugOverlay {
    visible: bool,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl DebugOverlay {
    fn new(gfx: &Graphics) -> Self {
        let egui_ctx = egui::Context::default();
        let viewport_id = egui_ctx.viewport_id();

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            viewport_id,
            gfx.window(),
            None,
            None,
            None,
        );

        let egui_renderer = egui_wgpu::Renderer::new(
            gfx.device(),
            gfx.surface_config().format,
            egui_wgpu::RendererOptions::default(),
        );

        Self {
            visible: false,
            egui_ctx,
            egui_state,
            egui_renderer,
        }
    }

    fn paint(
        &mut self,
        gfx: &mut Graphics,
        swap_view: &wgpu::TextureView,
        encoder: &mut wgpu::CommandEncoder,
        stats: &OverlayStats,
        eye: Vec3,
    ) {
        if !self.visible {
            return;
        }

        let raw_input = self.egui_state.take_egui_input(gfx.window());
        let visible = &mut self.visible;
        let full_output = self.egui_ctx.run(raw_input, |ctx| {
            egui::Window::new("Debug")
                .open(visible)
                .resizable(false)
                .default_pos(egui::pos2(12.0, 12.0))
                .show(ctx, |ui| {
                    ui.horizontal(|ui| {
                        ui.label("FPS:");
                        ui.monospace(format!("{:.1}", stats.fps));
                    });
                    ui.horizontal(|ui| {
                        ui.label("Camera:");
                        ui.monospace(format!("{:.1} {:.1} {:.1}", eye.x, eye.y, eye.z));
                    });
                    ui.horizontal(|ui| {
                        ui.label("Target:");
                        ui.monospace(format!(
                            "{:.1} {:.1} {:.1}",
                            stats.target.x, stats.target.y, stats.target.z
                        ));
                    });
                    ui.separator();
                    ui.label(format!("Mixers: {}", stats.mixers));
                    ui.label(format!("Pending loads: {}", stats.pending_loads));
                    ui.label(format!("MSAA: {}x", stats.sample_count));
                    ui.separator();
                    ui.label("F1 toggles this window, Esc quits.");
                });
        });

        let egui::FullOutput {
            platform_output,
            textures_delta,
            shapes,
            pixels_per_point,
            ..
        } = full_output;

        self.egui_state
            .handle_platform_output(gfx.window(), platform_output);

        let paint_jobs = self.egui_ctx.tessellate(shapes, pixels_per_point);

        for (id, image_delta) in &textures_delta.set {
            self.egui_renderer
                .update_texture(gfx.device(), gfx.queue(), *id, image_delta);
        }
        for id in &textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [gfx.surface_config().width, gfx.surface_config().height],
            pixels_per_point,
        };

        self.egui_renderer.update_buffers(
            gfx.device(),
            gfx.queue(),
            encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        let rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("egui_overlay_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: swap_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        let mut rpass = rpass.forget_lifetime();
        self.egui_renderer
            .render(&mut rpass, &paint_jobs, &screen_descriptor);
    }
}

pub struct App {
    state: State,
    config: Option<DemoConfig>,
    loader: AssetLoader,
    started: Instant,
    last_redraw: Option<Instant>,
    fps: f32,
}

impl App {
    pub fn new(event_loop: &EventLoop<RuntimeEvent>, config: DemoConfig) -> Self {
        Self {
            state: State::Init(Some(event_loop.create_proxy())),
            config: Some(config),
            loader: AssetLoader::new(event_loop.create_proxy()),
            started: Instant::now(),
            last_redraw: None,
            fps: 0.0,
        }
    }

    fn resized(&mut self, size: PhysicalSize<u32>) {
        if let State::Ready(ready) = &mut self.state {
            ready.gfx.resize(size);
            let logical = size.to_logical::<u32>(ready.gfx.window().scale_factor());
            ready.world.on_window_resize(logical.width, logical.height);
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let State::Ready(ready) = &mut self.state else {
            return;
        };
        let ReadyState {
            gfx,
            world,
            overlay,
        } = &mut **ready;

        // Queue the next frame first so the loop survives a failed one.
        gfx.request_redraw();

        let now = Instant::now();
        if let Some(last) = self.last_redraw.replace(now) {
            let dt = (now - last).as_secs_f32();
            if dt > 0.0 {
                self.fps = if self.fps == 0.0 {
                    1.0 / dt
                } else {
                    self.fps * 0.9 + 0.1 / dt
                };
            }
        }

        let stats = OverlayStats {
            fps: self.fps,
            target: world.controls().target,
            mixers: world.mixers().len(),
            pending_loads: world.pending_loads(),
            sample_count: gfx.sample_count(),
        };
        let timestamp_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let status = world.frame(timestamp_ms, |scene, camera| {
            gfx.render(scene, camera, |gfx, swap_view, encoder| {
                overlay.paint(gfx, swap_view, encoder, &stats, camera.position);
            });
        });

        if status == FrameStatus::Stopped {
            log::info!("render loop stopped");
            event_loop.exit();
        }
    }

    fn key_pressed(&mut self, event: &KeyEvent) {
        let State::Ready(ready) = &mut self.state else {
            return;
        };
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => ready.world.stop(),
            PhysicalKey::Code(KeyCode::F1) => ready.overlay.visible = !ready.overlay.visible,
            _ => {}
        }
    }
}

impl ApplicationHandler<RuntimeEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let State::Init(proxy) = &mut self.state {
            if let Some(proxy) = proxy.take() {
                let (title, width, height) = self
                    .config
                    .as_ref()
                    .map(|c| (c.window.title.clone(), c.window.width, c.window.height))
                    .unwrap_or_default();
                let win_attr = Window::default_attributes()
                    .with_title(title)
                    .with_inner_size(winit::dpi::LogicalSize::new(width.max(1), height.max(1)));

                let window: RcWindow = std::sync::Arc::new(
                    event_loop
                        .create_window(win_attr)
                        .expect("create window err."),
                );
                pollster::block_on(create_graphics(window, proxy));
            }
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Graphics(gfx) => {
                let Some(config) = self.config.take() else {
                    log::warn!("graphics delivered twice, ignoring");
                    return;
                };
                let overlay = DebugOverlay::new(&gfx);
                let window = gfx.window();
                let logical = window.inner_size().to_logical::<u32>(window.scale_factor());
                let world = BasicWorld::initialize(
                    config,
                    ViewportSize::new(logical.width, logical.height),
                    &self.loader,
                );

                gfx.request_redraw();
                self.state = State::Ready(Box::new(ReadyState {
                    gfx: *gfx,
                    world,
                    overlay,
                }));
            }
            RuntimeEvent::Load(event) => match &mut self.state {
                State::Ready(ready) => ready.world.handle_load_event(event, &self.loader),
                State::Init(_) => log::debug!("load event before the world exists: {event:?}"),
            },
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::Resized(size) => self.resized(size),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::CloseRequested => {
                if let State::Ready(ready) = &self.state {
                    ready.world.stop();
                }
                event_loop.exit();
            }
            other => {
                if let WindowEvent::KeyboardInput { event, .. } = &other {
                    self.key_pressed(event);
                }
                if let State::Ready(ready) = &mut self.state {
                    let consumed = ready.overlay.visible && {
                        let response = ready
                            .overlay
                            .egui_state
                            .on_window_event(ready.gfx.window(), &other);
                        response.consumed
                    };
                    if !consumed {
                        ready.world.handle_window_event(&other);
                    }
                }
            }
        }
    }
}
