pub mod config;
pub mod frame;
pub mod loader;
pub mod world;

use std::sync::Arc;

use winit::{dpi::PhysicalSize, event_loop::EventLoopProxy, window::Window};

use wgpu::{
    CommandEncoder, CommandEncoderDescriptor, Device, ExperimentalFeatures, Features,
    Instance, Limits, MemoryHints, PowerPreference, Queue, RequestAdapterOptions, Surface,
    SurfaceConfiguration, SurfaceError, TextureView, TextureViewDescriptor,
};

pub use config::{ConfigError, DemoConfig};
pub use frame::{FrameClock, FramePhase, FrameStatus, StopSignal};
pub use loader::{AssetLoader, LoadError, LoadEvent, LoadId, LoadSink, LoadedAsset};
pub use world::{BasicWorld, ViewportSize};

use shamble_3d::Renderer3D;
use shamble_camera::PerspectiveCamera;
use shamble_scene::Scene;

pub type RcWindow = Arc<Window>;

const MSAA_SAMPLES: u32 = 4;

/// Everything the event loop can be woken with.
pub enum RuntimeEvent {
    Graphics(Box<Graphics>),
    Load(LoadEvent),
}

impl From<LoadEvent> for RuntimeEvent {
    fn from(event: LoadEvent) -> Self {
        RuntimeEvent::Load(event)
    }
}

pub async fn create_graphics(window: RcWindow, proxy: EventLoopProxy<RuntimeEvent>) {
    let instance = Instance::default();
    let surface = instance
        .create_surface(Arc::clone(&window))
        .expect("Could not create a surface for the window.");

    let adapter = instance
        .request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::default(),
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        })
        .await
        .expect("Could not get an adapter (GPU).");

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: Features::empty(),
            required_limits: Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits()),
            memory_hints: MemoryHints::Performance,
            trace: Default::default(),
            experimental_features: ExperimentalFeatures::disabled(),
        })
        .await
        .expect("Failed to get device");

    let size = window.inner_size();
    let surface_config = surface
        .get_default_config(&adapter, size.width.max(1), size.height.max(1))
        .expect("Failed to create surface config");
    surface.configure(&device, &surface_config);

    let sample_count = if adapter
        .get_texture_format_features(surface_config.format)
        .flags
        .sample_count_supported(MSAA_SAMPLES)
    {
        MSAA_SAMPLES
    } else {
        log::warn!(
            "{:?} does not support {MSAA_SAMPLES}x MSAA, antialiasing disabled",
            surface_config.format
        );
        1
    };

    let renderer = Renderer3D::new(
        &device,
        surface_config.format,
        surface_config.width,
        surface_config.height,
        sample_count,
    );
    log::info!(
        "graphics ready: {} ({:?}), {}x{} {:?}, {sample_count}x MSAA",
        adapter.get_info().name,
        adapter.get_info().backend,
        surface_config.width,
        surface_config.height,
        surface_config.format
    );

    let gfx = Graphics {
        window,
        surface,
        surface_config,
        device,
        queue,
        renderer,
    };

    let _ = proxy.send_event(RuntimeEvent::Graphics(Box::new(gfx)));
}

pub struct Graphics {
    window: RcWindow,
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,
    device: Device,
    queue: Queue,
    renderer: Renderer3D,
}

impl Graphics {
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.surface_config.width = new_size.width.max(1);
        self.surface_config.height = new_size.height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
        self.renderer.resize(
            &self.device,
            self.surface_config.width,
            self.surface_config.height,
        );
    }

    /// Draws `scene` into the next swapchain image, then lets `overlay`
    /// record more passes on top of it.
    pub fn render<F>(&mut self, scene: &Scene, camera: &PerspectiveCamera, overlay: F)
    where
        F: FnOnce(&mut Self, &TextureView, &mut CommandEncoder),
    {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Lost | SurfaceError::Outdated) => {
                log::debug!("surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                return;
            }
            Err(SurfaceError::Timeout) => {
                log::debug!("surface timeout, skipping frame");
                return;
            }
            Err(err) => {
                log::error!("failed to acquire swapchain image: {err}");
                return;
            }
        };
        let swap_view = frame.texture.create_view(&TextureViewDescriptor::default());

        self.renderer
            .prepare(&self.device, &self.queue, scene, camera);

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        self.renderer.render(&mut encoder, &swap_view);
        overlay(self, &swap_view, &mut encoder);
        self.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn surface_config(&self) -> &SurfaceConfiguration {
        &self.surface_config
    }

    pub fn sample_count(&self) -> u32 {
        self.renderer.sample_count()
    }
}
