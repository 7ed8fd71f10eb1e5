use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use glam::{Quat, Vec3};
use shamble_anim::{AnimationClip, AnimationMixer, LoopMode};
use shamble_camera::{OrbitControls, PerspectiveCamera};
use shamble_scene::{
    AmbientLight, Background, Color, DirectionalLight, DirectionalShadow, Material, Mesh, Node,
    NodeId, Prefab, Scene, ShadowFrustum, Transform,
};
use winit::event::WindowEvent;

use crate::config::DemoConfig;
use crate::frame::{FrameClock, FramePhase, FrameStatus, StopSignal};
use crate::loader::{AssetLoader, LoadEvent, LoadId, LoadedAsset};

/// Logical size of the drawing area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PendingKind {
    Skybox,
    Model,
    Animations { model: NodeId },
}

#[derive(Debug)]
struct PendingLoad {
    path: PathBuf,
    kind: PendingKind,
    last_percent: Option<u64>,
}

impl PendingLoad {
    /// Returns the new whole percentage, or `None` when it has not changed
    /// or the total is unknown.
    fn record_progress(&mut self, loaded: u64, total: u64) -> Option<u64> {
        if total == 0 {
            return None;
        }
        let percent = loaded.min(total) * 100 / total;
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(percent)
    }
}

/// The demo scene: camera, lights, sky, ground and one animated model.
pub struct BasicWorld {
    config: DemoConfig,
    scene: Scene,
    camera: PerspectiveCamera,
    controls: OrbitControls,
    mixers: Vec<AnimationMixer>,
    viewport: ViewportSize,
    clock: FrameClock,
    pending: HashMap<LoadId, PendingLoad>,
    ground: NodeId,
}

impl BasicWorld {
    /// Builds the static scene and starts the skybox and model loads.
    pub fn initialize(config: DemoConfig, viewport: ViewportSize, loader: &AssetLoader) -> Self {
        let cam = &config.camera;
        let mut camera = PerspectiveCamera::new(cam.fov, cam.aspect, cam.near, cam.far);
        camera.position = Vec3::from(cam.position);

        let mut controls = OrbitControls::new(Vec3::from(config.controls.target));
        controls.set_viewport_height(viewport.height as f32);
        controls.update(&mut camera);

        let mut scene = Scene::new();
        scene.directional_lights.push(sun_from_config(&config));
        scene.ambient_lights.push(AmbientLight::new(
            config.ambient.color(),
            config.ambient.intensity,
        ));

        let g = &config.ground;
        let plane = Mesh::plane(
            g.width,
            g.height,
            g.width_segments,
            g.height_segments,
            Material::from_color(Color::from_hex(g.color).with_alpha(1.0)),
        );
        let mesh = scene.add_mesh(plane);
        let mut ground = Node::new("ground")
            .with_mesh(mesh)
            .with_transform(Transform::from_rotation(Quat::from_rotation_x(
                -std::f32::consts::FRAC_PI_2,
            )));
        ground.cast_shadow = false;
        ground.receive_shadow = true;
        let ground = scene.spawn(ground, None);
        scene.attach(ground);

        let mut world = Self {
            config,
            scene,
            camera,
            controls,
            mixers: Vec::new(),
            viewport,
            clock: FrameClock::new(StopSignal::new()),
            pending: HashMap::new(),
            ground,
        };

        let faces = world.config.assets.skybox_paths();
        let sky_path = faces[0].parent().map(PathBuf::from).unwrap_or_default();
        let id = loader.load_cube_map(faces);
        world.track(id, sky_path, PendingKind::Skybox);

        world.load_model(loader);
        log::info!(
            "world initialized at {}x{}",
            world.viewport.width,
            world.viewport.height
        );
        world
    }

    fn load_model(&mut self, loader: &AssetLoader) {
        let path = self.config.assets.model_path();
        let id = loader.load_model(&path);
        self.track(id, path, PendingKind::Model);
    }

    fn track(&mut self, id: LoadId, path: PathBuf, kind: PendingKind) {
        self.pending.insert(
            id,
            PendingLoad {
                path,
                kind,
                last_percent: None,
            },
        );
    }

    pub fn on_window_resize(&mut self, width: u32, height: u32) {
        self.viewport = ViewportSize::new(width, height);
        self.camera.aspect = self.viewport.width as f32 / self.viewport.height as f32;
        self.camera.update_projection_matrix();
        self.controls.set_viewport_height(self.viewport.height as f32);
    }

    /// Advances every mixer by `elapsed_ms`, then poses the scene.
    pub fn step(&mut self, elapsed_ms: f64) {
        let seconds = (elapsed_ms / 1000.0) as f32;
        for mixer in &mut self.mixers {
            mixer.update(seconds);
        }
        for mixer in &self.mixers {
            mixer.apply(&mut self.scene);
        }
    }

    /// One turn of the render loop. Renders, then steps by the time since
    /// the previous frame. Does nothing once stopped.
    pub fn frame<F>(&mut self, timestamp_ms: f64, render: F) -> FrameStatus
    where
        F: FnOnce(&Scene, &PerspectiveCamera),
    {
        let Some(elapsed_ms) = self.clock.tick(timestamp_ms) else {
            return FrameStatus::Stopped;
        };

        self.controls.update(&mut self.camera);
        self.scene.update_world_transforms();
        render(&self.scene, &self.camera);

        self.step(elapsed_ms);
        FrameStatus::Rendered { elapsed_ms }
    }

    pub fn stop(&self) {
        self.clock.stop_signal().stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.clock.stop_signal().clone()
    }

    pub fn phase(&self) -> FramePhase {
        self.clock.phase()
    }

    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        self.controls.handle_window_event(event, &self.camera);
    }

    /// Applies a loader event. Completions for loads this world is not
    /// waiting on are ignored.
    pub fn handle_load_event(&mut self, event: LoadEvent, loader: &AssetLoader) {
        match event {
            LoadEvent::Progress { id, loaded, total } => {
                let Some(pending) = self.pending.get_mut(&id) else {
                    return;
                };
                if let Some(percent) = pending.record_progress(loaded, total) {
                    log::info!("{}: {percent}% loaded", pending.path.display());
                }
            }
            LoadEvent::Finished { id, outcome } => {
                let Some(pending) = self.pending.remove(&id) else {
                    log::warn!("ignoring completion of load {id}, nothing is waiting for it");
                    return;
                };
                let asset = match outcome {
                    Ok(asset) => asset,
                    Err(err) => {
                        log::error!("{err}");
                        return;
                    }
                };
                match (pending.kind, asset) {
                    (PendingKind::Skybox, LoadedAsset::Skybox(cube)) => {
                        log::info!("skybox ready ({}px faces)", cube.size);
                        self.scene.set_background(Background::CubeMap(Arc::new(cube)));
                    }
                    (PendingKind::Model, LoadedAsset::Model(prefab)) => {
                        self.on_model_loaded(&prefab, loader);
                    }
                    (PendingKind::Animations { model }, LoadedAsset::Animations(clips)) => {
                        self.on_animations_loaded(model, clips, &pending.path);
                    }
                    (kind, asset) => {
                        log::error!(
                            "{}: expected {kind:?}, got {}",
                            pending.path.display(),
                            asset.kind()
                        );
                    }
                }
            }
        }
    }

    fn on_model_loaded(&mut self, prefab: &Prefab, loader: &AssetLoader) {
        let assets = &self.config.assets;
        let model = self.scene.instantiate(prefab);
        {
            let node = self.scene.node_mut(model);
            node.transform.set_uniform_scale(assets.model_scale);
            node.transform.translation = assets.model_position();
        }
        for id in self.scene.descendants(model) {
            self.scene.node_mut(id).cast_shadow = true;
        }
        self.scene.attach(model);
        log::info!(
            "model '{}' added with {} meshes",
            prefab.name.as_deref().unwrap_or("unnamed"),
            prefab.mesh_count()
        );

        let path = self.config.assets.animation_path();
        let id = loader.load_animations(&path);
        self.track(id, path, PendingKind::Animations { model });
    }

    fn on_animations_loaded(
        &mut self,
        model: NodeId,
        clips: Vec<AnimationClip>,
        path: &std::path::Path,
    ) {
        let Some(clip) = clips.into_iter().next() else {
            log::error!("{}: no animation clips", path.display());
            return;
        };
        let mut mixer = AnimationMixer::new(model);
        let action = mixer.clip_action(Arc::new(clip), &self.scene);
        mixer
            .action_mut(action)
            .set_loop(LoopMode::Repeat)
            .play();
        log::info!(
            "playing '{}' ({} of {} tracks bound)",
            mixer.action(action).clip().name,
            mixer.action(action).bound_tracks(),
            mixer.action(action).clip().tracks.len()
        );
        self.mixers.push(mixer);
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn mixers(&self) -> &[AnimationMixer] {
        &self.mixers
    }

    /// Size last handed to the renderer.
    pub fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    pub fn pending_loads(&self) -> usize {
        self.pending.len()
    }

    pub fn ground(&self) -> NodeId {
        self.ground
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn last_frame_ms(&self) -> Option<f64> {
        self.clock.previous()
    }
}

fn sun_from_config(config: &DemoConfig) -> DirectionalLight {
    let sun = &config.sun;
    let mut light = DirectionalLight::new(Color::from_hex(sun.color), sun.intensity);
    light.position = Vec3::from(sun.position);
    light.target = Vec3::from(sun.target);
    let s = &sun.shadow;
    light.shadow = Some(DirectionalShadow {
        bias: s.bias,
        map_size: s.map_size,
        frustum: ShadowFrustum {
            left: s.left,
            right: s.right,
            top: s.top,
            bottom: s.bottom,
            near: s.near,
            far: s.far,
        },
    });
    light
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadError;
    use shamble_anim::{Interpolation, Track, TrackValues};
    use shamble_scene::PrefabNode;
    use std::sync::mpsc;

    fn world() -> (BasicWorld, AssetLoader, mpsc::Receiver<LoadEvent>) {
        let dir = std::env::temp_dir().join("shamble-world-tests-missing");
        let mut config = DemoConfig::default();
        config.assets.root = dir;
        let (tx, rx) = mpsc::channel();
        let loader = AssetLoader::new(tx);
        let world = BasicWorld::initialize(config, ViewportSize::new(1920, 1080), &loader);
        (world, loader, rx)
    }

    fn prefab() -> Prefab {
        Prefab {
            name: Some("Zombie".into()),
            nodes: vec![PrefabNode {
                name: Some("Hips".into()),
                transform: Transform::IDENTITY,
                mesh: None,
                skin: None,
                children: Vec::new(),
            }],
            roots: vec![0],
            meshes: Vec::new(),
            skins: Vec::new(),
        }
    }

    fn walk() -> AnimationClip {
        AnimationClip::new(
            "Walk",
            vec![Track::new(
                "Hips".to_string(),
                vec![0.0, 1.0],
                TrackValues::Translation(vec![Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0)]),
                Interpolation::Linear,
            )],
        )
    }

    /// Drives a model load through to a playing mixer without touching disk.
    fn load_model(world: &mut BasicWorld, loader: &AssetLoader) -> LoadId {
        let model_id = world
            .pending
            .iter()
            .find(|(_, p)| matches!(p.kind, PendingKind::Model))
            .map(|(id, _)| *id)
            .unwrap();
        world.handle_load_event(
            LoadEvent::Finished {
                id: model_id,
                outcome: Ok(LoadedAsset::Model(prefab())),
            },
            loader,
        );
        let anim_id = world
            .pending
            .iter()
            .find(|(_, p)| matches!(p.kind, PendingKind::Animations { .. }))
            .map(|(id, _)| *id)
            .unwrap();
        world.handle_load_event(
            LoadEvent::Finished {
                id: anim_id,
                outcome: Ok(LoadedAsset::Animations(vec![walk()])),
            },
            loader,
        );
        anim_id
    }

    #[test]
    fn initialize_builds_static_scene() {
        let (world, _loader, _rx) = world();
        assert_eq!(world.camera().aspect, 1920.0 / 1080.0);
        assert_eq!(world.viewport(), ViewportSize::new(1920, 1080));
        assert_eq!(world.scene().directional_lights.len(), 1);
        assert_eq!(world.scene().ambient_lights.len(), 1);
        assert_eq!(world.pending_loads(), 2);
        assert!(world.mixers().is_empty());
        assert_eq!(world.phase(), FramePhase::AwaitingFirstFrame);

        let ground = world.scene().node(world.ground());
        assert!(ground.receive_shadow);
        assert!(!ground.cast_shadow);
        assert!(world.scene().is_attached(world.ground()));
    }

    #[test]
    fn resize_updates_camera_and_viewport() {
        let (mut world, _loader, _rx) = world();
        world.on_window_resize(800, 600);
        assert_eq!(world.camera().aspect, 800.0 / 600.0);
        assert_eq!(world.viewport(), ViewportSize::new(800, 600));

        world.on_window_resize(0, 0);
        assert_eq!(world.viewport(), ViewportSize::new(1, 1));
        assert_eq!(world.camera().aspect, 1.0);
    }

    #[test]
    fn model_and_animation_add_one_mixer() {
        let (mut world, loader, _rx) = world();
        load_model(&mut world, &loader);

        assert_eq!(world.mixers().len(), 1);
        let model = world.mixers()[0].root();
        assert_eq!(world.scene().occurrences(model), 1);
        assert!(
            world
                .scene()
                .descendants(model)
                .iter()
                .all(|&n| world.scene().node(n).cast_shadow)
        );
        let node = world.scene().node(model);
        assert_eq!(node.transform.scale, Vec3::splat(0.07));
        assert_eq!(node.transform.translation, Vec3::new(2.0, 0.0, 2.0));
        assert!(world.mixers()[0].actions().all(|a| a.is_running()));
    }

    #[test]
    fn repeated_completion_adds_nothing() {
        let (mut world, loader, _rx) = world();
        let anim_id = load_model(&mut world, &loader);
        world.handle_load_event(
            LoadEvent::Finished {
                id: anim_id,
                outcome: Ok(LoadedAsset::Animations(vec![walk()])),
            },
            &loader,
        );
        assert_eq!(world.mixers().len(), 1);
    }

    #[test]
    fn failed_load_adds_no_mixer() {
        let (mut world, loader, rx) = world();
        // The configured files do not exist, so both loads fail on their own.
        for _ in 0..2 {
            loop {
                let event = rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
                let done = matches!(event, LoadEvent::Finished { .. });
                if let LoadEvent::Finished { outcome, .. } = &event {
                    assert!(matches!(outcome, Err(LoadError::Io { .. })));
                }
                world.handle_load_event(event, &loader);
                if done {
                    break;
                }
            }
        }
        assert_eq!(world.pending_loads(), 0);
        assert!(world.mixers().is_empty());
        assert!(world.scene().background().is_none());
    }

    #[test]
    fn step_advances_every_mixer() {
        let (mut world, loader, _rx) = world();
        load_model(&mut world, &loader);

        world.step(0.0);
        assert_eq!(world.mixers()[0].time(), 0.0);

        world.step(500.0);
        assert!((world.mixers()[0].time() - 0.5).abs() < 1e-6);
        let hips = world
            .scene()
            .find_by_name(world.mixers()[0].root(), "Hips")
            .unwrap();
        assert!((world.scene().node(hips).transform.translation.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn frames_step_by_elapsed_time() {
        let (mut world, loader, _rx) = world();
        load_model(&mut world, &loader);

        let mut renders = 0;
        let status = world.frame(1000.0, |_, _| renders += 1);
        assert_eq!(status, FrameStatus::Rendered { elapsed_ms: 0.0 });
        assert_eq!(world.phase(), FramePhase::Running);

        world.frame(1016.0, |_, _| renders += 1);
        assert_eq!(renders, 2);
        assert!((world.mixers()[0].time() - 0.016).abs() < 1e-6);
        assert_eq!(world.last_frame_ms(), Some(1016.0));
    }

    #[test]
    fn stopped_loop_neither_renders_nor_steps() {
        let (mut world, loader, _rx) = world();
        load_model(&mut world, &loader);
        world.frame(0.0, |_, _| {});
        world.stop();

        let mut rendered = false;
        let status = world.frame(100.0, |_, _| rendered = true);
        assert_eq!(status, FrameStatus::Stopped);
        assert!(!rendered);
        assert_eq!(world.mixers()[0].time(), 0.0);
        assert_eq!(world.phase(), FramePhase::Stopped);
    }

    #[test]
    fn progress_reports_each_new_percentage_once() {
        let mut pending = PendingLoad {
            path: PathBuf::from("model.glb"),
            kind: PendingKind::Model,
            last_percent: None,
        };
        let reported: Vec<Option<u64>> = [(0, 100), (50, 100), (50, 100), (150, 100), (10, 0)]
            .into_iter()
            .map(|(loaded, total)| pending.record_progress(loaded, total))
            .collect();
        assert_eq!(reported, vec![Some(0), Some(50), None, Some(100), None]);
        assert_eq!(pending.last_percent, Some(100));
    }

    #[test]
    fn progress_events_leave_pending_loads_in_place() {
        let (mut world, loader, _rx) = world();
        let model_id = world
            .pending
            .iter()
            .find(|(_, p)| matches!(p.kind, PendingKind::Model))
            .map(|(id, _)| *id)
            .unwrap();
        let progress = |id, loaded, total| LoadEvent::Progress { id, loaded, total };

        world.handle_load_event(progress(model_id, 50, 100), &loader);
        world.handle_load_event(progress(model_id, 50, 100), &loader);
        world.handle_load_event(progress(model_id, 5, 0), &loader);
        assert_eq!(world.pending[&model_id].last_percent, Some(50));

        world.handle_load_event(progress(model_id, 150, 100), &loader);
        assert_eq!(world.pending[&model_id].last_percent, Some(100));

        world.handle_load_event(progress(LoadId(9999), 1, 2), &loader);
        assert_eq!(world.pending_loads(), 2);
        assert!(!world.pending.contains_key(&LoadId(9999)));
        assert!(world.mixers().is_empty());
    }

    #[test]
    fn unexpected_asset_kind_is_dropped() {
        let (mut world, loader, _rx) = world();
        let sky_id = world
            .pending
            .iter()
            .find(|(_, p)| matches!(p.kind, PendingKind::Skybox))
            .map(|(id, _)| *id)
            .unwrap();
        world.handle_load_event(
            LoadEvent::Finished {
                id: sky_id,
                outcome: Ok(LoadedAsset::Animations(vec![walk()])),
            },
            &loader,
        );
        assert!(world.mixers().is_empty());
        assert!(world.scene().background().is_none());
    }
}
