use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use shamble_runtime::{AssetLoader, BasicWorld, DemoConfig, LoadEvent, ViewportSize};

const MODEL: &str = r#"{
    "asset": { "version": "2.0" },
    "scene": 0,
    "scenes": [ { "name": "Zombiegirl", "nodes": [0] } ],
    "nodes": [ { "name": "Hips", "children": [1] }, { "name": "Spine" } ]
}"#;

const WALK: &str = r#"{
    "asset": { "version": "2.0" },
    "nodes": [ { "name": "Hips" } ],
    "animations": [ {
        "name": "Walk",
        "channels": [ { "sampler": 0, "target": { "node": 0, "path": "translation" } } ],
        "samplers": [ { "input": 0, "output": 1, "interpolation": "LINEAR" } ]
    } ],
    "buffers": [ { "uri": "walk.bin", "byteLength": 32 } ],
    "bufferViews": [
        { "buffer": 0, "byteOffset": 0, "byteLength": 8 },
        { "buffer": 0, "byteOffset": 8, "byteLength": 24 }
    ],
    "accessors": [
        { "bufferView": 0, "componentType": 5126, "count": 2, "type": "SCALAR",
          "min": [0.0], "max": [1.0] },
        { "bufferView": 1, "componentType": 5126, "count": 2, "type": "VEC3" }
    ]
}"#;

fn write_assets(dir: &Path) {
    std::fs::write(dir.join("model.gltf"), MODEL).unwrap();
    std::fs::write(dir.join("walk.gltf"), WALK).unwrap();
    let walk: [f32; 8] = [0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0];
    std::fs::write(dir.join("walk.bin"), bytemuck::cast_slice::<f32, u8>(&walk)).unwrap();
}

fn pump(world: &mut BasicWorld, loader: &AssetLoader, rx: &mpsc::Receiver<LoadEvent>) {
    while world.pending_loads() > 0 {
        let event = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("loader went quiet");
        world.handle_load_event(event, loader);
    }
}

#[test]
fn model_and_walk_cycle_load_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_assets(dir.path());

    let mut config = DemoConfig::default();
    config.assets.root = dir.path().to_path_buf();
    config.assets.model = "model.gltf".into();
    config.assets.animation = "walk.gltf".into();

    let (tx, rx) = mpsc::channel();
    let loader = AssetLoader::new(tx);
    let mut world = BasicWorld::initialize(config, ViewportSize::new(1920, 1080), &loader);
    pump(&mut world, &loader, &rx);

    // The skybox faces are missing: that load fails without affecting the rest.
    assert!(world.scene().background().is_none());

    assert_eq!(world.mixers().len(), 1);
    let model = world.mixers()[0].root();
    assert_eq!(world.scene().occurrences(model), 1);
    assert_eq!(world.scene().node(model).name.as_deref(), Some("Zombiegirl"));

    world.step(500.0);
    let hips = world.scene().find_by_name(model, "Hips").unwrap();
    let y = world.scene().node(hips).transform.translation.y;
    assert!((y - 1.0).abs() < 1e-5, "hips at y = {y}");
}

#[test]
fn broken_model_leaves_world_running() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("model.gltf"), "{ not json").unwrap();

    let mut config = DemoConfig::default();
    config.assets.root = dir.path().to_path_buf();
    config.assets.model = "model.gltf".into();

    let (tx, rx) = mpsc::channel();
    let loader = AssetLoader::new(tx);
    let mut world = BasicWorld::initialize(config, ViewportSize::new(1920, 1080), &loader);
    pump(&mut world, &loader, &rx);

    assert!(world.mixers().is_empty());
    let mut rendered = 0;
    world.frame(0.0, |_, _| rendered += 1);
    world.frame(16.0, |_, _| rendered += 1);
    assert_eq!(rendered, 2);
}
