use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use shamble_scene::Color;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub window: WindowSection,
    pub camera: CameraSection,
    pub controls: ControlsSection,
    pub sun: SunSection,
    pub ambient: AmbientSection,
    pub ground: GroundSection,
    pub assets: AssetsSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            title: "shamble".into(),
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            fov: 60.0,
            aspect: 1920.0 / 1080.0,
            near: 1.0,
            far: 1000.0,
            position: [75.0, 20.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsSection {
    pub target: [f32; 3],
}

impl Default for ControlsSection {
    fn default() -> Self {
        Self {
            target: [0.0, 2.0, 0.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SunSection {
    pub color: u32,
    pub intensity: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub shadow: ShadowSection,
}

impl Default for SunSection {
    fn default() -> Self {
        Self {
            color: 0xffffff,
            intensity: 1.0,
            position: [20.0, 100.0, 30.0],
            target: [0.0, 0.0, 0.0],
            shadow: ShadowSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowSection {
    pub bias: f32,
    pub map_size: u32,
    pub near: f32,
    pub far: f32,
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl Default for ShadowSection {
    fn default() -> Self {
        Self {
            bias: -0.0001,
            map_size: 2048,
            near: 0.5,
            far: 500.0,
            left: 100.0,
            right: -100.0,
            top: 100.0,
            bottom: -100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientSection {
    pub color: u32,
    pub intensity: f32,
    /// Treat `color` as sRGB and linearize it. With `false` the hex value is
    /// used as linear RGB, which is much brighter for dark colors.
    pub srgb: bool,
}

impl Default for AmbientSection {
    fn default() -> Self {
        Self {
            color: 0x101010,
            intensity: 30.0,
            srgb: true,
        }
    }
}

impl AmbientSection {
    pub fn color(&self) -> Color {
        if self.srgb {
            Color::from_hex(self.color)
        } else {
            Color::from_linear_hex(self.color)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundSection {
    pub width: f32,
    pub height: f32,
    pub width_segments: u32,
    pub height_segments: u32,
    pub color: u32,
}

impl Default for GroundSection {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
            width_segments: 10,
            height_segments: 10,
            color: 0x555555,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsSection {
    pub root: PathBuf,
    /// Cube faces in +X, -X, +Y, -Y, +Z, -Z order.
    pub skybox: [PathBuf; 6],
    pub model: PathBuf,
    pub animation: PathBuf,
    pub model_scale: f32,
    pub model_position: [f32; 3],
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            root: PathBuf::from("resources"),
            skybox: ["posx.jpg", "negx.jpg", "posy.jpg", "negy.jpg", "posz.jpg", "negz.jpg"]
                .map(PathBuf::from),
            model: PathBuf::from("zombie/Zombiegirl.glb"),
            animation: PathBuf::from("zombie/Zombie_Walk.glb"),
            model_scale: 0.07,
            model_position: [2.0, 0.0, 2.0],
        }
    }
}

impl AssetsSection {
    pub fn skybox_paths(&self) -> [PathBuf; 6] {
        self.skybox.clone().map(|face| self.root.join(face))
    }

    pub fn model_path(&self) -> PathBuf {
        self.root.join(&self.model)
    }

    pub fn animation_path(&self) -> PathBuf {
        self.root.join(&self.animation)
    }

    pub fn model_position(&self) -> Vec3 {
        Vec3::from(self.model_position)
    }
}

impl DemoConfig {
    pub fn from_toml_str(s: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&s, path)?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Like [`DemoConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("{} not found, using built-in defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = DemoConfig::from_toml_str(
            r#"
            [camera]
            fov = 45.0

            [ambient]
            color = 0x202020
            "#,
            Path::new("shamble.toml"),
        )
        .unwrap();

        assert_eq!(config.camera.fov, 45.0);
        assert_eq!(config.camera.position, [75.0, 20.0, 0.0]);
        assert_eq!(config.ambient.color, 0x202020);
        assert_eq!(config.ambient.intensity, 30.0);
        assert_eq!(config.sun, SunSection::default());
    }

    #[test]
    fn ambient_can_skip_linearization() {
        let managed = AmbientSection::default();
        assert_eq!(managed.color(), Color::from_hex(0x101010));

        let config = DemoConfig::from_toml_str(
            "[ambient]\nsrgb = false\n",
            Path::new("shamble.toml"),
        )
        .unwrap();
        assert!(!config.ambient.srgb);
        assert_eq!(config.ambient.color, 0x101010);
        let c = config.ambient.color();
        assert!((c.0.x - 16.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn missing_default_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let config = DemoConfig::load_or_default(dir.path().join("shamble.toml")).unwrap();
        assert_eq!(config, DemoConfig::default());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DemoConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shamble.toml");
        std::fs::write(&path, "[camera]\nfov = \"wide\"\n").unwrap();
        let err = DemoConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn asset_paths_resolve_under_root() {
        let assets = AssetsSection::default();
        assert_eq!(
            assets.model_path(),
            Path::new("resources").join("zombie/Zombiegirl.glb")
        );
        assert_eq!(assets.skybox_paths()[5], Path::new("resources").join("negz.jpg"));
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = toml::to_string_pretty(&DemoConfig::default()).unwrap();
        let back = DemoConfig::from_toml_str(&text, Path::new("shamble.toml")).unwrap();
        assert_eq!(back, DemoConfig::default());
    }
}
