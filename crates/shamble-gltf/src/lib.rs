//! glTF/GLB loading into scene prefabs and animation clips.
//!
//! Model and animation data often ship as separate files exported from the
//! same rig. Tracks therefore bind by node name; unnamed nodes get
//! `node_<index>` in both loaders so the two files still agree.

mod animation;
mod model;

use std::path::Path;

pub use animation::load_animations_from_slice;
pub use model::load_model_from_slice;

use shamble_anim::AnimationClip;
use shamble_scene::Prefab;

#[derive(Debug, thiserror::Error)]
pub enum GltfError {
    #[error("failed to parse glTF: {0}")]
    Parse(#[from] gltf::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mesh '{0}' has a primitive without positions")]
    MissingPositions(String),

    #[error("file contains no animations")]
    NoAnimations,
}

/// Loads a model from disk. External buffers and images resolve relative to
/// the file's directory.
pub fn load_model(path: impl AsRef<Path>) -> Result<Prefab, GltfError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let mut prefab = load_model_from_slice(&bytes, path.parent())?;
    if prefab.name.is_none() {
        prefab.name = path.file_stem().map(|s| s.to_string_lossy().into_owned());
    }
    Ok(prefab)
}

pub fn load_animations(path: impl AsRef<Path>) -> Result<Vec<AnimationClip>, GltfError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    load_animations_from_slice(&bytes, path.parent())
}

pub(crate) fn node_name(node: &gltf::Node) -> String {
    node.name()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("node_{}", node.index()))
}

pub(crate) fn import(
    bytes: &[u8],
    base: Option<&Path>,
) -> Result<(gltf::Document, Vec<gltf::buffer::Data>), GltfError> {
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes)?;
    let buffers = gltf::import_buffers(&document, base, blob)?;
    Ok((document, buffers))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};

    /// Writes a glTF JSON file plus its companion `.bin` buffer.
    pub fn write_gltf(dir: &Path, stem: &str, json: &str, buffer: &[f32]) -> PathBuf {
        let bin = dir.join(format!("{stem}.bin"));
        std::fs::write(&bin, bytemuck::cast_slice::<f32, u8>(buffer)).unwrap();
        let path = dir.join(format!("{stem}.gltf"));
        std::fs::write(&path, json.replace("@BIN@", &format!("{stem}.bin"))).unwrap();
        path
    }
}
