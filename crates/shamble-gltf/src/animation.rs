use std::path::Path;

use glam::{Quat, Vec3};
use gltf::animation::util::ReadOutputs;
use shamble_anim::{AnimationClip, Interpolation, Track, TrackValues};

use crate::{GltfError, import, node_name};

/// Parses every animation in a glTF or GLB file.
///
/// Morph target weight channels are skipped. A file without animations is
/// an error since the caller asked for clips.
pub fn load_animations_from_slice(
    bytes: &[u8],
    base: Option<&Path>,
) -> Result<Vec<AnimationClip>, GltfError> {
    let (document, buffers) = import(bytes, base)?;

    let mut clips = Vec::new();
    for animation in document.animations() {
        let mut tracks = Vec::new();
        for channel in animation.channels() {
            let reader = channel.reader(|buffer| Some(&buffers[buffer.index()]));
            let (Some(inputs), Some(outputs)) = (reader.read_inputs(), reader.read_outputs())
            else {
                continue;
            };
            let times: Vec<f32> = inputs.collect();
            let values = match outputs {
                ReadOutputs::Translations(iter) => {
                    TrackValues::Translation(iter.map(Vec3::from).collect())
                }
                ReadOutputs::Rotations(rot) => {
                    TrackValues::Rotation(rot.into_f32().map(Quat::from_array).collect())
                }
                ReadOutputs::Scales(iter) => TrackValues::Scale(iter.map(Vec3::from).collect()),
                ReadOutputs::MorphTargetWeights(_) => continue,
            };
            let interpolation = match channel.sampler().interpolation() {
                gltf::animation::Interpolation::Step => Interpolation::Step,
                gltf::animation::Interpolation::Linear => Interpolation::Linear,
                gltf::animation::Interpolation::CubicSpline => Interpolation::CubicSpline,
            };
            let track = Track::new(node_name(&channel.target().node()), times, values, interpolation);
            if !track.is_well_formed() {
                log::warn!("skipping malformed track for '{}'", track.target);
                continue;
            }
            tracks.push(track);
        }

        let name = animation
            .name()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("animation_{}", animation.index()));
        let clip = AnimationClip::new(name, tracks);
        log::debug!(
            "clip '{}': {} tracks, {:.2}s",
            clip.name,
            clip.tracks.len(),
            clip.duration
        );
        clips.push(clip);
    }

    if clips.is_empty() {
        return Err(GltfError::NoAnimations);
    }
    Ok(clips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_gltf;

    const WALK: &str = r#"{
        "asset": { "version": "2.0" },
        "nodes": [ { "name": "Hips" }, {} ],
        "animations": [ {
            "name": "Walk",
            "channels": [
                { "sampler": 0, "target": { "node": 0, "path": "translation" } },
                { "sampler": 1, "target": { "node": 1, "path": "rotation" } }
            ],
            "samplers": [
                { "input": 0, "output": 1, "interpolation": "LINEAR" },
                { "input": 0, "output": 2, "interpolation": "STEP" }
            ]
        } ],
        "buffers": [ { "uri": "@BIN@", "byteLength": 72 } ],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 8, "byteLength": 24 },
            { "buffer": 0, "byteOffset": 32, "byteLength": 32 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 2, "type": "SCALAR",
              "min": [0.0], "max": [1.5] },
            { "bufferView": 1, "componentType": 5126, "count": 2, "type": "VEC3" },
            { "bufferView": 2, "componentType": 5126, "count": 2, "type": "VEC4" }
        ]
    }"#;

    fn walk_buffer() -> Vec<f32> {
        vec![
            0.0, 1.5, // times
            0.0, 0.0, 0.0, 0.0, 3.0, 0.0, // translations
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, // rotations
            0.0, 0.0, // padding up to byteLength
        ]
    }

    #[test]
    fn loads_clip_with_named_and_fallback_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gltf(dir.path(), "walk", WALK, &walk_buffer());

        let clips = crate::load_animations(&path).unwrap();
        assert_eq!(clips.len(), 1);
        let clip = &clips[0];
        assert_eq!(clip.name, "Walk");
        assert_eq!(clip.duration, 1.5);
        assert_eq!(clip.tracks.len(), 2);

        assert_eq!(clip.tracks[0].target, "Hips");
        assert_eq!(clip.tracks[0].interpolation, Interpolation::Linear);
        assert_eq!(
            clip.tracks[0].values,
            TrackValues::Translation(vec![Vec3::ZERO, Vec3::new(0.0, 3.0, 0.0)])
        );

        assert_eq!(clip.tracks[1].target, "node_1");
        assert_eq!(clip.tracks[1].interpolation, Interpolation::Step);
    }

    #[test]
    fn file_without_animations_is_rejected() {
        let json = r#"{ "asset": { "version": "2.0" }, "nodes": [ { "name": "Hips" } ] }"#;
        let err = load_animations_from_slice(json.as_bytes(), None).unwrap_err();
        assert!(matches!(err, GltfError::NoAnimations));
    }
}
