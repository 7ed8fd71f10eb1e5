use std::path::Path;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3, Vec4};
use shamble_scene::{
    Material, Mesh, Prefab, PrefabNode, PrefabSkin, Primitive, TextureData, Transform, Vertex,
};

use crate::{GltfError, import, node_name};

/// Parses a glTF or GLB model into a [`Prefab`].
pub fn load_model_from_slice(bytes: &[u8], base: Option<&Path>) -> Result<Prefab, GltfError> {
    let (document, buffers) = import(bytes, base)?;
    let images = gltf::import_images(&document, base, &buffers)?;
    let textures: Vec<Option<Arc<TextureData>>> =
        images.iter().map(|img| to_rgba8(img).map(Arc::new)).collect();

    let mut meshes = Vec::new();
    for mesh in document.meshes() {
        meshes.push(read_mesh(&mesh, &buffers, &textures)?);
    }

    let nodes: Vec<PrefabNode> = document
        .nodes()
        .map(|node| {
            let (t, r, s) = node.transform().decomposed();
            PrefabNode {
                name: Some(node_name(&node)),
                transform: Transform {
                    translation: Vec3::from(t),
                    rotation: Quat::from_array(r),
                    scale: Vec3::from(s),
                },
                mesh: node.mesh().map(|m| m.index()),
                skin: node.skin().map(|s| s.index()),
                children: node.children().map(|c| c.index()).collect(),
            }
        })
        .collect();

    let roots = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => scene.nodes().map(|n| n.index()).collect(),
        None => {
            let mut is_child = vec![false; nodes.len()];
            for node in &nodes {
                for &c in &node.children {
                    is_child[c] = true;
                }
            }
            (0..nodes.len()).filter(|&i| !is_child[i]).collect()
        }
    };

    let skins = document
        .skins()
        .map(|skin| {
            let joints: Vec<usize> = skin.joints().map(|j| j.index()).collect();
            let reader = skin.reader(|buffer| Some(&buffers[buffer.index()]));
            let inverse_bind_matrices = reader
                .read_inverse_bind_matrices()
                .map(|iter| iter.map(|m| Mat4::from_cols_array_2d(&m)).collect())
                .unwrap_or_else(|| vec![Mat4::IDENTITY; joints.len()]);
            PrefabSkin {
                joints,
                inverse_bind_matrices,
            }
        })
        .collect();

    let prefab = Prefab {
        name: document
            .default_scene()
            .and_then(|s| s.name().map(str::to_owned)),
        nodes,
        roots,
        meshes,
        skins,
    };

    log::info!(
        "loaded glTF model: {} nodes, {} meshes, {} skins",
        prefab.nodes.len(),
        prefab.meshes.len(),
        prefab.skins.len()
    );
    Ok(prefab)
}

fn read_mesh(
    mesh: &gltf::Mesh,
    buffers: &[gltf::buffer::Data],
    textures: &[Option<Arc<TextureData>>],
) -> Result<Mesh, GltfError> {
    let name = mesh.name().unwrap_or("unnamed").to_string();
    let mut primitives = Vec::new();

    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!("mesh '{name}': skipping {:?} primitive", primitive.mode());
            continue;
        }
        let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| GltfError::MissingPositions(name.clone()))?
            .collect();
        let count = positions.len();

        let indices: Vec<u32> = reader
            .read_indices()
            .map(|iter| iter.into_u32().collect())
            .unwrap_or_else(|| (0..count as u32).collect());

        let normals: Vec<[f32; 3]> = reader
            .read_normals()
            .map(|iter| iter.collect())
            .unwrap_or_else(|| smooth_normals(&positions, &indices));
        let uvs: Vec<[f32; 2]> = reader
            .read_tex_coords(0)
            .map(|iter| iter.into_f32().collect())
            .unwrap_or_else(|| vec![[0.0; 2]; count]);
        let joints: Option<Vec<[u16; 4]>> =
            reader.read_joints(0).map(|iter| iter.into_u16().collect());
        let weights: Option<Vec<[f32; 4]>> =
            reader.read_weights(0).map(|iter| iter.into_f32().collect());

        let vertices = (0..count)
            .map(|i| {
                let mut v = Vertex::new(
                    positions[i],
                    normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                    uvs.get(i).copied().unwrap_or([0.0; 2]),
                );
                if let (Some(j), Some(w)) = (&joints, &weights) {
                    if let (Some(j), Some(w)) = (j.get(i), w.get(i)) {
                        v.joints = j.map(u32::from);
                        v.weights = normalize_weights(*w);
                    }
                }
                v
            })
            .collect();

        primitives.push(Primitive {
            vertices,
            indices,
            material: read_material(&primitive.material(), textures),
        });
    }

    Ok(Mesh {
        name: Some(name),
        primitives,
    })
}

fn read_material(material: &gltf::Material, textures: &[Option<Arc<TextureData>>]) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let base_color_texture = pbr
        .base_color_texture()
        .and_then(|info| textures.get(info.texture().source().index()).cloned().flatten());
    Material {
        name: material.name().map(str::to_owned),
        base_color: Vec4::from(pbr.base_color_factor()),
        base_color_texture,
    }
}

fn normalize_weights(w: [f32; 4]) -> [f32; 4] {
    let sum: f32 = w.iter().sum();
    if sum <= f32::EPSILON {
        [1.0, 0.0, 0.0, 0.0]
    } else {
        w.map(|x| x / sum)
    }
}

fn smooth_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut acc = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let pa = Vec3::from(positions[a]);
        let n = (Vec3::from(positions[b]) - pa).cross(Vec3::from(positions[c]) - pa);
        acc[a] += n;
        acc[b] += n;
        acc[c] += n;
    }
    acc.into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
        .collect()
}

fn to_rgba8(image: &gltf::image::Data) -> Option<TextureData> {
    let Some(rgba) = expand_to_rgba8(image.format, &image.pixels) else {
        log::warn!("unsupported texture format {:?}, using base color only", image.format);
        return None;
    };
    Some(TextureData {
        width: image.width,
        height: image.height,
        rgba,
    })
}

fn expand_to_rgba8(format: gltf::image::Format, px: &[u8]) -> Option<Vec<u8>> {
    use gltf::image::Format;

    Some(match format {
        Format::R8G8B8A8 => px.to_vec(),
        Format::R8G8B8 => px
            .chunks_exact(3)
            .flat_map(|c| [c[0], c[1], c[2], 255])
            .collect(),
        Format::R8G8 => px
            .chunks_exact(2)
            .flat_map(|c| [c[0], c[0], c[0], c[1]])
            .collect(),
        Format::R8 => px.iter().flat_map(|&c| [c, c, c, 255]).collect(),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_gltf;

    const TRIANGLE: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [ { "name": "Zombie", "nodes": [0] } ],
        "nodes": [
            { "name": "Hips", "translation": [0.0, 1.0, 0.0], "children": [1] },
            { "mesh": 0 }
        ],
        "meshes": [ { "name": "Body", "primitives": [ { "attributes": { "POSITION": 0 } } ] } ],
        "buffers": [ { "uri": "@BIN@", "byteLength": 36 } ],
        "bufferViews": [ { "buffer": 0, "byteOffset": 0, "byteLength": 36 } ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }
        ]
    }"#;

    #[test]
    fn loads_hierarchy_and_generated_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gltf(
            dir.path(),
            "triangle",
            TRIANGLE,
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        );

        let prefab = crate::load_model(&path).unwrap();
        assert_eq!(prefab.name.as_deref(), Some("Zombie"));
        assert_eq!(prefab.roots, vec![0]);
        assert_eq!(prefab.nodes.len(), 2);
        assert_eq!(prefab.find_node("Hips"), Some(0));
        assert_eq!(prefab.nodes[1].name.as_deref(), Some("node_1"));
        assert_eq!(prefab.nodes[0].transform.translation, Vec3::new(0.0, 1.0, 0.0));

        let prim = &prefab.meshes[0].primitives[0];
        assert_eq!(prim.indices, vec![0, 1, 2]);
        assert_eq!(prim.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(prim.vertices[2].weights, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(prim.material.base_color, Vec4::ONE);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = load_model_from_slice(b"definitely not gltf", None).unwrap_err();
        assert!(matches!(err, GltfError::Parse(_)));
    }

    #[test]
    fn weights_are_normalized() {
        assert_eq!(normalize_weights([2.0, 2.0, 0.0, 0.0]), [0.5, 0.5, 0.0, 0.0]);
        assert_eq!(normalize_weights([0.0; 4]), [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn rgb_images_gain_opaque_alpha() {
        use gltf::image::Format;

        assert_eq!(
            expand_to_rgba8(Format::R8G8B8, &[10, 20, 30]),
            Some(vec![10, 20, 30, 255])
        );
        assert_eq!(expand_to_rgba8(Format::R8, &[7]), Some(vec![7, 7, 7, 255]));
        assert_eq!(expand_to_rgba8(Format::R16, &[0, 0]), None);
    }
}
