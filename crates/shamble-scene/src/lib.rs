pub mod color;
pub mod light;
pub mod mesh;
pub mod prefab;
pub mod transform;

use std::sync::Arc;

use glam::Mat4;

pub use color::Color;
pub use light::{AmbientLight, DirectionalLight, DirectionalShadow, ShadowFrustum};
pub use mesh::{Material, Mesh, Primitive, TextureData, Vertex};
pub use prefab::{Prefab, PrefabNode, PrefabSkin};
pub use transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(usize);

impl MeshId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SkinId(usize);

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: Option<String>,
    pub transform: Transform,
    pub mesh: Option<MeshId>,
    pub skin: Option<SkinId>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    world: Mat4,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_mesh(mut self, mesh: MeshId) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug, Clone)]
pub struct Skin {
    /// One slot per joint of the source skin. `None` marks a joint that
    /// was not instantiated; its slot still occupies a palette entry.
    pub joints: Vec<Option<NodeId>>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

/// Six square RGBA8 faces ordered +X, -X, +Y, -Y, +Z, -Z.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeMap {
    pub size: u32,
    pub faces: [Vec<u8>; 6],
}

#[derive(Debug, Clone)]
pub enum Background {
    Color(Color),
    CubeMap(Arc<CubeMap>),
}

/// Node arena plus everything the renderer draws around it.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
    meshes: Vec<Arc<Mesh>>,
    skins: Vec<Skin>,
    pub directional_lights: Vec<DirectionalLight>,
    pub ambient_lights: Vec<AmbientLight>,
    background: Option<Background>,
    background_revision: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node under `parent`. Without a parent the node stays detached
    /// until [`Scene::attach`] is called.
    pub fn spawn(&mut self, node: Node, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            world: Mat4::IDENTITY,
            ..node
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    /// Puts a detached node at the root of the graph. Returns `false` when
    /// the node is already part of the graph.
    pub fn attach(&mut self, id: NodeId) -> bool {
        if self.is_attached(id) {
            log::warn!("node {:?} is already in the scene graph", id);
            return false;
        }
        if self.nodes[id.0].parent.is_some() {
            return false;
        }
        self.roots.push(id);
        true
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if self.roots.contains(&n) {
                return true;
            }
            cur = self.nodes.get(n.0).and_then(|node| node.parent);
        }
        false
    }

    /// Number of places the node is linked from (root list plus child lists).
    pub fn occurrences(&self, id: NodeId) -> usize {
        let as_root = self.roots.iter().filter(|&&r| r == id).count();
        let as_child = self
            .nodes
            .iter()
            .flat_map(|n| n.children.iter())
            .filter(|&&c| c == id)
            .count();
        as_root + as_child
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// `root` followed by all nodes below it, depth first.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        out
    }

    pub fn find_by_name(&self, root: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|&id| self.nodes[id.0].name.as_deref() == Some(name))
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let id = MeshId(self.meshes.len());
        self.meshes.push(Arc::new(mesh));
        id
    }

    pub fn mesh(&self, id: MeshId) -> &Arc<Mesh> {
        &self.meshes[id.0]
    }

    pub fn add_skin(&mut self, skin: Skin) -> SkinId {
        let id = SkinId(self.skins.len());
        self.skins.push(skin);
        id
    }

    pub fn skin(&self, id: SkinId) -> &Skin {
        &self.skins[id.0]
    }

    /// Copies a prefab into the arena under a fresh detached group node and
    /// returns the group.
    pub fn instantiate(&mut self, prefab: &Prefab) -> NodeId {
        let group = self.spawn(
            Node {
                name: prefab.name.clone(),
                ..Node::default()
            },
            None,
        );

        let mesh_ids: Vec<MeshId> = prefab
            .meshes
            .iter()
            .map(|m| self.add_mesh(m.clone()))
            .collect();

        let mut mapping = vec![None; prefab.nodes.len()];
        let mut stack: Vec<(usize, NodeId)> = prefab.roots.iter().rev().map(|&r| (r, group)).collect();
        while let Some((index, parent)) = stack.pop() {
            let Some(src) = prefab.nodes.get(index) else {
                log::warn!("prefab references missing node {index}");
                continue;
            };
            let id = self.spawn(
                Node {
                    name: src.name.clone(),
                    transform: src.transform,
                    mesh: src.mesh.and_then(|m| mesh_ids.get(m).copied()),
                    ..Node::default()
                },
                Some(parent),
            );
            mapping[index] = Some(id);
            stack.extend(src.children.iter().rev().map(|&c| (c, id)));
        }

        // Skins are resolved after the whole hierarchy exists since joints
        // may live anywhere in it.
        for (index, src) in prefab.nodes.iter().enumerate() {
            let (Some(id), Some(skin_index)) = (mapping[index], src.skin) else {
                continue;
            };
            let Some(prefab_skin) = prefab.skins.get(skin_index) else {
                continue;
            };
            let joints: Vec<Option<NodeId>> = prefab_skin
                .joints
                .iter()
                .map(|&j| mapping.get(j).copied().flatten())
                .collect();
            let missing = joints.iter().filter(|j| j.is_none()).count();
            if missing > 0 {
                log::warn!(
                    "skin {skin_index} has {missing} joints outside the instantiated hierarchy"
                );
            }
            let skin = self.add_skin(Skin {
                joints,
                inverse_bind_matrices: prefab_skin.inverse_bind_matrices.clone(),
            });
            self.nodes[id.0].skin = Some(skin);
        }

        group
    }

    pub fn set_background(&mut self, background: Background) {
        self.background = Some(background);
        self.background_revision += 1;
    }

    pub fn background(&self) -> Option<&Background> {
        self.background.as_ref()
    }

    pub fn background_revision(&self) -> u64 {
        self.background_revision
    }

    /// Recomputes cached world matrices for every attached node.
    pub fn update_world_transforms(&mut self) {
        let mut stack: Vec<(NodeId, Mat4)> =
            self.roots.iter().map(|&r| (r, Mat4::IDENTITY)).collect();
        while let Some((id, parent_world)) = stack.pop() {
            let node = &mut self.nodes[id.0];
            node.world = parent_world * node.transform.matrix();
            let world = node.world;
            stack.extend(node.children.iter().map(|&c| (c, world)));
        }
    }

    /// Last value computed by [`Scene::update_world_transforms`].
    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        self.nodes[id.0].world
    }

    /// Skinning palette, index-aligned with the skin's joint list.
    /// Unresolved joints contribute the identity.
    pub fn joint_matrices(&self, skin: SkinId) -> Vec<Mat4> {
        let skin = &self.skins[skin.0];
        skin.joints
            .iter()
            .enumerate()
            .map(|(i, joint)| {
                let Some(joint) = joint else {
                    return Mat4::IDENTITY;
                };
                let ibm = skin
                    .inverse_bind_matrices
                    .get(i)
                    .copied()
                    .unwrap_or(Mat4::IDENTITY);
                self.nodes[joint.0].world * ibm
            })
            .collect()
    }

    /// Attached nodes that carry a mesh.
    pub fn renderables(&self) -> Vec<NodeId> {
        self.roots
            .iter()
            .flat_map(|&r| self.descendants(r))
            .filter(|&id| self.nodes[id.0].mesh.is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn two_node_prefab() -> Prefab {
        Prefab {
            name: Some("model".into()),
            nodes: vec![
                PrefabNode {
                    name: Some("Hips".into()),
                    transform: Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)),
                    children: vec![1],
                    ..PrefabNode::default()
                },
                PrefabNode {
                    name: Some("Body".into()),
                    mesh: Some(0),
                    skin: Some(0),
                    ..PrefabNode::default()
                },
            ],
            roots: vec![0],
            meshes: vec![Mesh::plane(1.0, 1.0, 1, 1, Material::default())],
            skins: vec![PrefabSkin {
                joints: vec![0],
                inverse_bind_matrices: vec![Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0))],
            }],
        }
    }

    #[test]
    fn instantiate_is_detached_until_attached_once() {
        let mut scene = Scene::new();
        let root = scene.instantiate(&two_node_prefab());
        assert!(!scene.is_attached(root));
        assert!(scene.renderables().is_empty());

        assert!(scene.attach(root));
        assert!(!scene.attach(root));
        assert_eq!(scene.occurrences(root), 1);
        assert_eq!(scene.renderables().len(), 1);
        assert_eq!(scene.descendants(root).len(), 3);
    }

    #[test]
    fn children_cannot_become_roots() {
        let mut scene = Scene::new();
        let root = scene.instantiate(&two_node_prefab());
        let hips = scene.find_by_name(root, "Hips").unwrap();
        assert!(!scene.attach(hips));
        assert_eq!(scene.occurrences(hips), 1);
    }

    #[test]
    fn world_transforms_compose_parent_first() {
        let mut scene = Scene::new();
        let root = scene.instantiate(&two_node_prefab());
        scene.attach(root);
        scene.node_mut(root).transform = Transform {
            translation: Vec3::new(2.0, 0.0, 2.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::splat(0.5),
        };
        scene.update_world_transforms();

        let body = scene.find_by_name(root, "Body").unwrap();
        let p = scene.world_matrix(body).transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(2.0, 0.5, 2.0), 1e-5));
    }

    #[test]
    fn joint_matrices_cancel_bind_pose() {
        let mut scene = Scene::new();
        let root = scene.instantiate(&two_node_prefab());
        scene.attach(root);
        scene.update_world_transforms();

        let body = scene.find_by_name(root, "Body").unwrap();
        let skin = scene.node(body).skin.unwrap();
        let joints = scene.joint_matrices(skin);
        assert_eq!(joints.len(), 1);
        assert!(joints[0].abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn unresolved_joints_keep_their_palette_slot() {
        let mut prefab = two_node_prefab();
        // Node 2 is never reached from a root, so it is not instantiated.
        prefab.nodes.push(PrefabNode {
            name: Some("Outside".into()),
            ..PrefabNode::default()
        });
        prefab.skins[0] = PrefabSkin {
            joints: vec![2, 0],
            inverse_bind_matrices: vec![
                Mat4::IDENTITY,
                Mat4::from_translation(Vec3::new(0.0, -1.0, 0.0)),
            ],
        };

        let mut scene = Scene::new();
        let root = scene.instantiate(&prefab);
        scene.attach(root);
        scene.update_world_transforms();

        let body = scene.find_by_name(root, "Body").unwrap();
        let skin = scene.node(body).skin.unwrap();
        assert_eq!(scene.skin(skin).joints.len(), 2);
        assert!(scene.skin(skin).joints[0].is_none());

        let joints = scene.joint_matrices(skin);
        assert_eq!(joints.len(), 2);
        assert_eq!(joints[0], Mat4::IDENTITY);
        assert!(joints[1].abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn background_changes_bump_revision() {
        let mut scene = Scene::new();
        assert_eq!(scene.background_revision(), 0);
        scene.set_background(Background::Color(Color::BLACK));
        scene.set_background(Background::Color(Color::WHITE));
        assert_eq!(scene.background_revision(), 2);
    }
}
