use glam::Mat4;

use crate::{Mesh, Transform};

/// A loaded node hierarchy that has not been placed into a [`Scene`](crate::Scene) yet.
///
/// Indices refer to the vectors of the prefab itself.
#[derive(Debug, Clone, Default)]
pub struct Prefab {
    pub name: Option<String>,
    pub nodes: Vec<PrefabNode>,
    pub roots: Vec<usize>,
    pub meshes: Vec<Mesh>,
    pub skins: Vec<PrefabSkin>,
}

#[derive(Debug, Clone, Default)]
pub struct PrefabNode {
    pub name: Option<String>,
    pub transform: Transform,
    pub mesh: Option<usize>,
    pub skin: Option<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct PrefabSkin {
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

impl Prefab {
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|n| n.name.as_deref() == Some(name))
    }
}
