use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

/// Interleaved vertex shared by static and skinned meshes.
///
/// Static meshes keep `joints = [0; 4]` and `weights = [1, 0, 0, 0]`, which
/// makes joint zero (identity) the only influence.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub joints: [u32; 4],
    pub weights: [f32; 4],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            joints: [0; 4],
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Decoded RGBA8 image, sRGB encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: Option<String>,
    /// Linear RGBA.
    pub base_color: Vec4,
    pub base_color_texture: Option<Arc<TextureData>>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color: Vec4::ONE,
            base_color_texture: None,
        }
    }
}

impl Material {
    pub fn from_color(base_color: Vec4) -> Self {
        Self {
            base_color,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Primitive {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material: Material,
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

/// Keeps every vertex of a plane addressable by a `u32` index.
const MAX_PLANE_SEGMENTS: u32 = u16::MAX as u32 - 1;

/// Vertex and index counts of a `grid_x` by `grid_y` plane.
fn plane_counts(grid_x: u32, grid_y: u32) -> (u64, u64) {
    let (x, y) = (u64::from(grid_x), u64::from(grid_y));
    ((x + 1) * (y + 1), x * y * 6)
}

impl Mesh {
    /// Flat grid in the XY plane facing +Z, centered on the origin.
    pub fn plane(
        width: f32,
        height: f32,
        width_segments: u32,
        height_segments: u32,
        material: Material,
    ) -> Self {
        let grid_x = width_segments.clamp(1, MAX_PLANE_SEGMENTS);
        let grid_y = height_segments.clamp(1, MAX_PLANE_SEGMENTS);
        let (vertex_count, index_count) = plane_counts(grid_x, grid_y);
        let segment_w = width / grid_x as f32;
        let segment_h = height / grid_y as f32;

        let mut vertices = Vec::with_capacity(vertex_count as usize);
        for iy in 0..=grid_y {
            let y = height * 0.5 - iy as f32 * segment_h;
            for ix in 0..=grid_x {
                let x = ix as f32 * segment_w - width * 0.5;
                vertices.push(Vertex::new(
                    [x, y, 0.0],
                    [0.0, 0.0, 1.0],
                    [ix as f32 / grid_x as f32, iy as f32 / grid_y as f32],
                ));
            }
        }

        let row = grid_x + 1;
        let mut indices = Vec::with_capacity(index_count as usize);
        for iy in 0..grid_y {
            for ix in 0..grid_x {
                let a = ix + row * iy;
                let b = ix + row * (iy + 1);
                let c = ix + 1 + row * (iy + 1);
                let d = ix + 1 + row * iy;
                indices.extend_from_slice(&[a, b, d, b, c, d]);
            }
        }

        Self {
            name: Some("plane".into()),
            primitives: vec![Primitive {
                vertices,
                indices,
                material,
            }],
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.primitives.iter().map(|p| p.vertices.len()).sum()
    }
}
