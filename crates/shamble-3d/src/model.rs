use glam::Mat4;
use shamble_scene::{Material, Mesh, TextureData};
use wgpu::util::DeviceExt;
use wgpu::*;

use crate::pipeline::{
    Layouts, MAX_JOINTS, MaterialUniforms, OBJECT_UNIFORM_SIZE, ObjectHeader,
};

pub struct GpuPrimitive {
    pub vbuf: Buffer,
    pub ibuf: Buffer,
    pub index_count: u32,
    pub material_bg: BindGroup,
}

pub struct GpuMesh {
    pub primitives: Vec<GpuPrimitive>,
}

/// Per-node uniform: world matrix, flags and joint palette.
pub struct GpuObject {
    pub buf: Buffer,
    pub bg: BindGroup,
}

pub fn create_texture_rgba(
    device: &Device,
    queue: &Queue,
    label: &str,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> Texture {
    let size = Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8UnormSrgb,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: Origin3d::ZERO,
            aspect: TextureAspect::All,
        },
        rgba,
        TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture
}

fn white_texture(device: &Device, queue: &Queue) -> Texture {
    create_texture_rgba(device, queue, "white_1x1", 1, 1, &[255, 255, 255, 255])
}

fn texture_is_valid(tex: &TextureData) -> bool {
    let expected = u64::from(tex.width) * u64::from(tex.height) * 4;
    tex.width > 0 && tex.height > 0 && tex.rgba.len() as u64 == expected
}

pub fn create_material_bind_group(
    device: &Device,
    queue: &Queue,
    layouts: &Layouts,
    sampler: &Sampler,
    material: &Material,
) -> BindGroup {
    let texture = match &material.base_color_texture {
        Some(tex) if texture_is_valid(tex) => create_texture_rgba(
            device,
            queue,
            material.name.as_deref().unwrap_or("base_color"),
            tex.width,
            tex.height,
            &tex.rgba,
        ),
        Some(_) => {
            log::warn!("material {:?}: texture size does not match its data", material.name);
            white_texture(device, queue)
        }
        None => white_texture(device, queue),
    };
    let view = texture.create_view(&TextureViewDescriptor::default());

    let uniforms = MaterialUniforms {
        base_color: material.base_color.to_array(),
    };
    let buf = device.create_buffer_init(&util::BufferInitDescriptor {
        label: Some("material_ubo"),
        contents: bytemuck::cast_slice(&[uniforms]),
        usage: BufferUsages::UNIFORM,
    });

    device.create_bind_group(&BindGroupDescriptor {
        label: Some("material_bg"),
        layout: &layouts.material_bgl,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: buf.as_entire_binding(),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::TextureView(&view),
            },
            BindGroupEntry {
                binding: 2,
                resource: BindingResource::Sampler(sampler),
            },
        ],
    })
}

pub fn upload_mesh(
    device: &Device,
    queue: &Queue,
    layouts: &Layouts,
    sampler: &Sampler,
    mesh: &Mesh,
) -> GpuMesh {
    let primitives = mesh
        .primitives
        .iter()
        .filter(|p| !p.vertices.is_empty() && !p.indices.is_empty())
        .map(|p| GpuPrimitive {
            vbuf: device.create_buffer_init(&util::BufferInitDescriptor {
                label: Some("mesh_vbuf"),
                contents: bytemuck::cast_slice(&p.vertices),
                usage: BufferUsages::VERTEX,
            }),
            ibuf: device.create_buffer_init(&util::BufferInitDescriptor {
                label: Some("mesh_ibuf"),
                contents: bytemuck::cast_slice(&p.indices),
                usage: BufferUsages::INDEX,
            }),
            index_count: p.indices.len() as u32,
            material_bg: create_material_bind_group(device, queue, layouts, sampler, &p.material),
        })
        .collect();
    GpuMesh { primitives }
}

pub fn create_object(device: &Device, layouts: &Layouts) -> GpuObject {
    let buf = device.create_buffer(&BufferDescriptor {
        label: Some("object_ubo"),
        size: OBJECT_UNIFORM_SIZE,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bg = device.create_bind_group(&BindGroupDescriptor {
        label: Some("object_bg"),
        layout: &layouts.object_bgl,
        entries: &[BindGroupEntry {
            binding: 0,
            resource: buf.as_entire_binding(),
        }],
    });
    GpuObject { buf, bg }
}

impl GpuObject {
    /// Skinned objects carry their whole world transform in `joints`.
    pub fn write(&self, queue: &Queue, model: Mat4, joints: &[Mat4], receive_shadow: bool) {
        let skinned = !joints.is_empty();
        if joints.len() > MAX_JOINTS {
            log::debug!(
                "skin has {} joints, only the first {MAX_JOINTS} are uploaded",
                joints.len()
            );
        }
        let model = if skinned { Mat4::IDENTITY } else { model };
        let header = ObjectHeader {
            model: model.to_cols_array_2d(),
            params: [
                if receive_shadow { 1.0 } else { 0.0 },
                if skinned { 1.0 } else { 0.0 },
                0.0,
                0.0,
            ],
        };
        queue.write_buffer(&self.buf, 0, bytemuck::cast_slice(&[header]));
        if skinned {
            let palette: Vec<[[f32; 4]; 4]> = joints
                .iter()
                .take(MAX_JOINTS)
                .map(|m| m.to_cols_array_2d())
                .collect();
            queue.write_buffer(
                &self.buf,
                size_of::<ObjectHeader>() as BufferAddress,
                bytemuck::cast_slice(&palette),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_size_must_match_pixel_data() {
        let tex = |width, height, len| TextureData {
            width,
            height,
            rgba: vec![0; len],
        };
        assert!(texture_is_valid(&tex(2, 2, 16)));
        assert!(!texture_is_valid(&tex(2, 2, 15)));
        assert!(!texture_is_valid(&tex(0, 2, 0)));
        assert!(!texture_is_valid(&tex(65536, 65536, 16)));
    }
}
