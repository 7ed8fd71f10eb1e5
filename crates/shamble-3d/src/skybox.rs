use glam::{Mat3, Mat4};
use shamble_scene::CubeMap;
use wgpu::util::DeviceExt;
use wgpu::*;

use crate::pipeline::{Layouts, SkyUniforms};

/// Cube texture drawn behind everything else.
pub struct Skybox {
    uniform_buf: Buffer,
    pub bind_group: BindGroup,
}

impl Skybox {
    pub fn new(device: &Device, queue: &Queue, layouts: &Layouts, cube: &CubeMap) -> Self {
        let size = Extent3d {
            width: cube.size,
            height: cube.size,
            depth_or_array_layers: 6,
        };
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("skybox"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (layer, face) in cube.faces.iter().enumerate() {
            queue.write_texture(
                TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: Origin3d {
                        x: 0,
                        y: 0,
                        z: layer as u32,
                    },
                    aspect: TextureAspect::All,
                },
                face,
                TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * cube.size),
                    rows_per_image: Some(cube.size),
                },
                Extent3d {
                    width: cube.size,
                    height: cube.size,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&TextureViewDescriptor {
            label: Some("skybox_view"),
            dimension: Some(TextureViewDimension::Cube),
            ..Default::default()
        });
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("skybox_sampler"),
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Default::default()
        });
        let uniform_buf = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("skybox_ubo"),
            contents: bytemuck::cast_slice(&[SkyUniforms {
                inv_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            }]),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("skybox_bg"),
            layout: &layouts.skybox_bgl,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: uniform_buf.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::TextureView(&view),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: BindingResource::Sampler(&sampler),
                },
            ],
        });

        Self {
            uniform_buf,
            bind_group,
        }
    }

    pub fn update(&self, queue: &Queue, view: Mat4, projection: Mat4) {
        queue.write_buffer(
            &self.uniform_buf,
            0,
            bytemuck::cast_slice(&[SkyUniforms {
                inv_view_proj: sky_inverse_view_projection(view, projection).to_cols_array_2d(),
            }]),
        );
    }
}

/// Inverse view-projection with the camera translation removed.
pub fn sky_inverse_view_projection(view: Mat4, projection: Mat4) -> Mat4 {
    let rotation_only = Mat4::from_mat3(Mat3::from_mat4(view));
    (projection * rotation_only).inverse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};

    #[test]
    fn screen_center_looks_along_view_direction() {
        let view = Mat4::look_at_rh(Vec3::new(75.0, 20.0, 0.0), Vec3::new(0.0, 20.0, 0.0), Vec3::Y);
        let proj = Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 1.0, 1000.0);
        let p = sky_inverse_view_projection(view, proj) * Vec4::new(0.0, 0.0, 1.0, 1.0);
        let dir = (p.truncate() / p.w).normalize();
        assert!(dir.abs_diff_eq(Vec3::NEG_X, 1e-3));
    }
}
