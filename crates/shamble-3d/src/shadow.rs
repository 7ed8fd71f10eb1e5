use wgpu::*;

use crate::pipeline::SHADOW_FORMAT;

/// Depth map rendered from the directional light.
pub struct ShadowMap {
    pub size: u32,
    pub texture: Texture,
    pub view: TextureView,
    pub sampler: Sampler,
}

impl ShadowMap {
    pub fn new(device: &Device, size: u32) -> Self {
        let size = size.clamp(1, device.limits().max_texture_dimension_2d);
        let texture = device.create_texture(&TextureDescriptor {
            label: Some("shadow_map"),
            size: Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&TextureViewDescriptor::default());

        // Linear filtering on a comparison sampler gives 2x2 PCF per tap.
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("shadow_sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            compare: Some(CompareFunction::LessEqual),
            ..Default::default()
        });

        Self {
            size,
            texture,
            view,
            sampler,
        }
    }

    pub fn texel_size(&self) -> f32 {
        1.0 / self.size as f32
    }
}
