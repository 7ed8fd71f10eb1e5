use bytemuck::{Pod, Zeroable};
use shamble_scene::Vertex;
use wgpu::*;

use crate::depth::DEPTH_FORMAT;

pub const MAX_JOINTS: usize = 128;
pub const SHADOW_FORMAT: TextureFormat = TextureFormat::Depth32Float;

const MESH_SHADER: &str = include_str!("shaders/mesh.wgsl");
const SHADOW_SHADER: &str = include_str!("shaders/shadow.wgsl");
const SKYBOX_SHADER: &str = include_str!("shaders/skybox.wgsl");

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GlobalUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub light_dir: [f32; 4],
    pub light_color: [f32; 4],
    pub ambient: [f32; 4],
    pub shadow: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LightUniforms {
    pub view_proj: [[f32; 4]; 4],
}

/// Leading part of the per-object uniform; the joint palette follows it.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ObjectHeader {
    pub model: [[f32; 4]; 4],
    pub params: [f32; 4],
}

pub const OBJECT_UNIFORM_SIZE: u64 =
    (size_of::<ObjectHeader>() + MAX_JOINTS * size_of::<[[f32; 4]; 4]>()) as u64;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub base_color: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SkyUniforms {
    pub inv_view_proj: [[f32; 4]; 4],
}

const VERTEX_ATTRS: [VertexAttribute; 5] = vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x2,
    3 => Uint32x4,
    4 => Float32x4,
];

pub fn vertex_layout() -> VertexBufferLayout<'static> {
    VertexBufferLayout {
        array_stride: size_of::<Vertex>() as BufferAddress,
        step_mode: VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRS,
    }
}

pub struct Layouts {
    pub globals_bgl: BindGroupLayout,
    pub light_bgl: BindGroupLayout,
    pub object_bgl: BindGroupLayout,
    pub material_bgl: BindGroupLayout,
    pub skybox_bgl: BindGroupLayout,
}

fn uniform_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub fn create_bind_group_layouts(device: &Device) -> Layouts {
    let globals_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("globals_bgl"),
        entries: &[
            uniform_entry(0, ShaderStages::VERTEX | ShaderStages::FRAGMENT),
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Depth,
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Comparison),
                count: None,
            },
        ],
    });

    let light_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("light_bgl"),
        entries: &[uniform_entry(0, ShaderStages::VERTEX)],
    });

    let object_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("object_bgl"),
        entries: &[uniform_entry(0, ShaderStages::VERTEX | ShaderStages::FRAGMENT)],
    });

    let material_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("material_bgl"),
        entries: &[
            uniform_entry(0, ShaderStages::FRAGMENT),
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let skybox_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("skybox_bgl"),
        entries: &[
            uniform_entry(0, ShaderStages::FRAGMENT),
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Texture {
                    sample_type: TextureSampleType::Float { filterable: true },
                    view_dimension: TextureViewDimension::Cube,
                    multisampled: false,
                },
                count: None,
            },
            BindGroupLayoutEntry {
                binding: 2,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::Sampler(SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    Layouts {
        globals_bgl,
        light_bgl,
        object_bgl,
        material_bgl,
        skybox_bgl,
    }
}

pub fn create_mesh_pipeline(
    device: &Device,
    surface_format: TextureFormat,
    sample_count: u32,
    layouts: &Layouts,
) -> RenderPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("mesh_shader"),
        source: ShaderSource::Wgsl(MESH_SHADER.into()),
    });

    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("mesh_pipeline_layout"),
        bind_group_layouts: &[&layouts.globals_bgl, &layouts.object_bgl, &layouts.material_bgl],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("mesh_pipeline"),
        layout: Some(&layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[vertex_layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format: surface_format,
                blend: Some(BlendState::REPLACE),
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            // Materials are double sided.
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            stencil: StencilState::default(),
            bias: DepthBiasState::default(),
        }),
        multisample: MultisampleState {
            count: sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

pub fn create_shadow_pipeline(device: &Device, layouts: &Layouts) -> RenderPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("shadow_shader"),
        source: ShaderSource::Wgsl(SHADOW_SHADER.into()),
    });

    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("shadow_pipeline_layout"),
        bind_group_layouts: &[&layouts.light_bgl, &layouts.object_bgl],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("shadow_pipeline"),
        layout: Some(&layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[vertex_layout()],
            compilation_options: Default::default(),
        },
        fragment: None,
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(DepthStencilState {
            format: SHADOW_FORMAT,
            depth_write_enabled: true,
            depth_compare: CompareFunction::LessEqual,
            stencil: StencilState::default(),
            bias: DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            },
        }),
        multisample: MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

pub fn create_skybox_pipeline(
    device: &Device,
    surface_format: TextureFormat,
    sample_count: u32,
    layouts: &Layouts,
) -> RenderPipeline {
    let shader = device.create_shader_module(ShaderModuleDescriptor {
        label: Some("skybox_shader"),
        source: ShaderSource::Wgsl(SKYBOX_SHADER.into()),
    });

    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("skybox_pipeline_layout"),
        bind_group_layouts: &[&layouts.skybox_bgl],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("skybox_pipeline"),
        layout: Some(&layout),
        vertex: VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format: surface_format,
                blend: Some(BlendState::REPLACE),
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: PrimitiveState::default(),
        // Drawn first as the background; never touches depth.
        depth_stencil: Some(DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: CompareFunction::Always,
            stencil: StencilState::default(),
            bias: DepthBiasState::default(),
        }),
        multisample: MultisampleState {
            count: sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_match_shader_structs() {
        // Globals: two mat4 + five vec4
        assert_eq!(size_of::<GlobalUniforms>(), 2 * 64 + 5 * 16);
        // Object: mat4 + vec4 header, then the joint palette at a 16-byte boundary
        assert_eq!(size_of::<ObjectHeader>(), 80);
        assert_eq!(size_of::<ObjectHeader>() % 16, 0);
        assert_eq!(OBJECT_UNIFORM_SIZE, 80 + 128 * 64);
        assert!(OBJECT_UNIFORM_SIZE <= 16 * 1024);
    }

    #[test]
    fn vertex_layout_covers_vertex() {
        let layout = vertex_layout();
        assert_eq!(layout.array_stride, 64);
        let last = layout.attributes.last().unwrap();
        assert_eq!(last.offset + 16, layout.array_stride);
    }
}
