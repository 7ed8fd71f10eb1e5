use std::collections::{HashMap, HashSet};

use bytemuck::Zeroable;
use glam::{Mat4, Vec3};
use shamble_camera::PerspectiveCamera;
use shamble_scene::{Background, MeshId, NodeId, Scene};
use wgpu::util::DeviceExt;
use wgpu::*;

use crate::depth::{create_depth, create_msaa_color};
use crate::model::{GpuMesh, GpuObject, create_object, upload_mesh};
use crate::pipeline::{
    GlobalUniforms, Layouts, LightUniforms, create_bind_group_layouts, create_mesh_pipeline,
    create_shadow_pipeline, create_skybox_pipeline,
};
use crate::shadow::ShadowMap;
use crate::skybox::Skybox;

const DEFAULT_SHADOW_MAP_SIZE: u32 = 2048;

struct Draw {
    node: NodeId,
    mesh: MeshId,
    cast_shadow: bool,
}

pub struct Renderer3D {
    surface_format: TextureFormat,
    sample_count: u32,
    layouts: Layouts,
    mesh_pipeline: RenderPipeline,
    shadow_pipeline: RenderPipeline,
    skybox_pipeline: RenderPipeline,
    depth_view: TextureView,
    depth_tex: Texture,
    msaa_view: Option<TextureView>,
    shadow_map: ShadowMap,
    globals_buf: Buffer,
    globals_bg: BindGroup,
    light_buf: Buffer,
    light_bg: BindGroup,
    material_sampler: Sampler,
    meshes: HashMap<MeshId, GpuMesh>,
    objects: HashMap<NodeId, GpuObject>,
    skybox: Option<Skybox>,
    background_revision: Option<u64>,
    clear_color: Color,
    draws: Vec<Draw>,
    shadows_enabled: bool,
}

impl Renderer3D {
    pub fn new(
        device: &Device,
        surface_format: TextureFormat,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Self {
        let layouts = create_bind_group_layouts(device);
        let mesh_pipeline = create_mesh_pipeline(device, surface_format, sample_count, &layouts);
        let shadow_pipeline = create_shadow_pipeline(device, &layouts);
        let skybox_pipeline =
            create_skybox_pipeline(device, surface_format, sample_count, &layouts);

        let (depth_view, depth_tex) = create_depth(device, width, height, sample_count);
        let msaa_view = create_msaa_color(device, surface_format, width, height, sample_count);
        let shadow_map = ShadowMap::new(device, DEFAULT_SHADOW_MAP_SIZE);

        let globals_buf = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("globals_ubo"),
            contents: bytemuck::cast_slice(&[GlobalUniforms::zeroed()]),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let globals_bg = create_globals_bind_group(device, &layouts, &globals_buf, &shadow_map);

        let light_buf = device.create_buffer_init(&util::BufferInitDescriptor {
            label: Some("light_ubo"),
            contents: bytemuck::cast_slice(&[LightUniforms {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            }]),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let light_bg = device.create_bind_group(&BindGroupDescriptor {
            label: Some("light_bg"),
            layout: &layouts.light_bgl,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: light_buf.as_entire_binding(),
            }],
        });

        let material_sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("material_sampler"),
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            ..Default::default()
        });

        Self {
            surface_format,
            sample_count,
            layouts,
            mesh_pipeline,
            shadow_pipeline,
            skybox_pipeline,
            depth_view,
            depth_tex,
            msaa_view,
            shadow_map,
            globals_buf,
            globals_bg,
            light_buf,
            light_bg,
            material_sampler,
            meshes: HashMap::new(),
            objects: HashMap::new(),
            skybox: None,
            background_revision: None,
            clear_color: Color::BLACK,
            draws: Vec::new(),
            shadows_enabled: false,
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn resize(&mut self, device: &Device, width: u32, height: u32) {
        let (dv, dt) = create_depth(device, width, height, self.sample_count);
        self.depth_view = dv;
        self.depth_tex = dt;
        self.msaa_view =
            create_msaa_color(device, self.surface_format, width, height, self.sample_count);
    }

    /// Uploads whatever the scene gained since the last call and writes this
    /// frame's uniforms. World transforms must already be current.
    pub fn prepare(
        &mut self,
        device: &Device,
        queue: &Queue,
        scene: &Scene,
        camera: &PerspectiveCamera,
    ) {
        self.sync_background(device, queue, scene);

        let wanted_size = scene
            .directional_lights
            .first()
            .and_then(|l| l.shadow.as_ref())
            .map(|s| s.map_size)
            .unwrap_or(DEFAULT_SHADOW_MAP_SIZE);
        if wanted_size != self.shadow_map.size {
            self.shadow_map = ShadowMap::new(device, wanted_size);
            self.globals_bg =
                create_globals_bind_group(device, &self.layouts, &self.globals_buf, &self.shadow_map);
        }

        let (globals, light_view_proj) =
            global_uniforms(scene, camera, self.shadow_map.texel_size());
        self.shadows_enabled = light_view_proj.is_some();
        queue.write_buffer(&self.globals_buf, 0, bytemuck::cast_slice(&[globals]));
        queue.write_buffer(
            &self.light_buf,
            0,
            bytemuck::cast_slice(&[LightUniforms {
                view_proj: light_view_proj.unwrap_or(Mat4::IDENTITY).to_cols_array_2d(),
            }]),
        );
        if let Some(skybox) = &self.skybox {
            skybox.update(queue, camera.view_matrix(), camera.projection_matrix());
        }

        self.draws.clear();
        let mut live = HashSet::new();
        for id in scene.renderables() {
            let node = scene.node(id);
            let Some(mesh_id) = node.mesh else {
                continue;
            };

            if !self.meshes.contains_key(&mesh_id) {
                let mesh = scene.mesh(mesh_id);
                log::debug!(
                    "uploading mesh {:?} ({} vertices)",
                    mesh.name,
                    mesh.vertex_count()
                );
                let gpu = upload_mesh(device, queue, &self.layouts, &self.material_sampler, mesh);
                self.meshes.insert(mesh_id, gpu);
            }

            let object = self
                .objects
                .entry(id)
                .or_insert_with(|| create_object(device, &self.layouts));
            let joints = node
                .skin
                .map(|skin| scene.joint_matrices(skin))
                .unwrap_or_default();
            object.write(queue, scene.world_matrix(id), &joints, node.receive_shadow);

            live.insert(id);
            self.draws.push(Draw {
                node: id,
                mesh: mesh_id,
                cast_shadow: node.cast_shadow,
            });
        }
        self.objects.retain(|id, _| live.contains(id));
    }

    fn sync_background(&mut self, device: &Device, queue: &Queue, scene: &Scene) {
        let revision = scene.background_revision();
        if self.background_revision == Some(revision) {
            return;
        }
        self.background_revision = Some(revision);

        match scene.background() {
            Some(Background::CubeMap(cube)) => {
                log::debug!("uploading {}px cube map background", cube.size);
                self.skybox = Some(Skybox::new(device, queue, &self.layouts, cube));
            }
            Some(Background::Color(color)) => {
                self.skybox = None;
                self.clear_color = Color {
                    r: color.0.x as f64,
                    g: color.0.y as f64,
                    b: color.0.z as f64,
                    a: 1.0,
                };
            }
            None => {
                self.skybox = None;
                self.clear_color = Color::BLACK;
            }
        }
    }

    pub fn render(&self, encoder: &mut CommandEncoder, target_view: &TextureView) {
        if self.shadows_enabled {
            let mut s_pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("shadow_pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &self.shadow_map.view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            s_pass.set_pipeline(&self.shadow_pipeline);
            s_pass.set_bind_group(0, &self.light_bg, &[]);
            for draw in self.draws.iter().filter(|d| d.cast_shadow) {
                self.draw_mesh(&mut s_pass, draw, false);
            }
        }

        let (view, resolve_target, store) = match &self.msaa_view {
            Some(msaa) => (msaa, Some(target_view), StoreOp::Discard),
            None => (target_view, None, StoreOp::Store),
        };
        let mut r_pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("scene_pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target,
                ops: Operations {
                    load: LoadOp::Clear(self.clear_color),
                    store,
                },
            })],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(Operations {
                    load: LoadOp::Clear(1.0),
                    store: StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let Some(skybox) = &self.skybox {
            r_pass.set_pipeline(&self.skybox_pipeline);
            r_pass.set_bind_group(0, &skybox.bind_group, &[]);
            r_pass.draw(0..3, 0..1);
        }

        r_pass.set_pipeline(&self.mesh_pipeline);
        r_pass.set_bind_group(0, &self.globals_bg, &[]);
        for draw in &self.draws {
            self.draw_mesh(&mut r_pass, draw, true);
        }
    }

    fn draw_mesh(&self, pass: &mut RenderPass<'_>, draw: &Draw, with_material: bool) {
        let (Some(mesh), Some(object)) = (self.meshes.get(&draw.mesh), self.objects.get(&draw.node))
        else {
            return;
        };
        pass.set_bind_group(1, &object.bg, &[]);
        for prim in &mesh.primitives {
            if with_material {
                pass.set_bind_group(2, &prim.material_bg, &[]);
            }
            pass.set_vertex_buffer(0, prim.vbuf.slice(..));
            pass.set_index_buffer(prim.ibuf.slice(..), IndexFormat::Uint32);
            pass.draw_indexed(0..prim.index_count, 0, 0..1);
        }
    }
}

fn create_globals_bind_group(
    device: &Device,
    layouts: &Layouts,
    globals_buf: &Buffer,
    shadow_map: &ShadowMap,
) -> BindGroup {
    device.create_bind_group(&BindGroupDescriptor {
        label: Some("globals_bg"),
        layout: &layouts.globals_bgl,
        entries: &[
            BindGroupEntry {
                binding: 0,
                resource: globals_buf.as_entire_binding(),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::TextureView(&shadow_map.view),
            },
            BindGroupEntry {
                binding: 2,
                resource: BindingResource::Sampler(&shadow_map.sampler),
            },
        ],
    })
}

/// Camera and light state for the mesh shader. Only the first directional
/// light is shaded; ambient lights add up.
fn global_uniforms(
    scene: &Scene,
    camera: &PerspectiveCamera,
    shadow_texel: f32,
) -> (GlobalUniforms, Option<Mat4>) {
    let ambient = scene
        .ambient_lights
        .iter()
        .fold(Vec3::ZERO, |acc, l| acc + l.color.0 * l.intensity);

    let light = scene.directional_lights.first();
    let light_view_proj = light.and_then(|l| l.shadow_view_projection());
    let (dir, color) = match light {
        Some(l) => (l.direction_to_light(), l.color.0 * l.intensity),
        None => (Vec3::Y, Vec3::ZERO),
    };
    let bias = light
        .and_then(|l| l.shadow.as_ref())
        .map(|s| s.bias)
        .unwrap_or(0.0);

    let globals = GlobalUniforms {
        view_proj: camera.view_projection_matrix().to_cols_array_2d(),
        light_view_proj: light_view_proj
            .unwrap_or(Mat4::IDENTITY)
            .to_cols_array_2d(),
        camera_pos: camera.position.extend(1.0).to_array(),
        light_dir: dir.extend(if light_view_proj.is_some() { 1.0 } else { 0.0 }).to_array(),
        light_color: color.extend(1.0).to_array(),
        ambient: ambient.extend(1.0).to_array(),
        shadow: [bias, shadow_texel, 0.0, 0.0],
    };
    (globals, light_view_proj)
}
