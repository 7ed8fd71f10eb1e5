//! wgpu renderer for a [`shamble_scene::Scene`]: shadow pass, skybox and lit
//! skinned meshes.

pub mod depth;
pub mod model;
pub mod pipeline;
pub mod render;
pub mod shadow;
pub mod skybox;

pub use depth::{DEPTH_FORMAT, create_depth, create_msaa_color};
pub use model::{GpuMesh, GpuObject, upload_mesh};
pub use pipeline::{Layouts, MAX_JOINTS, create_bind_group_layouts};
pub use render::Renderer3D;
pub use shadow::ShadowMap;
pub use skybox::Skybox;
