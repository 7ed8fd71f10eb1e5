use glam::{Mat4, Vec3};

use crate::Color;

/// Orthographic volume a directional light renders its shadow map from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowFrustum {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalShadow {
    pub bias: f32,
    pub map_size: u32,
    pub frustum: ShadowFrustum,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    pub color: Color,
    pub intensity: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub shadow: Option<DirectionalShadow>,
}

impl DirectionalLight {
    pub fn new(color: Color, intensity: f32) -> Self {
        Self {
            color,
            intensity,
            position: Vec3::new(0.0, 1.0, 0.0),
            target: Vec3::ZERO,
            shadow: None,
        }
    }

    /// Unit vector pointing from the target towards the light.
    pub fn direction_to_light(&self) -> Vec3 {
        (self.position - self.target).normalize_or(Vec3::Y)
    }

    /// Clip-space transform of the shadow camera, if the light casts shadows.
    pub fn shadow_view_projection(&self) -> Option<Mat4> {
        let shadow = self.shadow.as_ref()?;
        let dir = self.position - self.target;
        let up = if dir.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(self.position, self.target, up);
        let f = shadow.frustum;
        let proj = Mat4::orthographic_rh(f.left, f.right, f.bottom, f.top, f.near, f.far);
        Some(proj * view)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

impl AmbientLight {
    pub fn new(color: Color, intensity: f32) -> Self {
        Self { color, intensity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sun() -> DirectionalLight {
        let mut light = DirectionalLight::new(Color::WHITE, 1.0);
        light.position = Vec3::new(20.0, 100.0, 30.0);
        light.shadow = Some(DirectionalShadow {
            bias: -0.0001,
            map_size: 2048,
            frustum: ShadowFrustum {
                left: 100.0,
                right: -100.0,
                top: 100.0,
                bottom: -100.0,
                near: 0.5,
                far: 500.0,
            },
        });
        light
    }

    #[test]
    fn origin_lands_inside_shadow_volume() {
        let vp = sun().shadow_view_projection().unwrap();
        let p = vp.project_point3(Vec3::ZERO);
        assert!(p.x.abs() < 1e-4 && p.y.abs() < 1e-4);
        assert!(p.z > 0.0 && p.z < 1.0);
    }

    #[test]
    fn no_shadow_means_no_shadow_camera() {
        let mut light = sun();
        light.shadow = None;
        assert!(light.shadow_view_projection().is_none());
    }
}
