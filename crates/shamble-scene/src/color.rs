use glam::{Vec3, Vec4};

/// Linear RGB color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color(pub Vec3);

impl Color {
    pub const WHITE: Self = Self(Vec3::ONE);
    pub const BLACK: Self = Self(Vec3::ZERO);

    /// Builds a color from a `0xRRGGBB` sRGB literal.
    pub fn from_hex(hex: u32) -> Self {
        let channel = |shift: u32| srgb_to_linear(((hex >> shift) & 0xff) as f32 / 255.0);
        Self(Vec3::new(channel(16), channel(8), channel(0)))
    }

    /// Builds a color from a `0xRRGGBB` literal whose channels are already
    /// linear.
    pub fn from_linear_hex(hex: u32) -> Self {
        let channel = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
        Self(Vec3::new(channel(16), channel(8), channel(0)))
    }

    pub fn with_alpha(self, alpha: f32) -> Vec4 {
        self.0.extend(alpha)
    }
}

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
