//! Mapping between world space, LOS texture space and minimap space.

use glam::{Mat4, Vec4};

use crate::bitmap::round_up;
use crate::config::LosConfig;

/// Side length of the square LOS texture for a map of `map_size` vertices.
///
/// Fits the map plus the blur margin, rounded to the row alignment and then
/// to a power of two.
#[must_use]
pub fn texture_size(map_size: usize, config: &LosConfig) -> usize {
    round_up(map_size + config.blur_size - 1, config.sub_texture_alignment).next_power_of_two()
}

/// Transforms handed to scene and minimap shaders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMatrices {
    /// Maps world `(x, y, z)` onto LOS texture `(u, v)`.
    pub world_to_los: Mat4,
    /// Maps minimap `(0, 0)-(1, 1)` onto the occupied part of the texture.
    pub los_to_minimap: Mat4,
}

impl Default for CoordinateMatrices {
    fn default() -> Self {
        Self {
            world_to_los: Mat4::IDENTITY,
            los_to_minimap: Mat4::IDENTITY,
        }
    }
}

impl CoordinateMatrices {
    /// Build both matrices for a map of `map_size` vertices stored in a
    /// `texture_size` texture, where vertices are `cell_size` world units
    /// apart.
    #[must_use]
    pub fn new(map_size: usize, texture_size: usize, cell_size: f32) -> Self {
        let texture_size = texture_size as f32;

        // World (0, y, 0) lands on the centre of the first texel and world
        // ((n-1)*cell, y, (n-1)*cell) on the centre of texel n-1. The y axis
        // is ignored.
        let s = 1.0 / (texture_size * cell_size);
        let t = 0.5 / texture_size;
        let world_to_los = Mat4::from_cols(
            Vec4::new(s, 0.0, 0.0, 0.0),
            Vec4::ZERO,
            Vec4::new(0.0, s, 0.0, 0.0),
            Vec4::new(t, t, 0.0, 1.0),
        );

        let m = map_size as f32 / texture_size;
        let los_to_minimap = Mat4::from_cols(
            Vec4::new(m, 0.0, 0.0, 0.0),
            Vec4::new(0.0, m, 0.0, 0.0),
            Vec4::ZERO,
            Vec4::W,
        );

        Self {
            world_to_los,
            los_to_minimap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec3};

    #[test]
    fn test_texture_size() {
        let config = LosConfig::default();
        assert_eq!(texture_size(65, &config), 128);
        assert_eq!(texture_size(1, &config), 8);
        assert_eq!(texture_size(58, &config), 64);
        assert_eq!(texture_size(59, &config), 128);
        assert_eq!(texture_size(257, &config), 512);
    }

    #[test]
    fn test_first_vertex_hits_first_texel_centre() {
        let m = CoordinateMatrices::new(65, 128, 16.0);
        let uv = m.world_to_los.transform_point3(Vec3::new(0.0, 42.0, 0.0));
        assert!((uv.x - 0.5 / 128.0).abs() < 1e-6);
        assert!((uv.y - 0.5 / 128.0).abs() < 1e-6);
    }

    #[test]
    fn test_last_vertex_hits_last_texel_centre() {
        let map_size = 65;
        let m = CoordinateMatrices::new(map_size, 128, 16.0);
        let last = (map_size - 1) as f32 * 16.0;
        let uv = m.world_to_los.transform_point3(Vec3::new(last, -3.0, last));

        let expected = (map_size as f32 - 0.5) / 128.0;
        let half_texel = 0.5 / 128.0;
        assert!((uv.x - expected).abs() < half_texel);
        assert!((uv.y - expected).abs() < half_texel);
        assert!((uv.x - expected).abs() < 1e-5);
    }

    #[test]
    fn test_height_is_ignored() {
        let m = CoordinateMatrices::new(65, 128, 16.0);
        let a = m.world_to_los.transform_point3(Vec3::new(100.0, 0.0, 200.0));
        let b = m.world_to_los.transform_point3(Vec3::new(100.0, 999.0, 200.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_minimap_covers_occupied_region() {
        let m = CoordinateMatrices::new(65, 128, 16.0);
        let corner = m.los_to_minimap.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert!((Vec2::new(corner.x, corner.y) - Vec2::splat(65.0 / 128.0)).length() < 1e-6);

        let origin = m.los_to_minimap.transform_point3(Vec3::ZERO);
        assert_eq!(origin, Vec3::ZERO);
    }
}
