//! Water surface mesh and its bounding volume.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// How far the endless ocean ring reaches past each map edge, in map sizes.
pub const ENDLESS_OCEAN_EXTENT: f32 = 8.0;

/// Quads per side of the in-map surface grid.
pub const SURFACE_GRID: u32 = 16;

/// Vertex of the water surface mesh.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct WaterVertex {
    pub position: [f32; 3],
    /// 1.0 on the surround ring outside the map, where no coast data exists.
    pub ocean: f32,
}

impl WaterVertex {
    pub fn new(x: f32, y: f32, z: f32, ocean: bool) -> Self {
        Self {
            position: [x, y, z],
            ocean: if ocean { 1.0 } else { 0.0 },
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<WaterVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                // Position
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                // Ocean flag
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}

/// Axis-aligned box tested by the occlusion query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaterBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl WaterBounds {
    /// Box around the water plane over the map, or over the whole ocean ring
    /// when `endless` is set. One unit thick so it never degenerates.
    pub fn new(map_size: (u32, u32), water_level: f32, endless: bool) -> Self {
        let (w, h) = (map_size.0 as f32, map_size.1 as f32);
        let (ex, ez) = if endless {
            (w * ENDLESS_OCEAN_EXTENT, h * ENDLESS_OCEAN_EXTENT)
        } else {
            (0.0, 0.0)
        };
        Self {
            min: Vec3::new(-ex, water_level - 0.5, -ez),
            max: Vec3::new(w + ex, water_level + 0.5, h + ez),
        }
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}

/// Flat surface at `water_level` covering the map with a `SURFACE_GRID`
/// quad grid, plus with `endless` a ring of eight quads reaching
/// `ENDLESS_OCEAN_EXTENT` map sizes beyond every edge.
pub fn build_surface_mesh(map_size: (u32, u32), water_level: f32, endless: bool) -> (Vec<WaterVertex>, Vec<u32>) {
    let (w, h) = (map_size.0 as f32, map_size.1 as f32);
    let n = SURFACE_GRID;
    let mut vertices = Vec::with_capacity(((n + 1) * (n + 1)) as usize + 16);
    let mut indices = Vec::with_capacity((n * n * 6) as usize + 48);

    for z in 0..=n {
        for x in 0..=n {
            vertices.push(WaterVertex::new(
                w * x as f32 / n as f32,
                water_level,
                h * z as f32 / n as f32,
                false,
            ));
        }
    }
    for z in 0..n {
        for x in 0..n {
            let top_left = z * (n + 1) + x;
            let top_right = top_left + 1;
            let bottom_left = top_left + n + 1;
            let bottom_right = bottom_left + 1;
            indices.extend([top_left, bottom_left, top_right, top_right, bottom_left, bottom_right]);
        }
    }

    if endless {
        let ex = w * ENDLESS_OCEAN_EXTENT;
        let ez = h * ENDLESS_OCEAN_EXTENT;
        let xs = [-ex, 0.0, w, w + ex];
        let zs = [-ez, 0.0, h, h + ez];
        let base = vertices.len() as u32;
        for &z in &zs {
            for &x in &xs {
                vertices.push(WaterVertex::new(x, water_level, z, true));
            }
        }
        for cz in 0..3u32 {
            for cx in 0..3u32 {
                // Centre cell is the map itself.
                if cx == 1 && cz == 1 {
                    continue;
                }
                let top_left = base + cz * 4 + cx;
                let top_right = top_left + 1;
                let bottom_left = top_left + 4;
                let bottom_right = bottom_left + 1;
                indices.extend([top_left, bottom_left, top_right, top_right, bottom_left, bottom_right]);
            }
        }
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_surface_covers_exactly_the_map() {
        let (vertices, indices) = build_surface_mesh((256, 128), 3.0, false);
        assert_eq!(indices.len(), (SURFACE_GRID * SURFACE_GRID * 6) as usize);
        assert!(vertices.iter().all(|v| v.position[1] == 3.0 && v.ocean == 0.0));
        let max_x = vertices.iter().map(|v| v.position[0]).fold(f32::MIN, f32::max);
        let max_z = vertices.iter().map(|v| v.position[2]).fold(f32::MIN, f32::max);
        assert_eq!((max_x, max_z), (256.0, 128.0));
    }

    #[test]
    fn endless_ring_surrounds_the_map() {
        let (vertices, indices) = build_surface_mesh((100, 100), 0.0, true);
        assert_eq!(indices.len(), (SURFACE_GRID * SURFACE_GRID * 6 + 8 * 6) as usize);
        let ocean: Vec<_> = vertices.iter().filter(|v| v.ocean == 1.0).collect();
        assert_eq!(ocean.len(), 16);
        let reach = 100.0 * ENDLESS_OCEAN_EXTENT;
        assert!(ocean.iter().any(|v| v.position == [-reach, 0.0, -reach]));
        assert!(ocean.iter().any(|v| v.position == [100.0 + reach, 0.0, 100.0 + reach]));
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn bounds_grow_with_endless_ocean() {
        let map = WaterBounds::new((64, 64), 2.0, false);
        let endless = WaterBounds::new((64, 64), 2.0, true);
        assert!(map.contains(Vec3::new(32.0, 2.0, 32.0)));
        assert!(!map.contains(Vec3::new(-10.0, 2.0, 32.0)));
        assert!(endless.contains(Vec3::new(-10.0, 2.0, 32.0)));
        assert!(map.max.y > map.min.y);
    }
}
