//! Terrain height fields generated from noise.
//!
//! **Seed-based determinism:** all noise is derived from `config.seed`, so the
//! same seed always produces the same heights at every cell.
//!
//! Cell `(x, z)` of the height map is world unit `[x, x + 1) x [z, z + 1)`.
//! Deformations report the rectangle of cells they touched so consumers can
//! refresh only what changed.

use engine_core::{HeightField, IRect};
use noise::{NoiseFn, Perlin, Simplex};

/// Derive a deterministic u32 noise seed from a world seed and an offset.
/// Same (seed, offset) always gives the same result so terrain is reproducible.
#[inline]
fn deterministic_noise_seed(seed: u64, offset: u64) -> u32 {
    ((seed.wrapping_add(offset))
        .wrapping_mul(0x9e3779b97f4a7c15_u64)
        .wrapping_add(offset.wrapping_mul(0x6c078965_u64))
        >> 32) as u32
}

/// Configuration for terrain generation.
#[derive(Debug, Clone)]
pub struct TerrainConfig {
    /// Cells per side.
    pub size: u32,
    /// Maximum height of terrain.
    pub height_scale: f32,
    /// Noise frequency (lower = smoother).
    pub frequency: f64,
    /// Number of octaves for fractal noise.
    pub octaves: u32,
    /// Lacunarity (frequency multiplier per octave).
    pub lacunarity: f64,
    /// Persistence (amplitude multiplier per octave).
    pub persistence: f64,
    /// Seed for random generation.
    pub seed: u64,
    /// Strength of the radial drop towards the map edge, 0 disables it.
    /// Positive values make an island surrounded by sea.
    pub island_falloff: f32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            size: 256,
            height_scale: 30.0,
            frequency: 0.02,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            seed: 0,
            island_falloff: 0.8,
        }
    }
}

/// Generated terrain heights.
#[derive(Debug, Clone)]
pub struct TerrainData {
    pub heightmap: Vec<f32>,
    pub config: TerrainConfig,
}

impl TerrainData {
    /// Generate terrain from configuration.
    pub fn generate(config: TerrainConfig) -> Self {
        let perlin = Perlin::new(deterministic_noise_seed(config.seed, 0));
        let simplex = Simplex::new(deterministic_noise_seed(config.seed, 1));

        let size = config.size as usize;
        let half = config.size as f32 * 0.5;
        let mut heightmap = Vec::with_capacity(size * size);

        for z in 0..size {
            for x in 0..size {
                let height = Self::fractal_noise(&perlin, &simplex, x as f64, z as f64, &config);

                // Radial falloff: 0 at the centre, 1 at the edge midpoints.
                let dx = (x as f32 + 0.5 - half) / half;
                let dz = (z as f32 + 0.5 - half) / half;
                let edge = (dx * dx + dz * dz).sqrt().min(1.5);
                let shaped = height as f32 - config.island_falloff * edge * edge;

                heightmap.push(shaped * config.height_scale);
            }
        }

        log::debug!(
            "Generated {}x{} terrain (seed {}, falloff {})",
            size,
            size,
            config.seed,
            config.island_falloff
        );
        Self { heightmap, config }
    }

    fn fractal_noise(
        perlin: &Perlin,
        simplex: &Simplex,
        x: f64,
        z: f64,
        config: &TerrainConfig,
    ) -> f64 {
        let mut value = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = config.frequency;
        let mut max_value = 0.0;

        for _ in 0..config.octaves {
            // Mix Perlin and Simplex for variety
            let perlin_sample = perlin.get([x * frequency, z * frequency]);
            let simplex_sample = simplex.get([x * frequency + 1000.0, z * frequency + 1000.0]);

            value += (perlin_sample * 0.7 + simplex_sample * 0.3) * amplitude;
            max_value += amplitude;

            amplitude *= config.persistence;
            frequency *= config.lacunarity;
        }

        if max_value == 0.0 {
            return 0.5;
        }
        // Normalize to 0-1 range
        (value / max_value + 1.0) * 0.5
    }

    /// Bilinear height at a world position, clamped to the map.
    pub fn sample_height(&self, x: f32, z: f32) -> f32 {
        let size = self.config.size as usize;
        if size == 0 {
            return 0.0;
        }
        if size == 1 {
            return self.heightmap[0];
        }
        // Cell centres sit at half-integer coordinates.
        let gx = (x - 0.5).clamp(0.0, (size - 1) as f32);
        let gz = (z - 0.5).clamp(0.0, (size - 1) as f32);
        let x0 = (gx.floor() as usize).min(size - 2);
        let z0 = (gz.floor() as usize).min(size - 2);
        let fx = gx - x0 as f32;
        let fz = gz - z0 as f32;

        let h00 = self.heightmap[z0 * size + x0];
        let h10 = self.heightmap[z0 * size + x0 + 1];
        let h01 = self.heightmap[(z0 + 1) * size + x0];
        let h11 = self.heightmap[(z0 + 1) * size + x0 + 1];

        let top = h00 + (h10 - h00) * fx;
        let bottom = h01 + (h11 - h01) * fx;
        top + (bottom - top) * fz
    }

    /// Lowest and highest height on the map.
    pub fn height_range(&self) -> (f32, f32) {
        self.heightmap
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| (lo.min(h), hi.max(h)))
    }

    /// Deform terrain with an impact crater: flat floor, steep walls, raised rim.
    /// Returns the rectangle of modified cells, `None` if nothing changed.
    /// Profile: flat floor from center to ~35% radius, steep wall to rim, then raised rim to ~115% radius.
    pub fn deform_crater(&mut self, center_x: f32, center_z: f32, radius: f32, depth: f32) -> Option<IRect> {
        let r2 = radius * radius;
        let rim_radius = radius * 1.15;
        let rim_radius2 = rim_radius * rim_radius;
        let floor_frac = 0.35; // flat floor out to 35% of radius
        let rim_height = depth * 0.25; // ejecta berm height

        self.deform_cells(center_x, center_z, rim_radius, |dist2| {
            let norm_r = (dist2 / r2).sqrt();
            if dist2 < r2 {
                let lower = if norm_r <= floor_frac {
                    depth
                } else {
                    // steep wall: smoothstep from depth at floor_frac to 0 at 1.0
                    let t = ((norm_r - floor_frac) / (1.0 - floor_frac)).clamp(0.0, 1.0);
                    let s = t * t * (3.0 - 2.0 * t);
                    depth * (1.0 - s)
                };
                Some(-lower)
            } else if dist2 < rim_radius2 {
                // Raised rim: peak at mid-rim
                let t = ((norm_r - 1.0) / 0.15).clamp(0.0, 1.0);
                Some(rim_height * 4.0 * t * (1.0 - t))
            } else {
                None
            }
        })
    }

    /// Raise a mound at `(center_x, center_z)` with a smoothstep falloff.
    /// Returns the rectangle of modified cells, `None` if nothing changed.
    pub fn deform_mound(&mut self, center_x: f32, center_z: f32, radius: f32, height: f32) -> Option<IRect> {
        let r2 = radius * radius;
        self.deform_cells(center_x, center_z, radius, |dist2| {
            if dist2 < r2 {
                let t = 1.0 - (dist2 / r2).sqrt();
                Some(height * t * t * (3.0 - 2.0 * t))
            } else {
                None
            }
        })
    }

    /// Apply `offset(dist2)` to every cell whose centre lies within `reach`
    /// of the given point and return the bounds of the cells that changed.
    fn deform_cells(
        &mut self,
        center_x: f32,
        center_z: f32,
        reach: f32,
        offset: impl Fn(f32) -> Option<f32>,
    ) -> Option<IRect> {
        let size = self.config.size as i32;
        let x_lo = ((center_x - reach).floor() as i32).clamp(0, size);
        let x_hi = ((center_x + reach).ceil() as i32 + 1).clamp(0, size);
        let z_lo = ((center_z - reach).floor() as i32).clamp(0, size);
        let z_hi = ((center_z + reach).ceil() as i32 + 1).clamp(0, size);
        let mut touched: Option<IRect> = None;

        for z in z_lo..z_hi {
            for x in x_lo..x_hi {
                let dx = x as f32 + 0.5 - center_x;
                let dz = z as f32 + 0.5 - center_z;
                let Some(delta) = offset(dx * dx + dz * dz) else {
                    continue;
                };
                let idx = (z * size + x) as usize;
                if delta == 0.0 {
                    continue;
                }
                self.heightmap[idx] += delta;
                let cell = IRect::new(x, z, x + 1, z + 1);
                touched = Some(touched.map_or(cell, |r| r.union_bounds(&cell)));
            }
        }
        touched
    }
}

impl HeightField for TerrainData {
    fn size(&self) -> (u32, u32) {
        (self.config.size, self.config.size)
    }

    fn height(&self, x: u32, y: u32) -> f32 {
        self.heightmap[(y * self.config.size + x) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(seed: u64) -> TerrainConfig {
        TerrainConfig {
            size: 48,
            height_scale: 15.0,
            seed,
            ..Default::default()
        }
    }

    /// Same seed and config must produce identical heightmaps (replayability).
    #[test]
    fn terrain_deterministic_same_seed() {
        let a = TerrainData::generate(small_config(98765));
        let b = TerrainData::generate(small_config(98765));
        assert_eq!(a.heightmap.len(), 48 * 48);
        for (i, (&ha, &hb)) in a.heightmap.iter().zip(b.heightmap.iter()).enumerate() {
            assert_eq!(ha, hb, "heightmap[{}] should match for same seed", i);
        }
    }

    /// Different seeds must produce different terrain.
    #[test]
    fn terrain_different_seed_different_heights() {
        let a = TerrainData::generate(small_config(11111));
        let b = TerrainData::generate(small_config(22222));
        assert_ne!(a.heightmap, b.heightmap);
    }

    #[test]
    fn island_falloff_sinks_the_edges() {
        let terrain = TerrainData::generate(TerrainConfig {
            island_falloff: 1.5,
            ..small_config(7)
        });
        let centre = terrain.height(24, 24);
        let corner = terrain.height(0, 0);
        assert!(centre > corner, "centre {} should be above corner {}", centre, corner);
    }

    #[test]
    fn crater_reports_exactly_the_cells_it_changed() {
        let mut terrain = TerrainData::generate(small_config(3));
        let before = terrain.heightmap.clone();
        let rect = terrain.deform_crater(20.0, 20.0, 5.0, 4.0).expect("crater modifies cells");

        assert!(rect.contains(19, 19));
        for z in 0..48 {
            for x in 0..48 {
                let idx = (z * 48 + x) as usize;
                if !rect.contains(x, z) {
                    assert_eq!(terrain.heightmap[idx], before[idx], "cell ({}, {}) moved", x, z);
                }
            }
        }
        assert!(terrain.height(19, 19) < before[19 * 48 + 19]);
    }

    #[test]
    fn deformation_off_the_map_changes_nothing() {
        let mut terrain = TerrainData::generate(small_config(3));
        assert_eq!(terrain.deform_mound(-50.0, -50.0, 4.0, 2.0), None);
        let edge = terrain.deform_mound(0.0, 0.0, 3.0, 2.0).expect("corner mound");
        assert_eq!((edge.x1, edge.y1), (0, 0));
    }

    #[test]
    fn sample_height_matches_cell_centres() {
        let terrain = TerrainData::generate(small_config(5));
        let h = terrain.height(10, 12);
        assert!((terrain.sample_height(10.5, 12.5) - h).abs() < 1e-4);
    }
}
