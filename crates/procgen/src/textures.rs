//! Procedural water textures: wave normal tile sets, shore foam and caustics.
//! Everything is generated at runtime from a seed, so the renderer never
//! needs asset files.

use glam::{Vec2, Vec3};
use noise::{NoiseFn, Perlin};
use rand::prelude::*;
use std::f32::consts::TAU;

/// RGBA pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(q(r), q(g), q(b), q(a))
    }

    /// Pack a unit normal into `[0, 1]` colour space.
    pub fn from_normal(n: Vec3) -> Self {
        let c = n.normalize_or_zero() * 0.5 + Vec3::splat(0.5);
        Self::from_rgba(c.x, c.y, c.z, 1.0)
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Generated RGBA8 texture data
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Pixel>,
}

impl TextureData {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Pixel::new(0, 0, 0, 255); (width * height) as usize],
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: Pixel) {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize] = pixel;
        }
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Pixel {
        if x < self.width && y < self.height {
            self.pixels[(y * self.width + x) as usize]
        } else {
            Pixel::new(0, 0, 0, 255)
        }
    }

    /// Tightly packed RGBA8 bytes, row-major.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(Pixel::to_bytes).collect()
    }
}

/// Several equally sized normal-map tiles packed into one texture.
#[derive(Debug, Clone)]
pub struct NormalTileSet {
    pub texture: TextureData,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl NormalTileSet {
    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    pub fn tile_size(&self) -> (u32, u32) {
        (
            self.texture.width / self.tiles_x.max(1),
            self.texture.height / self.tiles_y.max(1),
        )
    }
}

/// Sizes for [`WaterTextureGenerator::generate_all`].
#[derive(Debug, Clone)]
pub struct WaterTextureConfig {
    pub normal_tile_size: u32,
    pub normal_tiles_x: u32,
    pub normal_tiles_y: u32,
    pub foam_size: u32,
    pub caustic_size: u32,
    pub caustic_frames: u32,
}

impl Default for WaterTextureConfig {
    fn default() -> Self {
        Self {
            normal_tile_size: 64,
            normal_tiles_x: 2,
            normal_tiles_y: 2,
            foam_size: 128,
            caustic_size: 64,
            caustic_frames: 8,
        }
    }
}

/// Every texture the water surface samples.
#[derive(Debug, Clone)]
pub struct WaterTextureSet {
    pub normal: NormalTileSet,
    pub foam: TextureData,
    pub caustics: Vec<TextureData>,
}

/// Procedural water texture generator
pub struct WaterTextureGenerator {
    perlin: Perlin,
    rng: StdRng,
}

impl WaterTextureGenerator {
    pub fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            perlin: Perlin::new(rng.gen()),
            rng,
        }
    }

    pub fn generate_all(&mut self, config: &WaterTextureConfig) -> WaterTextureSet {
        WaterTextureSet {
            normal: self.generate_normal_tiles(
                config.normal_tile_size,
                config.normal_tiles_x,
                config.normal_tiles_y,
            ),
            foam: self.generate_foam(config.foam_size),
            caustics: self.generate_caustics(config.caustic_size, config.caustic_frames),
        }
    }

    /// Wave normal maps, one per tile. Each tile is a sum of sine waves with
    /// integer wave numbers, so it repeats seamlessly.
    pub fn generate_normal_tiles(&mut self, tile_size: u32, tiles_x: u32, tiles_y: u32) -> NormalTileSet {
        let tiles_x = tiles_x.max(1);
        let tiles_y = tiles_y.max(1);
        let mut texture = TextureData::new(tile_size * tiles_x, tile_size * tiles_y);

        for tile in 0..tiles_x * tiles_y {
            let waves: Vec<(Vec2, f32, f32)> = (0..6)
                .map(|_| {
                    let k = Vec2::new(
                        self.rng.gen_range(-4i32..=4) as f32,
                        self.rng.gen_range(1i32..=4) as f32,
                    );
                    let amplitude = 0.6 / (1.0 + k.length());
                    let phase = self.rng.gen_range(0.0..TAU);
                    (k, amplitude, phase)
                })
                .collect();

            let ox = (tile % tiles_x) * tile_size;
            let oy = (tile / tiles_x) * tile_size;
            for y in 0..tile_size {
                for x in 0..tile_size {
                    let p = Vec2::new(x as f32, y as f32) / tile_size as f32;
                    // Height h = sum a*sin(2pi k.p + phase); normal = (-dh/dx, -dh/dy, 1).
                    let mut grad = Vec2::ZERO;
                    for &(k, a, phase) in &waves {
                        grad += k * (a * TAU * (TAU * k.dot(p) + phase).cos());
                    }
                    let normal = Vec3::new(-grad.x * 0.1, -grad.y * 0.1, 1.0);
                    texture.set_pixel(ox + x, oy + y, Pixel::from_normal(normal));
                }
            }
        }

        NormalTileSet { texture, tiles_x, tiles_y }
    }

    /// Shore foam: broken noise in the alpha channel over white.
    pub fn generate_foam(&mut self, size: u32) -> TextureData {
        let mut texture = TextureData::new(size, size);
        for y in 0..size {
            for x in 0..size {
                let u = x as f64 / size as f64;
                let v = y as f64 / size as f64;
                let bubbles = self.fbm(u * 16.0, v * 16.0, 4);
                let streaks = self.fbm(u * 4.0, v * 24.0 + bubbles, 3);
                let density = smooth_step(0.45, 0.7, bubbles * 0.6 + streaks * 0.4) as f32;
                texture.set_pixel(x, y, Pixel::from_rgba(1.0, 1.0, 1.0, density));
            }
        }
        texture
    }

    /// Animated caustic frames: bright voronoi cell edges whose feature
    /// points orbit over the frame cycle.
    pub fn generate_caustics(&mut self, size: u32, frames: u32) -> Vec<TextureData> {
        let frames = frames.max(1);
        let cells = 6.0;
        (0..frames)
            .map(|frame| {
                let t = frame as f64 / frames as f64;
                let mut texture = TextureData::new(size, size);
                for y in 0..size {
                    for x in 0..size {
                        let u = x as f64 / size as f64 * cells;
                        let v = y as f64 / size as f64 * cells;
                        let (near, second) = voronoi(u, v, cells, t);
                        let edge = 1.0 - smooth_step(0.0, 0.12, second - near);
                        let light = (edge * edge) as f32;
                        texture.set_pixel(x, y, Pixel::from_rgba(light, light, light, 1.0));
                    }
                }
                texture
            })
            .collect()
    }

    fn fbm(&self, x: f64, y: f64, octaves: u32) -> f64 {
        let mut value = 0.0;
        let mut amplitude = 0.5;
        let mut frequency = 1.0;

        for _ in 0..octaves {
            value += amplitude * (self.perlin.get([x * frequency, y * frequency]) * 0.5 + 0.5);
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        value
    }
}

/// Distances to the nearest and second-nearest feature point. Cells wrap at
/// `period` so the pattern tiles; `t` in `[0, 1)` moves each point once
/// around a small circle.
fn voronoi(x: f64, y: f64, period: f64, t: f64) -> (f64, f64) {
    let n = (x.floor(), y.floor());
    let f = (x - n.0, y - n.1);

    let mut min_dist: f64 = 8.0;
    let mut second_dist: f64 = 8.0;

    for j in -1..=1 {
        for i in -1..=1 {
            let g = (i as f64, j as f64);
            let cx = (n.0 + g.0).rem_euclid(period);
            let cy = (n.1 + g.1).rem_euclid(period);
            let angle = (t + hash2d(cx + 5.0, cy + 9.0)) * std::f64::consts::TAU;
            let o = (
                0.5 + 0.35 * (hash2d(cx, cy) - 0.5) * 2.0 + 0.1 * angle.cos(),
                0.5 + 0.35 * (hash2d(cx + 17.0, cy + 31.0) - 0.5) * 2.0 + 0.1 * angle.sin(),
            );
            let r = (g.0 + o.0 - f.0, g.1 + o.1 - f.1);
            let d = r.0 * r.0 + r.1 * r.1;

            if d < min_dist {
                second_dist = min_dist;
                min_dist = d;
            } else if d < second_dist {
                second_dist = d;
            }
        }
    }

    (min_dist.sqrt(), second_dist.sqrt())
}

fn hash2d(x: f64, y: f64) -> f64 {
    let p = Vec2::new(x as f32, y as f32);
    let p3 = (Vec3::new(p.x, p.y, p.x) * 0.1031).fract();
    let p3 = p3 + Vec3::splat(p3.dot(Vec3::new(p3.y + 33.33, p3.z + 33.33, p3.x + 33.33)));
    ((p3.x + p3.y) * p3.z).fract() as f64
}

fn smooth_step(edge0: f64, edge1: f64, x: f64) -> f64 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_tiles_face_up_and_pack_into_one_texture() {
        let set = WaterTextureGenerator::new(1).generate_normal_tiles(16, 2, 2);
        assert_eq!((set.texture.width, set.texture.height), (32, 32));
        assert_eq!(set.tile_count(), 4);
        assert_eq!(set.tile_size(), (16, 16));
        assert!(set.texture.pixels.iter().all(|p| p.b > 128));
    }

    #[test]
    fn normal_tiles_are_resolution_independent() {
        // Same seed draws the same waves; even texels of the double-size tile
        // sample the same positions as the small one.
        let small = WaterTextureGenerator::new(9).generate_normal_tiles(16, 1, 1);
        let large = WaterTextureGenerator::new(9).generate_normal_tiles(32, 1, 1);
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(small.texture.get_pixel(x, y), large.texture.get_pixel(2 * x, 2 * y));
            }
        }
    }

    #[test]
    fn caustic_frames_animate() {
        let frames = WaterTextureGenerator::new(4).generate_caustics(24, 4);
        assert_eq!(frames.len(), 4);
        assert_ne!(frames[0], frames[1]);
        assert_eq!(frames[0].to_bytes().len(), 24 * 24 * 4);
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let config = WaterTextureConfig {
            normal_tile_size: 8,
            foam_size: 16,
            caustic_size: 8,
            caustic_frames: 2,
            ..Default::default()
        };
        let a = WaterTextureGenerator::new(77).generate_all(&config);
        let b = WaterTextureGenerator::new(77).generate_all(&config);
        assert_eq!(a.normal.texture, b.normal.texture);
        assert_eq!(a.foam, b.foam);
        assert_eq!(a.caustics, b.caustics);
    }
}
