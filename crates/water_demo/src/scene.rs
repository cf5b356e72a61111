//! The demo world: a generated island that gets dug up while the camera
//! circles it.

use std::f32::consts::TAU;

use engine_core::IRect;
use glam::Vec3;
use procgen::{TerrainConfig, TerrainData, TextureData, WaterTextureConfig, WaterTextureGenerator};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use water::gpu::{TexelRegion, TextureDesc, TextureFormat, TextureId};
use water::{FrameReport, GpuError, GpuResources, ViewCamera, WaterRenderer, WaterTextures, WaveTileSet};

use crate::config::DemoConfig;

/// Seconds for one camera orbit.
const ORBIT_PERIOD: f32 = 40.0;

pub struct DemoScene {
    pub terrain: TerrainData,
    rng: StdRng,
    edit_every: u32,
    aspect: f32,
    frame: u32,
}

impl DemoScene {
    pub fn new(config: &DemoConfig) -> Self {
        let terrain = TerrainData::generate(TerrainConfig {
            size: config.map_size,
            seed: config.terrain_seed,
            ..TerrainConfig::default()
        });
        let (lo, hi) = terrain.height_range();
        log::info!(
            "Island {}x{}, heights {:.1}..{:.1}, water at {:.1}",
            config.map_size,
            config.map_size,
            lo,
            hi,
            config.water.water_level
        );
        Self {
            terrain,
            rng: StdRng::seed_from_u64(config.terrain_seed ^ 0xed17),
            edit_every: config.edit_every,
            aspect: config.screen_width as f32 / config.screen_height as f32,
            frame: 0,
        }
    }

    fn map_size(&self) -> f32 {
        self.terrain.config.size as f32
    }

    /// Camera on a slow orbit around the island centre.
    pub fn camera(&self, time: f32) -> ViewCamera {
        let size = self.map_size();
        let centre = Vec3::new(size * 0.5, 0.0, size * 0.5);
        let angle = time / ORBIT_PERIOD * TAU;
        let mut eye = centre + Vec3::new(angle.cos() * size * 0.7, size * 0.3, angle.sin() * size * 0.7);
        eye.y = eye.y.max(self.terrain.sample_height(eye.x, eye.z) + 10.0);
        ViewCamera::look_at(eye, centre, 60f32.to_radians(), self.aspect)
    }

    /// Wind slowly veering with time.
    pub fn wind(&self, time: f32) -> Vec3 {
        let angle = time * 0.05;
        Vec3::new(angle.cos(), 0.0, angle.sin()) * 6.0
    }

    /// Dig a crater or raise a mound when one is due. Returns the changed
    /// cells.
    pub fn step_edits(&mut self) -> Option<IRect> {
        self.frame += 1;
        if self.edit_every == 0 || self.frame % self.edit_every != 0 {
            return None;
        }
        let size = self.map_size();
        let x = self.rng.gen_range(0.2..0.8) * size;
        let z = self.rng.gen_range(0.2..0.8) * size;
        let radius = self.rng.gen_range(3.0..10.0);
        if self.rng.gen_bool(0.6) {
            let depth = self.rng.gen_range(2.0..8.0);
            log::debug!("Crater at ({:.0}, {:.0}) r={:.1} depth={:.1}", x, z, radius, depth);
            self.terrain.deform_crater(x, z, radius, depth)
        } else {
            let height = self.rng.gen_range(2.0..6.0);
            log::debug!("Mound at ({:.0}, {:.0}) r={:.1} height={:.1}", x, z, radius, height);
            self.terrain.deform_mound(x, z, radius, height)
        }
    }
}

/// Totals over a demo run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemoStats {
    pub frames: u32,
    pub drawn: u32,
    pub edits: u32,
    pub coast_tiles: usize,
    pub coast_bytes: usize,
    pub wave_compositions: u32,
    pub reflections: u32,
    pub refractions: u32,
    pub program_builds: u32,
}

impl DemoStats {
    fn record(&mut self, report: &FrameReport) {
        self.frames += 1;
        self.drawn += report.surface_drawn as u32;
        self.coast_tiles += report.coast_tiles_recomputed;
        self.coast_bytes += report.coast_upload.bytes;
        self.wave_compositions += report.dynamic_waves_rendered as u32;
        self.reflections += report.reflection_rendered as u32;
        self.refractions += report.refraction_rendered as u32;
        self.program_builds += report.program_rebuilt as u32;
    }
}

/// Run `frames` frames: apply due terrain edits, move the camera and wind,
/// then let `render` record the water for the frame.
pub fn drive<F>(
    config: &DemoConfig,
    scene: &mut DemoScene,
    renderer: &mut WaterRenderer,
    mut render: F,
) -> anyhow::Result<DemoStats>
where
    F: FnMut(&mut WaterRenderer, &DemoScene, &ViewCamera, f32) -> water::error::Result<FrameReport>,
{
    let mut stats = DemoStats::default();
    for i in 0..config.frames {
        let time = i as f32 * config.frame_time;
        if let Some(rect) = scene.step_edits() {
            renderer.notify_height_map_changed(rect);
            stats.edits += 1;
        }
        renderer.set_wind(scene.wind(time));
        let camera = scene.camera(time);
        let report = render(renderer, scene, &camera, config.frame_time)?;
        stats.record(&report);
    }
    Ok(stats)
}

fn upload<G: GpuResources + ?Sized>(gpu: &mut G, label: &str, data: &TextureData) -> Result<TextureId, GpuError> {
    let texture = gpu.create_texture(&TextureDesc::new(label, data.width, data.height, TextureFormat::Rgba8Unorm))?;
    gpu.write_texture(texture, TexelRegion::new(0, 0, data.width, data.height), &data.to_bytes())?;
    Ok(texture)
}

/// Generate the water textures and upload them. The caller owns the result.
pub fn create_textures<G: GpuResources + ?Sized>(gpu: &mut G, seed: u64) -> Result<WaterTextures, GpuError> {
    let set = WaterTextureGenerator::new(seed).generate_all(&WaterTextureConfig::default());
    let normal = upload(gpu, "wave normals", &set.normal.texture)?;
    let foam = upload(gpu, "foam", &set.foam)?;
    let caustics = set
        .caustics
        .iter()
        .enumerate()
        .map(|(i, frame)| upload(gpu, &format!("caustic {}", i), frame))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(WaterTextures {
        normal: WaveTileSet {
            texture: normal,
            size: (set.normal.texture.width, set.normal.texture.height),
            tiles_x: set.normal.tiles_x,
            tiles_y: set.normal.tiles_y,
        },
        foam,
        caustics,
    })
}

pub fn release_textures<G: GpuResources + ?Sized>(gpu: &mut G, textures: &WaterTextures) {
    gpu.release_texture(textures.normal.texture);
    gpu.release_texture(textures.foam);
    for &caustic in &textures.caustics {
        gpu.release_texture(caustic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use water::{ScenePass, TraceGpu};

    fn small_config() -> DemoConfig {
        let mut config = DemoConfig {
            frames: 60,
            map_size: 64,
            edit_every: 10,
            ..DemoConfig::default()
        };
        config.water.coast_grid = (4, 4);
        config.water.coast_atlas_size = (128, 128);
        config.water.reflection_texture_size = 64;
        config
    }

    #[test]
    fn edits_reach_the_coast_atlas() {
        let config = small_config();
        let mut gpu = TraceGpu::new();
        let mut scene = DemoScene::new(&config);
        let textures = create_textures(&mut gpu, 3).unwrap();
        let mut renderer =
            WaterRenderer::new(&mut gpu, config.water.clone(), &scene.terrain, textures.clone(), (320, 180)).unwrap();

        let stats = drive(&config, &mut scene, &mut renderer, |renderer, scene, camera, dt| {
            let mut no_scene = |_: &mut TraceGpu, _: &ScenePass| {};
            renderer.render_frame(&mut gpu, &mut no_scene, &scene.terrain, camera, dt)
        })
        .unwrap();

        assert_eq!(stats.frames, 60);
        assert_eq!(stats.drawn, 60);
        assert!(stats.edits > 0);
        assert!(stats.coast_bytes > 0);
        assert!(stats.wave_compositions > 0);
        assert_eq!(stats.program_builds, 0);

        renderer.shutdown(&mut gpu);
        release_textures(&mut gpu, &textures);
        assert_eq!(gpu.live_resources(), 0);
    }

    #[test]
    fn edit_cadence_follows_the_config() {
        let mut config = small_config();
        config.edit_every = 0;
        let mut scene = DemoScene::new(&config);
        assert!((0..50).all(|_| scene.step_edits().is_none()));
    }

    #[test]
    fn camera_stays_above_the_water() {
        let config = small_config();
        let scene = DemoScene::new(&config);
        for t in [0.0, 10.0, 25.0] {
            assert!(scene.camera(t).eye.y > config.water.water_level);
        }
    }
}
