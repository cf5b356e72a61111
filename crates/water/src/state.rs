//! Everything the water renderer owns between frames.

use engine_core::{FrameClock, HeightField};
use glam::{Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::coast_atlas::{CoastAtlas, CoastAtlasLayout};
use crate::config::WaterConfig;
use crate::dynamic_waves::{DynamicWaveGenerator, WaveTileSet};
use crate::error::{Diagnostic, Feature, GpuError, Result, WaterError};
use crate::geometry::{build_surface_mesh, WaterBounds};
use crate::gpu::{GpuResources, MeshId, QueryId, QueryResult, TexelRegion, TextureDesc, TextureFormat, TextureId, WaterGpu};
use crate::passes::{ReflectionPass, RefractionPass, WaterPass};
use crate::uniforms::{UniformBinder, UniformMode};

/// Edge length of the shore wave random texture.
pub const WAVE_RAND_SIZE: u32 = 64;

/// Textures the caller owns and the water surface samples.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterTextures {
    pub normal: WaveTileSet,
    pub foam: TextureId,
    /// Animation frames, cycled one per rendered frame.
    pub caustics: Vec<TextureId>,
}

/// Query-ahead visibility tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OcclusionState {
    pub query: Option<QueryId>,
    pub last_result: QueryResult,
    pub visible_last_frame: bool,
}

impl OcclusionState {
    pub fn new(query: Option<QueryId>) -> Self {
        Self {
            query,
            last_result: QueryResult::Unavailable,
            visible_last_frame: true,
        }
    }

    /// Read the previous frame's result without blocking. Only a ready
    /// result of zero samples counts as hidden.
    pub fn poll<G: WaterGpu + ?Sized>(&mut self, gpu: &mut G) -> bool {
        let Some(query) = self.query else {
            return true;
        };
        self.last_result = gpu.occlusion_result(query);
        self.visible_last_frame = self.last_result != QueryResult::Ready(0);
        self.visible_last_frame
    }
}

/// Wind and sun.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub wind: Vec3,
    /// Horizontal wind direction, zero in calm air.
    pub wind_dir: Vec2,
    pub sun_direction: Vec3,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            wind: Vec3::ZERO,
            wind_dir: Vec2::ZERO,
            sun_direction: Vec3::new(0.4, 1.0, 0.3).normalize(),
        }
    }
}

impl Environment {
    pub fn set_wind(&mut self, wind: Vec3) {
        if !wind.is_finite() {
            log::warn!("Ignoring non-finite wind {:?}", wind);
            return;
        }
        self.wind = wind;
        self.wind_dir = Vec2::new(wind.x, wind.z).normalize_or_zero();
    }

    pub fn set_sun_direction(&mut self, dir: Vec3) {
        self.sun_direction = dir.normalize_or(Vec3::Y);
    }
}

/// Configuration, GPU handles and per-frame state, owned by one renderer.
#[derive(Debug)]
pub struct RenderState {
    pub config: WaterConfig,
    pub map_size: (u32, u32),
    pub screen: (u32, u32),
    pub reflection: ReflectionPass,
    pub refraction: RefractionPass,
    pub coast: Option<CoastAtlas>,
    pub waves: DynamicWaveGenerator,
    pub binder: UniformBinder,
    pub textures: WaterTextures,
    pub wave_rand: Option<TextureId>,
    pub mesh: MeshId,
    pub bounds: WaterBounds,
    pub occlusion: OcclusionState,
    pub env: Environment,
    pub clock: FrameClock,
    pub diagnostics: Vec<Diagnostic>,
}

impl RenderState {
    /// Allocate every resource. Configuration problems are errors; resources
    /// that fail to allocate switch their feature off and add a diagnostic.
    pub fn new<G, H>(
        gpu: &mut G,
        config: WaterConfig,
        heights: &H,
        textures: WaterTextures,
        screen: (u32, u32),
    ) -> Result<Self>
    where
        G: GpuResources + ?Sized,
        H: HeightField + ?Sized,
    {
        config.validate()?;
        if textures.caustics.is_empty() {
            return Err(WaterError::InvalidConfig("at least one caustic frame is required".into()));
        }
        let map_size = heights.size();
        if map_size.0 == 0 || map_size.1 == 0 {
            return Err(WaterError::InvalidConfig(format!(
                "height field is empty ({}x{})",
                map_size.0, map_size.1
            )));
        }
        let mut diagnostics = Vec::new();

        let coast = if config.shore_waves {
            let layout = CoastAtlasLayout {
                grid: config.coast_grid,
                atlas_size: config.coast_atlas_size,
                map_size,
                max_distance: config.coast_max_distance,
                water_level: config.water_level,
            };
            let mut atlas = CoastAtlas::new(layout, gpu.max_texture_size())?;
            atlas.recompute(heights, true);
            match atlas.upload(gpu) {
                Ok(_) => Some(atlas),
                Err(err) => {
                    diagnostics.push(Diagnostic::degraded(Feature::ShoreWaves, &err));
                    atlas.release(gpu);
                    None
                }
            }
        } else {
            None
        };

        let reflection = ReflectionPass::create(gpu, &config, &mut diagnostics);
        let refraction = RefractionPass::create(
            gpu,
            config.refraction,
            config.use_depth_copy,
            config.depth_bits,
            screen,
            &mut diagnostics,
        );

        let mut waves = DynamicWaveGenerator::new(
            config.dynamic_waves,
            config.dynamic_wave_interval,
            config.dynamic_wave_seed,
        );
        if let Err(err) = waves.initialize(gpu, textures.normal) {
            diagnostics.push(Diagnostic::degraded(Feature::DynamicWaves, &err));
            waves.disable();
        }

        let query = if gpu.supports_occlusion_queries() {
            match gpu.create_occlusion_query() {
                Ok(query) => Some(query),
                Err(err) => {
                    diagnostics.push(Diagnostic::degraded(Feature::OcclusionQuery, &err));
                    None
                }
            }
        } else {
            log::info!("Occlusion queries unsupported, water is always drawn");
            None
        };

        let wave_rand = match create_wave_rand(gpu, config.dynamic_wave_seed) {
            Ok(texture) => Some(texture),
            Err(err) => {
                diagnostics.push(Diagnostic::degraded(Feature::ShoreWaveRandom, &err));
                None
            }
        };
        let (vertices, indices) = build_surface_mesh(map_size, config.water_level, config.endless_ocean);
        let mesh = match gpu.create_mesh(&vertices, &indices) {
            Ok(mesh) => mesh,
            Err(err) => {
                // The surface is required; hand back everything built so far.
                let mut reflection = reflection;
                let mut refraction = refraction;
                let mut coast = coast;
                reflection.release(gpu);
                refraction.release(gpu);
                if let Some(coast) = coast.as_mut() {
                    coast.release(gpu);
                }
                waves.release(gpu);
                if let Some(query) = query {
                    gpu.release_query(query);
                }
                if let Some(texture) = wave_rand {
                    gpu.release_texture(texture);
                }
                return Err(err.into());
            }
        };
        let bounds = WaterBounds::new(map_size, config.water_level, config.endless_ocean);

        let mode = if config.use_runtime_uniforms {
            UniformMode::Runtime
        } else {
            UniformMode::Baked
        };

        log::info!(
            "Water renderer ready: {}x{} map, reflection {}, refraction {:?}, shore waves {}, dynamic waves {}, {:?} uniforms",
            map_size.0,
            map_size.1,
            reflection.is_enabled(),
            refraction.mode(),
            coast.is_some(),
            waves.is_enabled(),
            mode
        );

        Ok(Self {
            config,
            map_size,
            screen,
            reflection,
            refraction,
            coast,
            waves,
            binder: UniformBinder::new(mode),
            textures,
            wave_rand,
            mesh,
            bounds,
            occlusion: OcclusionState::new(query),
            env: Environment::default(),
            clock: FrameClock::new(),
            diagnostics,
        })
    }

    /// Reallocate screen-sized resources.
    pub fn resize<G: GpuResources + ?Sized>(&mut self, gpu: &mut G, width: u32, height: u32) {
        if (width, height) == self.screen {
            return;
        }
        self.screen = (width, height);
        self.refraction.release(gpu);
        self.refraction = RefractionPass::create(
            gpu,
            self.config.refraction,
            self.config.use_depth_copy,
            self.config.depth_bits,
            self.screen,
            &mut self.diagnostics,
        );
        log::debug!("Water resized to {}x{}", width, height);
    }

    /// Release every resource this state allocated.
    pub fn release<G: GpuResources + ?Sized>(&mut self, gpu: &mut G) {
        self.reflection.release(gpu);
        self.refraction.release(gpu);
        if let Some(coast) = self.coast.as_mut() {
            coast.release(gpu);
        }
        self.coast = None;
        self.waves.release(gpu);
        self.binder.release(gpu);
        if let Some(query) = self.occlusion.query.take() {
            gpu.release_query(query);
        }
        if let Some(texture) = self.wave_rand.take() {
            gpu.release_texture(texture);
        }
        gpu.release_mesh(self.mesh);
    }
}

/// Per-texel random values the shore waves use to break up repetition.
fn create_wave_rand<G: GpuResources + ?Sized>(gpu: &mut G, seed: u64) -> Result<TextureId, GpuError> {
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed_0f_5a7e);
    let mut data = vec![0u8; (WAVE_RAND_SIZE * WAVE_RAND_SIZE * 4) as usize];
    rng.fill(data.as_mut_slice());
    let texture = gpu.create_texture(&TextureDesc::new(
        "water wave random",
        WAVE_RAND_SIZE,
        WAVE_RAND_SIZE,
        TextureFormat::Rgba8Unorm,
    ))?;
    if let Err(err) = gpu.write_texture(texture, TexelRegion::new(0, 0, WAVE_RAND_SIZE, WAVE_RAND_SIZE), &data) {
        gpu.release_texture(texture);
        return Err(err);
    }
    Ok(texture)
}
