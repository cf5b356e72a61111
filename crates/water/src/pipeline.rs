//! Per-frame orchestration of the water passes.
//!
//! Each frame runs, in order: occlusion test, coast atlas recompute and
//! upload, dynamic wave update, reflection pass, refraction pass and the
//! final surface draw. Visibility is decided from the previous frame's
//! occlusion query so the CPU never waits on the GPU; a frame judged hidden
//! only issues the next query.

use engine_core::{HeightField, IRect};
use glam::{Vec3, Vec4};

use crate::coast_atlas::{CoastAtlas, UploadStats};
use crate::config::WaterConfig;
use crate::error::{Diagnostic, Result};
use crate::gpu::{GpuResources, WaterBindings, WaterDraw, WaterGpu};
use crate::passes::{PassContext, SceneDrawer, ViewCamera, WaterPass};
use crate::state::{RenderState, WaterTextures};
use crate::uniforms::{FeatureToggles, FrameUniforms, ParamInputs, UniformMode, WaterParams};

/// What one call to [`WaterRenderer::render_frame`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    /// Whether the previous frame's query let this frame render.
    pub visible: bool,
    pub occlusion_query_issued: bool,
    pub coast_tiles_recomputed: usize,
    pub coast_upload: UploadStats,
    pub dynamic_waves_rendered: bool,
    pub reflection_rendered: bool,
    pub refraction_rendered: bool,
    pub program_rebuilt: bool,
    pub surface_drawn: bool,
}

/// Bump-mapped water surface renderer.
#[derive(Debug)]
pub struct WaterRenderer {
    state: RenderState,
}

impl WaterRenderer {
    /// Build the renderer over `heights`. Fails on inconsistent configuration;
    /// passes whose resources cannot be allocated are disabled and reported
    /// through [`WaterRenderer::diagnostics`].
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
        let mut state = RenderState::new(gpu, config, heights, textures, screen)?;
        let params = resolve_params(&state);
        if let Err(err) = state.binder.prepare(gpu, &params) {
            state.release(gpu);
            return Err(err.into());
        }
        Ok(Self { state })
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn config(&self) -> &WaterConfig {
        &self.state.config
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.state.diagnostics
    }

    pub fn coast_atlas(&self) -> Option<&CoastAtlas> {
        self.state.coast.as_ref()
    }

    /// Queue a changed height-map region. Picked up by the next rendered frame.
    pub fn notify_height_map_changed(&mut self, rect: IRect) {
        if let Some(coast) = self.state.coast.as_mut() {
            coast.notify_region_changed(rect);
        }
    }

    pub fn set_wind(&mut self, wind: Vec3) {
        self.state.env.set_wind(wind);
    }

    pub fn set_sun_direction(&mut self, dir: Vec3) {
        self.state.env.set_sun_direction(dir);
    }

    /// Switch between baked and runtime parameters. Rebuilds the program on
    /// the next rendered frame.
    pub fn set_uniform_mode(&mut self, mode: UniformMode) {
        self.state.binder.set_mode(mode);
    }

    pub fn resize<G: GpuResources + ?Sized>(&mut self, gpu: &mut G, width: u32, height: u32) {
        self.state.resize(gpu, width, height);
    }

    /// Render the water for one frame, after the scene has been drawn to the
    /// screen. `dt` is the time since the previous frame in seconds.
    pub fn render_frame<G, S, H>(
        &mut self,
        gpu: &mut G,
        scene: &mut S,
        heights: &H,
        camera: &ViewCamera,
        dt: f32,
    ) -> Result<FrameReport>
    where
        G: WaterGpu + ?Sized,
        S: SceneDrawer<G> + ?Sized,
        H: HeightField + ?Sized,
    {
        let state = &mut self.state;
        state.clock.advance(dt);
        let frame = frame_uniforms(state, camera);
        let mut report = FrameReport {
            frame: state.clock.frame_count(),
            ..FrameReport::default()
        };

        // Occlusion test
        report.visible = state.occlusion.poll(gpu);
        if let Some(query) = state.occlusion.query {
            report.occlusion_query_issued = gpu.issue_occlusion_query(query, &state.bounds, &frame);
        }
        if !report.visible {
            log::trace!("Water frame {} skipped: hidden last frame", report.frame);
            return Ok(report);
        }

        // Coast recompute and upload
        if let Some(coast) = state.coast.as_mut() {
            if coast.pending_edits() > 0 {
                report.coast_tiles_recomputed = coast.recompute(heights, false).len();
            }
            report.coast_upload = coast.upload(gpu)?;
        }

        // Dynamic waves
        report.dynamic_waves_rendered = state.waves.update(gpu, dt, state.env.wind_dir);

        // Reflection and refraction
        let mut ctx = PassContext {
            gpu: &mut *gpu,
            scene,
            camera,
            water_level: state.config.water_level,
            blur_base: state.config.material.blur_base,
            blur_exponent: state.config.material.blur_exponent,
        };
        let reflection = state.reflection.run_pass(&mut ctx);
        let refraction = state.refraction.run_pass(&mut ctx);
        report.reflection_rendered = reflection.color.is_some();
        report.refraction_rendered = refraction.color.is_some();

        // Final draw
        let params = resolve_params(state);
        let bound = state.binder.bind(gpu, &params)?;
        report.program_rebuilt = bound.rebuilt;

        let textures = &state.textures;
        let caustic = textures.caustics[(report.frame as usize) % textures.caustics.len()];
        let normal = state.waves.output().unwrap_or(textures.normal.texture);
        gpu.draw_water(&WaterDraw {
            program: bound.program,
            mesh: state.mesh,
            frame,
            bindings: WaterBindings {
                normal,
                coast: state.coast.as_ref().and_then(|c| c.texture()),
                reflection: reflection.color,
                refraction: refraction.color,
                depth: refraction.depth,
                foam: textures.foam,
                caustic,
                wave_rand: state.wave_rand,
            },
        });
        report.surface_drawn = true;

        log::trace!("Water frame {}: {:?}", report.frame, report);
        Ok(report)
    }

    /// Release every GPU resource the renderer allocated.
    pub fn shutdown<G: GpuResources + ?Sized>(mut self, gpu: &mut G) {
        self.state.release(gpu);
        log::info!("Water renderer shut down");
    }
}

/// Feature toggles as the passes actually run, after any degradation.
fn feature_toggles(state: &RenderState) -> FeatureToggles {
    FeatureToggles {
        reflection: state.reflection.is_enabled(),
        refraction: u8::from(state.refraction.mode()),
        shore_waves: state.coast.is_some(),
        depth_blend: state.refraction.depth_blend(),
    }
}

fn resolve_params(state: &RenderState) -> WaterParams {
    let normal = &state.textures.normal;
    WaterParams::resolve(&ParamInputs {
        material: &state.config.material,
        map_size: state.map_size,
        water_level: state.config.water_level,
        sun_direction: state.env.sun_direction,
        normal_tiles: (normal.tiles_x, normal.tiles_y),
        coast_tex_gen: state.coast.as_ref().map_or(Vec4::ZERO, |c| c.tex_gen()),
        toggles: feature_toggles(state),
    })
}

fn frame_uniforms(state: &RenderState, camera: &ViewCamera) -> FrameUniforms {
    let (w, h) = (state.screen.0.max(1) as f32, state.screen.1.max(1) as f32);
    let wind = state.env.wind;
    let frame = state.clock.frame_count();
    let caustic = frame % state.textures.caustics.len().max(1) as u64;
    FrameUniforms {
        view_proj: camera.view_proj().to_cols_array_2d(),
        eye_pos: camera.eye.extend(state.clock.elapsed_seconds()).to_array(),
        screen: [w, h, 1.0 / w, 1.0 / h],
        wind: wind.extend(wind.length()).to_array(),
        frame: [frame as f32, caustic as f32, state.waves.phase(), 0.0],
    }
}
