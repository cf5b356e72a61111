//! Reflection and refraction pass strategies.
//!
//! Each pass is chosen once from the configuration. A pass whose target
//! could not be allocated is constructed as `Disabled` and costs nothing per
//! frame.

use glam::{Mat4, Vec3, Vec4};

use crate::config::{DepthBits, ReflectionQuality, RefractionMode, WaterConfig};
use crate::error::{Diagnostic, Feature};
use crate::gpu::{GpuResources, RenderTarget, RenderTargetDesc, TextureDesc, TextureFormat, TextureId, WaterGpu};

/// Sky colour the reflection target is cleared to.
pub const REFLECTION_CLEAR: [f32; 4] = [0.5, 0.6, 0.7, 1.0];
/// Refraction background where no terrain is drawn.
pub const REFRACTION_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Reflection,
    Refraction,
}

/// What the scene drawer should draw into the current target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneContent {
    pub terrain: bool,
    pub models: bool,
}

/// Request handed to the [`SceneDrawer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenePass {
    pub kind: PassKind,
    pub content: SceneContent,
    pub view_proj: Mat4,
    pub eye: Vec3,
    /// Keep geometry where `dot(plane.xyz, p) + plane.w >= 0`.
    pub clip_plane: Vec4,
}

/// Draws scene geometry for the off-screen passes. The renderer itself never
/// knows how terrain or models are drawn.
pub trait SceneDrawer<G: ?Sized> {
    fn draw(&mut self, gpu: &mut G, pass: &ScenePass);
}

impl<G: ?Sized, F: FnMut(&mut G, &ScenePass)> SceneDrawer<G> for F {
    fn draw(&mut self, gpu: &mut G, pass: &ScenePass) {
        self(gpu, pass)
    }
}

/// Camera of the main view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewCamera {
    pub view: Mat4,
    pub proj: Mat4,
    pub eye: Vec3,
}

impl ViewCamera {
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32) -> Self {
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            proj: Mat4::perspective_rh(fov_y, aspect, 0.5, 10_000.0),
            eye,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    /// The same camera seen in a mirror at height `level`.
    pub fn mirrored(&self, level: f32) -> Self {
        let mirror = mirror_matrix(level);
        Self {
            view: self.view * mirror,
            proj: self.proj,
            eye: Vec3::new(self.eye.x, 2.0 * level - self.eye.y, self.eye.z),
        }
    }
}

/// Reflection across the horizontal plane `y = level`.
pub fn mirror_matrix(level: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, level, 0.0))
        * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        * Mat4::from_translation(Vec3::new(0.0, -level, 0.0))
}

/// Everything a pass needs for one frame.
pub struct PassContext<'a, G: ?Sized, S: ?Sized> {
    pub gpu: &'a mut G,
    pub scene: &'a mut S,
    pub camera: &'a ViewCamera,
    pub water_level: f32,
    pub blur_base: f32,
    pub blur_exponent: f32,
}

/// Textures a pass produced this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutput {
    pub color: Option<TextureId>,
    pub depth: Option<TextureId>,
}

pub trait WaterPass {
    fn is_enabled(&self) -> bool;

    fn run_pass<G, S>(&self, ctx: &mut PassContext<'_, G, S>) -> PassOutput
    where
        G: WaterGpu + ?Sized,
        S: SceneDrawer<G> + ?Sized;

    fn release<G: GpuResources + ?Sized>(&mut self, gpu: &mut G);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReflectionPass {
    Disabled,
    Mirrored {
        content: SceneContent,
        target: RenderTarget,
        /// Intermediate for the separable blur, when blurring.
        blur: Option<RenderTarget>,
    },
}

impl ReflectionPass {
    pub fn create<G: GpuResources + ?Sized>(gpu: &mut G, config: &WaterConfig, diagnostics: &mut Vec<Diagnostic>) -> Self {
        let content = match config.reflection {
            ReflectionQuality::Off => return Self::Disabled,
            ReflectionQuality::TerrainOnly => SceneContent {
                terrain: true,
                models: false,
            },
            ReflectionQuality::Full => SceneContent {
                terrain: true,
                models: true,
            },
        };
        let size = config.reflection_texture_size;
        let desc = RenderTargetDesc {
            label: "water reflection".into(),
            width: size,
            height: size,
            color_format: TextureFormat::ScreenColor,
            depth: Some(config.depth_bits),
        };
        let target = match gpu.create_render_target(&desc) {
            Ok(target) => target,
            Err(err) => {
                diagnostics.push(Diagnostic::degraded(Feature::Reflection, &err));
                return Self::Disabled;
            }
        };

        let blur = if config.blur_reflection {
            let desc = RenderTargetDesc {
                label: "water reflection blur".into(),
                depth: None,
                ..desc
            };
            match gpu.create_render_target(&desc) {
                Ok(scratch) => Some(scratch),
                Err(err) => {
                    diagnostics.push(Diagnostic::degraded(Feature::ReflectionBlur, &err));
                    None
                }
            }
        } else {
            None
        };

        Self::Mirrored { content, target, blur }
    }

    pub fn target(&self) -> Option<&RenderTarget> {
        match self {
            Self::Disabled => None,
            Self::Mirrored { target, .. } => Some(target),
        }
    }
}

impl WaterPass for ReflectionPass {
    fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    fn run_pass<G, S>(&self, ctx: &mut PassContext<'_, G, S>) -> PassOutput
    where
        G: WaterGpu + ?Sized,
        S: SceneDrawer<G> + ?Sized,
    {
        let Self::Mirrored { content, target, blur } = self else {
            return PassOutput::default();
        };
        let mirrored = ctx.camera.mirrored(ctx.water_level);
        ctx.gpu.begin_offscreen(target, REFLECTION_CLEAR);
        ctx.scene.draw(
            ctx.gpu,
            &ScenePass {
                kind: PassKind::Reflection,
                content: *content,
                view_proj: mirrored.view_proj(),
                eye: mirrored.eye,
                clip_plane: Vec4::new(0.0, 1.0, 0.0, -ctx.water_level),
            },
        );
        ctx.gpu.end_offscreen(target);
        if let Some(scratch) = blur {
            ctx.gpu.blur(target, scratch, ctx.blur_base, ctx.blur_exponent);
        }
        PassOutput {
            color: Some(target.color),
            depth: None,
        }
    }

    fn release<G: GpuResources + ?Sized>(&mut self, gpu: &mut G) {
        if let Self::Mirrored { target, blur, .. } = std::mem::replace(self, Self::Disabled) {
            gpu.release_render_target(&target);
            if let Some(scratch) = blur {
                gpu.release_render_target(&scratch);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefractionPass {
    Disabled,
    /// Copy of the finished screen, and of its depth when requested.
    ScreenCopy {
        color: TextureId,
        depth: Option<TextureId>,
    },
    /// Separate render of everything below the water plane.
    Dedicated {
        target: RenderTarget,
        /// Whether the target's depth is sampled for the depth blend.
        sample_depth: bool,
    },
}

impl RefractionPass {
    /// Allocate screen-sized resources for `mode`. Falls back to `Disabled`
    /// when the colour resource cannot be allocated, and drops only the depth
    /// copy when that alone fails.
    pub fn create<G: GpuResources + ?Sized>(
        gpu: &mut G,
        mode: RefractionMode,
        use_depth_copy: bool,
        depth_bits: DepthBits,
        screen: (u32, u32),
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Self {
        let (width, height) = screen;
        match mode {
            RefractionMode::Off => Self::Disabled,
            RefractionMode::ScreenCopy => {
                let color =
                    match gpu.create_texture(&TextureDesc::new("water refraction copy", width, height, TextureFormat::ScreenColor)) {
                        Ok(color) => color,
                        Err(err) => {
                            diagnostics.push(Diagnostic::degraded(Feature::Refraction, &err));
                            return Self::Disabled;
                        }
                    };
                let depth = if use_depth_copy {
                    match gpu.create_texture(&TextureDesc::new("water depth copy", width, height, TextureFormat::ScreenDepth)) {
                        Ok(depth) => Some(depth),
                        Err(err) => {
                            diagnostics.push(Diagnostic::degraded(Feature::DepthCopy, &err));
                            None
                        }
                    }
                } else {
                    None
                };
                Self::ScreenCopy { color, depth }
            }
            RefractionMode::Dedicated => {
                let desc = RenderTargetDesc {
                    label: "water refraction".into(),
                    width,
                    height,
                    color_format: TextureFormat::ScreenColor,
                    depth: Some(depth_bits),
                };
                match gpu.create_render_target(&desc) {
                    Ok(target) => Self::Dedicated {
                        target,
                        sample_depth: use_depth_copy,
                    },
                    Err(err) => {
                        diagnostics.push(Diagnostic::degraded(Feature::Refraction, &err));
                        Self::Disabled
                    }
                }
            }
        }
    }

    /// Refraction mode actually in effect.
    pub fn mode(&self) -> RefractionMode {
        match self {
            Self::Disabled => RefractionMode::Off,
            Self::ScreenCopy { .. } => RefractionMode::ScreenCopy,
            Self::Dedicated { .. } => RefractionMode::Dedicated,
        }
    }

    /// Deep/shallow interpolation needs a dedicated render with depth.
    pub fn depth_blend(&self) -> bool {
        matches!(self, Self::Dedicated { sample_depth: true, .. })
    }
}

impl WaterPass for RefractionPass {
    fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    fn run_pass<G, S>(&self, ctx: &mut PassContext<'_, G, S>) -> PassOutput
    where
        G: WaterGpu + ?Sized,
        S: SceneDrawer<G> + ?Sized,
    {
        match self {
            Self::Disabled => PassOutput::default(),
            Self::ScreenCopy { color, depth } => {
                ctx.gpu.copy_screen(Some(*color), *depth);
                PassOutput {
                    color: Some(*color),
                    depth: *depth,
                }
            }
            Self::Dedicated { target, sample_depth } => {
                ctx.gpu.begin_offscreen(target, REFRACTION_CLEAR);
                ctx.scene.draw(
                    ctx.gpu,
                    &ScenePass {
                        kind: PassKind::Refraction,
                        content: SceneContent {
                            terrain: true,
                            models: true,
                        },
                        view_proj: ctx.camera.view_proj(),
                        eye: ctx.camera.eye,
                        clip_plane: Vec4::new(0.0, -1.0, 0.0, ctx.water_level),
                    },
                );
                ctx.gpu.end_offscreen(target);
                PassOutput {
                    color: Some(target.color),
                    depth: if *sample_depth { target.depth } else { None },
                }
            }
        }
    }

    fn release<G: GpuResources + ?Sized>(&mut self, gpu: &mut G) {
        match std::mem::replace(self, Self::Disabled) {
            Self::Disabled => {}
            Self::ScreenCopy { color, depth } => {
                gpu.release_texture(color);
                if let Some(depth) = depth {
                    gpu.release_texture(depth);
                }
            }
            Self::Dedicated { target, .. } => gpu.release_render_target(&target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::trace::{GpuCommand, TraceGpu};

    fn run<P: WaterPass>(pass: &P, gpu: &mut TraceGpu, drawn: &mut Vec<ScenePass>) -> PassOutput {
        let camera = ViewCamera::look_at(Vec3::new(0.0, 50.0, -80.0), Vec3::ZERO, 1.0, 1.5);
        let mut scene = |_: &mut TraceGpu, pass: &ScenePass| drawn.push(*pass);
        let mut ctx = PassContext {
            gpu,
            scene: &mut scene,
            camera: &camera,
            water_level: 2.0,
            blur_base: 2.0,
            blur_exponent: 1.5,
        };
        pass.run_pass(&mut ctx)
    }

    #[test]
    fn reflection_off_allocates_nothing() {
        let mut gpu = TraceGpu::new();
        let mut diagnostics = Vec::new();
        let config = WaterConfig {
            reflection: ReflectionQuality::Off,
            ..WaterConfig::default()
        };
        let pass = ReflectionPass::create(&mut gpu, &config, &mut diagnostics);
        assert_eq!(pass, ReflectionPass::Disabled);
        assert_eq!(gpu.live_resources(), 0);
        assert!(diagnostics.is_empty());

        let mut drawn = Vec::new();
        assert_eq!(run(&pass, &mut gpu, &mut drawn), PassOutput::default());
        assert!(drawn.is_empty());
        assert!(gpu.commands().is_empty());
    }

    #[test]
    fn reflection_quality_selects_scene_content() {
        for (quality, models) in [(ReflectionQuality::TerrainOnly, false), (ReflectionQuality::Full, true)] {
            let mut gpu = TraceGpu::new();
            let config = WaterConfig {
                reflection: quality,
                ..WaterConfig::default()
            };
            let pass = ReflectionPass::create(&mut gpu, &config, &mut Vec::new());
            let mut drawn = Vec::new();
            let out = run(&pass, &mut gpu, &mut drawn);
            assert_eq!(out.color, pass.target().map(|t| t.color));
            assert_eq!(drawn.len(), 1);
            assert_eq!(drawn[0].kind, PassKind::Reflection);
            assert!(drawn[0].content.terrain);
            assert_eq!(drawn[0].content.models, models);
            assert_eq!(drawn[0].clip_plane, Vec4::new(0.0, 1.0, 0.0, -2.0));
        }
    }

    #[test]
    fn blur_failure_keeps_the_reflection() {
        let mut gpu = TraceGpu::new();
        gpu.fail_allocations_matching("blur");
        let config = WaterConfig {
            blur_reflection: true,
            ..WaterConfig::default()
        };
        let mut diagnostics = Vec::new();
        let pass = ReflectionPass::create(&mut gpu, &config, &mut diagnostics);
        assert!(pass.is_enabled());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].feature, Feature::ReflectionBlur);

        run(&pass, &mut gpu, &mut Vec::new());
        assert!(!gpu.commands().iter().any(|c| matches!(c, GpuCommand::Blur { .. })));
    }

    #[test]
    fn reflection_allocation_failure_degrades() {
        let mut gpu = TraceGpu::new().with_max_texture_size(256);
        let config = WaterConfig {
            reflection_texture_size: 1024,
            ..WaterConfig::default()
        };
        let mut diagnostics = Vec::new();
        let pass = ReflectionPass::create(&mut gpu, &config, &mut diagnostics);
        assert_eq!(pass, ReflectionPass::Disabled);
        assert_eq!(diagnostics[0].feature, Feature::Reflection);
    }

    #[test]
    fn mirrored_camera_reflects_across_the_plane() {
        let camera = ViewCamera::look_at(Vec3::new(3.0, 10.0, 4.0), Vec3::ZERO, 1.0, 1.0);
        let mirrored = camera.mirrored(2.0);
        assert_eq!(mirrored.eye, Vec3::new(3.0, -6.0, 4.0));
        let p = mirror_matrix(2.0).transform_point3(Vec3::new(1.0, 5.0, -1.0));
        assert!((p - Vec3::new(1.0, -1.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn screen_copy_refraction_copies_color_and_depth() {
        let mut gpu = TraceGpu::new();
        let pass = RefractionPass::create(&mut gpu, RefractionMode::ScreenCopy, true, DepthBits::D24, (320, 200), &mut Vec::new());
        assert!(!pass.depth_blend());
        gpu.take_commands();
        let mut drawn = Vec::new();
        let out = run(&pass, &mut gpu, &mut drawn);
        assert!(out.color.is_some() && out.depth.is_some());
        assert!(drawn.is_empty());
        assert_eq!(gpu.commands(), &[GpuCommand::CopyScreen { color: true, depth: true }]);
    }

    #[test]
    fn depth_blend_only_with_dedicated_depth() {
        let mut gpu = TraceGpu::new();
        let dedicated = RefractionPass::create(&mut gpu, RefractionMode::Dedicated, true, DepthBits::D24, (64, 64), &mut Vec::new());
        let no_depth = RefractionPass::create(&mut gpu, RefractionMode::Dedicated, false, DepthBits::D24, (64, 64), &mut Vec::new());
        assert!(dedicated.depth_blend());
        assert!(!no_depth.depth_blend());

        let mut drawn = Vec::new();
        let out = run(&dedicated, &mut gpu, &mut drawn);
        assert!(out.depth.is_some());
        assert_eq!(drawn[0].kind, PassKind::Refraction);
        assert_eq!(drawn[0].clip_plane, Vec4::new(0.0, -1.0, 0.0, 2.0));
    }

    #[test]
    fn release_frees_everything() {
        let mut gpu = TraceGpu::new();
        let config = WaterConfig {
            reflection: ReflectionQuality::Full,
            blur_reflection: true,
            ..WaterConfig::default()
        };
        let mut reflection = ReflectionPass::create(&mut gpu, &config, &mut Vec::new());
        let mut copy = RefractionPass::create(&mut gpu, RefractionMode::ScreenCopy, true, DepthBits::D16, (32, 32), &mut Vec::new());
        let mut dedicated = RefractionPass::create(&mut gpu, RefractionMode::Dedicated, true, DepthBits::D32, (32, 32), &mut Vec::new());
        assert!(gpu.live_resources() > 0);
        reflection.release(&mut gpu);
        copy.release(&mut gpu);
        dedicated.release(&mut gpu);
        assert_eq!(gpu.live_resources(), 0);
        assert!(!reflection.is_enabled() && !copy.is_enabled() && !dedicated.is_enabled());
    }
}
