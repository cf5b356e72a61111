//! The seam between the water renderer and a graphics backend.
//!
//! The renderer only ever sees opaque handles. [`GpuResources`] covers
//! allocation and uploads; [`WaterGpu`] adds the per-frame commands. Two
//! backends implement them: [`trace::TraceGpu`], which records commands and
//! keeps texture memory on the CPU, and the wgpu backend in [`wgpu_backend`].

pub mod trace;
pub mod wgpu_backend;

use glam::Vec2;

use crate::config::DepthBits;
use crate::error::GpuError;
use crate::geometry::{WaterBounds, WaterVertex};
use crate::uniforms::{FrameUniforms, UniformMode, WaterParams};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

handle!(
    /// Texture owned by the backend.
    TextureId
);
handle!(
    /// Off-screen render target (colour texture plus optional depth).
    RenderTargetId
);
handle!(QueryId);
handle!(ProgramId);
handle!(MeshId);

/// Texel formats the renderer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Rgba16Float,
    /// Whatever the screen colour buffer uses, so scene pipelines can draw
    /// into targets of this format unchanged.
    ScreenColor,
    /// Whatever the screen depth buffer uses; required for depth copies.
    ScreenDepth,
    Depth(DepthBits),
}

impl TextureFormat {
    /// Bytes per texel for CPU-side uploads. Backend-defined formats report 0.
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba8Unorm => 4,
            Self::Rgba16Float => 8,
            Self::ScreenColor | Self::ScreenDepth | Self::Depth(_) => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureDesc {
    pub fn new(label: impl Into<String>, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            format,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub color_format: TextureFormat,
    pub depth: Option<DepthBits>,
}

/// Allocated off-screen target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub id: RenderTargetId,
    pub color: TextureId,
    pub depth: Option<TextureId>,
    pub width: u32,
    pub height: u32,
}

/// Sub-rectangle of a texture in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TexelRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn texels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Non-blocking occlusion query read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// Number of samples that passed the depth test.
    Ready(u64),
    /// Issued but the GPU has not finished yet.
    Pending,
    /// Never issued or not supported.
    Unavailable,
}

/// Water program build request. The backend appends its shader body to
/// `prelude`, which declares the parameter accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDesc {
    pub label: String,
    pub prelude: String,
    pub mode: UniformMode,
}

/// Source tile pair and drift offset for one output tile of the dynamic
/// wave texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveSlot {
    pub from_tile: u32,
    pub to_tile: u32,
    pub offset: Vec2,
}

/// One dynamic wave composition.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicWaveStep {
    /// Blend factor from `from_tile` to `to_tile`, in `[0, 1)`.
    pub phase: f32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub slots: Vec<WaveSlot>,
}

/// Textures bound for the final water draw. `None` slots are bound to a
/// neutral fallback by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterBindings {
    pub normal: TextureId,
    pub coast: Option<TextureId>,
    pub reflection: Option<TextureId>,
    pub refraction: Option<TextureId>,
    pub depth: Option<TextureId>,
    pub foam: TextureId,
    pub caustic: TextureId,
    pub wave_rand: Option<TextureId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterDraw {
    pub program: ProgramId,
    pub mesh: MeshId,
    pub frame: FrameUniforms,
    pub bindings: WaterBindings,
}

/// Resource management.
pub trait GpuResources {
    fn max_texture_size(&self) -> u32;

    fn supports_occlusion_queries(&self) -> bool;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError>;

    /// Replace `region` of `texture` with tightly packed rows from `data`.
    fn write_texture(&mut self, texture: TextureId, region: TexelRegion, data: &[u8]) -> Result<(), GpuError>;

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTarget, GpuError>;

    fn create_occlusion_query(&mut self) -> Result<QueryId, GpuError>;

    fn build_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, GpuError>;

    fn create_mesh(&mut self, vertices: &[WaterVertex], indices: &[u32]) -> Result<MeshId, GpuError>;

    fn release_texture(&mut self, texture: TextureId);

    /// Releases the target together with its colour and depth textures.
    fn release_render_target(&mut self, target: &RenderTarget);

    fn release_query(&mut self, query: QueryId);

    fn release_program(&mut self, program: ProgramId);

    fn release_mesh(&mut self, mesh: MeshId);
}

/// Commands recorded while rendering one frame.
pub trait WaterGpu: GpuResources {
    /// Result of the last query issued on `query`, without blocking.
    fn occlusion_result(&mut self, query: QueryId) -> QueryResult;

    /// Count the samples of `bounds` that pass the depth test against the
    /// current screen depth. Returns false when the query was not issued,
    /// e.g. while its previous result is still being read back.
    fn issue_occlusion_query(&mut self, query: QueryId, bounds: &WaterBounds, frame: &FrameUniforms) -> bool;

    /// Clear `target` and make it the destination of scene draws.
    fn begin_offscreen(&mut self, target: &RenderTarget, clear_color: [f32; 4]);

    fn end_offscreen(&mut self, target: &RenderTarget);

    /// Copy the screen colour and/or depth buffer into screen-sized textures.
    fn copy_screen(&mut self, color: Option<TextureId>, depth: Option<TextureId>);

    /// Separable blur of `target`'s colour, using `scratch` as the
    /// intermediate.
    fn blur(&mut self, target: &RenderTarget, scratch: &RenderTarget, base: f32, exponent: f32);

    fn render_dynamic_waves(&mut self, target: &RenderTarget, base: TextureId, step: &DynamicWaveStep);

    /// Write the runtime parameter array.
    fn set_water_params(&mut self, params: &WaterParams);

    fn draw_water(&mut self, draw: &WaterDraw);
}
