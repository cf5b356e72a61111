//! Terrain water rendering: reflection, refraction, shore waves driven by a
//! coastline distance atlas, and animated wave normals.

pub mod coast_atlas;
pub mod config;
pub mod dynamic_waves;
pub mod error;
pub mod geometry;
pub mod gpu;
pub mod passes;
pub mod pipeline;
pub mod state;
pub mod uniforms;

pub use coast_atlas::{CoastAtlas, CoastAtlasLayout, CoastAtlasRect, UploadStats};
pub use config::{DepthBits, MaterialConfig, ReflectionQuality, RefractionMode, WaterConfig};
pub use dynamic_waves::{DynamicWaveGenerator, WaveTileSet};
pub use error::{Diagnostic, Feature, GpuError, WaterError};
pub use gpu::trace::TraceGpu;
pub use gpu::wgpu_backend::{ScreenBuffers, WgpuFrame, WgpuWater};
pub use gpu::{GpuResources, WaterGpu};
pub use passes::{PassKind, SceneContent, SceneDrawer, ScenePass, ViewCamera};
pub use pipeline::{FrameReport, WaterRenderer};
pub use state::WaterTextures;
pub use uniforms::{UniformBinder, UniformMode, WaterParam, WaterParams};
