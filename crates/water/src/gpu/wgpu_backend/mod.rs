//! wgpu implementation of the GPU seam.
//!
//! [`WgpuWater`] owns the device and every resource the renderer allocates.
//! Per-frame commands go through a [`WgpuFrame`], which borrows the water
//! backend together with the frame's command encoder and screen buffers.
//! After submitting the encoder call [`WgpuWater::finish_frame`] so pending
//! occlusion results start mapping.

mod frame;
pub mod pipelines;

pub use frame::{ScreenBuffers, WgpuFrame};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::config::DepthBits;
use crate::error::GpuError;
use crate::geometry::WaterVertex;
use crate::uniforms::{FrameUniforms, WaterParams};

use super::{
    GpuResources, MeshId, ProgramDesc, ProgramId, QueryId, QueryResult, RenderTarget, RenderTargetDesc,
    RenderTargetId, TexelRegion, TextureDesc, TextureFormat, TextureId,
};
use pipelines::{OcclusionUniform, WaveUniform};

/// Format of the screen depth buffer and of depth copies.
pub const SCREEN_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const QUERY_IDLE: u8 = 0;
const QUERY_RESOLVED: u8 = 1;
const QUERY_MAPPING: u8 = 2;
const QUERY_READY: u8 = 3;
const QUERY_FAILED: u8 = 4;

pub(crate) struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
}

struct TargetEntry {
    color: TextureId,
    depth: Option<TextureId>,
}

pub(crate) struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_indices: u32,
}

pub(crate) struct GpuQuery {
    pub set: wgpu::QuerySet,
    pub resolve: wgpu::Buffer,
    pub readback: wgpu::Buffer,
    pub status: Arc<AtomicU8>,
    pub issued: bool,
}

/// wgpu device, queue and the water renderer's resources.
pub struct WgpuWater {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) color_format: wgpu::TextureFormat,

    textures: HashMap<TextureId, GpuTexture>,
    targets: HashMap<RenderTargetId, TargetEntry>,
    pub(crate) programs: HashMap<ProgramId, wgpu::RenderPipeline>,
    pub(crate) meshes: HashMap<MeshId, GpuMesh>,
    pub(crate) queries: HashMap<QueryId, GpuQuery>,
    next_id: u32,

    pub(crate) water_uniform_layout: wgpu::BindGroupLayout,
    pub(crate) water_texture_layout: wgpu::BindGroupLayout,
    pub(crate) blur_bind_group_layout: wgpu::BindGroupLayout,
    pub(crate) wave_bind_group_layout: wgpu::BindGroupLayout,
    pub(crate) occlusion_bind_group_layout: wgpu::BindGroupLayout,
    pub(crate) occlusion_pipeline: wgpu::RenderPipeline,
    pub(crate) wave_pipeline: wgpu::RenderPipeline,
    blur_pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,

    pub(crate) wrap_sampler: wgpu::Sampler,
    pub(crate) clamp_sampler: wgpu::Sampler,
    pub(crate) fallback_color: wgpu::TextureView,
    pub(crate) fallback_depth: wgpu::TextureView,

    pub(crate) frame_buffer: wgpu::Buffer,
    pub(crate) params_buffer: wgpu::Buffer,
    pub(crate) blur_uniform_h: wgpu::Buffer,
    pub(crate) blur_uniform_v: wgpu::Buffer,
    pub(crate) occlusion_buffer: wgpu::Buffer,
    pub(crate) wave_buffer: wgpu::Buffer,
}

impl WgpuWater {
    /// `color_format` is the format of the screen colour buffer the water is
    /// drawn into; the screen depth buffer must be [`SCREEN_DEPTH_FORMAT`].
    /// Screen buffers need `COPY_SRC` usage for screen-copy refraction.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, color_format: wgpu::TextureFormat, anisotropy: u16) -> Self {
        let water_uniform_layout = pipelines::create_water_uniform_bind_group_layout(&device);
        let water_texture_layout = pipelines::create_water_texture_bind_group_layout(&device);
        let blur_bind_group_layout = pipelines::create_fullscreen_bind_group_layout(&device, "Blur Bind Group Layout");
        let wave_bind_group_layout =
            pipelines::create_fullscreen_bind_group_layout(&device, "Dynamic Wave Bind Group Layout");
        let occlusion_bind_group_layout = pipelines::create_occlusion_bind_group_layout(&device);

        let occlusion_pipeline = pipelines::create_occlusion_pipeline(
            &device,
            &occlusion_bind_group_layout,
            color_format,
            SCREEN_DEPTH_FORMAT,
        );
        let wave_pipeline = pipelines::create_fullscreen_pipeline(
            &device,
            "Dynamic Wave Pipeline",
            pipelines::DYNAMIC_WAVES_SHADER,
            &wave_bind_group_layout,
            wgpu::TextureFormat::Rgba8Unorm,
        );

        let wrap_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Water Wrap Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            anisotropy_clamp: anisotropy.clamp(1, 16),
            ..Default::default()
        });
        let clamp_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Water Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // 1x1 stand-ins for unbound texture slots
        let one = wgpu::Extent3d { width: 1, height: 1, depth_or_array_layers: 1 };
        let fallback_color_texture = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("Water Fallback Color"),
                size: one,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let fallback_depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Water Fallback Depth"),
            size: one,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SCREEN_DEPTH_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let fallback_depth = fallback_depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
        // Depth formats reject queue writes; clear to the far plane instead.
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Water Fallback Depth Clear"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Water Fallback Depth Clear"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &fallback_depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        queue.submit(Some(encoder.finish()));

        let uniform_buffer = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let frame_buffer = uniform_buffer("Water Frame Buffer", std::mem::size_of::<FrameUniforms>() as u64);
        let params_buffer = uniform_buffer("Water Params Buffer", std::mem::size_of::<WaterParams>() as u64);
        let blur_uniform_h = uniform_buffer("Blur Uniform H", 16);
        let blur_uniform_v = uniform_buffer("Blur Uniform V", 16);
        let occlusion_buffer = uniform_buffer("Occlusion Buffer", std::mem::size_of::<OcclusionUniform>() as u64);
        let wave_buffer = uniform_buffer("Dynamic Wave Buffer", std::mem::size_of::<WaveUniform>() as u64);

        log::info!(
            "Water wgpu backend: screen {:?}, max texture {}, anisotropy {}",
            color_format,
            device.limits().max_texture_dimension_2d,
            anisotropy
        );

        Self {
            device,
            queue,
            color_format,
            textures: HashMap::new(),
            targets: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            queries: HashMap::new(),
            next_id: 1,
            water_uniform_layout,
            water_texture_layout,
            blur_bind_group_layout,
            wave_bind_group_layout,
            occlusion_bind_group_layout,
            occlusion_pipeline,
            wave_pipeline,
            blur_pipelines: HashMap::new(),
            wrap_sampler,
            clamp_sampler,
            fallback_color: fallback_color_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            fallback_depth,
            frame_buffer,
            params_buffer,
            blur_uniform_h,
            blur_uniform_v,
            occlusion_buffer,
            wave_buffer,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.color_format
    }

    /// Number of live textures, targets, queries, programs and meshes.
    pub fn live_resources(&self) -> usize {
        self.textures.len() + self.targets.len() + self.queries.len() + self.programs.len() + self.meshes.len()
    }

    /// Start mapping the occlusion results resolved by the frame that was
    /// just submitted.
    pub fn finish_frame(&mut self) {
        for query in self.queries.values() {
            if query.status.load(Ordering::Acquire) != QUERY_RESOLVED {
                continue;
            }
            query.status.store(QUERY_MAPPING, Ordering::Release);
            let status = Arc::clone(&query.status);
            query.readback.slice(..).map_async(wgpu::MapMode::Read, move |result| {
                let next = if result.is_ok() { QUERY_READY } else { QUERY_FAILED };
                status.store(next, Ordering::Release);
            });
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn wgpu_format(&self, format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::ScreenColor => self.color_format,
            TextureFormat::ScreenDepth => SCREEN_DEPTH_FORMAT,
            TextureFormat::Depth(DepthBits::D16) => wgpu::TextureFormat::Depth16Unorm,
            TextureFormat::Depth(DepthBits::D24) => wgpu::TextureFormat::Depth24Plus,
            TextureFormat::Depth(DepthBits::D32) => wgpu::TextureFormat::Depth32Float,
        }
    }

    /// Run `create` inside validation and out-of-memory error scopes.
    fn scoped<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let value = create(&self.device);
        let oom = pollster::block_on(self.device.pop_error_scope());
        let validation = pollster::block_on(self.device.pop_error_scope());
        match oom.or(validation) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }

    fn allocate_texture(&mut self, desc: &TextureDesc, render: bool) -> Result<TextureId, GpuError> {
        let max = self.max_texture_size();
        let fail = |reason: String| GpuError::Allocation {
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
            reason,
        };
        if desc.width == 0 || desc.height == 0 {
            return Err(fail("zero-sized texture".into()));
        }
        if desc.width > max || desc.height > max {
            return Err(fail(format!("exceeds the {} texel limit", max)));
        }

        let format = self.wgpu_format(desc.format);
        let usage = match desc.format {
            // Depth24Plus cannot be a copy destination
            TextureFormat::Depth(_) => wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            TextureFormat::ScreenDepth => wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::TEXTURE_BINDING,
            _ if render => {
                wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC
            }
            _ => wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        };
        let texture = self
            .scoped(|device| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&desc.label),
                    size: wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage,
                    view_formats: &[],
                })
            })
            .map_err(fail)?;

        let id = TextureId(self.next_id());
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                format: desc.format,
                width: desc.width,
                height: desc.height,
            },
        );
        Ok(id)
    }

    pub(crate) fn texture(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(&id)
    }

    pub(crate) fn view_or_fallback(&self, id: Option<TextureId>) -> &wgpu::TextureView {
        id.and_then(|id| self.textures.get(&id))
            .map(|t| &t.view)
            .unwrap_or(&self.fallback_color)
    }

    pub(crate) fn depth_view_or_fallback(&self, id: Option<TextureId>) -> &wgpu::TextureView {
        id.and_then(|id| self.textures.get(&id))
            .map(|t| &t.view)
            .unwrap_or(&self.fallback_depth)
    }

    /// Build the blur pipeline for targets of `format` if it does not exist.
    pub(crate) fn prepare_blur_pipeline(&mut self, format: wgpu::TextureFormat) {
        if self.blur_pipelines.contains_key(&format) {
            return;
        }
        let pipeline = pipelines::create_fullscreen_pipeline(
            &self.device,
            "Blur Pipeline",
            pipelines::BLUR_SHADER,
            &self.blur_bind_group_layout,
            format,
        );
        self.blur_pipelines.insert(format, pipeline);
    }

    pub(crate) fn blur_pipeline(&self, format: wgpu::TextureFormat) -> Option<&wgpu::RenderPipeline> {
        self.blur_pipelines.get(&format)
    }

    /// Non-blocking read of `query`'s last resolved sample count.
    pub(crate) fn poll_query(&mut self, query: QueryId) -> QueryResult {
        let _ = self.device.poll(wgpu::Maintain::Poll);
        let Some(entry) = self.queries.get_mut(&query) else {
            return QueryResult::Unavailable;
        };
        if !entry.issued {
            return QueryResult::Unavailable;
        }
        match entry.status.load(Ordering::Acquire) {
            QUERY_READY => {
                let samples = {
                    let data = entry.readback.slice(..).get_mapped_range();
                    bytemuck::pod_read_unaligned::<u64>(&data[..8])
                };
                entry.readback.unmap();
                entry.status.store(QUERY_IDLE, Ordering::Release);
                QueryResult::Ready(samples)
            }
            QUERY_FAILED => {
                log::warn!("Occlusion query {:?} readback failed", query);
                entry.status.store(QUERY_IDLE, Ordering::Release);
                QueryResult::Unavailable
            }
            _ => QueryResult::Pending,
        }
    }
}

impl GpuResources for WgpuWater {
    fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn supports_occlusion_queries(&self) -> bool {
        true
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        self.allocate_texture(desc, false)
    }

    fn write_texture(&mut self, texture: TextureId, region: TexelRegion, data: &[u8]) -> Result<(), GpuError> {
        let entry = self.textures.get(&texture).ok_or(GpuError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        let bpp = entry.format.bytes_per_texel();
        if bpp == 0 {
            return Err(GpuError::Unsupported("CPU uploads to screen or depth textures"));
        }
        if region.x + region.width > entry.width || region.y + region.height > entry.height {
            return Err(GpuError::Allocation {
                label: format!("texture {} upload", texture.0),
                width: region.width,
                height: region.height,
                reason: format!("region outside {}x{}", entry.width, entry.height),
            });
        }
        if data.len() != region.texels() * bpp as usize {
            return Err(GpuError::Allocation {
                label: format!("texture {} upload", texture.0),
                width: region.width,
                height: region.height,
                reason: format!("expected {} bytes, got {}", region.texels() * bpp as usize, data.len()),
            });
        }
        if region.texels() == 0 {
            return Ok(());
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(region.width * bpp),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTarget, GpuError> {
        let color = self.allocate_texture(
            &TextureDesc::new(desc.label.clone(), desc.width, desc.height, desc.color_format),
            true,
        )?;
        let depth = match desc.depth {
            Some(bits) => {
                let depth_desc = TextureDesc::new(
                    format!("{} depth", desc.label),
                    desc.width,
                    desc.height,
                    TextureFormat::Depth(bits),
                );
                match self.allocate_texture(&depth_desc, true) {
                    Ok(depth) => Some(depth),
                    Err(err) => {
                        self.release_texture(color);
                        return Err(err);
                    }
                }
            }
            None => None,
        };
        let id = RenderTargetId(self.next_id());
        self.targets.insert(id, TargetEntry { color, depth });
        Ok(RenderTarget {
            id,
            color,
            depth,
            width: desc.width,
            height: desc.height,
        })
    }

    fn create_occlusion_query(&mut self) -> Result<QueryId, GpuError> {
        let fail = |reason: String| GpuError::Allocation {
            label: "occlusion query".into(),
            width: 1,
            height: 1,
            reason,
        };
        let (set, resolve, readback) = self
            .scoped(|device| {
                let set = device.create_query_set(&wgpu::QuerySetDescriptor {
                    label: Some("Water Occlusion Query"),
                    ty: wgpu::QueryType::Occlusion,
                    count: 1,
                });
                let resolve = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Water Occlusion Resolve"),
                    size: wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT,
                    usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                });
                let readback = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Water Occlusion Readback"),
                    size: wgpu::QUERY_RESOLVE_BUFFER_ALIGNMENT,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (set, resolve, readback)
            })
            .map_err(fail)?;
        let id = QueryId(self.next_id());
        self.queries.insert(
            id,
            GpuQuery {
                set,
                resolve,
                readback,
                status: Arc::new(AtomicU8::new(QUERY_IDLE)),
                issued: false,
            },
        );
        Ok(id)
    }

    fn build_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, GpuError> {
        let source = format!("{}\n{}", desc.prelude, pipelines::WATER_SHADER_BODY);
        let layouts = [&self.water_uniform_layout, &self.water_texture_layout];
        let color_format = self.color_format;
        let pipeline = self
            .scoped(|device| {
                let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&desc.label),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
                pipelines::create_water_pipeline(device, &shader, &layouts, color_format, SCREEN_DEPTH_FORMAT)
            })
            .map_err(|message| GpuError::ShaderBuild {
                label: desc.label.clone(),
                message,
            })?;
        let id = ProgramId(self.next_id());
        self.programs.insert(id, pipeline);
        Ok(id)
    }

    fn create_mesh(&mut self, vertices: &[WaterVertex], indices: &[u32]) -> Result<MeshId, GpuError> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(GpuError::Allocation {
                label: "water mesh".into(),
                width: vertices.len() as u32,
                height: indices.len() as u32,
                reason: "empty mesh".into(),
            });
        }
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Water Vertex Buffer"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Water Index Buffer"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let id = MeshId(self.next_id());
        self.meshes.insert(
            id,
            GpuMesh {
                vertex_buffer,
                index_buffer,
                num_indices: indices.len() as u32,
            },
        );
        Ok(id)
    }

    fn release_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.remove(&texture) {
            entry.texture.destroy();
        }
    }

    fn release_render_target(&mut self, target: &RenderTarget) {
        if let Some(entry) = self.targets.remove(&target.id) {
            self.release_texture(entry.color);
            if let Some(depth) = entry.depth {
                self.release_texture(depth);
            }
        }
    }

    fn release_query(&mut self, query: QueryId) {
        if let Some(entry) = self.queries.remove(&query) {
            entry.resolve.destroy();
            entry.readback.destroy();
        }
    }

    fn release_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn release_mesh(&mut self, mesh: MeshId) {
        if let Some(entry) = self.meshes.remove(&mesh) {
            entry.vertex_buffer.destroy();
            entry.index_buffer.destroy();
        }
    }
}

pub(crate) fn query_status(query: &GpuQuery) -> u8 {
    query.status.load(Ordering::Acquire)
}

pub(crate) fn mark_query_resolved(query: &mut GpuQuery) {
    query.status.store(QUERY_RESOLVED, Ordering::Release);
    query.issued = true;
}

/// Whether a new query may be recorded: the readback buffer is not mapped
/// or waiting to be read.
pub(crate) fn query_writable(query: &GpuQuery) -> bool {
    matches!(query_status(query), QUERY_IDLE | QUERY_RESOLVED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReflectionQuality, RefractionMode, WaterConfig};
    use crate::dynamic_waves::WaveTileSet;
    use crate::gpu::{TexelRegion, TextureDesc, TextureFormat};
    use crate::passes::{ScenePass, ViewCamera};
    use crate::pipeline::WaterRenderer;
    use crate::state::WaterTextures;
    use engine_core::HeightGrid;
    use glam::Vec3;

    const SCREEN: (u32, u32) = (160, 120);

    /// Vulkan, Metal or DX12 device, or `None` on machines without one.
    fn device() -> Option<(wgpu::Device, wgpu::Queue)> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
        pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Water Test Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
            },
            None,
        ))
        .ok()
    }

    fn screen_texture(device: &wgpu::Device, label: &str, format: wgpu::TextureFormat) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: SCREEN.0,
                height: SCREEN.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    fn textures(water: &mut WgpuWater) -> WaterTextures {
        let mut texture = |label: &str, size: u32| {
            let id = water
                .create_texture(&TextureDesc::new(label, size, size, TextureFormat::Rgba8Unorm))
                .unwrap();
            let data = vec![128u8; (size * size * 4) as usize];
            water.write_texture(id, TexelRegion::new(0, 0, size, size), &data).unwrap();
            id
        };
        let normal = texture("wave normals", 64);
        let foam = texture("foam", 32);
        let caustics = vec![texture("caustic 0", 16), texture("caustic 1", 16)];
        WaterTextures {
            normal: WaveTileSet {
                texture: normal,
                size: (64, 64),
                tiles_x: 2,
                tiles_y: 2,
            },
            foam,
            caustics,
        }
    }

    #[test]
    fn renders_a_frame_on_a_real_adapter() {
        let Some((device, queue)) = device() else {
            return;
        };
        let color_format = wgpu::TextureFormat::Rgba8UnormSrgb;
        let color = screen_texture(&device, "Test Screen Color", color_format);
        let depth = screen_texture(&device, "Test Screen Depth", SCREEN_DEPTH_FORMAT);
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        let mut water = WgpuWater::new(device, queue, color_format, 4);

        let heights = HeightGrid::from_fn(32, 32, |x, y| 8.0 - ((x as f32 - 16.0).abs() + (y as f32 - 16.0).abs()) * 0.5);
        let config = WaterConfig {
            reflection: ReflectionQuality::Full,
            refraction: RefractionMode::ScreenCopy,
            use_depth_copy: true,
            reflection_texture_size: 64,
            blur_reflection: true,
            dynamic_waves: true,
            coast_grid: (2, 2),
            coast_atlas_size: (64, 64),
            coast_max_distance: 4,
            ..WaterConfig::default()
        };
        let textures = textures(&mut water);
        let caller_owned = water.live_resources();
        let mut renderer = WaterRenderer::new(&mut water, config, &heights, textures, SCREEN).unwrap();
        assert!(renderer.diagnostics().is_empty());

        let camera = ViewCamera::look_at(Vec3::new(16.0, 20.0, -10.0), Vec3::new(16.0, 0.0, 16.0), 1.0, 4.0 / 3.0);
        let mut encoder = water
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Test Encoder") });
        let report = {
            let mut frame = WgpuFrame::new(
                &mut water,
                &mut encoder,
                ScreenBuffers {
                    color: &color,
                    color_view: &color_view,
                    depth: &depth,
                    depth_view: &depth_view,
                },
            );
            let mut scene = |frame: &mut WgpuFrame<'_>, _: &ScenePass| {
                let _pass = frame.begin_scene_pass();
            };
            renderer.render_frame(&mut frame, &mut scene, &heights, &camera, 0.016).unwrap()
        };
        water.queue().submit(Some(encoder.finish()));
        water.finish_frame();
        let _ = water.device().poll(wgpu::Maintain::Wait);

        assert!(report.visible && report.surface_drawn);
        assert!(report.reflection_rendered && report.refraction_rendered);
        assert!(report.occlusion_query_issued);

        renderer.shutdown(&mut water);
        assert_eq!(water.live_resources(), caller_owned);
    }
}
