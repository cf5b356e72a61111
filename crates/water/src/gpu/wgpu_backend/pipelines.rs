//! Bind group layouts and render pipelines of the wgpu backend.

use bytemuck::{Pod, Zeroable};

use crate::geometry::WaterVertex;

pub const OCCLUSION_SHADER: &str = include_str!("../../shaders/occlusion.wgsl");
pub const BLUR_SHADER: &str = include_str!("../../shaders/blur.wgsl");
pub const DYNAMIC_WAVES_SHADER: &str = include_str!("../../shaders/dynamic_waves.wgsl");
/// Surface shader body; the parameter prelude is prepended per program.
pub const WATER_SHADER_BODY: &str = include_str!("../../shaders/water.wgsl");

/// Slots in `dynamic_waves.wgsl`'s uniform array.
pub const MAX_WAVE_SLOTS: usize = 16;

/// Vertices of the occlusion box, generated in the vertex shader.
pub const OCCLUSION_BOX_VERTICES: u32 = 36;

/// Occlusion shader uniform (must match occlusion.wgsl OcclusionUniform).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct OcclusionUniform {
    pub view_proj: [[f32; 4]; 4],
    pub box_min: [f32; 4],
    pub box_max: [f32; 4],
}

/// Dynamic wave uniform (must match dynamic_waves.wgsl WaveUniform).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WaveUniform {
    /// x = phase, y = tiles_x, z = tiles_y, w = slot count
    pub params: [f32; 4],
    /// x = from tile, y = to tile, zw = offset
    pub slots: [[f32; 4]; MAX_WAVE_SLOTS],
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Group 0 of the water program: frame uniforms and the parameter array.
/// Baked programs never read binding 1 but share the layout.
pub fn create_water_uniform_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let stages = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Water Uniform Bind Group Layout"),
        entries: &[uniform_entry(0, stages), uniform_entry(1, stages)],
    })
}

/// Group 1 of the water program: every sampled texture.
pub fn create_water_texture_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let float = wgpu::TextureSampleType::Float { filterable: true };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Water Texture Bind Group Layout"),
        entries: &[
            texture_entry(0, float), // normal
            texture_entry(1, float), // coast
            texture_entry(2, float), // reflection
            texture_entry(3, float), // refraction
            texture_entry(4, wgpu::TextureSampleType::Depth),
            texture_entry(5, float), // foam
            texture_entry(6, float), // caustic
            texture_entry(7, float), // wave random
            sampler_entry(8),
            sampler_entry(9),
        ],
    })
}

/// Texture, sampler and uniform: the layout of the blur and dynamic wave
/// passes.
pub fn create_fullscreen_bind_group_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            texture_entry(0, wgpu::TextureSampleType::Float { filterable: true }),
            sampler_entry(1),
            uniform_entry(2, wgpu::ShaderStages::FRAGMENT),
        ],
    })
}

pub fn create_occlusion_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Occlusion Bind Group Layout"),
        entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
    })
}

/// Water surface pipeline over the screen, alpha blended, depth tested but
/// not written.
pub fn create_water_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layouts: &[&wgpu::BindGroupLayout],
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Water Pipeline Layout"),
        bind_group_layouts: layouts,
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Water Pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[WaterVertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Seen from above and below
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: depth_format,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Bounding box draw that only counts samples passing the depth test.
pub fn create_occlusion_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Occlusion Shader"),
        source: wgpu::ShaderSource::Wgsl(OCCLUSION_SHADER.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Occlusion Pipeline Layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Occlusion Pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: None,
                write_mask: wgpu::ColorWrites::empty(),
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: depth_format,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Fullscreen-triangle pipeline writing `format`, shared by the blur and the
/// dynamic wave composition.
pub fn create_fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &str,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::{FrameUniforms, WaterParam};

    #[test]
    fn uniform_sizes_match_the_shaders() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 128);
        assert_eq!(std::mem::size_of::<OcclusionUniform>(), 96);
        assert_eq!(std::mem::size_of::<WaveUniform>(), 16 * (1 + MAX_WAVE_SLOTS));
        assert!(DYNAMIC_WAVES_SHADER.contains(&format!("MAX_WAVE_SLOTS: u32 = {}u", MAX_WAVE_SLOTS)));
    }

    #[test]
    fn water_body_only_uses_declared_accessors() {
        for param in WaterParam::ALL {
            let _ = param.name();
        }
        for accessor in ["surface_color()", "fresnel_min()", "toggles()", "coast_tex_gen()", "normal_tiles()"] {
            assert!(WATER_SHADER_BODY.contains(accessor));
        }
        assert!(!WATER_SHADER_BODY.contains("@binding(1) var<uniform>"));
    }
}
