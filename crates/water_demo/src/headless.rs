//! Off-screen wgpu device and screen buffers for the demo.

use anyhow::Result;
use engine_core::HeightField;
use water::{
    FrameReport, ScenePass, ScreenBuffers, ViewCamera, WaterRenderer, WgpuFrame, WgpuWater,
};

use crate::config::DemoConfig;
use crate::scene::{create_textures, drive, release_textures, DemoScene, DemoStats};

const SCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
const SKY: wgpu::Color = wgpu::Color {
    r: 0.45,
    g: 0.62,
    b: 0.85,
    a: 1.0,
};

pub struct Headless {
    pub water: WgpuWater,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
}

impl Headless {
    pub async fn new(config: &DemoConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("Failed to find suitable GPU adapter"))?;

        log::info!("Using GPU: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Water Demo Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let size = wgpu::Extent3d {
            width: config.screen_width,
            height: config.screen_height,
            depth_or_array_layers: 1,
        };
        let screen_texture = |label: &str, format: wgpu::TextureFormat| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        };
        let color = screen_texture("Screen Color", SCREEN_FORMAT);
        let depth = screen_texture("Screen Depth", water::gpu::wgpu_backend::SCREEN_DEPTH_FORMAT);
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());

        let water = WgpuWater::new(device, queue, SCREEN_FORMAT, config.water.anisotropy_level());
        Ok(Self {
            water,
            color,
            color_view,
            depth,
            depth_view,
        })
    }

    /// Stand-in for the main scene pass: sky colour and far depth.
    fn clear_screen(&self, encoder: &mut wgpu::CommandEncoder) {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(SKY),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
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

    /// Record and submit one frame.
    pub fn render<H: HeightField + ?Sized>(
        &mut self,
        renderer: &mut WaterRenderer,
        heights: &H,
        camera: &ViewCamera,
        dt: f32,
    ) -> water::error::Result<FrameReport> {
        let mut encoder = self
            .water
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Water Demo Encoder"),
            });
        self.clear_screen(&mut encoder);

        let report = {
            let mut frame = WgpuFrame::new(
                &mut self.water,
                &mut encoder,
                ScreenBuffers {
                    color: &self.color,
                    color_view: &self.color_view,
                    depth: &self.depth,
                    depth_view: &self.depth_view,
                },
            );
            // Off-screen passes only get their clear colour.
            let mut scene = |frame: &mut WgpuFrame<'_>, pass: &ScenePass| {
                let _pass = frame.begin_scene_pass();
                log::trace!(
                    "{:?} scene pass: terrain {}, models {}",
                    pass.kind,
                    pass.content.terrain,
                    pass.content.models
                );
            };
            renderer.render_frame(&mut frame, &mut scene, heights, camera, dt)
        };

        self.water.queue().submit(Some(encoder.finish()));
        self.water.finish_frame();
        report
    }
}

pub fn run(config: &DemoConfig, scene: &mut DemoScene, mut gpu: Headless) -> Result<DemoStats> {
    let textures = create_textures(&mut gpu.water, config.terrain_seed)?;
    let mut renderer = match WaterRenderer::new(
        &mut gpu.water,
        config.water.clone(),
        &scene.terrain,
        textures.clone(),
        (config.screen_width, config.screen_height),
    ) {
        Ok(renderer) => renderer,
        Err(e) => {
            release_textures(&mut gpu.water, &textures);
            return Err(e.into());
        }
    };
    for diagnostic in renderer.diagnostics() {
        log::warn!("{}", diagnostic);
    }

    let stats = drive(config, scene, &mut renderer, |renderer, scene, camera, dt| {
        gpu.render(renderer, &scene.terrain, camera, dt)
    });

    renderer.shutdown(&mut gpu.water);
    release_textures(&mut gpu.water, &textures);
    log::info!("wgpu resources still live: {}", gpu.water.live_resources());
    stats
}
