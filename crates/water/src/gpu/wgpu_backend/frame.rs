use crate::error::GpuError;
use crate::geometry::{WaterBounds, WaterVertex};
use crate::gpu::{
    DynamicWaveStep, GpuResources, MeshId, ProgramDesc, ProgramId, QueryId, QueryResult, RenderTarget,
    RenderTargetDesc, TexelRegion, TextureDesc, TextureId, WaterDraw, WaterGpu,
};
use crate::uniforms::{FrameUniforms, WaterParams};

use super::pipelines::{OcclusionUniform, WaveUniform, MAX_WAVE_SLOTS, OCCLUSION_BOX_VERTICES};
use super::{mark_query_resolved, query_writable, WgpuWater};

/// The screen buffers of the frame being rendered. The scene has already
/// been drawn into them.
pub struct ScreenBuffers<'a> {
    pub color: &'a wgpu::Texture,
    pub color_view: &'a wgpu::TextureView,
    pub depth: &'a wgpu::Texture,
    pub depth_view: &'a wgpu::TextureView,
}

/// Records one frame of water commands into `encoder`.
pub struct WgpuFrame<'a> {
    water: &'a mut WgpuWater,
    encoder: &'a mut wgpu::CommandEncoder,
    screen: ScreenBuffers<'a>,
    offscreen: Option<RenderTarget>,
}

impl<'a> WgpuFrame<'a> {
    pub fn new(water: &'a mut WgpuWater, encoder: &'a mut wgpu::CommandEncoder, screen: ScreenBuffers<'a>) -> Self {
        Self {
            water,
            encoder,
            screen,
            offscreen: None,
        }
    }

    pub fn water(&self) -> &WgpuWater {
        self.water
    }

    /// Target scene draws currently go to, if not the screen.
    pub fn offscreen_target(&self) -> Option<RenderTarget> {
        self.offscreen
    }

    /// Render pass that loads the current destination (the active off-screen
    /// target, else the screen) for scene drawers to draw into.
    pub fn begin_scene_pass(&mut self) -> wgpu::RenderPass<'_> {
        let water = &*self.water;
        let (color_view, depth_view) = match self.offscreen {
            Some(target) => (
                water.texture(target.color).map(|t| &t.view).unwrap_or(self.screen.color_view),
                target.depth.and_then(|d| water.texture(d)).map(|t| &t.view),
            ),
            None => (self.screen.color_view, Some(self.screen.depth_view)),
        };
        self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Water Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    fn fullscreen_pass(
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        view: &wgpu::TextureView,
        pipeline: &wgpu::RenderPipeline,
        bind_group: &wgpu::BindGroup,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

impl GpuResources for WgpuFrame<'_> {
    fn max_texture_size(&self) -> u32 {
        self.water.max_texture_size()
    }

    fn supports_occlusion_queries(&self) -> bool {
        self.water.supports_occlusion_queries()
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        self.water.create_texture(desc)
    }

    fn write_texture(&mut self, texture: TextureId, region: TexelRegion, data: &[u8]) -> Result<(), GpuError> {
        self.water.write_texture(texture, region, data)
    }

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTarget, GpuError> {
        self.water.create_render_target(desc)
    }

    fn create_occlusion_query(&mut self) -> Result<QueryId, GpuError> {
        self.water.create_occlusion_query()
    }

    fn build_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, GpuError> {
        self.water.build_program(desc)
    }

    fn create_mesh(&mut self, vertices: &[WaterVertex], indices: &[u32]) -> Result<MeshId, GpuError> {
        self.water.create_mesh(vertices, indices)
    }

    fn release_texture(&mut self, texture: TextureId) {
        self.water.release_texture(texture)
    }

    fn release_render_target(&mut self, target: &RenderTarget) {
        self.water.release_render_target(target)
    }

    fn release_query(&mut self, query: QueryId) {
        self.water.release_query(query)
    }

    fn release_program(&mut self, program: ProgramId) {
        self.water.release_program(program)
    }

    fn release_mesh(&mut self, mesh: MeshId) {
        self.water.release_mesh(mesh)
    }
}

impl WaterGpu for WgpuFrame<'_> {
    fn occlusion_result(&mut self, query: QueryId) -> QueryResult {
        self.water.poll_query(query)
    }

    fn issue_occlusion_query(&mut self, query: QueryId, bounds: &WaterBounds, frame: &FrameUniforms) -> bool {
        let water = &*self.water;
        let Some(entry) = water.queries.get(&query) else {
            return false;
        };
        if !query_writable(entry) {
            log::trace!("Occlusion query {:?} still mapping, not reissued", query);
            return false;
        }

        let uniform = OcclusionUniform {
            view_proj: frame.view_proj,
            box_min: bounds.min.extend(1.0).to_array(),
            box_max: bounds.max.extend(1.0).to_array(),
        };
        water.queue.write_buffer(&water.occlusion_buffer, 0, bytemuck::bytes_of(&uniform));
        let bind_group = water.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Occlusion Bind Group"),
            layout: &water.occlusion_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: water.occlusion_buffer.as_entire_binding(),
            }],
        });

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Water Occlusion Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.screen.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.screen.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: Some(&entry.set),
        });
        pass.set_pipeline(&water.occlusion_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.begin_occlusion_query(0);
        pass.draw(0..OCCLUSION_BOX_VERTICES, 0..1);
        pass.end_occlusion_query();
        drop(pass);

        self.encoder.resolve_query_set(&entry.set, 0..1, &entry.resolve, 0);
        self.encoder.copy_buffer_to_buffer(&entry.resolve, 0, &entry.readback, 0, 8);
        if let Some(entry) = self.water.queries.get_mut(&query) {
            mark_query_resolved(entry);
        }
        true
    }

    fn begin_offscreen(&mut self, target: &RenderTarget, clear_color: [f32; 4]) {
        let water = &*self.water;
        let Some(color) = water.texture(target.color) else {
            log::warn!("Off-screen target {:?} has no colour texture", target.id);
            return;
        };
        let depth = target.depth.and_then(|d| water.texture(d));
        let [r, g, b, a] = clear_color.map(f64::from);
        let pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Water Offscreen Clear"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth.map(|depth| wgpu::RenderPassDepthStencilAttachment {
                view: &depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        drop(pass);
        self.offscreen = Some(*target);
    }

    fn end_offscreen(&mut self, target: &RenderTarget) {
        if self.offscreen.map(|t| t.id) == Some(target.id) {
            self.offscreen = None;
        }
    }

    fn copy_screen(&mut self, color: Option<TextureId>, depth: Option<TextureId>) {
        let water = &*self.water;
        let copies = [
            (color, self.screen.color, wgpu::TextureAspect::All),
            (depth, self.screen.depth, wgpu::TextureAspect::DepthOnly),
        ];
        for (dst, src, aspect) in copies {
            let Some(dst) = dst.and_then(|id| water.texture(id)) else {
                continue;
            };
            let size = src.size();
            if (size.width, size.height) != (dst.width, dst.height) {
                log::warn!(
                    "Screen copy skipped: screen {}x{}, copy {}x{}",
                    size.width,
                    size.height,
                    dst.width,
                    dst.height
                );
                continue;
            }
            self.encoder.copy_texture_to_texture(
                wgpu::ImageCopyTexture {
                    texture: src,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect,
                },
                wgpu::ImageCopyTexture {
                    texture: &dst.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect,
                },
                wgpu::Extent3d {
                    width: dst.width,
                    height: dst.height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    fn blur(&mut self, target: &RenderTarget, scratch: &RenderTarget, base: f32, exponent: f32) {
        let Some(format) = self.water.texture(target.color).map(|t| t.texture.format()) else {
            return;
        };
        self.water.prepare_blur_pipeline(format);
        let water = &*self.water;
        let (Some(pipeline), Some(source), Some(temp)) = (
            water.blur_pipeline(format),
            water.texture(target.color),
            water.texture(scratch.color),
        ) else {
            return;
        };

        let step_x = 1.0 / target.width.max(1) as f32;
        let step_y = 1.0 / target.height.max(1) as f32;
        water.queue.write_buffer(&water.blur_uniform_h, 0, bytemuck::cast_slice(&[step_x, 0.0, base, exponent]));
        water.queue.write_buffer(&water.blur_uniform_v, 0, bytemuck::cast_slice(&[0.0, step_y, base, exponent]));

        let bind = |label: &str, view: &wgpu::TextureView, uniform: &wgpu::Buffer| {
            water.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &water.blur_bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&water.clamp_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: uniform.as_entire_binding(),
                    },
                ],
            })
        };

        // Horizontal: target -> scratch, vertical: scratch -> target
        let blur_bind_h = bind("Blur Bind H", &source.view, &water.blur_uniform_h);
        Self::fullscreen_pass(self.encoder, "Blur H Pass", &temp.view, pipeline, &blur_bind_h);
        let blur_bind_v = bind("Blur Bind V", &temp.view, &water.blur_uniform_v);
        Self::fullscreen_pass(self.encoder, "Blur V Pass", &source.view, pipeline, &blur_bind_v);
    }

    fn render_dynamic_waves(&mut self, target: &RenderTarget, base: TextureId, step: &DynamicWaveStep) {
        let water = &*self.water;
        let (Some(base), Some(output)) = (water.texture(base), water.texture(target.color)) else {
            return;
        };

        let mut uniform = WaveUniform {
            params: [
                step.phase,
                step.tiles_x as f32,
                step.tiles_y as f32,
                step.slots.len().min(MAX_WAVE_SLOTS) as f32,
            ],
            slots: [[0.0; 4]; MAX_WAVE_SLOTS],
        };
        for (dst, slot) in uniform.slots.iter_mut().zip(&step.slots) {
            *dst = [slot.from_tile as f32, slot.to_tile as f32, slot.offset.x, slot.offset.y];
        }
        water.queue.write_buffer(&water.wave_buffer, 0, bytemuck::bytes_of(&uniform));

        let bind_group = water.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Dynamic Wave Bind Group"),
            layout: &water.wave_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&base.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&water.wrap_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: water.wave_buffer.as_entire_binding(),
                },
            ],
        });
        Self::fullscreen_pass(
            self.encoder,
            "Dynamic Wave Pass",
            &output.view,
            &water.wave_pipeline,
            &bind_group,
        );
    }

    fn set_water_params(&mut self, params: &WaterParams) {
        self.water
            .queue
            .write_buffer(&self.water.params_buffer, 0, bytemuck::bytes_of(params));
    }

    fn draw_water(&mut self, draw: &WaterDraw) {
        let water = &*self.water;
        let (Some(pipeline), Some(mesh)) = (water.programs.get(&draw.program), water.meshes.get(&draw.mesh)) else {
            log::warn!("Water draw skipped: unknown program {:?} or mesh {:?}", draw.program, draw.mesh);
            return;
        };
        water.queue.write_buffer(&water.frame_buffer, 0, bytemuck::bytes_of(&draw.frame));

        let uniform_bind_group = water.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Water Uniform Bind Group"),
            layout: &water.water_uniform_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: water.frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: water.params_buffer.as_entire_binding(),
                },
            ],
        });

        let b = &draw.bindings;
        let views = [
            water.view_or_fallback(Some(b.normal)),
            water.view_or_fallback(b.coast),
            water.view_or_fallback(b.reflection),
            water.view_or_fallback(b.refraction),
            water.depth_view_or_fallback(b.depth),
            water.view_or_fallback(Some(b.foam)),
            water.view_or_fallback(Some(b.caustic)),
            water.view_or_fallback(b.wave_rand),
        ];
        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: 8,
            resource: wgpu::BindingResource::Sampler(&water.wrap_sampler),
        });
        entries.push(wgpu::BindGroupEntry {
            binding: 9,
            resource: wgpu::BindingResource::Sampler(&water.clamp_sampler),
        });
        let texture_bind_group = water.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Water Texture Bind Group"),
            layout: &water.water_texture_layout,
            entries: &entries,
        });

        let mut pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Water Surface Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.screen.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.screen.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &uniform_bind_group, &[]);
        pass.set_bind_group(1, &texture_bind_group, &[]);
        pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.num_indices, 0, 0..1);
    }
}
