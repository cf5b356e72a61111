//! Recording backend: keeps texture memory on the CPU and logs every
//! command instead of drawing. Used by the tests and by the headless demo
//! when no GPU adapter is available.

use std::collections::{HashMap, HashSet, VecDeque};

use super::{
    DynamicWaveStep, GpuResources, MeshId, ProgramDesc, ProgramId, QueryId, QueryResult, RenderTarget,
    RenderTargetDesc, RenderTargetId, TexelRegion, TextureDesc, TextureFormat, TextureId, WaterDraw, WaterGpu,
};
use crate::error::GpuError;
use crate::geometry::{WaterBounds, WaterVertex};
use crate::uniforms::{FrameUniforms, UniformMode, WaterParams};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    CreateTexture { texture: TextureId, label: String, width: u32, height: u32 },
    WriteTexture { texture: TextureId, region: TexelRegion },
    CreateRenderTarget { target: RenderTargetId, label: String, width: u32, height: u32 },
    CreateQuery { query: QueryId },
    BuildProgram { program: ProgramId, mode: UniformMode },
    CreateMesh { mesh: MeshId, vertices: usize, indices: usize },
    OcclusionQuery { query: QueryId, bounds: WaterBounds },
    BeginOffscreen { target: RenderTargetId },
    EndOffscreen { target: RenderTargetId },
    CopyScreen { color: bool, depth: bool },
    Blur { target: RenderTargetId },
    DynamicWaves { target: RenderTargetId, phase: f32 },
    SetWaterParams,
    DrawWater(WaterDraw),
    Release { kind: &'static str, id: u32 },
}

#[derive(Debug)]
struct TraceTexture {
    desc: TextureDesc,
    data: Vec<u8>,
}

/// CPU-side stand-in for a GPU.
#[derive(Debug)]
pub struct TraceGpu {
    next_id: u32,
    max_texture_size: u32,
    query_support: bool,
    fail_labels: Vec<String>,
    fail_programs: bool,
    busy_queries: bool,
    textures: HashMap<u32, TraceTexture>,
    targets: HashMap<u32, RenderTarget>,
    programs: HashMap<u32, ProgramDesc>,
    meshes: HashMap<u32, (usize, usize)>,
    queries: HashSet<u32>,
    issued: HashSet<u32>,
    occlusion_script: VecDeque<QueryResult>,
    default_occlusion: QueryResult,
    last_params: Option<WaterParams>,
    commands: Vec<GpuCommand>,
}

impl Default for TraceGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceGpu {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            max_texture_size: 8192,
            query_support: true,
            fail_labels: Vec::new(),
            fail_programs: false,
            busy_queries: false,
            textures: HashMap::new(),
            targets: HashMap::new(),
            programs: HashMap::new(),
            meshes: HashMap::new(),
            queries: HashSet::new(),
            issued: HashSet::new(),
            occlusion_script: VecDeque::new(),
            default_occlusion: QueryResult::Ready(1),
            last_params: None,
            commands: Vec::new(),
        }
    }

    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = size;
        self
    }

    pub fn with_query_support(mut self, supported: bool) -> Self {
        self.query_support = supported;
        self
    }

    /// Make every texture or target allocation whose label contains
    /// `pattern` fail.
    pub fn fail_allocations_matching(&mut self, pattern: impl Into<String>) {
        self.fail_labels.push(pattern.into());
    }

    pub fn fail_program_builds(&mut self, fail: bool) {
        self.fail_programs = fail;
    }

    /// While set, queries behave as if their previous readback is still in
    /// flight and are not reissued.
    pub fn hold_occlusion_queries(&mut self, busy: bool) {
        self.busy_queries = busy;
    }

    /// Results returned by the next occlusion reads, in order. Once used up,
    /// reads return `Ready(1)`.
    pub fn script_occlusion(&mut self, results: impl IntoIterator<Item = QueryResult>) {
        self.occlusion_script.extend(results);
    }

    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<GpuCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Resources allocated and not yet released.
    pub fn live_resources(&self) -> usize {
        self.textures.len() + self.targets.len() + self.programs.len() + self.meshes.len() + self.queries.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn texture_desc(&self, texture: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&texture.0).map(|t| &t.desc)
    }

    /// Current contents of a CPU-format texture.
    pub fn texture_data(&self, texture: TextureId) -> Option<&[u8]> {
        self.textures.get(&texture.0).map(|t| t.data.as_slice())
    }

    /// Labels of live render targets' colour textures.
    pub fn render_target_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self
            .targets
            .values()
            .filter_map(|t| self.texture_desc(t.color))
            .map(|d| d.label.as_str())
            .collect();
        labels.sort_unstable();
        labels
    }

    pub fn program_desc(&self, program: ProgramId) -> Option<&ProgramDesc> {
        self.programs.get(&program.0)
    }

    pub fn last_water_params(&self) -> Option<&WaterParams> {
        self.last_params.as_ref()
    }

    /// Parameter values the most recent water draw saw: decoded from the
    /// program source when baked, the last uniform write otherwise.
    pub fn effective_water_params(&self) -> Option<WaterParams> {
        let draw = self.commands.iter().rev().find_map(|c| match c {
            GpuCommand::DrawWater(draw) => Some(draw),
            _ => None,
        })?;
        let program = self.programs.get(&draw.program.0)?;
        match program.mode {
            UniformMode::Baked => WaterParams::from_baked_prelude(&program.prelude),
            UniformMode::Runtime => self.last_params,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check_allocation(&self, label: &str, width: u32, height: u32) -> Result<(), GpuError> {
        let fail = |reason: &str| {
            Err(GpuError::Allocation {
                label: label.to_string(),
                width,
                height,
                reason: reason.to_string(),
            })
        };
        if width == 0 || height == 0 {
            return fail("zero-sized");
        }
        if width > self.max_texture_size || height > self.max_texture_size {
            return fail("exceeds maximum texture size");
        }
        if self.fail_labels.iter().any(|p| label.contains(p.as_str())) {
            return fail("scripted failure");
        }
        Ok(())
    }

    fn insert_texture(&mut self, desc: &TextureDesc) -> TextureId {
        let id = self.allocate_id();
        let bytes = desc.format.bytes_per_texel() as usize * desc.width as usize * desc.height as usize;
        self.textures.insert(
            id,
            TraceTexture {
                desc: desc.clone(),
                data: vec![0; bytes],
            },
        );
        TextureId(id)
    }
}

impl GpuResources for TraceGpu {
    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn supports_occlusion_queries(&self) -> bool {
        self.query_support
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureId, GpuError> {
        self.check_allocation(&desc.label, desc.width, desc.height)?;
        let texture = self.insert_texture(desc);
        self.commands.push(GpuCommand::CreateTexture {
            texture,
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
        });
        Ok(texture)
    }

    fn write_texture(&mut self, texture: TextureId, region: TexelRegion, data: &[u8]) -> Result<(), GpuError> {
        let tex = self
            .textures
            .get_mut(&texture.0)
            .ok_or(GpuError::InvalidHandle { kind: "texture", id: texture.0 })?;
        let bpp = tex.desc.format.bytes_per_texel() as usize;
        if bpp == 0 {
            return Err(GpuError::Unsupported("CPU writes to screen-format textures"));
        }
        if region.x + region.width > tex.desc.width || region.y + region.height > tex.desc.height {
            return Err(GpuError::Unsupported("texture writes outside the texture"));
        }
        if data.len() != region.texels() * bpp {
            return Err(GpuError::Unsupported("texture writes with mismatched data length"));
        }
        let row_bytes = region.width as usize * bpp;
        let stride = tex.desc.width as usize * bpp;
        for row in 0..region.height as usize {
            let dst = (region.y as usize + row) * stride + region.x as usize * bpp;
            tex.data[dst..dst + row_bytes].copy_from_slice(&data[row * row_bytes..(row + 1) * row_bytes]);
        }
        self.commands.push(GpuCommand::WriteTexture { texture, region });
        Ok(())
    }

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> Result<RenderTarget, GpuError> {
        self.check_allocation(&desc.label, desc.width, desc.height)?;
        let color = self.insert_texture(&TextureDesc::new(desc.label.clone(), desc.width, desc.height, desc.color_format));
        let depth = desc.depth.map(|bits| {
            self.insert_texture(&TextureDesc::new(
                format!("{} depth", desc.label),
                desc.width,
                desc.height,
                TextureFormat::Depth(bits),
            ))
        });
        let id = RenderTargetId(self.allocate_id());
        let target = RenderTarget {
            id,
            color,
            depth,
            width: desc.width,
            height: desc.height,
        };
        self.targets.insert(id.0, target);
        self.commands.push(GpuCommand::CreateRenderTarget {
            target: id,
            label: desc.label.clone(),
            width: desc.width,
            height: desc.height,
        });
        Ok(target)
    }

    fn create_occlusion_query(&mut self) -> Result<QueryId, GpuError> {
        if !self.query_support {
            return Err(GpuError::Unsupported("occlusion queries"));
        }
        let query = QueryId(self.allocate_id());
        self.queries.insert(query.0);
        self.commands.push(GpuCommand::CreateQuery { query });
        Ok(query)
    }

    fn build_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId, GpuError> {
        if self.fail_programs {
            return Err(GpuError::ShaderBuild {
                label: desc.label.clone(),
                message: "scripted failure".into(),
            });
        }
        let program = ProgramId(self.allocate_id());
        self.programs.insert(program.0, desc.clone());
        self.commands.push(GpuCommand::BuildProgram { program, mode: desc.mode });
        Ok(program)
    }

    fn create_mesh(&mut self, vertices: &[WaterVertex], indices: &[u32]) -> Result<MeshId, GpuError> {
        self.check_allocation("water surface mesh", 1, 1)?;
        let mesh = MeshId(self.allocate_id());
        self.meshes.insert(mesh.0, (vertices.len(), indices.len()));
        self.commands.push(GpuCommand::CreateMesh {
            mesh,
            vertices: vertices.len(),
            indices: indices.len(),
        });
        Ok(mesh)
    }

    fn release_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture.0).is_some() {
            self.commands.push(GpuCommand::Release { kind: "texture", id: texture.0 });
        }
    }

    fn release_render_target(&mut self, target: &RenderTarget) {
        if self.targets.remove(&target.id.0).is_some() {
            self.textures.remove(&target.color.0);
            if let Some(depth) = target.depth {
                self.textures.remove(&depth.0);
            }
            self.commands.push(GpuCommand::Release { kind: "render target", id: target.id.0 });
        }
    }

    fn release_query(&mut self, query: QueryId) {
        if self.queries.remove(&query.0) {
            self.issued.remove(&query.0);
            self.commands.push(GpuCommand::Release { kind: "query", id: query.0 });
        }
    }

    fn release_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program.0).is_some() {
            self.commands.push(GpuCommand::Release { kind: "program", id: program.0 });
        }
    }

    fn release_mesh(&mut self, mesh: MeshId) {
        if self.meshes.remove(&mesh.0).is_some() {
            self.commands.push(GpuCommand::Release { kind: "mesh", id: mesh.0 });
        }
    }
}

impl WaterGpu for TraceGpu {
    fn occlusion_result(&mut self, query: QueryId) -> QueryResult {
        if !self.issued.contains(&query.0) {
            return QueryResult::Unavailable;
        }
        self.occlusion_script.pop_front().unwrap_or(self.default_occlusion)
    }

    fn issue_occlusion_query(&mut self, query: QueryId, bounds: &WaterBounds, _frame: &FrameUniforms) -> bool {
        if !self.queries.contains(&query.0) || self.busy_queries {
            return false;
        }
        self.issued.insert(query.0);
        self.commands.push(GpuCommand::OcclusionQuery { query, bounds: *bounds });
        true
    }

    fn begin_offscreen(&mut self, target: &RenderTarget, _clear_color: [f32; 4]) {
        self.commands.push(GpuCommand::BeginOffscreen { target: target.id });
    }

    fn end_offscreen(&mut self, target: &RenderTarget) {
        self.commands.push(GpuCommand::EndOffscreen { target: target.id });
    }

    fn copy_screen(&mut self, color: Option<TextureId>, depth: Option<TextureId>) {
        self.commands.push(GpuCommand::CopyScreen {
            color: color.is_some(),
            depth: depth.is_some(),
        });
    }

    fn blur(&mut self, target: &RenderTarget, _scratch: &RenderTarget, _base: f32, _exponent: f32) {
        self.commands.push(GpuCommand::Blur { target: target.id });
    }

    fn render_dynamic_waves(&mut self, target: &RenderTarget, _base: TextureId, step: &DynamicWaveStep) {
        self.commands.push(GpuCommand::DynamicWaves {
            target: target.id,
            phase: step.phase,
        });
    }

    fn set_water_params(&mut self, params: &WaterParams) {
        self.last_params = Some(*params);
        self.commands.push(GpuCommand::SetWaterParams);
    }

    fn draw_water(&mut self, draw: &WaterDraw) {
        self.commands.push(GpuCommand::DrawWater(draw.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_texture_writes_land_in_place() {
        let mut gpu = TraceGpu::new();
        let tex = gpu
            .create_texture(&TextureDesc::new("atlas", 4, 4, TextureFormat::R8Unorm))
            .unwrap();
        gpu.write_texture(tex, TexelRegion::new(1, 2, 2, 2), &[1, 2, 3, 4]).unwrap();
        let data = gpu.texture_data(tex).unwrap();
        assert_eq!(&data[8..12], &[0, 1, 2, 0]);
        assert_eq!(&data[12..16], &[0, 3, 4, 0]);
        assert!(gpu.write_texture(tex, TexelRegion::new(3, 3, 2, 1), &[0, 0]).is_err());
    }

    #[test]
    fn scripted_allocation_failures_match_labels() {
        let mut gpu = TraceGpu::new().with_max_texture_size(256);
        gpu.fail_allocations_matching("reflection");
        let desc = RenderTargetDesc {
            label: "water reflection".into(),
            width: 128,
            height: 128,
            color_format: TextureFormat::ScreenColor,
            depth: None,
        };
        assert!(matches!(gpu.create_render_target(&desc), Err(GpuError::Allocation { .. })));
        let big = TextureDesc::new("big", 512, 16, TextureFormat::R8Unorm);
        assert!(gpu.create_texture(&big).is_err());
        assert_eq!(gpu.live_resources(), 0);
    }

    #[test]
    fn releasing_a_target_frees_its_textures() {
        let mut gpu = TraceGpu::new();
        let target = gpu
            .create_render_target(&RenderTargetDesc {
                label: "refraction".into(),
                width: 8,
                height: 8,
                color_format: TextureFormat::ScreenColor,
                depth: Some(crate::config::DepthBits::D24),
            })
            .unwrap();
        assert_eq!(gpu.live_resources(), 3);
        gpu.release_render_target(&target);
        assert_eq!(gpu.live_resources(), 0);
    }

    #[test]
    fn occlusion_reads_follow_script_after_issue() {
        let mut gpu = TraceGpu::new();
        let query = gpu.create_occlusion_query().unwrap();
        assert_eq!(gpu.occlusion_result(query), QueryResult::Unavailable);
        gpu.script_occlusion([QueryResult::Ready(0), QueryResult::Pending]);
        let bounds = WaterBounds::new((8, 8), 0.0, false);
        assert!(gpu.issue_occlusion_query(query, &bounds, &FrameUniforms::default()));
        assert_eq!(gpu.occlusion_result(query), QueryResult::Ready(0));
        assert_eq!(gpu.occlusion_result(query), QueryResult::Pending);
        assert_eq!(gpu.occlusion_result(query), QueryResult::Ready(1));
    }
}
