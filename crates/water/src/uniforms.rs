//! Shader parameter slots and the two ways of feeding them to the water
//! program: baked into the source as constants, or bound as a uniform array.
//!
//! Both modes expose the same accessor functions (`surface_color()`,
//! `fresnel_min()`, ...) to the shader body, so the body is written once and
//! sees identical values either way.

use std::fmt::Write as _;
use std::ops::{Index, IndexMut};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::config::MaterialConfig;
use crate::error::GpuError;
use crate::gpu::{GpuResources, ProgramDesc, ProgramId, WaterGpu};

/// Named parameter slot. The discriminant is the slot index in the uniform
/// array and never changes meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaterParam {
    SurfaceColor,
    PlaneColor,
    DiffuseColor,
    SpecularColor,
    SpecularPower,
    SpecularFactor,
    AmbientFactor,
    DiffuseFactor,
    FresnelMin,
    FresnelMax,
    FresnelPower,
    ReflectionDistortion,
    BlurBase,
    BlurExponent,
    PerlinStartFreq,
    PerlinLacunarity,
    PerlinAmplitude,
    WindSpeed,
    ShoreWaves,
    CoastTexGen,
    NormalTexGen,
    MapSize,
    SunDirection,
    WaterLevel,
    NormalTiles,
    Toggles,
}

impl WaterParam {
    pub const COUNT: usize = 26;

    pub const ALL: [WaterParam; Self::COUNT] = [
        Self::SurfaceColor,
        Self::PlaneColor,
        Self::DiffuseColor,
        Self::SpecularColor,
        Self::SpecularPower,
        Self::SpecularFactor,
        Self::AmbientFactor,
        Self::DiffuseFactor,
        Self::FresnelMin,
        Self::FresnelMax,
        Self::FresnelPower,
        Self::ReflectionDistortion,
        Self::BlurBase,
        Self::BlurExponent,
        Self::PerlinStartFreq,
        Self::PerlinLacunarity,
        Self::PerlinAmplitude,
        Self::WindSpeed,
        Self::ShoreWaves,
        Self::CoastTexGen,
        Self::NormalTexGen,
        Self::MapSize,
        Self::SunDirection,
        Self::WaterLevel,
        Self::NormalTiles,
        Self::Toggles,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Accessor function name in the shader.
    pub fn name(self) -> &'static str {
        match self {
            Self::SurfaceColor => "surface_color",
            Self::PlaneColor => "plane_color",
            Self::DiffuseColor => "diffuse_color",
            Self::SpecularColor => "specular_color",
            Self::SpecularPower => "specular_power",
            Self::SpecularFactor => "specular_factor",
            Self::AmbientFactor => "ambient_factor",
            Self::DiffuseFactor => "diffuse_factor",
            Self::FresnelMin => "fresnel_min",
            Self::FresnelMax => "fresnel_max",
            Self::FresnelPower => "fresnel_power",
            Self::ReflectionDistortion => "reflection_distortion",
            Self::BlurBase => "blur_base",
            Self::BlurExponent => "blur_exponent",
            Self::PerlinStartFreq => "perlin_start_freq",
            Self::PerlinLacunarity => "perlin_lacunarity",
            Self::PerlinAmplitude => "perlin_amplitude",
            Self::WindSpeed => "wind_speed",
            Self::ShoreWaves => "shore_waves",
            Self::CoastTexGen => "coast_tex_gen",
            Self::NormalTexGen => "normal_tex_gen",
            Self::MapSize => "map_size",
            Self::SunDirection => "sun_direction",
            Self::WaterLevel => "water_level",
            Self::NormalTiles => "normal_tiles",
            Self::Toggles => "toggles",
        }
    }

    /// Constant name used when baked.
    pub fn const_name(self) -> String {
        self.name().to_ascii_uppercase()
    }
}

/// One `vec4` per [`WaterParam`], laid out as the shader's uniform array.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct WaterParams {
    slots: [[f32; 4]; WaterParam::COUNT],
}

impl Default for WaterParams {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl Index<WaterParam> for WaterParams {
    type Output = [f32; 4];

    fn index(&self, param: WaterParam) -> &[f32; 4] {
        &self.slots[param.index()]
    }
}

impl IndexMut<WaterParam> for WaterParams {
    fn index_mut(&mut self, param: WaterParam) -> &mut [f32; 4] {
        &mut self.slots[param.index()]
    }
}

/// Which optional features the water program should use this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureToggles {
    pub reflection: bool,
    /// 0 off, 1 screen copy, 2 dedicated render.
    pub refraction: u8,
    pub shore_waves: bool,
    pub depth_blend: bool,
}

/// Everything the parameter slots are resolved from.
#[derive(Debug, Clone, Copy)]
pub struct ParamInputs<'a> {
    pub material: &'a MaterialConfig,
    pub map_size: (u32, u32),
    pub water_level: f32,
    pub sun_direction: Vec3,
    pub normal_tiles: (u32, u32),
    /// World position to coast atlas texture coordinate: `uv = xz * xy + zw`.
    pub coast_tex_gen: Vec4,
    pub toggles: FeatureToggles,
}

fn rgb(c: [f32; 3], w: f32) -> [f32; 4] {
    [c[0], c[1], c[2], w]
}

fn scalar(v: f32) -> [f32; 4] {
    [v, 0.0, 0.0, 0.0]
}

fn flag(on: bool) -> f32 {
    if on {
        1.0
    } else {
        0.0
    }
}

impl WaterParams {
    /// Resolve every slot.
    pub fn resolve(inputs: &ParamInputs<'_>) -> Self {
        use WaterParam::*;

        let m = inputs.material;
        let (w, h) = (inputs.map_size.0.max(1) as f32, inputs.map_size.1.max(1) as f32);
        let (tx, ty) = (inputs.normal_tiles.0.max(1) as f32, inputs.normal_tiles.1.max(1) as f32);
        let repeat = 1.0 / m.normal_repeat;
        let sun = inputs.sun_direction.normalize_or(Vec3::Y);
        let t = inputs.toggles;

        let mut p = Self::default();
        p[SurfaceColor] = rgb(m.surface_color, m.surface_alpha);
        p[PlaneColor] = rgb(m.plane_color, 0.0);
        p[DiffuseColor] = rgb(m.diffuse_color, 0.0);
        p[SpecularColor] = rgb(m.specular_color, 0.0);
        p[SpecularPower] = scalar(m.specular_power);
        p[SpecularFactor] = scalar(m.specular_factor);
        p[AmbientFactor] = scalar(m.ambient_factor);
        p[DiffuseFactor] = scalar(m.diffuse_factor);
        p[FresnelMin] = scalar(m.fresnel_min);
        p[FresnelMax] = scalar(m.fresnel_max);
        p[FresnelPower] = scalar(m.fresnel_power);
        p[ReflectionDistortion] = scalar(m.reflection_distortion);
        p[BlurBase] = scalar(m.blur_base);
        p[BlurExponent] = scalar(m.blur_exponent);
        p[PerlinStartFreq] = scalar(m.perlin_start_freq);
        p[PerlinLacunarity] = scalar(m.perlin_lacunarity);
        p[PerlinAmplitude] = scalar(m.perlin_amplitude);
        p[WindSpeed] = scalar(m.wind_speed);
        p[ShoreWaves] = [m.shore_wave_speed, m.shore_wave_scale, m.shore_foam_intensity, 0.0];
        p[CoastTexGen] = inputs.coast_tex_gen.to_array();
        p[NormalTexGen] = [repeat, repeat, 0.0, 0.0];
        p[MapSize] = [w, h, 1.0 / w, 1.0 / h];
        p[SunDirection] = [sun.x, sun.y, sun.z, 0.0];
        p[WaterLevel] = scalar(inputs.water_level);
        p[NormalTiles] = [tx, ty, 1.0 / tx, 1.0 / ty];
        p[Toggles] = [
            flag(t.reflection),
            t.refraction as f32,
            flag(t.shore_waves),
            flag(t.depth_blend),
        ];
        p
    }

    /// Recover baked values from a prelude produced in [`UniformMode::Baked`].
    pub fn from_baked_prelude(prelude: &str) -> Option<Self> {
        let mut params = Self::default();
        for param in WaterParam::ALL {
            let head = format!("const {}: vec4<f32> = vec4<f32>(", param.const_name());
            let line = prelude.lines().find_map(|l| l.trim().strip_prefix(head.as_str()))?;
            let args = line.strip_suffix(");")?;
            let mut values = args.split(',').map(|v| v.trim().parse::<f32>());
            for slot in params[param].iter_mut() {
                *slot = values.next()?.ok()?;
            }
        }
        Some(params)
    }
}

/// How parameters reach the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformMode {
    /// Uniform array written every frame; values may change freely.
    Runtime,
    /// Values compiled into the program as constants.
    Baked,
}

/// Shortest decimal that parses back to exactly `v`, as a WGSL literal.
fn wgsl_float(v: f32) -> String {
    if v.is_finite() {
        format!("{:?}", v)
    } else {
        "0.0".to_string()
    }
}

/// Shader source prelude declaring every parameter accessor for `mode`.
pub fn prelude(mode: UniformMode, params: &WaterParams) -> String {
    let mut src = String::new();
    let _ = writeln!(src, "const WATER_PARAM_COUNT: u32 = {}u;", WaterParam::COUNT);
    match mode {
        UniformMode::Runtime => {
            let _ = writeln!(src, "struct WaterParamBlock {{ slots: array<vec4<f32>, {}>, }}", WaterParam::COUNT);
            src.push_str("@group(0) @binding(1) var<uniform> water_params: WaterParamBlock;\n");
            for param in WaterParam::ALL {
                let _ = writeln!(
                    src,
                    "fn {}() -> vec4<f32> {{ return water_params.slots[{}]; }}",
                    param.name(),
                    param.index()
                );
            }
        }
        UniformMode::Baked => {
            for param in WaterParam::ALL {
                let [x, y, z, w] = params[param];
                let _ = writeln!(
                    src,
                    "const {}: vec4<f32> = vec4<f32>({}, {}, {}, {});",
                    param.const_name(),
                    wgsl_float(x),
                    wgsl_float(y),
                    wgsl_float(z),
                    wgsl_float(w)
                );
            }
            for param in WaterParam::ALL {
                let _ = writeln!(
                    src,
                    "fn {}() -> vec4<f32> {{ return {}; }}",
                    param.name(),
                    param.const_name()
                );
            }
        }
    }
    src
}

/// Per-frame values that are never baked.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// xyz = eye position, w = elapsed seconds.
    pub eye_pos: [f32; 4],
    /// xy = screen size, zw = 1 / screen size.
    pub screen: [f32; 4],
    /// xyz = wind vector, w = wind strength.
    pub wind: [f32; 4],
    /// x = frame counter, y = caustic frame index, z = dynamic wave phase.
    pub frame: [f32; 4],
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            eye_pos: [0.0; 4],
            screen: [1.0, 1.0, 1.0, 1.0],
            wind: [0.0; 4],
            frame: [0.0; 4],
        }
    }
}

/// Result of [`UniformBinder::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundProgram {
    pub program: ProgramId,
    pub rebuilt: bool,
}

/// Keeps the water program in sync with the parameter mode and, when baked,
/// with the parameter values.
#[derive(Debug)]
pub struct UniformBinder {
    mode: UniformMode,
    program: Option<ProgramId>,
    built_mode: Option<UniformMode>,
    baked: Option<WaterParams>,
    rebuilds: u32,
}

impl UniformBinder {
    pub fn new(mode: UniformMode) -> Self {
        Self {
            mode,
            program: None,
            built_mode: None,
            baked: None,
            rebuilds: 0,
        }
    }

    pub fn mode(&self) -> UniformMode {
        self.mode
    }

    /// Switch modes. The program is rebuilt once, on the next bind.
    pub fn set_mode(&mut self, mode: UniformMode) {
        if mode != self.mode {
            log::debug!("Water uniform mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
        }
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    /// Programs built so far.
    pub fn build_count(&self) -> u32 {
        self.rebuilds
    }

    pub fn needs_rebuild(&self, params: &WaterParams) -> bool {
        self.program.is_none()
            || self.built_mode != Some(self.mode)
            || (self.mode == UniformMode::Baked && self.baked.as_ref() != Some(params))
    }

    /// Build the program if it is missing or stale. Returns whether a build
    /// happened. The previous program survives a failed build.
    pub fn prepare<G: GpuResources + ?Sized>(&mut self, gpu: &mut G, params: &WaterParams) -> Result<bool, GpuError> {
        if !self.needs_rebuild(params) {
            return Ok(false);
        }
        let desc = ProgramDesc {
            label: format!("water ({:?})", self.mode),
            prelude: prelude(self.mode, params),
            mode: self.mode,
        };
        let program = gpu.build_program(&desc)?;
        if let Some(old) = self.program.replace(program) {
            gpu.release_program(old);
        }
        self.built_mode = Some(self.mode);
        self.baked = (self.mode == UniformMode::Baked).then_some(*params);
        self.rebuilds += 1;
        log::debug!("Built water program {:?} ({:?}, build #{})", program, self.mode, self.rebuilds);
        Ok(true)
    }

    /// Make `params` visible to the next water draw.
    pub fn bind<G: WaterGpu + ?Sized>(&mut self, gpu: &mut G, params: &WaterParams) -> Result<BoundProgram, GpuError> {
        let rebuilt = self.prepare(gpu, params)?;
        let program = self.program.ok_or(GpuError::InvalidHandle { kind: "program", id: 0 })?;
        if self.mode == UniformMode::Runtime {
            gpu.set_water_params(params);
        }
        Ok(BoundProgram { program, rebuilt })
    }

    pub fn release<G: GpuResources + ?Sized>(&mut self, gpu: &mut G) {
        if let Some(program) = self.program.take() {
            gpu.release_program(program);
        }
        self.built_mode = None;
        self.baked = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::trace::{GpuCommand, TraceGpu};

    fn sample_params() -> WaterParams {
        let material = MaterialConfig::default();
        WaterParams::resolve(&ParamInputs {
            material: &material,
            map_size: (512, 256),
            water_level: -1.25,
            sun_direction: Vec3::new(0.3, 1.0, 0.2),
            normal_tiles: (2, 2),
            coast_tex_gen: Vec4::new(1.0 / 512.0, 1.0 / 256.0, 0.0, 0.0),
            toggles: FeatureToggles {
                reflection: true,
                refraction: 2,
                shore_waves: true,
                depth_blend: true,
            },
        })
    }

    #[test]
    fn slots_have_stable_unique_indices_and_names() {
        for (i, param) in WaterParam::ALL.iter().enumerate() {
            assert_eq!(param.index(), i);
        }
        let mut names: Vec<_> = WaterParam::ALL.iter().map(|p| p.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), WaterParam::COUNT);
        assert_eq!(std::mem::size_of::<WaterParams>(), WaterParam::COUNT * 16);
    }

    #[test]
    fn resolve_fills_toggles_and_map_size() {
        let p = sample_params();
        assert_eq!(p[WaterParam::Toggles], [1.0, 2.0, 1.0, 1.0]);
        assert_eq!(p[WaterParam::MapSize][0], 512.0);
        assert_eq!(p[WaterParam::WaterLevel][0], -1.25);
        let sun = Vec3::from_slice(&p[WaterParam::SunDirection][..3]);
        assert!((sun.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn runtime_prelude_reads_the_uniform_array() {
        let src = prelude(UniformMode::Runtime, &sample_params());
        assert!(src.contains("var<uniform> water_params"));
        for param in WaterParam::ALL {
            let accessor = format!("fn {}() -> vec4<f32> {{ return water_params.slots[{}]; }}", param.name(), param.index());
            assert!(src.contains(&accessor), "missing {}", accessor);
        }
    }

    #[test]
    fn baked_literals_round_trip_exactly() {
        let mut params = sample_params();
        params[WaterParam::FresnelMin] = [0.1, 1.0 / 3.0, 1e-7, -3.402_823_5e38];
        params[WaterParam::PlaneColor] = [f32::NAN, f32::INFINITY, 0.0, -0.0];
        let src = prelude(UniformMode::Baked, &params);
        assert!(!src.contains("var<uniform>"));

        let parsed = WaterParams::from_baked_prelude(&src).expect("baked prelude parses");
        assert_eq!(parsed[WaterParam::FresnelMin], params[WaterParam::FresnelMin]);
        assert_eq!(parsed[WaterParam::PlaneColor][..3], [0.0, 0.0, 0.0]);
        for param in WaterParam::ALL {
            if param != WaterParam::PlaneColor {
                assert_eq!(parsed[param], params[param], "{:?}", param);
            }
        }
    }

    #[test]
    fn both_modes_declare_the_same_accessors() {
        let params = sample_params();
        let runtime = prelude(UniformMode::Runtime, &params);
        let baked = prelude(UniformMode::Baked, &params);
        for param in WaterParam::ALL {
            let signature = format!("fn {}() -> vec4<f32>", param.name());
            assert!(runtime.contains(&signature));
            assert!(baked.contains(&signature));
        }
    }

    #[test]
    fn mode_switch_rebuilds_exactly_once() {
        let mut gpu = TraceGpu::new();
        let mut binder = UniformBinder::new(UniformMode::Baked);
        let params = sample_params();

        assert!(binder.bind(&mut gpu, &params).unwrap().rebuilt);
        assert!(!binder.bind(&mut gpu, &params).unwrap().rebuilt);

        binder.set_mode(UniformMode::Runtime);
        binder.set_mode(UniformMode::Baked);
        binder.set_mode(UniformMode::Runtime);
        assert!(binder.bind(&mut gpu, &params).unwrap().rebuilt);
        assert!(!binder.bind(&mut gpu, &params).unwrap().rebuilt);
        assert_eq!(binder.build_count(), 2);
        assert_eq!(gpu.live_programs(), 1);
    }

    #[test]
    fn baked_value_change_rebuilds_runtime_change_rebinds() {
        let mut gpu = TraceGpu::new();
        let mut params = sample_params();

        let mut baked = UniformBinder::new(UniformMode::Baked);
        baked.bind(&mut gpu, &params).unwrap();
        params[WaterParam::SunDirection] = [0.0, 1.0, 0.0, 0.0];
        assert!(baked.bind(&mut gpu, &params).unwrap().rebuilt);
        assert_eq!(baked.build_count(), 2);

        gpu.take_commands();
        let mut runtime = UniformBinder::new(UniformMode::Runtime);
        runtime.bind(&mut gpu, &params).unwrap();
        params[WaterParam::SunDirection] = [1.0, 0.0, 0.0, 0.0];
        assert!(!runtime.bind(&mut gpu, &params).unwrap().rebuilt);
        let writes = gpu
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::SetWaterParams))
            .count();
        assert_eq!(writes, 2);
        assert_eq!(gpu.last_water_params(), Some(&params));
    }

    #[test]
    fn failed_build_keeps_previous_program() {
        let mut gpu = TraceGpu::new();
        let mut binder = UniformBinder::new(UniformMode::Baked);
        let mut params = sample_params();
        let first = binder.bind(&mut gpu, &params).unwrap().program;

        gpu.fail_program_builds(true);
        params[WaterParam::WaterLevel] = [5.0, 0.0, 0.0, 0.0];
        assert!(binder.bind(&mut gpu, &params).is_err());
        assert_eq!(binder.program(), Some(first));
    }
}
