//! Water renderer configuration. Read once at construction, usually from a
//! `.ron` file.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WaterError};

/// Reflection quality: what the mirrored scene pass draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReflectionQuality {
    /// No reflection pass; no target allocated.
    Off,
    /// Mirrored terrain only.
    TerrainOnly,
    /// Mirrored terrain and models.
    Full,
}

impl TryFrom<u8> for ReflectionQuality {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::TerrainOnly),
            2 => Ok(Self::Full),
            other => Err(format!("reflection must be 0, 1 or 2, got {}", other)),
        }
    }
}

impl From<ReflectionQuality> for u8 {
    fn from(value: ReflectionQuality) -> Self {
        match value {
            ReflectionQuality::Off => 0,
            ReflectionQuality::TerrainOnly => 1,
            ReflectionQuality::Full => 2,
        }
    }
}

/// How the refracted (underwater) image is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RefractionMode {
    Off,
    /// Copy of the already rendered screen.
    ScreenCopy,
    /// Separate screen-sized render clipped below the water plane.
    Dedicated,
}

impl TryFrom<u8> for RefractionMode {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::ScreenCopy),
            2 => Ok(Self::Dedicated),
            other => Err(format!("refraction must be 0, 1 or 2, got {}", other)),
        }
    }
}

impl From<RefractionMode> for u8 {
    fn from(value: RefractionMode) -> Self {
        match value {
            RefractionMode::Off => 0,
            RefractionMode::ScreenCopy => 1,
            RefractionMode::Dedicated => 2,
        }
    }
}

/// Depth buffer precision for off-screen targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DepthBits {
    D16,
    D24,
    D32,
}

impl TryFrom<u8> for DepthBits {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            16 => Ok(Self::D16),
            24 => Ok(Self::D24),
            32 => Ok(Self::D32),
            other => Err(format!("depth_bits must be 16, 24 or 32, got {}", other)),
        }
    }
}

impl From<DepthBits> for u8 {
    fn from(value: DepthBits) -> Self {
        match value {
            DepthBits::D16 => 16,
            DepthBits::D24 => 24,
            DepthBits::D32 => 32,
        }
    }
}

/// Look of the water surface. Every field feeds one shader parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    pub surface_color: [f32; 3],
    pub surface_alpha: f32,
    /// Colour of the underwater plane seen where there is no terrain.
    pub plane_color: [f32; 3],
    pub diffuse_color: [f32; 3],
    pub specular_color: [f32; 3],
    pub specular_power: f32,
    pub specular_factor: f32,
    pub ambient_factor: f32,
    pub diffuse_factor: f32,
    pub fresnel_min: f32,
    pub fresnel_max: f32,
    pub fresnel_power: f32,
    pub reflection_distortion: f32,
    pub blur_base: f32,
    pub blur_exponent: f32,
    pub perlin_start_freq: f32,
    pub perlin_lacunarity: f32,
    pub perlin_amplitude: f32,
    pub wind_speed: f32,
    pub shore_wave_speed: f32,
    pub shore_wave_scale: f32,
    pub shore_foam_intensity: f32,
    /// World units covered by one repeat of the wave normal map.
    pub normal_repeat: f32,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            surface_color: [0.75, 0.8, 0.85],
            surface_alpha: 0.55,
            plane_color: [0.0, 0.4, 0.0],
            diffuse_color: [1.0, 1.0, 1.0],
            specular_color: [0.8, 0.8, 0.8],
            specular_power: 20.0,
            specular_factor: 1.0,
            ambient_factor: 1.0,
            diffuse_factor: 1.0,
            fresnel_min: 0.2,
            fresnel_max: 0.8,
            fresnel_power: 4.0,
            reflection_distortion: 1.0,
            blur_base: 2.0,
            blur_exponent: 1.5,
            perlin_start_freq: 8.0,
            perlin_lacunarity: 3.0,
            perlin_amplitude: 0.9,
            wind_speed: 1.0,
            shore_wave_speed: 0.5,
            shore_wave_scale: 1.0,
            shore_foam_intensity: 1.0,
            normal_repeat: 64.0,
        }
    }
}

impl MaterialConfig {
    /// Name of the first field holding a NaN or infinity.
    pub fn non_finite_field(&self) -> Option<&'static str> {
        let colors = [
            ("surface_color", self.surface_color),
            ("plane_color", self.plane_color),
            ("diffuse_color", self.diffuse_color),
            ("specular_color", self.specular_color),
        ];
        let scalars = [
            ("surface_alpha", self.surface_alpha),
            ("specular_power", self.specular_power),
            ("specular_factor", self.specular_factor),
            ("ambient_factor", self.ambient_factor),
            ("diffuse_factor", self.diffuse_factor),
            ("fresnel_min", self.fresnel_min),
            ("fresnel_max", self.fresnel_max),
            ("fresnel_power", self.fresnel_power),
            ("reflection_distortion", self.reflection_distortion),
            ("blur_base", self.blur_base),
            ("blur_exponent", self.blur_exponent),
            ("perlin_start_freq", self.perlin_start_freq),
            ("perlin_lacunarity", self.perlin_lacunarity),
            ("perlin_amplitude", self.perlin_amplitude),
            ("wind_speed", self.wind_speed),
            ("shore_wave_speed", self.shore_wave_speed),
            ("shore_wave_scale", self.shore_wave_scale),
            ("shore_foam_intensity", self.shore_foam_intensity),
            ("normal_repeat", self.normal_repeat),
        ];
        colors
            .into_iter()
            .find(|(_, c)| c.iter().any(|v| !v.is_finite()))
            .map(|(name, _)| name)
            .or_else(|| scalars.into_iter().find(|(_, v)| !v.is_finite()).map(|(name, _)| name))
    }
}

/// Renderer options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterConfig {
    #[serde(default = "default_reflection")]
    pub reflection: ReflectionQuality,
    #[serde(default = "default_refraction")]
    pub refraction: RefractionMode,
    /// Edge length of the square reflection target.
    #[serde(default = "default_reflection_texture_size")]
    pub reflection_texture_size: u32,
    /// Copy scene depth for the deep/shallow blend.
    #[serde(default = "default_true")]
    pub use_depth_copy: bool,
    /// Anisotropic filtering for the wave normal map, 0 disables it.
    #[serde(default)]
    pub anisotropy: f32,
    #[serde(default = "default_depth_bits")]
    pub depth_bits: DepthBits,
    #[serde(default)]
    pub blur_reflection: bool,
    #[serde(default = "default_true")]
    pub shore_waves: bool,
    /// Extend the water surface far beyond the map edges.
    #[serde(default = "default_true")]
    pub endless_ocean: bool,
    #[serde(default)]
    pub dynamic_waves: bool,
    /// Write parameters every frame instead of baking them into the shader.
    #[serde(default)]
    pub use_runtime_uniforms: bool,
    #[serde(default)]
    pub water_level: f32,
    /// Coast atlas tiles per axis.
    #[serde(default = "default_coast_grid")]
    pub coast_grid: (u32, u32),
    /// Coast atlas texture size in texels.
    #[serde(default = "default_coast_atlas_size")]
    pub coast_atlas_size: (u32, u32),
    /// Distance field search radius in atlas texels.
    #[serde(default = "default_coast_max_distance")]
    pub coast_max_distance: u32,
    /// Seconds between dynamic wave compositions.
    #[serde(default = "default_dynamic_wave_interval")]
    pub dynamic_wave_interval: f32,
    #[serde(default)]
    pub dynamic_wave_seed: u64,
    #[serde(default)]
    pub material: MaterialConfig,
}

fn default_reflection() -> ReflectionQuality {
    ReflectionQuality::TerrainOnly
}
fn default_refraction() -> RefractionMode {
    RefractionMode::ScreenCopy
}
fn default_reflection_texture_size() -> u32 {
    512
}
fn default_true() -> bool {
    true
}
fn default_depth_bits() -> DepthBits {
    DepthBits::D24
}
fn default_coast_grid() -> (u32, u32) {
    (8, 8)
}
fn default_coast_atlas_size() -> (u32, u32) {
    (512, 512)
}
fn default_coast_max_distance() -> u32 {
    8
}
fn default_dynamic_wave_interval() -> f32 {
    0.25
}

impl Default for WaterConfig {
    fn default() -> Self {
        Self {
            reflection: default_reflection(),
            refraction: default_refraction(),
            reflection_texture_size: default_reflection_texture_size(),
            use_depth_copy: true,
            anisotropy: 0.0,
            depth_bits: default_depth_bits(),
            blur_reflection: false,
            shore_waves: true,
            endless_ocean: true,
            dynamic_waves: false,
            use_runtime_uniforms: false,
            water_level: 0.0,
            coast_grid: default_coast_grid(),
            coast_atlas_size: default_coast_atlas_size(),
            coast_max_distance: default_coast_max_distance(),
            dynamic_wave_interval: default_dynamic_wave_interval(),
            dynamic_wave_seed: 0,
            material: MaterialConfig::default(),
        }
    }
}

impl WaterConfig {
    /// Parse a configuration from RON text. Missing fields take defaults.
    pub fn from_ron(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the renderer cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(WaterError::InvalidConfig(msg));
        if self.reflection != ReflectionQuality::Off && self.reflection_texture_size == 0 {
            return invalid("reflection_texture_size must be positive".into());
        }
        if !self.anisotropy.is_finite() || self.anisotropy < 0.0 {
            return invalid(format!("anisotropy must be >= 0, got {}", self.anisotropy));
        }
        if !self.water_level.is_finite() {
            return invalid("water_level must be finite".into());
        }
        if self.dynamic_waves && !(self.dynamic_wave_interval > 0.0) {
            return invalid(format!(
                "dynamic_wave_interval must be positive, got {}",
                self.dynamic_wave_interval
            ));
        }
        if self.shore_waves && self.coast_max_distance == 0 {
            return invalid("coast_max_distance must be at least 1".into());
        }
        if let Some(field) = self.material.non_finite_field() {
            return invalid(format!("material.{} must be finite", field));
        }
        if self.material.normal_repeat <= 0.0 {
            return invalid("material.normal_repeat must be positive".into());
        }
        Ok(())
    }

    /// Anisotropy clamp as the integer level samplers take, 1 meaning off.
    pub fn anisotropy_level(&self) -> u16 {
        (self.anisotropy.round() as u16).clamp(1, 16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_ron_fills_defaults() {
        let config = WaterConfig::from_ron("(reflection: 2, refraction: 0, depth_bits: 16)").unwrap();
        assert_eq!(config.reflection, ReflectionQuality::Full);
        assert_eq!(config.refraction, RefractionMode::Off);
        assert_eq!(config.depth_bits, DepthBits::D16);
        assert_eq!(config.reflection_texture_size, 512);
        assert!(config.shore_waves);
        assert_eq!(config.material, MaterialConfig::default());
    }

    #[test]
    fn non_finite_material_values_are_rejected() {
        let err = WaterConfig::from_ron("(material: (specular_power: inf))").unwrap_err();
        assert!(matches!(&err, WaterError::InvalidConfig(msg) if msg.contains("specular_power")));
        let err = WaterConfig::from_ron("(material: (normal_repeat: NaN))").unwrap_err();
        assert!(matches!(&err, WaterError::InvalidConfig(msg) if msg.contains("normal_repeat")));

        let mut config = WaterConfig::default();
        config.material.surface_color[1] = f32::NEG_INFINITY;
        assert!(config.validate().is_err());
        assert_eq!(MaterialConfig::default().non_finite_field(), None);
    }

    #[test]
    fn out_of_range_options_are_rejected() {
        assert!(matches!(
            WaterConfig::from_ron("(reflection: 3)"),
            Err(WaterError::ConfigParse(_))
        ));
        assert!(matches!(
            WaterConfig::from_ron("(depth_bits: 12)"),
            Err(WaterError::ConfigParse(_))
        ));
        assert!(matches!(
            WaterConfig::from_ron("(refraction: 7)"),
            Err(WaterError::ConfigParse(_))
        ));
    }

    #[test]
    fn inconsistent_values_fail_validation() {
        assert!(matches!(
            WaterConfig::from_ron("(shore_waves: true, coast_max_distance: 0)"),
            Err(WaterError::InvalidConfig(_))
        ));
        assert!(matches!(
            WaterConfig::from_ron("(dynamic_waves: true, dynamic_wave_interval: 0.0)"),
            Err(WaterError::InvalidConfig(_))
        ));
        assert!(WaterConfig::from_ron("(shore_waves: false, coast_max_distance: 0)").is_ok());
    }

    #[test]
    fn enumerated_options_serialize_as_integers() {
        let text = ron::to_string(&WaterConfig::default()).unwrap();
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        assert!(compact.contains("reflection:1,"), "{}", text);
        assert!(compact.contains("depth_bits:24,"), "{}", text);
        let back = WaterConfig::from_ron(&text).unwrap();
        assert_eq!(back, WaterConfig::default());
    }

    #[test]
    fn anisotropy_level_is_clamped() {
        let mut config = WaterConfig::default();
        assert_eq!(config.anisotropy_level(), 1);
        config.anisotropy = 8.0;
        assert_eq!(config.anisotropy_level(), 8);
        config.anisotropy = 64.0;
        assert_eq!(config.anisotropy_level(), 16);
    }
}
