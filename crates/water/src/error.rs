//! Error types for the water renderer.

use thiserror::Error;

/// Failures reported by a GPU backend.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to allocate {label} ({width}x{height}): {reason}")]
    Allocation {
        label: String,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("backend does not support {0}")]
    Unsupported(&'static str),

    #[error("shader program '{label}' failed to build: {message}")]
    ShaderBuild { label: String, message: String },

    #[error("unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u32 },
}

/// Errors that make the water renderer unusable.
#[derive(Debug, Error)]
pub enum WaterError {
    #[error("invalid coast atlas layout: {0}")]
    AtlasLayout(String),

    #[error("invalid water configuration: {0}")]
    InvalidConfig(String),

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    #[error("failed to parse water configuration: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),
}

/// Optional feature of the renderer that can be switched off at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Reflection,
    ReflectionBlur,
    Refraction,
    DepthCopy,
    ShoreWaves,
    ShoreWaveRandom,
    DynamicWaves,
    OcclusionQuery,
}

/// A feature the renderer disabled instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub feature: Feature,
    pub message: String,
}

impl Diagnostic {
    /// Record that `feature` was disabled because of `error`, and log it.
    pub fn degraded(feature: Feature, error: &GpuError) -> Self {
        log::warn!("Water {:?} disabled: {}", feature, error);
        Self {
            feature,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} disabled: {}", self.feature, self.message)
    }
}

pub type Result<T, E = WaterError> = std::result::Result<T, E>;
