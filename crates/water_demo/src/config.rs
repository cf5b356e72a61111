//! Demo configuration. Loaded from water_demo.ron at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use water::WaterConfig;

/// Which GPU backend the demo drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendChoice {
    /// wgpu when an adapter is found, the trace backend otherwise.
    Auto,
    Wgpu,
    Trace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub backend: BackendChoice,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Frames to render before exiting.
    pub frames: u32,
    /// Simulated seconds per frame.
    pub frame_time: f32,
    /// Cells per side of the generated island.
    pub map_size: u32,
    pub terrain_seed: u64,
    /// A crater or mound is dug every this many frames, 0 disables edits.
    pub edit_every: u32,
    pub water: WaterConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            screen_width: 1280,
            screen_height: 720,
            frames: 240,
            frame_time: 1.0 / 60.0,
            map_size: 256,
            terrain_seed: 7,
            edit_every: 30,
            water: WaterConfig {
                water_level: 2.0,
                dynamic_waves: true,
                ..WaterConfig::default()
            },
        }
    }
}

impl DemoConfig {
    /// Load from `path`. A missing file gives the defaults; an invalid one is
    /// reported and also gives the defaults.
    pub fn load(path: &Path) -> Self {
        let Ok(data) = std::fs::read_to_string(path) else {
            log::info!("No config at {:?}, using defaults", path);
            return Self::default();
        };
        match Self::parse(&data) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Invalid config at {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = ron::from_str(text)?;
        config.water.validate()?;
        anyhow::ensure!(config.map_size >= 2, "map_size must be at least 2, got {}", config.map_size);
        anyhow::ensure!(
            config.screen_width > 0 && config.screen_height > 0,
            "screen size must be positive"
        );
        Ok(config)
    }
}

/// `water_demo.ron` in the current directory, or the path given as the first
/// argument.
pub fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("water_demo.ron")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use water::ReflectionQuality;

    #[test]
    fn nested_water_section_overrides_defaults() {
        let config = DemoConfig::parse("(backend: Trace, frames: 10, water: (reflection: 1, water_level: 4.5))").unwrap();
        assert_eq!(config.backend, BackendChoice::Trace);
        assert_eq!(config.frames, 10);
        assert_eq!(config.water.reflection, ReflectionQuality::TerrainOnly);
        assert_eq!(config.water.water_level, 4.5);
        assert_eq!(config.map_size, 256);
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(DemoConfig::parse("(map_size: 1)").is_err());
        assert!(DemoConfig::parse("(water: (reflection: 7))").is_err());
        assert!(DemoConfig::parse("not ron").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = DemoConfig::load(Path::new("/nonexistent/water_demo.ron"));
        assert_eq!(config.frames, DemoConfig::default().frames);
    }
}
