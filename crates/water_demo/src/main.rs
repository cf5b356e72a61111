//! Water demo: renders the water over a generated island for a fixed number
//! of frames while the terrain is dug up, then prints what was rendered.

mod config;
mod headless;
mod scene;

use anyhow::Result;
use water::{ScenePass, TraceGpu, WaterRenderer};

use config::{config_path, BackendChoice, DemoConfig};
use headless::Headless;
use scene::{create_textures, drive, release_textures, DemoScene, DemoStats};

/// Drive the renderer on the recording backend; no GPU needed.
fn run_trace(config: &DemoConfig, scene: &mut DemoScene) -> Result<DemoStats> {
    let mut gpu = TraceGpu::new();
    let textures = create_textures(&mut gpu, config.terrain_seed)?;
    let mut renderer = WaterRenderer::new(
        &mut gpu,
        config.water.clone(),
        &scene.terrain,
        textures.clone(),
        (config.screen_width, config.screen_height),
    )?;
    for diagnostic in renderer.diagnostics() {
        log::warn!("{}", diagnostic);
    }

    let mut commands = 0usize;
    let stats = drive(config, scene, &mut renderer, |renderer, scene, camera, dt| {
        let mut no_scene = |_: &mut TraceGpu, _: &ScenePass| {};
        let report = renderer.render_frame(&mut gpu, &mut no_scene, &scene.terrain, camera, dt);
        commands += gpu.take_commands().len();
        report
    });

    renderer.shutdown(&mut gpu);
    release_textures(&mut gpu, &textures);
    log::info!("Trace backend recorded {} commands", commands);
    stats
}

/// Run `wgpu_run`, and on failure rerun a fresh scene on the trace backend.
fn with_trace_fallback<F>(config: &DemoConfig, scene: &mut DemoScene, wgpu_run: F) -> Result<DemoStats>
where
    F: FnOnce(&DemoConfig, &mut DemoScene) -> Result<DemoStats>,
{
    match wgpu_run(config, scene) {
        Ok(stats) => Ok(stats),
        Err(e) => {
            log::warn!("wgpu backend failed ({:#}), using the trace backend", e);
            *scene = DemoScene::new(config);
            run_trace(config, scene)
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DemoConfig::load(&config_path());
    let mut scene = DemoScene::new(&config);

    let stats = match config.backend {
        BackendChoice::Trace => run_trace(&config, &mut scene)?,
        BackendChoice::Wgpu => {
            let gpu = pollster::block_on(Headless::new(&config))?;
            headless::run(&config, &mut scene, gpu)?
        }
        BackendChoice::Auto => with_trace_fallback(&config, &mut scene, |config, scene| {
            let gpu = pollster::block_on(Headless::new(config)).map_err(|e| e.context("no GPU available"))?;
            headless::run(config, scene, gpu)
        })?,
    };

    println!("Rendered {} frames ({} with water drawn)", stats.frames, stats.drawn);
    println!(
        "  terrain edits: {}, coast tiles recomputed: {}, coast bytes uploaded: {}",
        stats.edits, stats.coast_tiles, stats.coast_bytes
    );
    println!(
        "  dynamic wave compositions: {}, reflections: {}, refractions: {}, program builds: {}",
        stats.wave_compositions, stats.reflections, stats.refractions, stats.program_builds
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_wgpu_run_falls_back_to_trace() {
        let mut config = DemoConfig {
            frames: 12,
            map_size: 64,
            edit_every: 5,
            ..DemoConfig::default()
        };
        config.water.coast_grid = (4, 4);
        config.water.coast_atlas_size = (128, 128);
        let mut scene = DemoScene::new(&config);

        let stats = with_trace_fallback(&config, &mut scene, |_, scene| {
            scene.step_edits();
            anyhow::bail!("water program rejected")
        })
        .unwrap();
        assert_eq!(stats.frames, 12);
        assert_eq!(stats.edits, 2);
    }

    #[test]
    fn successful_wgpu_run_is_kept() {
        let config = DemoConfig {
            map_size: 16,
            ..DemoConfig::default()
        };
        let mut scene = DemoScene::new(&config);
        let stats = with_trace_fallback(&config, &mut scene, |_, _| {
            Ok(DemoStats {
                frames: 3,
                ..DemoStats::default()
            })
        })
        .unwrap();
        assert_eq!(stats.frames, 3);
    }
}
