//! Animated wave normal map composed from a tiled base texture.
//!
//! Every output tile cross-fades between two tiles of the base set while
//! sliding along the wind. When the fade completes the tile picks a new
//! target, so the surface never settles into a visible loop.

use engine_core::FixedStep;
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::GpuError;
use crate::gpu::{DynamicWaveStep, GpuResources, RenderTarget, RenderTargetDesc, TextureFormat, TextureId, WaterGpu, WaveSlot};

/// Phase advanced per second of wave time.
const PHASE_RATE: f32 = 0.5;
/// Tile offset drift per second along the wind, in tile widths.
const DRIFT_RATE: f32 = 0.05;

/// Base texture the generator composes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveTileSet {
    pub texture: TextureId,
    pub size: (u32, u32),
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl WaveTileSet {
    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }
}

#[derive(Debug)]
pub struct DynamicWaveGenerator {
    enabled: bool,
    cadence: FixedStep,
    phase: f32,
    base: Option<WaveTileSet>,
    target: Option<RenderTarget>,
    slots: Vec<WaveSlot>,
    rng: StdRng,
    rendered: bool,
    compositions: u64,
}

impl DynamicWaveGenerator {
    pub fn new(enabled: bool, interval: f32, seed: u64) -> Self {
        Self {
            enabled,
            cadence: FixedStep::new(interval),
            phase: 0.0,
            base: None,
            target: None,
            slots: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            rendered: false,
            compositions: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn compositions(&self) -> u64 {
        self.compositions
    }

    pub fn slots(&self) -> &[WaveSlot] {
        &self.slots
    }

    /// Record the base tile set and allocate the output target. A set with a
    /// single tile has nothing to blend and leaves the generator disabled.
    pub fn initialize<G: GpuResources + ?Sized>(&mut self, gpu: &mut G, base: WaveTileSet) -> Result<(), GpuError> {
        self.base = Some(base);
        if !self.enabled {
            return Ok(());
        }
        if base.tile_count() < 2 {
            log::warn!(
                "Dynamic waves need a normal tile set, got {}x{} tiles; disabled",
                base.tiles_x,
                base.tiles_y
            );
            self.enabled = false;
            return Ok(());
        }

        let target = gpu.create_render_target(&RenderTargetDesc {
            label: "dynamic waves".into(),
            width: base.size.0,
            height: base.size.1,
            color_format: TextureFormat::Rgba8Unorm,
            depth: None,
        })?;
        self.target = Some(target);

        let count = base.tile_count();
        let slots = (0..count)
            .map(|i| WaveSlot {
                from_tile: i,
                to_tile: self.pick_other(i, count),
                offset: Vec2::new(self.rng.gen(), self.rng.gen()),
            })
            .collect();
        self.slots = slots;
        self.phase = 0.0;
        self.cadence.reset();
        log::debug!("Dynamic waves over {} base tiles", count);
        Ok(())
    }

    fn pick_other(&mut self, tile: u32, count: u32) -> u32 {
        (tile + self.rng.gen_range(1..count)) % count
    }

    /// Advance by `dt` seconds and compose a new texture when due. Returns
    /// whether a composition was issued.
    pub fn update<G: WaterGpu + ?Sized>(&mut self, gpu: &mut G, dt: f32, wind_dir: Vec2) -> bool {
        if !self.enabled {
            return false;
        }
        let (Some(base), Some(target)) = (self.base, self.target) else {
            return false;
        };
        if !self.cadence.tick(dt) {
            return false;
        }

        let step = self.cadence.interval();
        let drift = wind_dir.normalize_or_zero() * DRIFT_RATE * step;
        for slot in &mut self.slots {
            slot.offset = (slot.offset + drift).fract_gl();
        }
        self.phase += PHASE_RATE * step;
        if self.phase >= 1.0 {
            self.phase = self.phase.fract();
            let count = base.tile_count();
            for i in 0..self.slots.len() {
                let from = self.slots[i].to_tile;
                let to = self.pick_other(from, count);
                self.slots[i].from_tile = from;
                self.slots[i].to_tile = to;
            }
        }

        gpu.render_dynamic_waves(
            &target,
            base.texture,
            &DynamicWaveStep {
                phase: self.phase,
                tiles_x: base.tiles_x,
                tiles_y: base.tiles_y,
                slots: self.slots.clone(),
            },
        );
        self.rendered = true;
        self.compositions += 1;
        log::trace!("Dynamic waves composed, phase {:.3}", self.phase);
        true
    }

    /// Normal map for the final draw.
    pub fn output(&self) -> Option<TextureId> {
        match (self.rendered, self.target) {
            (true, Some(target)) => Some(target.color),
            _ => self.base.map(|b| b.texture),
        }
    }

    pub fn release<G: GpuResources + ?Sized>(&mut self, gpu: &mut G) {
        if let Some(target) = self.target.take() {
            gpu.release_render_target(&target);
        }
        self.rendered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::trace::{GpuCommand, TraceGpu};
    use crate::gpu::{TextureDesc, TextureFormat};

    fn tile_set(gpu: &mut TraceGpu, tiles: (u32, u32)) -> WaveTileSet {
        let size = (64 * tiles.0, 64 * tiles.1);
        let texture = gpu
            .create_texture(&TextureDesc::new("wave normals", size.0, size.1, TextureFormat::Rgba8Unorm))
            .unwrap();
        WaveTileSet {
            texture,
            size,
            tiles_x: tiles.0,
            tiles_y: tiles.1,
        }
    }

    #[test]
    fn composes_on_a_fixed_cadence() {
        let mut gpu = TraceGpu::new();
        let base = tile_set(&mut gpu, (2, 2));
        let mut waves = DynamicWaveGenerator::new(true, 0.25, 1);
        waves.initialize(&mut gpu, base).unwrap();
        assert_eq!(waves.output(), Some(base.texture));

        let fired: Vec<bool> = (0..7).map(|_| waves.update(&mut gpu, 0.093_75, Vec2::X)).collect();
        assert_eq!(fired, vec![true, false, true, false, false, true, false]);
        assert_eq!(waves.compositions(), 3);
        assert_ne!(waves.output(), Some(base.texture));

        let renders = gpu
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::DynamicWaves { .. }))
            .count();
        assert_eq!(renders, 3);
    }

    #[test]
    fn long_stall_does_not_burst() {
        let mut gpu = TraceGpu::new();
        let base = tile_set(&mut gpu, (2, 1));
        let mut waves = DynamicWaveGenerator::new(true, 0.25, 1);
        waves.initialize(&mut gpu, base).unwrap();
        waves.update(&mut gpu, 0.0, Vec2::X);
        let before = waves.compositions();
        assert!(waves.update(&mut gpu, 30.0, Vec2::X));
        assert_eq!(waves.compositions(), before + 1);
    }

    #[test]
    fn phase_wrap_rotates_source_tiles() {
        let mut gpu = TraceGpu::new();
        let base = tile_set(&mut gpu, (2, 2));
        let mut waves = DynamicWaveGenerator::new(true, 0.5, 9);
        waves.initialize(&mut gpu, base).unwrap();
        let targets: Vec<u32> = waves.slots().iter().map(|s| s.to_tile).collect();
        for slot in waves.slots() {
            assert_ne!(slot.from_tile, slot.to_tile);
        }

        // 0.5 s steps advance the phase by 0.25: the fourth step wraps.
        for _ in 0..4 {
            assert!(waves.update(&mut gpu, 0.5, Vec2::new(1.0, 1.0)));
        }
        assert!(waves.phase() < 1.0);
        let from: Vec<u32> = waves.slots().iter().map(|s| s.from_tile).collect();
        assert_eq!(from, targets);
        for slot in waves.slots() {
            assert_ne!(slot.from_tile, slot.to_tile);
            assert!((0.0..1.0).contains(&slot.offset.x));
        }
    }

    #[test]
    fn single_tile_base_disables_the_feature() {
        let mut gpu = TraceGpu::new();
        let base = tile_set(&mut gpu, (1, 1));
        let mut waves = DynamicWaveGenerator::new(true, 0.25, 1);
        waves.initialize(&mut gpu, base).unwrap();
        assert!(!waves.is_enabled());
        assert!(!waves.update(&mut gpu, 1.0, Vec2::X));
        assert_eq!(waves.output(), Some(base.texture));
        assert_eq!(gpu.live_resources(), 1);
    }

    #[test]
    fn allocation_failure_propagates() {
        let mut gpu = TraceGpu::new();
        let base = tile_set(&mut gpu, (2, 2));
        gpu.fail_allocations_matching("dynamic waves");
        let mut waves = DynamicWaveGenerator::new(true, 0.25, 1);
        assert!(waves.initialize(&mut gpu, base).is_err());
    }

    #[test]
    fn same_seed_same_animation() {
        let run = || {
            let mut gpu = TraceGpu::new();
            let base = tile_set(&mut gpu, (2, 2));
            let mut waves = DynamicWaveGenerator::new(true, 0.25, 42);
            waves.initialize(&mut gpu, base).unwrap();
            for _ in 0..10 {
                waves.update(&mut gpu, 0.25, Vec2::new(0.3, -0.7));
            }
            waves.slots().to_vec()
        };
        assert_eq!(run(), run());
    }
}
