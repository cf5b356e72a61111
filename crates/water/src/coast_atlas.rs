//! Packed atlas of coastline distance fields.
//!
//! The terrain is cut into a fixed grid of regions; each region owns one tile
//! of a single-channel atlas texture. A tile stores, per texel, the signed
//! distance to the nearest shoreline (positive on land), which the water
//! shader turns into shore waves and foam. Height-map edits only recompute the
//! tiles they can influence.

use engine_core::{HeightField, IRect, RectangleOverlapHandler};
use glam::Vec4;

use crate::error::{GpuError, Result, WaterError};
use crate::gpu::{GpuResources, TexelRegion, TextureDesc, TextureFormat, TextureId};

/// Narrowest tile edge, in texels, the layout accepts.
pub const MIN_TILE_TEXELS: u32 = 4;

/// Texel value of tiles that contain no shoreline.
pub const ALL_LAND: u8 = 255;
pub const ALL_WATER: u8 = 0;

/// Fixed parameters of an atlas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoastAtlasLayout {
    /// Tiles per axis.
    pub grid: (u32, u32),
    /// Atlas texture size in texels.
    pub atlas_size: (u32, u32),
    /// Terrain size in height cells.
    pub map_size: (u32, u32),
    /// Distance field search radius in texels.
    pub max_distance: u32,
    pub water_level: f32,
}

/// One tile of the atlas.
#[derive(Debug, Clone)]
pub struct CoastAtlasRect {
    pub index: usize,
    /// Texel bounds inside the atlas.
    pub atlas: IRect,
    /// Terrain region the tile covers.
    pub world: IRect,
    /// Texture coordinate bounds `(tx1, ty1, tx2, ty2)`.
    pub tex: Vec4,
    /// Whether the last recompute found both land and water around the tile.
    pub is_coastline: bool,
    staging: Vec<u8>,
    upload_pending: bool,
}

impl CoastAtlasRect {
    pub fn xsize(&self) -> u32 {
        self.atlas.width() as u32
    }

    pub fn ysize(&self) -> u32 {
        self.atlas.height() as u32
    }

    /// Encoded distance field, row-major, `xsize * ysize` bytes.
    pub fn staging(&self) -> &[u8] {
        &self.staging
    }

    pub fn upload_pending(&self) -> bool {
        self.upload_pending
    }

    /// World units per atlas texel, horizontally and vertically.
    fn texel_scale(&self) -> (f32, f32) {
        (
            self.world.width() as f32 / self.xsize() as f32,
            self.world.height() as f32 / self.ysize() as f32,
        )
    }
}

/// What an [`CoastAtlas::upload`] call wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub tiles: usize,
    pub bytes: usize,
    pub full: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TileClass {
    Land,
    Water,
    Coast,
}

/// Grid boundary `i` of `cells` over `size`.
fn split(i: u32, size: u32, cells: u32) -> i32 {
    (i as u64 * size as u64 / cells as u64) as i32
}

/// Signed distance encoded to a texel.
pub fn encode_distance(distance: f32, max_distance: u32) -> u8 {
    let normalized = 0.5 + 0.5 * distance / max_distance as f32;
    (normalized * 255.0).round().clamp(0.0, 255.0) as u8
}

#[derive(Debug)]
pub struct CoastAtlas {
    layout: CoastAtlasLayout,
    tiles: Vec<CoastAtlasRect>,
    edits: RectangleOverlapHandler,
    /// Edit expansion, in height cells, covering every sample a tile reads.
    apron: i32,
    full_upload_pending: bool,
    texture: Option<TextureId>,
}

impl CoastAtlas {
    /// Compute the tile layout. Fails when the layout cannot work with a
    /// backend limited to `max_texture_size` texels per side.
    pub fn new(layout: CoastAtlasLayout, max_texture_size: u32) -> Result<Self> {
        let bad = |msg: String| Err(WaterError::AtlasLayout(msg));
        let (gx, gy) = layout.grid;
        let (aw, ah) = layout.atlas_size;
        let (mw, mh) = layout.map_size;
        if gx == 0 || gy == 0 {
            return bad(format!("grid {}x{} has no tiles", gx, gy));
        }
        if aw > max_texture_size || ah > max_texture_size {
            return bad(format!(
                "atlas {}x{} exceeds the maximum texture size {}",
                aw, ah, max_texture_size
            ));
        }
        if aw / gx < MIN_TILE_TEXELS || ah / gy < MIN_TILE_TEXELS {
            return bad(format!(
                "{}x{} tiles in a {}x{} atlas are narrower than {} texels",
                gx, gy, aw, ah, MIN_TILE_TEXELS
            ));
        }
        if mw / gx == 0 || mh / gy == 0 {
            return bad(format!(
                "{}x{} tiles over a {}x{} map cover less than one unit each",
                gx, gy, mw, mh
            ));
        }
        if layout.max_distance == 0 {
            return bad("max_distance must be at least 1".into());
        }

        let mut tiles = Vec::with_capacity((gx * gy) as usize);
        for ty in 0..gy {
            for tx in 0..gx {
                let atlas = IRect::new(split(tx, aw, gx), split(ty, ah, gy), split(tx + 1, aw, gx), split(ty + 1, ah, gy));
                let world = IRect::new(split(tx, mw, gx), split(ty, mh, gy), split(tx + 1, mw, gx), split(ty + 1, mh, gy));
                let tex = Vec4::new(
                    atlas.x1 as f32 / aw as f32,
                    atlas.y1 as f32 / ah as f32,
                    atlas.x2 as f32 / aw as f32,
                    atlas.y2 as f32 / ah as f32,
                );
                tiles.push(CoastAtlasRect {
                    index: tiles.len(),
                    atlas,
                    world,
                    tex,
                    is_coastline: false,
                    staging: vec![ALL_WATER; atlas.area() as usize],
                    upload_pending: false,
                });
            }
        }

        let apron = tiles
            .iter()
            .map(|t| {
                let (sx, sy) = t.texel_scale();
                (layout.max_distance as f32 * sx.max(sy)).ceil() as i32 + 1
            })
            .max()
            .unwrap_or(1);

        log::debug!(
            "Coast atlas: {}x{} tiles in {}x{} texels over a {}x{} map, apron {}",
            gx,
            gy,
            aw,
            ah,
            mw,
            mh,
            apron
        );

        Ok(Self {
            layout,
            tiles,
            edits: RectangleOverlapHandler::new(),
            apron,
            full_upload_pending: false,
            texture: None,
        })
    }

    pub fn layout(&self) -> &CoastAtlasLayout {
        &self.layout
    }

    pub fn tiles(&self) -> &[CoastAtlasRect] {
        &self.tiles
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// Tile covering world point `(x, y)`, `None` outside the map.
    pub fn tile_at(&self, x: f32, y: f32) -> Option<&CoastAtlasRect> {
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let (cx, cy) = (x.floor() as i32, y.floor() as i32);
        self.tiles.iter().find(|t| t.world.contains(cx, cy))
    }

    /// World position to atlas texture coordinate: `uv = xz * xy + zw`.
    pub fn tex_gen(&self) -> Vec4 {
        let (w, h) = self.layout.map_size;
        Vec4::new(1.0 / w as f32, 1.0 / h as f32, 0.0, 0.0)
    }

    /// Queue a changed height-map region for the next recompute.
    pub fn notify_region_changed(&mut self, rect: IRect) {
        self.edits.push(rect);
    }

    pub fn pending_edits(&self) -> usize {
        self.edits.pending_len()
    }

    /// Recompute dirty tiles into their staging buffers and return their
    /// indices. `force_full` recomputes every tile and drops queued edits.
    pub fn recompute<H: HeightField + ?Sized>(&mut self, heights: &H, force_full: bool) -> Vec<usize> {
        let dirty: Vec<usize> = if force_full {
            self.edits.clear();
            self.full_upload_pending = true;
            (0..self.tiles.len()).collect()
        } else {
            let merged = self.edits.get_merged_rects();
            let mut dirty = vec![false; self.tiles.len()];
            for rect in &merged {
                let reach = rect.expanded(self.apron);
                for tile in &self.tiles {
                    if tile.world.overlaps(&reach) {
                        dirty[tile.index] = true;
                    }
                }
            }
            dirty.iter().enumerate().filter(|(_, d)| **d).map(|(i, _)| i).collect()
        };

        let mut coast = 0;
        for &index in &dirty {
            let layout = self.layout;
            let tile = &mut self.tiles[index];
            recompute_tile(tile, heights, &layout);
            tile.upload_pending = true;
            coast += tile.is_coastline as usize;
        }
        if !dirty.is_empty() {
            log::debug!(
                "Coast atlas recomputed {} tile(s) ({} coastline){}",
                dirty.len(),
                coast,
                if force_full { ", full" } else { "" }
            );
        }
        dirty
    }

    /// Write pending tiles to the atlas texture, creating it on first use.
    pub fn upload<G: GpuResources + ?Sized>(&mut self, gpu: &mut G) -> Result<UploadStats, GpuError> {
        let texture = match self.texture {
            Some(texture) => texture,
            None => {
                let (w, h) = self.layout.atlas_size;
                let texture = gpu.create_texture(&TextureDesc::new("coast atlas", w, h, TextureFormat::R8Unorm))?;
                self.texture = Some(texture);
                self.full_upload_pending = true;
                texture
            }
        };

        let mut stats = UploadStats::default();
        if self.full_upload_pending {
            let (w, h) = self.layout.atlas_size;
            let texels = self.texels();
            gpu.write_texture(texture, TexelRegion::new(0, 0, w, h), &texels)?;
            stats = UploadStats {
                tiles: self.tiles.len(),
                bytes: texels.len(),
                full: true,
            };
            for tile in &mut self.tiles {
                tile.upload_pending = false;
            }
            self.full_upload_pending = false;
            return Ok(stats);
        }

        for tile in self.tiles.iter_mut().filter(|t| t.upload_pending) {
            let region = TexelRegion::new(tile.atlas.x1 as u32, tile.atlas.y1 as u32, tile.xsize(), tile.ysize());
            gpu.write_texture(texture, region, &tile.staging)?;
            tile.upload_pending = false;
            stats.tiles += 1;
            stats.bytes += tile.staging.len();
        }
        Ok(stats)
    }

    /// CPU copy of the whole atlas, row-major.
    pub fn texels(&self) -> Vec<u8> {
        let (w, h) = self.layout.atlas_size;
        let mut texels = vec![ALL_WATER; (w * h) as usize];
        for tile in &self.tiles {
            let xs = tile.xsize() as usize;
            for (row, src) in tile.staging.chunks_exact(xs).enumerate() {
                let start = (tile.atlas.y1 as usize + row) * w as usize + tile.atlas.x1 as usize;
                texels[start..start + xs].copy_from_slice(src);
            }
        }
        texels
    }

    pub fn release<G: GpuResources + ?Sized>(&mut self, gpu: &mut G) {
        if let Some(texture) = self.texture.take() {
            gpu.release_texture(texture);
        }
    }
}

/// Sample the tile plus its apron, classify it and fill its staging buffer.
fn recompute_tile<H: HeightField + ?Sized>(tile: &mut CoastAtlasRect, heights: &H, layout: &CoastAtlasLayout) {
    let md = layout.max_distance as i32;
    let (xs, ys) = (tile.xsize() as i32, tile.ysize() as i32);
    let (sw, sh) = (xs + 2 * md, ys + 2 * md);
    let (scale_x, scale_y) = tile.texel_scale();

    let mut land = Vec::with_capacity((sw * sh) as usize);
    for v in -md..ys + md {
        let wy = tile.world.y1 as f32 + (v as f32 + 0.5) * scale_y;
        for u in -md..xs + md {
            let wx = tile.world.x1 as f32 + (u as f32 + 0.5) * scale_x;
            land.push(heights.sample_nearest(wx, wy) > layout.water_level);
        }
    }

    let class = match (land.iter().any(|&l| l), land.iter().all(|&l| l)) {
        (_, true) => TileClass::Land,
        (false, _) => TileClass::Water,
        _ => TileClass::Coast,
    };
    tile.is_coastline = class == TileClass::Coast;

    match class {
        TileClass::Land => tile.staging.fill(ALL_LAND),
        TileClass::Water => tile.staging.fill(ALL_WATER),
        TileClass::Coast => {
            let limit = md * md;
            for y in 0..ys {
                for x in 0..xs {
                    let here = land[((y + md) * sw + x + md) as usize];
                    let mut best = limit;
                    for dy in -md..=md {
                        let row = (y + md + dy) * sw;
                        for dx in -md..=md {
                            let d2 = dx * dx + dy * dy;
                            if d2 < best && land[(row + x + md + dx) as usize] != here {
                                best = d2;
                            }
                        }
                    }
                    let distance = (best as f32).sqrt();
                    let signed = if here { distance } else { -distance };
                    tile.staging[(y * xs + x) as usize] = encode_distance(signed, layout.max_distance);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::trace::{GpuCommand, TraceGpu};
    use engine_core::HeightGrid;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn layout(grid: (u32, u32), atlas: (u32, u32), map: (u32, u32), max_distance: u32) -> CoastAtlasLayout {
        CoastAtlasLayout {
            grid,
            atlas_size: atlas,
            map_size: map,
            max_distance,
            water_level: 0.0,
        }
    }

    fn island(size: u32) -> HeightGrid {
        let c = size as f32 / 2.0;
        HeightGrid::from_fn(size, size, |x, y| {
            let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
            c * 0.6 - d
        })
    }

    #[test]
    fn tiles_partition_atlas_and_world() {
        let atlas = CoastAtlas::new(layout((3, 4), (100, 70), (250, 130), 4), 1024).unwrap();
        let tiles = atlas.tiles();
        assert_eq!(tiles.len(), 12);
        let atlas_area: i64 = tiles.iter().map(|t| t.atlas.area()).sum();
        let world_area: i64 = tiles.iter().map(|t| t.world.area()).sum();
        assert_eq!(atlas_area, 100 * 70);
        assert_eq!(world_area, 250 * 130);
        for (i, a) in tiles.iter().enumerate() {
            for b in &tiles[i + 1..] {
                assert!(!a.atlas.overlaps(&b.atlas));
                assert!(!a.world.overlaps(&b.world));
            }
        }
        let widths: Vec<u32> = tiles.iter().map(|t| t.xsize()).collect();
        assert!(widths.iter().max().unwrap() - widths.iter().min().unwrap() <= 1);
        assert_eq!(tiles[11].tex.z, 1.0);
    }

    #[test]
    fn impossible_layouts_are_rejected() {
        let cases = [
            layout((0, 4), (256, 256), (256, 256), 8),
            layout((4, 4), (512, 512), (256, 256), 8),
            layout((64, 64), (128, 128), (256, 256), 8),
            layout((8, 8), (256, 256), (4, 4), 8),
        ];
        for case in cases {
            assert!(
                matches!(CoastAtlas::new(case, 256), Err(WaterError::AtlasLayout(_))),
                "{:?}",
                case
            );
        }
    }

    #[test]
    fn single_edit_touches_one_tile_of_sixteen() {
        let heights = island(256);
        let mut atlas = CoastAtlas::new(layout((4, 4), (256, 256), (256, 256), 8), 4096).unwrap();
        let mut gpu = TraceGpu::new();
        atlas.recompute(&heights, true);
        atlas.upload(&mut gpu).unwrap();
        let before: Vec<Vec<u8>> = atlas.tiles().iter().map(|t| t.staging().to_vec()).collect();
        gpu.take_commands();

        atlas.notify_region_changed(IRect::new(10, 10, 20, 20));
        assert_eq!(atlas.recompute(&heights, false), vec![0]);
        for (tile, old) in atlas.tiles().iter().zip(&before) {
            assert_eq!(tile.upload_pending(), tile.index == 0);
            assert_eq!(tile.staging(), old.as_slice());
        }

        let stats = atlas.upload(&mut gpu).unwrap();
        assert_eq!(stats, UploadStats { tiles: 1, bytes: 64 * 64, full: false });
        let writes: Vec<_> = gpu
            .commands()
            .iter()
            .filter_map(|c| match c {
                GpuCommand::WriteTexture { region, .. } => Some(*region),
                _ => None,
            })
            .collect();
        assert_eq!(writes, vec![TexelRegion::new(0, 0, 64, 64)]);
    }

    #[test]
    fn classification_matches_terrain() {
        let heights = island(128);
        let mut atlas = CoastAtlas::new(layout((5, 5), (128, 128), (128, 128), 4), 4096).unwrap();
        atlas.recompute(&heights, true);

        let corner = atlas.tile_at(1.0, 1.0).unwrap();
        assert!(!corner.is_coastline);
        assert!(corner.staging().iter().all(|&t| t == ALL_WATER));

        let center = atlas.tile_at(64.0, 64.0).unwrap();
        assert!(!center.is_coastline);
        assert!(center.staging().iter().all(|&t| t == ALL_LAND));

        let coast = atlas.tiles().iter().filter(|t| t.is_coastline).count();
        assert!(coast > 0 && coast < 25);
        assert!(atlas.tile_at(-1.0, 3.0).is_none());
    }

    #[test]
    fn distance_encoding_saturates_at_max_distance() {
        assert_eq!(encode_distance(8.0, 8), 255);
        assert_eq!(encode_distance(-8.0, 8), 0);
        assert_eq!(encode_distance(0.0, 8), 128);
        assert_eq!(encode_distance(1.0, 8), 143);
    }

    #[test]
    fn recompute_of_unchanged_heights_is_bit_identical() {
        let heights = island(96);
        let mut atlas = CoastAtlas::new(layout((3, 3), (96, 96), (96, 96), 5), 4096).unwrap();
        atlas.recompute(&heights, true);
        let first = atlas.texels();
        for rect in [IRect::new(0, 0, 96, 96), IRect::new(40, 10, 41, 11)] {
            atlas.notify_region_changed(rect);
            atlas.recompute(&heights, false);
            assert_eq!(atlas.texels(), first);
        }
        atlas.recompute(&heights, true);
        assert_eq!(atlas.texels(), first);
    }

    #[test]
    fn partial_updates_match_full_recompute() {
        let mut rng = StdRng::seed_from_u64(7);
        for map in [(64u32, 64u32), (90, 70)] {
            let layout = layout((4, 3), (48, 40), map, 3);
            let mut heights = HeightGrid::from_fn(map.0, map.1, |x, y| {
                ((x as f32 * 0.21).sin() + (y as f32 * 0.17).cos()) * 4.0
            });
            let mut gpu = TraceGpu::new();
            let mut incremental = CoastAtlas::new(layout, 4096).unwrap();
            incremental.recompute(&heights, true);
            incremental.upload(&mut gpu).unwrap();

            for _ in 0..25 {
                let x = rng.gen_range(-5..map.0 as i32);
                let y = rng.gen_range(-5..map.1 as i32);
                let rect = IRect::new(x, y, x + rng.gen_range(1..12), y + rng.gen_range(1..12));
                let height = rng.gen_range(-6.0..6.0);
                if let Some(touched) = heights.fill_rect(rect, height) {
                    incremental.notify_region_changed(touched);
                }
                if rng.gen_bool(0.3) {
                    incremental.recompute(&heights, false);
                    incremental.upload(&mut gpu).unwrap();
                }
            }
            incremental.recompute(&heights, false);
            incremental.upload(&mut gpu).unwrap();

            let mut scratch = TraceGpu::new();
            let mut full = CoastAtlas::new(layout, 4096).unwrap();
            full.recompute(&heights, true);
            full.upload(&mut scratch).unwrap();

            let texture = incremental.texture().unwrap();
            assert_eq!(gpu.texture_data(texture).unwrap(), full.texels().as_slice(), "{:?}", map);
            assert_eq!(scratch.texture_data(full.texture().unwrap()).unwrap(), full.texels().as_slice());
        }
    }

    #[test]
    fn first_upload_writes_the_whole_atlas_once() {
        let heights = island(64);
        let mut atlas = CoastAtlas::new(layout((2, 2), (32, 32), (64, 64), 2), 4096).unwrap();
        let mut gpu = TraceGpu::new();
        atlas.recompute(&heights, true);
        let stats = atlas.upload(&mut gpu).unwrap();
        assert!(stats.full);
        assert_eq!(stats.bytes, 32 * 32);
        assert_eq!(atlas.upload(&mut gpu).unwrap(), UploadStats::default());
        atlas.release(&mut gpu);
        assert_eq!(gpu.live_resources(), 0);
    }
}
