//! Draw ordering and the per-frame draw passes.

use crate::core::types::{Mat4, Vec2, Vec3};
use crate::math::Aabb;
use crate::render::FloraRenderer;
use crate::terrain::TerrainQuery;

use super::block::FloraBlock;
use super::constants::BLOCK_WIDTH;

/// Counters for the current frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FloraStats {
    pub draw_calls: usize,
    pub triangles: usize,
    /// Blocks waiting for a refill.
    pub pending_blocks: usize,
    /// Blocks filled by the last update.
    pub fills: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SortedBlock {
    pub index: usize,
    /// Squared XZ distance to the camera when last visible.
    pub dist_sq: f32,
}

/// Blocks ordered farthest first.
pub struct DrawOrder {
    entries: Vec<SortedBlock>,
}

impl DrawOrder {
    pub fn new(count: usize) -> Self {
        Self { entries: (0..count).map(|index| SortedBlock { index, dist_sq: 0.0 }).collect() }
    }

    pub fn entries(&self) -> &[SortedBlock] {
        &self.entries
    }

    /// Refresh distances of visible blocks and re-sort. Hidden blocks keep
    /// their last distance; they are skipped when drawing anyway.
    pub fn update(&mut self, blocks: &[FloraBlock], camera: Vec2) {
        for entry in &mut self.entries {
            let block = &blocks[entry.index];
            if block.is_visible() {
                entry.dist_sq = block.center().distance_squared(camera);
            }
        }
        self.entries.sort_by(|a, b| b.dist_sq.total_cmp(&a.dist_sq));
    }
}

/// Local-to-world transforms of the terrain blocks under the window,
/// keyed by block parity and computed once per frame.
#[derive(Debug, Default)]
pub struct TransformCache {
    transforms: [Option<Mat4>; 4],
}

impl TransformCache {
    pub fn reset(&mut self) {
        self.transforms = [None; 4];
    }

    pub fn get(&mut self, block: &FloraBlock, terrain: &dyn TerrainQuery) -> Mat4 {
        let Ok(parity) = usize::try_from(block.block_id()) else {
            return Mat4::IDENTITY;
        };
        debug_assert!(parity < 4);
        if let Some(m) = self.transforms[parity & 3] {
            return m;
        }
        let center = block.center();
        match terrain.find_block(Vec3::new(center.x, 0.0, center.y)) {
            Some(info) => {
                self.transforms[parity & 3] = Some(info.local_to_world);
                info.local_to_world
            }
            None => Mat4::IDENTITY,
        }
    }
}

/// Everything a draw pass reads or updates.
pub struct Frame<'a> {
    pub blocks: &'a [FloraBlock],
    pub order: &'a DrawOrder,
    pub renderer: &'a mut dyn FloraRenderer,
    pub terrain: &'a dyn TerrainQuery,
    pub transforms: &'a mut TransformCache,
    pub vertices_per_block: usize,
    pub stats: &'a mut FloraStats,
}

impl Frame<'_> {
    fn draw_block(&mut self, block: &FloraBlock) {
        let transform = self.transforms.get(block, self.terrain);
        self.renderer.draw_block(block.offset(), self.vertices_per_block, &transform);
        self.stats.draw_calls += 1;
        self.stats.triangles += self.vertices_per_block / 3;
    }

    /// Near blocks, nearest first, out to `distance` plus two blocks.
    pub fn alpha_test_pass(&mut self, distance: f32, fade_pct: f32, alpha_ref: u32) {
        self.renderer.begin_alpha_test_pass(distance, fade_pct, alpha_ref);
        let margin = BLOCK_WIDTH * 2.0;
        let limit = distance * distance + margin * margin;
        let (order, blocks) = (self.order, self.blocks);
        for entry in order.entries().iter().rev() {
            if entry.dist_sq >= limit {
                break;
            }
            let block = &blocks[entry.index];
            if block.is_visible() {
                self.draw_block(block);
            }
        }
    }

    /// Far blocks, farthest first, from `distance` less two blocks.
    pub fn alpha_blend_pass(&mut self, distance: f32, fade_pct: f32) {
        self.renderer.begin_alpha_blend_pass(distance, fade_pct);
        let margin = BLOCK_WIDTH * 2.0;
        let limit = distance * distance - margin * margin;
        let (order, blocks) = (self.order, self.blocks);
        for entry in order.entries() {
            let block = &blocks[entry.index];
            if entry.dist_sq > limit && block.is_visible() {
                self.draw_block(block);
            }
        }
    }

    /// Visible blocks within `distance` whose bounds touch the shadow
    /// caster's volume. Returns false if the renderer has no shadow pass.
    pub fn shadow_pass(&mut self, volume: &Aabb, distance: f32, alpha_ref: u32) -> bool {
        if !self.renderer.begin_shadow_pass(alpha_ref) {
            return false;
        }
        let limit = distance * distance;
        let (order, blocks) = (self.order, self.blocks);
        for entry in order.entries() {
            let block = &blocks[entry.index];
            if entry.dist_sq < limit && block.is_visible() && block.bounds().intersects(volume) {
                self.draw_block(block);
            }
        }
        self.renderer.end_shadow_pass();
        true
    }
}
