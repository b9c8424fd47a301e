//! Two-level visibility culling.
//!
//! The grid is covered by 5x5 macro boxes, each the union of its member
//! blocks' bounds. A macro box fully outside or fully inside the frustum
//! settles all of its members at once; only straddling boxes test their
//! blocks individually.

use crate::math::{Aabb, Containment, Frustum};

use super::block::FloraBlock;
use super::constants::{BLOCK_STRIDE, MACRO_STRIDE, MACRO_TILE};

const MEMBERS: usize = MACRO_TILE * MACRO_TILE;

#[derive(Clone, Debug)]
pub struct MacroBox {
    pub bounds: Aabb,
    /// Grid indices (`z * BLOCK_STRIDE + x`) of the member blocks.
    pub members: [usize; MEMBERS],
}

pub struct MacroBoxes {
    boxes: Vec<MacroBox>,
}

impl Default for MacroBoxes {
    fn default() -> Self {
        Self::new()
    }
}

impl MacroBoxes {
    pub fn new() -> Self {
        let boxes = (0..MACRO_STRIDE * MACRO_STRIDE)
            .map(|_| MacroBox { bounds: Aabb::INSIDE_OUT, members: [0; MEMBERS] })
            .collect();
        Self { boxes }
    }

    pub fn boxes(&self) -> &[MacroBox] {
        &self.boxes
    }

    /// Rebuild membership and bounds, tiling from the grid's logical
    /// top-left corner so each box covers a contiguous world area.
    pub fn accumulate(&mut self, blocks: &[FloraBlock], center_x: usize, center_z: usize) {
        let left = (center_x + BLOCK_STRIDE - BLOCK_STRIDE / 2) % BLOCK_STRIDE;
        let front = (center_z + BLOCK_STRIDE - BLOCK_STRIDE / 2) % BLOCK_STRIDE;

        let mut boxes = self.boxes.iter_mut();
        for z in (front..front + BLOCK_STRIDE).step_by(MACRO_TILE) {
            for x in (left..left + BLOCK_STRIDE).step_by(MACRO_TILE) {
                let Some(macro_box) = boxes.next() else {
                    return;
                };
                macro_box.bounds = Aabb::INSIDE_OUT;
                for zz in 0..MACRO_TILE {
                    for xx in 0..MACRO_TILE {
                        let index = ((z + zz) % BLOCK_STRIDE) * BLOCK_STRIDE + (x + xx) % BLOCK_STRIDE;
                        macro_box.members[zz * MACRO_TILE + xx] = index;
                        let block = &blocks[index];
                        if block.block_id() != -1 {
                            macro_box.bounds.add_bounds(block.bounds());
                        }
                    }
                }
            }
        }
    }

    /// Set every block's culled flag.
    pub fn cull(&self, blocks: &mut [FloraBlock], frustum: &Frustum) {
        for macro_box in &self.boxes {
            match frustum.classify_aabb(&macro_box.bounds) {
                Containment::Outside => {
                    for &i in &macro_box.members {
                        blocks[i].set_culled(true);
                    }
                }
                Containment::Inside => {
                    for &i in &macro_box.members {
                        let invalid = blocks[i].block_id() == -1;
                        blocks[i].set_culled(invalid);
                    }
                }
                Containment::Intersecting => {
                    for &i in &macro_box.members {
                        blocks[i].cull(frustum);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Mat4, Vec2, Vec3};
    use crate::flora::constants::BLOCK_WIDTH;

    /// Grid laid out the way a teleport to the origin lays it out.
    fn grid() -> Vec<FloraBlock> {
        let half = BLOCK_STRIDE as f32 * BLOCK_WIDTH * 0.5;
        (0..BLOCK_STRIDE * BLOCK_STRIDE)
            .map(|i| {
                let (x, z) = (i % BLOCK_STRIDE, i / BLOCK_STRIDE);
                let center = Vec2::new(
                    -half + BLOCK_WIDTH * (x as f32 + 0.5),
                    half - BLOCK_WIDTH * (z as f32 + 0.5),
                );
                let c = Vec3::new(center.x, 0.0, center.y);
                let bounds = Aabb::new(c - Vec3::new(2.0, 0.0, 2.0), c + Vec3::new(2.0, 1.0, 2.0));
                FloraBlock::filled_for_test(center, 0, bounds, 0)
            })
            .collect()
    }

    #[test]
    fn test_every_block_in_exactly_one_box() {
        let blocks = grid();
        let mut boxes = MacroBoxes::new();
        boxes.accumulate(&blocks, 7, 19);

        let mut seen = vec![0; blocks.len()];
        for b in boxes.boxes() {
            for &i in &b.members {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1));

        // First box starts at the logical top-left block.
        let first = &boxes.boxes()[0];
        assert_eq!(first.members[0], 7 * BLOCK_STRIDE + 20);
    }

    #[test]
    fn test_bounds_skip_invalid_blocks() {
        let mut blocks = grid();
        for z in 0..MACRO_TILE {
            blocks[z * BLOCK_STRIDE] = FloraBlock::new();
        }
        let mut boxes = MacroBoxes::new();
        boxes.accumulate(&blocks, BLOCK_STRIDE / 2, BLOCK_STRIDE / 2);

        let first = &boxes.boxes()[0];
        assert_eq!(first.members[0], 0);
        // The first column would extend the box to x = -50.
        assert_eq!(first.bounds.min.x, -46.0);
        assert_eq!(first.bounds.max.x, -30.0);
        assert_eq!(first.bounds.max.z, 50.0);
    }

    #[test]
    fn test_cull_matches_per_block_test() {
        let mut blocks = grid();
        let mut boxes = MacroBoxes::new();
        boxes.accumulate(&blocks, BLOCK_STRIDE / 2, BLOCK_STRIDE / 2);

        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 1.0, 0.1, 200.0);
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 0.0), Vec3::new(10.0, 0.0, -20.0), Vec3::Y);
        let frustum = Frustum::from_view_projection(&(proj * view));
        boxes.cull(&mut blocks, &frustum);

        let culled = blocks.iter().filter(|b| b.culled()).count();
        assert!(culled > 0 && culled < blocks.len());
        for block in &blocks {
            assert_eq!(block.culled(), !frustum.intersects_aabb(block.bounds()));
        }
    }

    #[test]
    fn test_invalid_blocks_always_culled() {
        let mut blocks: Vec<FloraBlock> = (0..BLOCK_STRIDE * BLOCK_STRIDE).map(|_| FloraBlock::new()).collect();
        let mut boxes = MacroBoxes::new();
        boxes.accumulate(&blocks, 0, 0);
        assert!(boxes.boxes().iter().all(|b| b.bounds.is_inside_out()));

        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 200.0);
        let frustum = Frustum::from_view_projection(&(proj * Mat4::look_at_rh(Vec3::Y, Vec3::NEG_Z, Vec3::Y)));
        boxes.cull(&mut blocks, &frustum);
        assert!(blocks.iter().all(FloraBlock::culled));
    }
}
