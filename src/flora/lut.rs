//! Deterministic placement lookup table.
//!
//! Every block seeds a cursor from its world centre and then walks the
//! table, so refilling the same location always reproduces the same
//! offsets, rotations and random numbers.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::constants::{BLOCK_WIDTH, LUT_SIZE};

/// Radius of the circle the offsets are drawn from; covers a whole block.
pub fn offset_radius() -> f32 {
    let half = BLOCK_WIDTH * 0.5;
    (2.0 * half * half).sqrt()
}

pub struct OffsetTable {
    offsets: Vec<Vec2>,
    randoms: Vec<f32>,
    cursor: usize,
}

impl Default for OffsetTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OffsetTable {
    /// Build the table from a fixed seed.
    pub fn new() -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let radius = offset_radius();

        let mut offsets = Vec::with_capacity(LUT_SIZE);
        let mut randoms = Vec::with_capacity(LUT_SIZE);
        for _ in 0..LUT_SIZE {
            let t = rng.gen_range(0.0f32..1.0) * TAU;
            let r = rng.gen_range(0.0f32..1.0) * radius;
            offsets.push(Vec2::new(r * t.cos(), r * t.sin()));
            randoms.push(rng.gen_range(0.0f32..1.0));
        }

        Self { offsets, randoms, cursor: 0 }
    }

    /// Position the cursor from a block's world XZ centre.
    pub fn seed(&mut self, center: Vec2) {
        self.cursor = (center.x.abs() * 5.0 + center.y.abs() * 13.0) as usize;
    }

    fn advance(&mut self) -> usize {
        self.cursor = (self.cursor % LUT_SIZE + 1) % LUT_SIZE;
        self.cursor
    }

    /// Next offset inside the block's covering circle.
    pub fn next_offset(&mut self) -> Vec2 {
        let i = self.advance();
        self.offsets[i]
    }

    /// Next rotation in radians.
    pub fn next_rotation(&mut self) -> f32 {
        let i = self.advance();
        self.offsets[i].x % 6.283
    }

    /// Next random number in [0, 1].
    pub fn next_random(&mut self) -> f32 {
        let i = self.advance();
        self.randoms[i]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
