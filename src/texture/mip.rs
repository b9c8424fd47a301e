//! Mip chain sizing and generation.

use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Smallest mip edge kept in the chain.
pub const MIN_MIP_SIZE: u32 = 4;

/// Dimensions of every level of a mip chain, largest first.
///
/// Levels stop before either edge drops below [`MIN_MIP_SIZE`]; a base
/// smaller than that still yields one level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MipChain {
    levels: Vec<(u32, u32)>,
}

impl MipChain {
    pub fn new(width: u32, height: u32) -> Self {
        let mut levels = vec![(width.max(1), height.max(1))];
        let (mut w, mut h) = (width / 2, height / 2);
        while w >= MIN_MIP_SIZE && h >= MIN_MIP_SIZE {
            levels.push((w, h));
            w /= 2;
            h /= 2;
        }
        Self { levels }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level(&self, index: usize) -> Option<(u32, u32)> {
        self.levels.get(index).copied()
    }

    pub fn levels(&self) -> &[(u32, u32)] {
        &self.levels
    }

    /// Downsample `base` into every level of this chain. The base is
    /// resized first if it does not match level 0.
    pub fn build(&self, base: &RgbaImage) -> Vec<RgbaImage> {
        let mut out: Vec<RgbaImage> = Vec::with_capacity(self.levels.len());
        for &(w, h) in &self.levels {
            let src = out.last().unwrap_or(base);
            let level = if src.dimensions() == (w, h) {
                src.clone()
            } else {
                imageops::resize(src, w, h, FilterType::Triangle)
            };
            out.push(level);
        }
        out
    }
}
