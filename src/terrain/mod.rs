//! Terrain queries used to seat flora on the ground.
//!
//! The flora system never owns terrain. It asks a [`TerrainQuery`] for the
//! terrain block under a point (which may not be streamed in yet) and for
//! height, normal and dominant texture within that block, and asks an
//! [`EcotypePainter`] whether an ecotype was painted explicitly.

pub mod generator;
pub mod painted;

pub use generator::{ProceduralTerrain, TerrainParams, TextureBand};
pub use painted::{AutoEcotypes, PaintedEcotypeMap};

use std::sync::Arc;

use crate::core::types::{IVec2, Mat4, Vec2, Vec3};
use crate::ecotype::EcotypeId;

/// Edge length of one terrain block in meters.
pub const TERRAIN_BLOCK_SIZE: f32 = 100.0;

/// A terrain block found under a world position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainBlockInfo {
    /// Grid coordinate of the block.
    pub key: IVec2,
    /// Block-local to world transform.
    pub local_to_world: Mat4,
    /// World to block-local transform.
    pub world_to_local: Mat4,
}

impl TerrainBlockInfo {
    /// Block-local XZ position of a world position.
    pub fn to_local(&self, world: Vec3) -> Vec2 {
        let local = self.world_to_local.transform_point3(world);
        Vec2::new(local.x, local.z)
    }

    /// 2x2 parity of this block, used to pick one of four cached draw transforms.
    pub fn parity(&self) -> i32 {
        let centre = self
            .local_to_world
            .transform_point3(Vec3::new(TERRAIN_BLOCK_SIZE * 0.5, 0.0, TERRAIN_BLOCK_SIZE * 0.5))
            / TERRAIN_BLOCK_SIZE;
        let x = (centre.x.floor() as i32).abs();
        let z = (centre.z.floor() as i32).abs();
        (x % 2) | ((z % 2) << 1)
    }
}

/// Terrain query service.
///
/// `find_block` returns `None` where terrain has not been streamed in; the
/// flora treats that as "retry later", never as an error.
pub trait TerrainQuery {
    fn find_block(&self, world: Vec3) -> Option<TerrainBlockInfo>;

    /// Height above the block origin at a block-local XZ position.
    fn height_at(&self, block: &TerrainBlockInfo, local: Vec2) -> f32;

    fn normal_at(&self, block: &TerrainBlockInfo, local: Vec2) -> Vec3;

    /// Resource name of the texture covering most of this point, if the
    /// block has a dominant texture map.
    fn dominant_texture(&self, block: &TerrainBlockInfo, local: Vec2) -> Option<String>;
}

impl<T: TerrainQuery + ?Sized> TerrainQuery for Arc<T> {
    fn find_block(&self, world: Vec3) -> Option<TerrainBlockInfo> {
        (**self).find_block(world)
    }

    fn height_at(&self, block: &TerrainBlockInfo, local: Vec2) -> f32 {
        (**self).height_at(block, local)
    }

    fn normal_at(&self, block: &TerrainBlockInfo, local: Vec2) -> Vec3 {
        (**self).normal_at(block, local)
    }

    fn dominant_texture(&self, block: &TerrainBlockInfo, local: Vec2) -> Option<String> {
        (**self).dominant_texture(block, local)
    }
}

/// Result of asking the painter for an explicit ecotype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EcotypeSelection {
    /// Nothing painted; derive the ecotype from the terrain texture.
    Auto,
    Id(EcotypeId),
}

/// Terrain-correlated (painted) ecotype service.
pub trait EcotypePainter {
    fn ecotype_at(&self, world: Vec2) -> EcotypeSelection;
}

impl<T: EcotypePainter + ?Sized> EcotypePainter for Arc<T> {
    fn ecotype_at(&self, world: Vec2) -> EcotypeSelection {
        (**self).ecotype_at(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_parity() {
        let info = |x: i32, z: i32| {
            let origin = Vec3::new(x as f32 * TERRAIN_BLOCK_SIZE, 0.0, z as f32 * TERRAIN_BLOCK_SIZE);
            let m = Mat4::from_translation(origin);
            TerrainBlockInfo { key: IVec2::new(x, z), local_to_world: m, world_to_local: m.inverse() }
        };
        assert_eq!(info(0, 0).parity(), 0);
        assert_eq!(info(1, 0).parity(), 1);
        assert_eq!(info(0, 1).parity(), 2);
        assert_eq!(info(3, 5).parity(), 3);
        assert_eq!(info(-1, -2).parity(), 1);
    }

    #[test]
    fn test_to_local() {
        let m = Mat4::from_translation(Vec3::new(100.0, 0.0, 200.0));
        let info = TerrainBlockInfo { key: IVec2::new(1, 2), local_to_world: m, world_to_local: m.inverse() };
        assert_eq!(info.to_local(Vec3::new(110.0, 5.0, 250.0)), Vec2::new(10.0, 50.0));
    }
}
