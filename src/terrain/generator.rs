//! Noise-based procedural terrain used as a flora ground source.
//!
//! Heights come from fractal Brownian motion; the dominant texture is
//! picked from height bands, with a separate texture for steep slopes.
//! Blocks can be streamed in and out to exercise the flora's deferred
//! fill path.

use std::collections::HashSet;
use std::sync::RwLock;

use glam::{IVec2, Mat4, Vec2, Vec3};
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use super::{TerrainBlockInfo, TerrainQuery, TERRAIN_BLOCK_SIZE};

/// Texture assigned below a normalized height.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureBand {
    /// Upper bound of this band, as a fraction of `height_scale`.
    pub max_height: f32,
    pub texture: String,
}

impl TextureBand {
    pub fn new(max_height: f32, texture: impl Into<String>) -> Self {
        Self { max_height, texture: texture.into() }
    }
}

/// Parameters controlling terrain generation
#[derive(Clone, Debug)]
pub struct TerrainParams {
    pub seed: u32,
    pub scale: f32,        // Horizontal scale (larger = smoother)
    pub height_scale: f32, // Vertical scale (max height)
    pub octaves: u32,      // FBM octaves (detail levels)
    pub persistence: f32,  // FBM persistence (0.5 typical)
    pub lacunarity: f32,   // FBM lacunarity (2.0 typical)
    /// Height bands, ascending by `max_height`.
    pub texture_bands: Vec<TextureBand>,
    /// Texture used where the surface normal's Y is below `steep_cos`.
    pub steep_texture: String,
    pub steep_cos: f32,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 100.0,
            height_scale: 64.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            texture_bands: vec![
                TextureBand::new(0.35, "maps/terrain/sand.dds"),
                TextureBand::new(0.7, "maps/terrain/grass.dds"),
                TextureBand::new(1.01, "maps/terrain/snow.dds"),
            ],
            steep_texture: "maps/terrain/rock.dds".into(),
            steep_cos: 0.7,
        }
    }
}

/// Procedural terrain using fractal Brownian motion (FBM)
pub struct ProceduralTerrain {
    params: TerrainParams,
    noise: Fbm<Perlin>,
    /// Blocks currently streamed in; `None` means the terrain is unbounded.
    streamed: RwLock<Option<HashSet<IVec2>>>,
}

impl ProceduralTerrain {
    /// Create unbounded terrain with the given parameters
    pub fn new(params: TerrainParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self {
            params,
            noise,
            streamed: RwLock::new(None),
        }
    }

    /// Perfectly flat terrain at height 0 with a single texture.
    pub fn flat(texture: impl Into<String>) -> Self {
        Self::new(TerrainParams {
            height_scale: 0.0,
            texture_bands: vec![TextureBand::new(f32::MAX, texture)],
            ..Default::default()
        })
    }

    /// Create terrain where only explicitly streamed blocks exist.
    pub fn with_streaming(self) -> Self {
        if let Ok(mut streamed) = self.streamed.write() {
            *streamed = Some(HashSet::new());
        }
        self
    }

    /// Get terrain parameters
    pub fn params(&self) -> &TerrainParams {
        &self.params
    }

    /// Grid key of the block under a world position.
    pub fn block_key(world_x: f32, world_z: f32) -> IVec2 {
        IVec2::new(
            (world_x / TERRAIN_BLOCK_SIZE).floor() as i32,
            (world_z / TERRAIN_BLOCK_SIZE).floor() as i32,
        )
    }

    /// Mark a block as streamed in. No-op for unbounded terrain.
    pub fn stream_in(&self, key: IVec2) {
        if let Ok(mut streamed) = self.streamed.write() {
            if let Some(set) = streamed.as_mut() {
                set.insert(key);
            }
        }
    }

    /// Stream in every block within `radius` meters of a world XZ point.
    pub fn stream_in_radius(&self, center: Vec2, radius: f32) {
        let min = Self::block_key(center.x - radius, center.y - radius);
        let max = Self::block_key(center.x + radius, center.y + radius);
        for z in min.y..=max.y {
            for x in min.x..=max.x {
                self.stream_in(IVec2::new(x, z));
            }
        }
    }

    /// Mark a block as streamed out. No-op for unbounded terrain.
    pub fn stream_out(&self, key: IVec2) {
        if let Ok(mut streamed) = self.streamed.write() {
            if let Some(set) = streamed.as_mut() {
                set.remove(&key);
            }
        }
    }

    fn is_streamed(&self, key: IVec2) -> bool {
        match self.streamed.read() {
            Ok(streamed) => streamed.as_ref().is_none_or(|set| set.contains(&key)),
            Err(_) => false,
        }
    }

    /// Get terrain height at world position (x, z)
    pub fn world_height_at(&self, x: f32, z: f32) -> f32 {
        if self.params.height_scale == 0.0 {
            return 0.0;
        }

        // Sample noise in normalized coordinates
        let nx = (x / self.params.scale) as f64;
        let nz = (z / self.params.scale) as f64;

        // Get noise value in range [-1, 1]
        let noise_value = self.noise.get([nx, nz]);

        // Map to height range [0, height_scale]
        let normalized = (noise_value + 1.0) / 2.0;
        (normalized * self.params.height_scale as f64) as f32
    }

    /// Surface normal at world position (x, z), by central differences.
    pub fn world_normal_at(&self, x: f32, z: f32) -> Vec3 {
        const EPS: f32 = 0.5;
        let dx = self.world_height_at(x + EPS, z) - self.world_height_at(x - EPS, z);
        let dz = self.world_height_at(x, z + EPS) - self.world_height_at(x, z - EPS);
        Vec3::new(-dx, 2.0 * EPS, -dz).normalize()
    }

    /// Dominant texture at world position (x, z).
    pub fn world_texture_at(&self, x: f32, z: f32) -> Option<&str> {
        if self.world_normal_at(x, z).y < self.params.steep_cos {
            return Some(&self.params.steep_texture);
        }

        let normalized = if self.params.height_scale > 0.0 {
            self.world_height_at(x, z) / self.params.height_scale
        } else {
            0.0
        };
        self.params
            .texture_bands
            .iter()
            .find(|band| normalized < band.max_height)
            .map(|band| band.texture.as_str())
    }

    fn block_info(key: IVec2) -> TerrainBlockInfo {
        let origin = Vec3::new(key.x as f32 * TERRAIN_BLOCK_SIZE, 0.0, key.y as f32 * TERRAIN_BLOCK_SIZE);
        let local_to_world = Mat4::from_translation(origin);
        TerrainBlockInfo {
            key,
            local_to_world,
            world_to_local: Mat4::from_translation(-origin),
        }
    }

    fn to_world(block: &TerrainBlockInfo, local: Vec2) -> Vec3 {
        block.local_to_world.transform_point3(Vec3::new(local.x, 0.0, local.y))
    }
}

impl TerrainQuery for ProceduralTerrain {
    fn find_block(&self, world: Vec3) -> Option<TerrainBlockInfo> {
        let key = Self::block_key(world.x, world.z);
        self.is_streamed(key).then(|| Self::block_info(key))
    }

    fn height_at(&self, block: &TerrainBlockInfo, local: Vec2) -> f32 {
        let world = Self::to_world(block, local);
        self.world_height_at(world.x, world.z)
    }

    fn normal_at(&self, block: &TerrainBlockInfo, local: Vec2) -> Vec3 {
        let world = Self::to_world(block, local);
        self.world_normal_at(world.x, world.z)
    }

    fn dominant_texture(&self, block: &TerrainBlockInfo, local: Vec2) -> Option<String> {
        let world = Self::to_world(block, local);
        self.world_texture_at(world.x, world.z).map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terrain_params_default() {
        let params = TerrainParams::default();
        assert_eq!(params.seed, 12345);
        assert_eq!(params.scale, 100.0);
        assert_eq!(params.height_scale, 64.0);
        assert_eq!(params.octaves, 4);
        assert_eq!(params.texture_bands.len(), 3);
    }

    #[test]
    fn test_height_at() {
        let terrain = ProceduralTerrain::new(TerrainParams::default());

        let height = terrain.world_height_at(0.0, 0.0);
        assert!(height >= 0.0);
        assert!(height <= 64.0);
        assert_eq!(height, terrain.world_height_at(0.0, 0.0));

        let height3 = terrain.world_height_at(100.0, 100.0);
        assert!(height3 >= 0.0);
        assert!(height3 <= 64.0);
    }

    #[test]
    fn test_different_seeds() {
        let t1 = ProceduralTerrain::new(TerrainParams { seed: 1, ..Default::default() });
        let t2 = ProceduralTerrain::new(TerrainParams { seed: 2, ..Default::default() });
        assert_ne!(t1.world_height_at(50.5, 50.5), t2.world_height_at(50.5, 50.5));
    }

    #[test]
    fn test_flat_terrain() {
        let terrain = ProceduralTerrain::flat("grass.dds");
        let block = terrain.find_block(Vec3::new(-12.0, 0.0, 340.0)).unwrap();
        assert_eq!(block.key, IVec2::new(-1, 3));
        let local = block.to_local(Vec3::new(-12.0, 0.0, 340.0));
        assert_eq!(terrain.height_at(&block, local), 0.0);
        assert!((terrain.normal_at(&block, local) - Vec3::Y).length() < 1e-5);
        assert_eq!(terrain.dominant_texture(&block, local).as_deref(), Some("grass.dds"));
    }

    #[test]
    fn test_local_queries_match_world() {
        let terrain = ProceduralTerrain::new(TerrainParams::default());
        let world = Vec3::new(123.4, 0.0, -56.7);
        let block = terrain.find_block(world).unwrap();
        let local = block.to_local(world);
        let h = terrain.height_at(&block, local);
        assert!((h - terrain.world_height_at(world.x, world.z)).abs() < 1e-3);
    }

    #[test]
    fn test_streaming() {
        let terrain = ProceduralTerrain::flat("grass.dds").with_streaming();
        assert!(terrain.find_block(Vec3::new(10.0, 0.0, 10.0)).is_none());

        terrain.stream_in(IVec2::new(0, 0));
        assert!(terrain.find_block(Vec3::new(10.0, 0.0, 10.0)).is_some());
        assert!(terrain.find_block(Vec3::new(110.0, 0.0, 10.0)).is_none());

        terrain.stream_in_radius(Vec2::ZERO, 150.0);
        assert!(terrain.find_block(Vec3::new(-110.0, 0.0, 110.0)).is_some());

        terrain.stream_out(IVec2::new(0, 0));
        assert!(terrain.find_block(Vec3::new(10.0, 0.0, 10.0)).is_none());
    }
}
