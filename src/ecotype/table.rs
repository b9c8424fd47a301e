//! Ecotype registry.
//!
//! Owns the 256 ecotype entries, the atlas their textures page into and
//! the background loader. Only the main thread touches it; loader
//! results are applied by [`EcotypeTable::poll_loads`].

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::core::types::Result;
use crate::flora::config::FloraConfig;
use crate::terrain::{EcotypePainter, EcotypeSelection, TerrainQuery};
use crate::texture::FloraTexture;

use super::generator::EcotypeGenerator;
use super::loader::{CancelToken, EcotypeLoader, LoadCompletion, LoadRequest};
use super::{Ecotype, EcotypeId, EcotypeState, MAX_ECOTYPE_IDS};

/// Outcome of resolving the ecotype at a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EcotypeLookup {
    /// Not usable yet. Also returned when flora has no configuration.
    Loading,
    Ready { id: EcotypeId, is_empty: bool },
}

impl EcotypeLookup {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

pub struct EcotypeTable {
    ecotypes: Vec<Option<Ecotype>>,
    atlas: FloraTexture,
    loader: Option<EcotypeLoader>,
    config: Option<Arc<FloraConfig>>,
    texture_roots: HashMap<String, EcotypeId>,
    cos_max_slope: f32,
    next_generation: u64,
}

impl Default for EcotypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl EcotypeTable {
    /// Unconfigured table; every lookup reports loading.
    pub fn new() -> Self {
        let defaults = FloraConfig::default();
        Self {
            ecotypes: (0..MAX_ECOTYPE_IDS).map(|_| None).collect(),
            atlas: FloraTexture::new(defaults.atlas_layout()),
            loader: None,
            config: None,
            texture_roots: HashMap::new(),
            cos_max_slope: defaults.cos_max_slope(),
            next_generation: 0,
        }
    }

    /// Apply a configuration, dropping every registered ecotype.
    ///
    /// No ecotype may be referenced when this is called.
    pub fn configure(&mut self, config: Arc<FloraConfig>) -> Result<()> {
        self.clear();
        if self.loader.is_none() {
            self.loader = Some(EcotypeLoader::new(config.loader_threads)?);
        }
        self.atlas = FloraTexture::new(config.atlas_layout());
        self.texture_roots = config.texture_root_map();
        self.cos_max_slope = config.cos_max_slope();
        log::info!(
            "Flora: {} ecotypes, {} terrain texture mappings",
            config.ecotypes.len(),
            self.texture_roots.len()
        );
        self.config = Some(config);
        Ok(())
    }

    /// Cancel in-flight loads and forget every ecotype.
    pub fn clear(&mut self) {
        if let Some(loader) = &self.loader {
            loader.cancel_all();
        }
        for slot in &mut self.ecotypes {
            if let Some(ecotype) = slot.as_mut() {
                if ecotype.ref_count > 0 {
                    log::error!("Ecotype {} cleared with {} references", ecotype.id, ecotype.ref_count);
                }
                ecotype.uninit();
            }
            *slot = None;
        }
        self.atlas.reset();
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// Resolve the ecotype at a world position, starting its load if needed.
    pub fn lookup(
        &mut self,
        world: Vec3,
        terrain: &dyn TerrainQuery,
        painter: &dyn EcotypePainter,
    ) -> EcotypeLookup {
        if self.config.is_none() {
            return EcotypeLookup::Loading;
        }

        let id = match painter.ecotype_at(Vec2::new(world.x, world.z)) {
            EcotypeSelection::Id(id) => id,
            EcotypeSelection::Auto => self.generate_ecotype_id(world, terrain),
        };

        let state = self.ecotypes[id as usize]
            .get_or_insert_with(|| Ecotype::new(id))
            .state;
        match state {
            EcotypeState::Uninitialized => {
                self.init(id);
                EcotypeLookup::Loading
            }
            EcotypeState::Loading => EcotypeLookup::Loading,
            EcotypeState::Ready => {
                let is_empty = self
                    .generator(id)
                    .is_none_or(|g| g.is_empty());
                EcotypeLookup::Ready { id, is_empty }
            }
        }
    }

    /// Derive an ecotype from the dominant terrain texture. Steep ground,
    /// missing terrain and unmapped textures give ecotype 0.
    pub fn generate_ecotype_id(&self, world: Vec3, terrain: &dyn TerrainQuery) -> EcotypeId {
        let Some(block) = terrain.find_block(world) else {
            return 0;
        };
        let local = block.to_local(world);
        if terrain.normal_at(&block, local).y <= self.cos_max_slope {
            return 0;
        }
        let Some(texture) = terrain.dominant_texture(&block, local) else {
            return 0;
        };
        let root = texture_root(&texture);
        self.texture_roots.get(root).copied().unwrap_or(0)
    }

    fn init(&mut self, id: EcotypeId) {
        let (Some(config), Some(loader)) = (&self.config, &mut self.loader) else {
            return;
        };
        let Some(ecotype) = self.ecotypes[id as usize].as_mut() else {
            return;
        };

        self.next_generation += 1;
        let cancel = CancelToken::new();
        ecotype.state = EcotypeState::Loading;
        ecotype.generation = self.next_generation;
        ecotype.cancel = Some(cancel.clone());

        log::debug!("Loading ecotype {}", id);
        loader.submit(LoadRequest {
            id,
            generation: self.next_generation,
            generator: config.ecotypes.get(id as usize).and_then(|d| d.generator.clone()),
            resource_root: config.resource_root.clone(),
            layout: config.atlas_layout(),
            cancel,
        });
    }

    /// Apply finished background loads. Returns how many were applied.
    pub fn poll_loads(&mut self) -> usize {
        let done = match self.loader.as_mut() {
            Some(loader) => loader.poll_completed(),
            None => return 0,
        };
        done.into_iter().map(|c| self.apply(c)).filter(|&applied| applied).count()
    }

    /// Block until every in-flight load has finished, then apply them.
    pub fn wait_for_loads(&mut self) -> usize {
        let done = match self.loader.as_mut() {
            Some(loader) => loader.wait_idle(),
            None => return 0,
        };
        done.into_iter().map(|c| self.apply(c)).filter(|&applied| applied).count()
    }

    fn apply(&mut self, completion: LoadCompletion) -> bool {
        if completion.cancel.is_cancelled() {
            return false;
        }
        let id = completion.id;
        let Some(ecotype) = self.ecotypes[id as usize].as_mut() else {
            return false;
        };
        if !ecotype.is_loading() || ecotype.generation != completion.generation {
            log::debug!("Discarding stale load of ecotype {}", id);
            return false;
        }

        ecotype.cancel = None;
        ecotype.state = EcotypeState::Ready;
        match completion.result {
            Ok(loaded) => {
                log::debug!("Ecotype {} loaded", id);
                ecotype.generator = Some(Arc::new(loaded.generator));
                ecotype.texture = loaded.texture;
            }
            Err(e) => {
                log::error!("Ecotype {} failed to load, using an empty generator: {}", id, e);
                ecotype.generator = Some(Arc::new(EcotypeGenerator::Empty));
                ecotype.texture = None;
            }
        }
        true
    }

    /// Take a reference on a ready ecotype. The first reference copies
    /// its texture into the atlas.
    pub(crate) fn inc_ref(&mut self, id: EcotypeId) {
        let Some(ecotype) = self.ecotypes[id as usize].as_mut() else {
            log::error!("Reference taken on unregistered ecotype {}", id);
            return;
        };
        debug_assert!(ecotype.is_initialized(), "ecotype {} referenced before it loaded", id);

        ecotype.ref_count += 1;
        if ecotype.ref_count == 1 {
            if let Some(texture) = &ecotype.texture {
                ecotype.uv_offset = self.atlas.allocate(id, texture);
            }
            log::trace!("Ecotype {} activated", id);
        }
    }

    /// Release a reference. The last one frees the atlas slot and
    /// uninitializes the ecotype.
    pub(crate) fn dec_ref(&mut self, id: EcotypeId) {
        let Some(ecotype) = self.ecotypes[id as usize].as_mut() else {
            return;
        };
        if ecotype.ref_count == 0 {
            log::error!("Ecotype {} reference count underflow", id);
            debug_assert!(false, "ecotype {} reference count underflow", id);
            return;
        }

        ecotype.ref_count -= 1;
        if ecotype.ref_count == 0 {
            if ecotype.texture.is_some() {
                self.atlas.deallocate(id);
            }
            ecotype.uninit();
            log::trace!("Ecotype {} released", id);
        }
    }

    pub fn generator(&self, id: EcotypeId) -> Option<Arc<EcotypeGenerator>> {
        self.ecotypes[id as usize].as_ref().and_then(|e| e.generator.clone())
    }

    pub fn uv_offset(&self, id: EcotypeId) -> Vec2 {
        self.ecotypes[id as usize].as_ref().map_or(Vec2::ZERO, |e| e.uv_offset)
    }

    pub fn ecotype(&self, id: EcotypeId) -> Option<&Ecotype> {
        self.ecotypes[id as usize].as_ref()
    }

    pub fn atlas(&self) -> &FloraTexture {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut FloraTexture {
        &mut self.atlas
    }

    /// Ecotypes with a background load in flight.
    pub fn loading_count(&self) -> usize {
        self.ecotypes.iter().flatten().filter(|e| e.is_loading()).count()
    }

    /// Ecotypes currently referenced by at least one block.
    pub fn live_count(&self) -> usize {
        self.ecotypes.iter().flatten().filter(|e| e.ref_count > 0).count()
    }
}

/// Resource name without its extension.
fn texture_root(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if !name[dot..].contains('/') => &name[..dot],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecotype::def::{EcotypeDef, GeneratorDef, VisualDef};
    use crate::terrain::{AutoEcotypes, PaintedEcotypeMap, ProceduralTerrain, TerrainParams};

    fn grass_def(colour: &str) -> EcotypeDef {
        EcotypeDef {
            textures: vec!["maps/terrain/grass".into()],
            generator: Some(GeneratorDef::Visual {
                density: 1.0,
                texture: colour.into(),
                visuals: vec![VisualDef { mesh: "quad".into(), flex: 1.0, scale_variation: 0.0 }],
            }),
        }
    }

    fn config() -> Arc<FloraConfig> {
        Arc::new(FloraConfig {
            texture_width: 16,
            texture_height: 8,
            ecotypes: vec![EcotypeDef::default(), grass_def("#00ff00")],
            ..Default::default()
        })
    }

    fn table() -> EcotypeTable {
        let mut table = EcotypeTable::new();
        table.configure(config()).unwrap();
        table
    }

    #[test]
    fn test_texture_root() {
        assert_eq!(texture_root("maps/terrain/grass.dds"), "maps/terrain/grass");
        assert_eq!(texture_root("maps/terrain.v2/grass"), "maps/terrain.v2/grass");
        assert_eq!(texture_root("grass"), "grass");
    }

    #[test]
    fn test_unconfigured_is_always_loading() {
        let mut table = EcotypeTable::new();
        let terrain = ProceduralTerrain::flat("maps/terrain/grass.dds");
        assert_eq!(table.lookup(Vec3::ZERO, &terrain, &AutoEcotypes), EcotypeLookup::Loading);
        assert_eq!(table.wait_for_loads(), 0);
        assert_eq!(table.lookup(Vec3::ZERO, &terrain, &AutoEcotypes), EcotypeLookup::Loading);
    }

    #[test]
    fn test_lookup_loads_in_background() {
        let mut table = table();
        let terrain = ProceduralTerrain::flat("maps/terrain/grass.dds");
        let p = Vec3::new(12.0, 0.0, 30.0);

        assert!(table.lookup(p, &terrain, &AutoEcotypes).is_loading());
        assert_eq!(table.loading_count(), 1);
        assert!(table.lookup(p, &terrain, &AutoEcotypes).is_loading());

        assert_eq!(table.wait_for_loads(), 1);
        assert_eq!(
            table.lookup(p, &terrain, &AutoEcotypes),
            EcotypeLookup::Ready { id: 1, is_empty: false }
        );
        assert_eq!(table.ecotype(1).unwrap().texture_name(), Some("#00ff00ff"));
    }

    #[test]
    fn test_unmapped_and_steep_fall_back_to_zero() {
        let table = table();
        let sand = ProceduralTerrain::flat("maps/terrain/sand.dds");
        assert_eq!(table.generate_ecotype_id(Vec3::ZERO, &sand), 0);

        let grass = ProceduralTerrain::flat("maps/terrain/grass.dds");
        assert_eq!(table.generate_ecotype_id(Vec3::ZERO, &grass), 1);

        let streamed = ProceduralTerrain::flat("maps/terrain/grass.dds").with_streaming();
        assert_eq!(table.generate_ecotype_id(Vec3::ZERO, &streamed), 0);

        let mountains = ProceduralTerrain::new(TerrainParams {
            scale: 5.0,
            height_scale: 200.0,
            texture_bands: vec![crate::terrain::TextureBand::new(f32::MAX, "maps/terrain/grass.dds")],
            steep_cos: -1.0,
            ..Default::default()
        });
        let steep = (0..200)
            .map(|i| Vec3::new(i as f32 * 0.37, 0.0, 3.1))
            .find(|p| mountains.world_normal_at(p.x, p.z).y < 0.8)
            .unwrap();
        assert_eq!(table.generate_ecotype_id(steep, &mountains), 0);
    }

    #[test]
    fn test_empty_ecotype_lookup() {
        let mut table = table();
        let sand = ProceduralTerrain::flat("maps/terrain/sand.dds");
        table.lookup(Vec3::ZERO, &sand, &AutoEcotypes);
        table.wait_for_loads();
        assert_eq!(
            table.lookup(Vec3::ZERO, &sand, &AutoEcotypes),
            EcotypeLookup::Ready { id: 0, is_empty: true }
        );
    }

    #[test]
    fn test_painted_overrides_terrain() {
        let mut table = table();
        let sand = ProceduralTerrain::flat("maps/terrain/sand.dds");
        let painter = PaintedEcotypeMap::new(10.0);
        painter.paint(Vec2::new(1.0, 1.0), 1);
        table.lookup(Vec3::new(1.0, 0.0, 1.0), &sand, &painter);
        table.wait_for_loads();
        assert_eq!(
            table.lookup(Vec3::new(1.0, 0.0, 1.0), &sand, &painter),
            EcotypeLookup::Ready { id: 1, is_empty: false }
        );
    }

    #[test]
    fn test_ref_counting_drives_atlas() {
        let mut table = table();
        let grass = ProceduralTerrain::flat("maps/terrain/grass.dds");
        table.lookup(Vec3::ZERO, &grass, &AutoEcotypes);
        table.wait_for_loads();

        table.inc_ref(1);
        table.inc_ref(1);
        assert_eq!(table.atlas().slot_of(1), Some(0));
        assert_eq!(table.atlas().copy_count(), 1);
        assert_eq!(table.live_count(), 1);

        table.dec_ref(1);
        assert!(table.ecotype(1).unwrap().is_initialized());
        table.dec_ref(1);
        assert_eq!(table.atlas().slot_of(1), None);
        assert_eq!(table.ecotype(1).unwrap().state(), EcotypeState::Uninitialized);

        // Reactivating reloads the ecotype and reclaims the same slot.
        assert!(table.lookup(Vec3::ZERO, &grass, &AutoEcotypes).is_loading());
        table.wait_for_loads();
        table.inc_ref(1);
        assert_eq!(table.atlas().slot_of(1), Some(0));
        assert_eq!(table.atlas().copy_count(), 1);
        table.dec_ref(1);
    }

    #[test]
    fn test_failed_load_degrades_to_empty() {
        let mut table = EcotypeTable::new();
        table
            .configure(Arc::new(FloraConfig {
                ecotypes: vec![grass_def("missing/texture.png")],
                ..Default::default()
            }))
            .unwrap();
        let grass = ProceduralTerrain::flat("maps/terrain/grass.dds");
        table.lookup(Vec3::ZERO, &grass, &AutoEcotypes);
        table.wait_for_loads();
        assert_eq!(
            table.lookup(Vec3::ZERO, &grass, &AutoEcotypes),
            EcotypeLookup::Ready { id: 0, is_empty: true }
        );
    }

    #[test]
    fn test_reconfigure_discards_in_flight_loads() {
        let mut table = table();
        let grass = ProceduralTerrain::flat("maps/terrain/grass.dds");
        table.lookup(Vec3::ZERO, &grass, &AutoEcotypes);
        table.configure(config()).unwrap();
        assert_eq!(table.wait_for_loads(), 0);
        assert!(table.ecotype(1).is_none());
    }
}
