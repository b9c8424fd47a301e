//! Ecotypes: vegetation types made of a generator and a texture.
//!
//! Ecotypes live in an [`EcotypeTable`] indexed by a small ID. They load
//! in the background on first use, take an atlas slot while referenced
//! and fall back to an uninitialized (but still registered) state when
//! the last [`EcotypeHandle`] is dropped.

pub mod choose_max;
pub mod def;
pub mod generator;
pub mod handle;
pub mod loader;
pub mod mesh;
pub mod table;

pub use choose_max::{ChooseMaxGenerator, SuitabilityFunction};
pub use def::{ChoiceDef, EcotypeDef, FunctionDef, GeneratorDef, VisualDef};
pub use generator::{EcotypeGenerator, Placement, VisualCopy, VisualsGenerator};
pub use handle::EcotypeHandle;
pub use loader::{CancelToken, EcotypeLoader, LoadCompletion, LoadRequest, LoadedEcotype};
pub use mesh::{FloraMesh, MeshFile, MeshVertex};
pub use table::{EcotypeLookup, EcotypeTable};

use std::sync::Arc;

use glam::Vec2;

use crate::texture::SourceTexture;

/// Ecotype identifier.
pub type EcotypeId = u8;

/// Number of addressable ecotype IDs.
pub const MAX_ECOTYPE_IDS: usize = 256;

/// Load state of an ecotype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EcotypeState {
    /// Registered, nothing loaded.
    Uninitialized,
    /// Background load in flight.
    Loading,
    Ready,
}

/// One vegetation type.
#[derive(Debug)]
pub struct Ecotype {
    id: EcotypeId,
    state: EcotypeState,
    ref_count: u32,
    generator: Option<Arc<EcotypeGenerator>>,
    texture: Option<SourceTexture>,
    uv_offset: Vec2,
    generation: u64,
    cancel: Option<CancelToken>,
}

impl Ecotype {
    pub fn new(id: EcotypeId) -> Self {
        Self {
            id,
            state: EcotypeState::Uninitialized,
            ref_count: 0,
            generator: None,
            texture: None,
            uv_offset: Vec2::ZERO,
            generation: 0,
            cancel: None,
        }
    }

    pub fn id(&self) -> EcotypeId {
        self.id
    }

    pub fn state(&self) -> EcotypeState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == EcotypeState::Loading
    }

    pub fn is_initialized(&self) -> bool {
        self.state == EcotypeState::Ready
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn generator(&self) -> Option<&Arc<EcotypeGenerator>> {
        self.generator.as_ref()
    }

    /// Atlas UV offset; valid while referenced.
    pub fn uv_offset(&self) -> Vec2 {
        self.uv_offset
    }

    pub fn texture_name(&self) -> Option<&str> {
        self.texture.as_ref().map(SourceTexture::name)
    }

    /// Drop generator and texture, keeping the ID registered.
    fn uninit(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.state = EcotypeState::Uninitialized;
        self.generator = None;
        self.texture = None;
        self.uv_offset = Vec2::ZERO;
    }
}
