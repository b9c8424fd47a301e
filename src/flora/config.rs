//! Flora configuration.
//!
//! Read once at start-up from JSON and occasionally hot-reloaded. Every
//! field has a default, so a config file only needs the parts it changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::ecotype::{EcotypeDef, EcotypeId, MAX_ECOTYPE_IDS};
use crate::texture::AtlasLayout;

/// Named vertex-budget scale, e.g. `HIGH = 1.0`. A ratio of 0 disables flora.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DensityOption {
    pub label: String,
    pub ratio: f32,
}

impl DensityOption {
    pub fn new(label: impl Into<String>, ratio: f32) -> Self {
        Self { label: label.into(), ratio }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloraConfig {
    /// Vertex buffer budget in bytes.
    pub vb_size: usize,
    /// Steepest slope, in degrees, that derives an ecotype from terrain.
    pub max_slope: f32,
    /// Blocks filled per frame at most.
    pub max_per_frame_block_move: usize,
    pub alpha_test_ref: u32,
    pub shadow_alpha_test_ref: u32,
    /// Radius in metres of the alpha-tested pass; 0 disables it.
    pub alpha_test_distance: f32,
    /// Start of the alpha-blended pass in metres.
    pub alpha_blend_distance: f32,
    pub alpha_test_fade_pct: f32,
    pub alpha_blend_fade_pct: f32,
    /// Radius in metres by which ecotype sample points are jittered.
    pub blur_amount: f32,
    /// Atlas slot size in pixels.
    pub texture_width: u32,
    pub texture_height: u32,
    /// Widest sheet the device supports.
    pub max_sheet_width: u32,
    /// Directory mesh and texture paths are relative to.
    pub resource_root: PathBuf,
    /// Background loader threads.
    pub loader_threads: usize,
    pub density_options: Vec<DensityOption>,
    /// Ecotype definitions; the index is the ecotype ID.
    pub ecotypes: Vec<EcotypeDef>,
}

impl Default for FloraConfig {
    fn default() -> Self {
        Self {
            vb_size: 1 << 20,
            max_slope: 30.0,
            max_per_frame_block_move: 10,
            alpha_test_ref: 128,
            shadow_alpha_test_ref: 70,
            alpha_test_distance: 25.0,
            alpha_blend_distance: 0.0,
            alpha_test_fade_pct: 70.0,
            alpha_blend_fade_pct: 70.0,
            blur_amount: 2.0,
            texture_width: 256,
            texture_height: 128,
            max_sheet_width: 4096,
            resource_root: PathBuf::from("."),
            loader_threads: 2,
            density_options: vec![
                DensityOption::new("HIGH", 1.0),
                DensityOption::new("MEDIUM", 0.5),
                DensityOption::new("LOW", 0.25),
                DensityOption::new("OFF", 0.0),
            ],
            ecotypes: Vec::new(),
        }
    }
}

impl FloraConfig {
    /// Load from a JSON file. A relative `resource_root` is resolved
    /// against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&text)?;
        if config.resource_root.is_relative() {
            if let Some(dir) = path.parent() {
                config.resource_root = dir.join(&config.resource_root);
            }
        }
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ecotypes.len() > MAX_ECOTYPE_IDS {
            return Err(Error::Config(format!(
                "{} ecotypes defined, at most {} are addressable",
                self.ecotypes.len(),
                MAX_ECOTYPE_IDS
            )));
        }
        if self.texture_width == 0 || self.texture_height == 0 {
            return Err(Error::Config("flora texture size must be non-zero".into()));
        }
        if !(0.0..=90.0).contains(&self.max_slope) {
            return Err(Error::Config(format!("max_slope {} is not in 0..=90 degrees", self.max_slope)));
        }
        Ok(())
    }

    pub fn atlas_layout(&self) -> AtlasLayout {
        AtlasLayout::new(self.texture_width, self.texture_height, self.max_sheet_width)
    }

    pub fn cos_max_slope(&self) -> f32 {
        self.max_slope.to_radians().cos()
    }

    /// Terrain texture root to ecotype ID. Later duplicates are ignored.
    pub fn texture_root_map(&self) -> HashMap<String, EcotypeId> {
        let mut map = HashMap::new();
        for (id, def) in self.ecotypes.iter().enumerate().take(MAX_ECOTYPE_IDS) {
            for root in &def.textures {
                if let Some(existing) = map.get(root) {
                    log::warn!("Texture {} already maps to ecotype {}, ignoring ecotype {}", root, existing, id);
                    continue;
                }
                map.insert(root.clone(), id as EcotypeId);
            }
        }
        map
    }

    pub fn density_ratio(&self, label: &str) -> Option<f32> {
        self.density_options
            .iter()
            .find(|o| o.label.eq_ignore_ascii_case(label))
            .map(|o| o.ratio)
    }
}
