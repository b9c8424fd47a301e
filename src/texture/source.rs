//! Source textures paged into the flora atlas.

use std::path::Path;

use image::{Rgba, RgbaImage};

use super::mip::MipChain;
use crate::core::error::Error;
use crate::core::types::Result;

/// Where an ecotype's texture comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextureSource {
    /// Image file, relative to the resource root.
    File(String),
    /// Single colour, written as `#rrggbb` or `#rrggbbaa`.
    Solid([u8; 4]),
}

impl TextureSource {
    pub fn parse(s: &str) -> Result<Self> {
        let Some(hex) = s.strip_prefix('#') else {
            return Ok(Self::File(s.to_string()));
        };
        if hex.len() != 6 && hex.len() != 8 {
            return Err(Error::Config(format!("invalid colour '{}'", s)));
        }
        let mut rgba = [255u8; 4];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|e| Error::Config(e.to_string()))?;
            rgba[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| Error::Config(format!("invalid colour '{}'", s)))?;
        }
        Ok(Self::Solid(rgba))
    }

    /// Resource name used to identify the texture in the atlas.
    pub fn name(&self) -> String {
        match self {
            Self::File(path) => path.clone(),
            Self::Solid([r, g, b, a]) => format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a),
        }
    }
}

/// A texture decoded and mipped to one atlas slot's size.
#[derive(Clone, Debug)]
pub struct SourceTexture {
    name: String,
    mips: Vec<RgbaImage>,
}

impl SourceTexture {
    /// Decode `source` and build its mip chain at the slot size.
    ///
    /// Images of the wrong size are logged and rescaled.
    pub fn load(source: &TextureSource, root: &Path, slot_width: u32, slot_height: u32) -> Result<Self> {
        let base = match source {
            TextureSource::File(path) => {
                let full = root.join(path);
                let img = image::open(&full)?.to_rgba8();
                if img.dimensions() != (slot_width, slot_height) {
                    log::warn!(
                        "Flora texture {} is {}x{}, expected {}x{}; rescaling",
                        path,
                        img.width(),
                        img.height(),
                        slot_width,
                        slot_height
                    );
                }
                img
            }
            TextureSource::Solid(rgba) => RgbaImage::from_pixel(slot_width, slot_height, Rgba(*rgba)),
        };
        Ok(Self::from_image(source.name(), &base, slot_width, slot_height))
    }

    pub fn from_image(name: impl Into<String>, base: &RgbaImage, slot_width: u32, slot_height: u32) -> Self {
        let mips = MipChain::new(slot_width, slot_height).build(base);
        Self { name: name.into(), mips }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mips(&self) -> &[RgbaImage] {
        &self.mips
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mips.first().map_or((0, 0), |m| m.dimensions())
    }
}
