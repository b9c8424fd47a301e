//! Flora texture atlas and source texture loading

pub mod atlas;
pub mod mip;
pub mod source;

pub use atlas::{AtlasLayout, FloraTexture, MAX_ECOTYPES};
pub use mip::MipChain;
pub use source::{SourceTexture, TextureSource};
