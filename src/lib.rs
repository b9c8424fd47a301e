//! Flora - streaming detail vegetation around a moving camera

pub mod core;
pub mod math;
pub mod terrain;
pub mod render;
pub mod texture;
pub mod ecotype;
pub mod flora;
