//! Rendering backend interface for flora.
//!
//! The flora manager never touches GPU objects directly. It writes vertices
//! through a locked [`VertexSink`] range and submits draws through a
//! [`FloraRenderer`]. [`CpuFloraRenderer`] is a headless implementation
//! that keeps the vertex buffer in memory and records every draw call.

pub mod cpu;
pub mod vertex;

pub use cpu::{CpuFloraRenderer, DrawCall};
pub use vertex::{FloraVertex, VertexSink};

use crate::core::types::{Mat4, Result};
use crate::texture::FloraTexture;

/// Kind of pass a draw call was submitted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    /// Near blocks, alpha tested, front to back.
    AlphaTest,
    /// Far blocks, alpha blended, back to front.
    AlphaBlend,
    Shadow,
}

/// GPU-side services used by the flora manager.
pub trait FloraRenderer {
    /// Size in bytes of one vertex in the shared buffer.
    fn vertex_size(&self) -> usize {
        std::mem::size_of::<FloraVertex>()
    }

    /// Largest number of primitives a single buffer may hold.
    fn max_primitive_count(&self) -> usize;

    /// (Re)create the shared vertex buffer with room for `vertex_count`
    /// vertices. A count of 0 releases it.
    fn init(&mut self, vertex_count: usize) -> Result<()>;

    /// Lock `count` vertices starting at `first` for writing.
    fn lock(&mut self, first: usize, count: usize) -> Option<&mut dyn VertexSink>;

    /// Commit the range opened by the last `lock`.
    fn unlock(&mut self);

    /// Start a frame; returns false if nothing can be drawn.
    fn pre_draw(&mut self) -> bool;

    fn post_draw(&mut self);

    fn begin_alpha_test_pass(&mut self, distance: f32, fade_pct: f32, alpha_ref: u32);

    fn begin_alpha_blend_pass(&mut self, distance: f32, fade_pct: f32);

    /// Draw `count` vertices from `first`, positioned by `transform`.
    fn draw_block(&mut self, first: usize, count: usize, transform: &Mat4);

    /// Start a shadow caster pass; returns false if unsupported.
    fn begin_shadow_pass(&mut self, alpha_ref: u32) -> bool;

    fn end_shadow_pass(&mut self);

    /// Upload a changed atlas sheet.
    fn update_atlas(&mut self, atlas: &FloraTexture) -> Result<()>;
}
