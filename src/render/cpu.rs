//! Headless renderer keeping the flora vertex buffer in system memory.

use crate::core::error::Error;
use crate::core::types::{Mat4, Result, Vec2, Vec3};
use crate::texture::FloraTexture;

use super::vertex::{FloraVertex, VertexSink};
use super::{FloraRenderer, PassKind};

/// One recorded `draw_block` call.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub pass: PassKind,
    pub first: usize,
    pub count: usize,
    pub transform: Mat4,
}

/// Staging area handed out by [`CpuFloraRenderer::lock`].
#[derive(Debug, Default)]
pub struct CpuVertexSink {
    staging: Vec<FloraVertex>,
    capacity: usize,
    uv_offset: Vec2,
    anim_block: u32,
    overflow: usize,
}

impl CpuVertexSink {
    fn reset(&mut self, capacity: usize) {
        self.staging.clear();
        self.staging.reserve(capacity);
        self.capacity = capacity;
        self.uv_offset = Vec2::ZERO;
        self.anim_block = 0;
        self.overflow = 0;
    }

    fn push(&mut self, vertex: FloraVertex) {
        if self.staging.len() < self.capacity {
            self.staging.push(vertex);
        } else {
            self.overflow += 1;
        }
    }
}

impl VertexSink for CpuVertexSink {
    fn clear(&mut self, count: usize) {
        for _ in 0..count {
            self.push(FloraVertex::default());
        }
    }

    fn add_vertex(&mut self, vertex: &FloraVertex, transform: &Mat4) {
        let position = transform.transform_point3(Vec3::from_array(vertex.position));
        self.push(FloraVertex {
            position: position.to_array(),
            flex: vertex.flex,
            uv: (vertex.uv() + self.uv_offset).to_array(),
            anim_block: self.anim_block,
            _pad: 0,
        });
    }

    fn set_uv_offset(&mut self, offset: Vec2) {
        self.uv_offset = offset;
    }

    fn set_anim_block(&mut self, block: u32) {
        self.anim_block = block;
    }

    fn written(&self) -> usize {
        self.staging.len() + self.overflow
    }
}

/// In-memory [`FloraRenderer`].
///
/// Draw calls are recorded per frame and can be inspected after `draw`;
/// the atlas upload count tracks how often the sheet changed.
pub struct CpuFloraRenderer {
    vertices: Vec<FloraVertex>,
    max_primitives: usize,
    sink: CpuVertexSink,
    locked: Option<(usize, usize)>,
    pass: Option<PassKind>,
    draws: Vec<DrawCall>,
    frames: u64,
    atlas_uploads: usize,
    lock_count: usize,
}

impl Default for CpuFloraRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuFloraRenderer {
    pub fn new() -> Self {
        Self::with_max_primitives(usize::MAX / 3)
    }

    /// Renderer reporting a device primitive cap.
    pub fn with_max_primitives(max_primitives: usize) -> Self {
        Self {
            vertices: Vec::new(),
            max_primitives,
            sink: CpuVertexSink::default(),
            locked: None,
            pass: None,
            draws: Vec::new(),
            frames: 0,
            atlas_uploads: 0,
            lock_count: 0,
        }
    }

    pub fn vertices(&self) -> &[FloraVertex] {
        &self.vertices
    }

    /// Vertices of one block range.
    pub fn range(&self, first: usize, count: usize) -> &[FloraVertex] {
        let end = (first + count).min(self.vertices.len());
        &self.vertices[first.min(end)..end]
    }

    /// Draw calls recorded since the last `pre_draw`/`begin_shadow_pass`.
    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn draws_in(&self, pass: PassKind) -> impl Iterator<Item = &DrawCall> {
        self.draws.iter().filter(move |d| d.pass == pass)
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn atlas_uploads(&self) -> usize {
        self.atlas_uploads
    }

    pub fn lock_count(&self) -> usize {
        self.lock_count
    }
}

impl FloraRenderer for CpuFloraRenderer {
    fn max_primitive_count(&self) -> usize {
        self.max_primitives
    }

    fn init(&mut self, vertex_count: usize) -> Result<()> {
        if self.locked.is_some() {
            return Err(Error::Renderer("vertex buffer resized while locked".into()));
        }
        self.vertices.clear();
        self.vertices.resize(vertex_count, FloraVertex::default());
        log::debug!("CPU flora buffer: {} vertices", vertex_count);
        Ok(())
    }

    fn lock(&mut self, first: usize, count: usize) -> Option<&mut dyn VertexSink> {
        if self.locked.is_some() || first + count > self.vertices.len() {
            log::error!(
                "Cannot lock vertices {}..{} of {}",
                first,
                first + count,
                self.vertices.len()
            );
            return None;
        }
        self.locked = Some((first, count));
        self.lock_count += 1;
        self.sink.reset(count);
        Some(&mut self.sink)
    }

    fn unlock(&mut self) {
        let Some((first, count)) = self.locked.take() else {
            return;
        };
        if self.sink.overflow > 0 {
            log::error!("Flora block overflowed its range by {} vertices", self.sink.overflow);
        }
        let written = self.sink.staging.len();
        self.vertices[first..first + written].copy_from_slice(&self.sink.staging);
        // Anything not written stays degenerate.
        self.vertices[first + written..first + count].fill(FloraVertex::default());
    }

    fn pre_draw(&mut self) -> bool {
        self.frames += 1;
        self.draws.clear();
        self.pass = None;
        !self.vertices.is_empty()
    }

    fn post_draw(&mut self) {
        self.pass = None;
    }

    fn begin_alpha_test_pass(&mut self, _distance: f32, _fade_pct: f32, _alpha_ref: u32) {
        self.pass = Some(PassKind::AlphaTest);
    }

    fn begin_alpha_blend_pass(&mut self, _distance: f32, _fade_pct: f32) {
        self.pass = Some(PassKind::AlphaBlend);
    }

    fn draw_block(&mut self, first: usize, count: usize, transform: &Mat4) {
        let Some(pass) = self.pass else {
            log::warn!("draw_block outside of a pass");
            return;
        };
        self.draws.push(DrawCall { pass, first, count, transform: *transform });
    }

    fn begin_shadow_pass(&mut self, _alpha_ref: u32) -> bool {
        self.draws.clear();
        self.pass = Some(PassKind::Shadow);
        !self.vertices.is_empty()
    }

    fn end_shadow_pass(&mut self) {
        self.pass = None;
    }

    fn update_atlas(&mut self, _atlas: &FloraTexture) -> Result<()> {
        self.atlas_uploads += 1;
        Ok(())
    }
}
