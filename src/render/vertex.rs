//! Flora vertex format and the vertex-writing contract.

use bytemuck::{Pod, Zeroable};

use crate::core::types::{Mat4, Vec2, Vec3};

/// One detail-object vertex as stored in the shared vertex buffer.
///
/// A zeroed vertex is degenerate; unused slots of a block's range are
/// cleared to zero so that they rasterize nothing.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FloraVertex {
    /// Position relative to the owning terrain block (12 bytes, offset 0)
    pub position: [f32; 3],
    /// Wind flex weight, 0 at the base (4 bytes, offset 12)
    pub flex: f32,
    /// Atlas UV, already offset into the ecotype's slot (8 bytes, offset 16)
    pub uv: [f32; 2],
    /// Animation block number in 0..49 (4 bytes, offset 24)
    pub anim_block: u32,
    /// Padding to 32 bytes (4 bytes, offset 28)
    pub _pad: u32,
}

impl FloraVertex {
    pub fn new(position: Vec3, uv: Vec2, flex: f32) -> Self {
        Self {
            position: position.to_array(),
            flex,
            uv: uv.to_array(),
            anim_block: 0,
            _pad: 0,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn uv(&self) -> Vec2 {
        Vec2::from_array(self.uv)
    }

    pub fn is_degenerate(&self) -> bool {
        *self == Self::zeroed()
    }
}

/// Destination for a locked range of the vertex buffer.
///
/// The sink owns the per-object UV offset and animation block; callers set
/// them before appending an object's vertices.
pub trait VertexSink {
    /// Append `count` degenerate vertices.
    fn clear(&mut self, count: usize);

    /// Append one vertex, transforming its position by `transform` and
    /// applying the current UV offset and animation block.
    fn add_vertex(&mut self, vertex: &FloraVertex, transform: &Mat4);

    fn set_uv_offset(&mut self, offset: Vec2);

    fn set_anim_block(&mut self, block: u32);

    /// Number of vertices written since the range was locked.
    fn written(&self) -> usize;

    /// Append a run of vertices sharing one transform.
    fn add_vertices(&mut self, vertices: &[FloraVertex], transform: &Mat4) {
        for v in vertices {
            self.add_vertex(v, transform);
        }
    }
}
