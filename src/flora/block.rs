//! One cell of the flora grid.
//!
//! A block owns a fixed range of the shared vertex buffer and the
//! ecotype references its placements hold. Filling is two-pass: a dry
//! run walks the lookup table and resolves every placement without
//! touching any shared state, and only if every ecotype it needs is
//! ready does the commit pass replay the same walk into the buffer.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use glam::Quat;

use crate::core::types::{Mat4, Vec2, Vec3};
use crate::ecotype::{EcotypeGenerator, EcotypeHandle, EcotypeId, EcotypeLookup, EcotypeTable, Placement};
use crate::math::{Aabb, Frustum};
use crate::render::FloraRenderer;
use crate::terrain::{EcotypePainter, TerrainBlockInfo, TerrainQuery};

use super::constants::BLOCK_WIDTH;
use super::lut::{offset_radius, OffsetTable};

/// Result of [`FloraBlock::fill`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillOutcome {
    Filled,
    /// Terrain or an ecotype is not ready yet; try again next frame.
    Deferred,
}

/// Shared services a fill needs.
pub struct FillContext<'a> {
    pub table: &'a Rc<RefCell<EcotypeTable>>,
    pub terrain: &'a dyn TerrainQuery,
    pub painter: &'a dyn EcotypePainter,
    pub lut: &'a mut OffsetTable,
    pub renderer: &'a mut dyn FloraRenderer,
    /// Radius in metres by which ecotype sample points are jittered.
    pub blur_amount: f32,
}

/// Lookup-table values consumed by one placement, in draw order.
struct LutDraw {
    offset: Vec2,
    blur: Vec2,
    rotation: f32,
}

impl LutDraw {
    fn next(lut: &mut OffsetTable, blur_scale: f32) -> Self {
        let offset = lut.next_offset();
        let blur = lut.next_offset() * blur_scale;
        let rotation = lut.next_rotation();
        Self { offset, blur, rotation }
    }
}

/// A placement validated by the dry run.
struct PlannedPlacement {
    offset: Vec2,
    id: EcotypeId,
    generator: Arc<EcotypeGenerator>,
    object_to_world: Mat4,
    object_to_chunk: Mat4,
    vertices: usize,
}

pub struct FloraBlock {
    center: Vec2,
    bounds: Aabb,
    culled: bool,
    offset: usize,
    block_id: i32,
    needs_refill: bool,
    ecotypes: Vec<EcotypeHandle>,
}

impl Default for FloraBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl FloraBlock {
    pub fn new() -> Self {
        Self {
            center: Vec2::ZERO,
            bounds: Aabb::INSIDE_OUT,
            culled: true,
            offset: 0,
            block_id: -1,
            needs_refill: true,
            ecotypes: Vec::new(),
        }
    }

    /// Place the block and assign its vertex range.
    pub fn init(&mut self, center: Vec2, offset: usize) {
        self.offset = offset;
        self.set_center(center);
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    /// Move the block. Always invalidates it.
    pub fn set_center(&mut self, center: Vec2) {
        self.center = center;
        self.invalidate();
    }

    /// Release every held ecotype and mark the block for refill.
    pub fn invalidate(&mut self) {
        self.ecotypes.clear();
        let c = Vec3::new(self.center.x, 0.0, self.center.y);
        self.bounds = Aabb::new(c, c);
        self.block_id = -1;
        self.culled = true;
        self.needs_refill = true;
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn culled(&self) -> bool {
        self.culled
    }

    pub(crate) fn set_culled(&mut self, culled: bool) {
        self.culled = culled;
    }

    /// First vertex of this block's range.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Parity of the terrain block under the centre, or -1 if the block
    /// has nothing to draw.
    pub fn block_id(&self) -> i32 {
        self.block_id
    }

    pub fn needs_refill(&self) -> bool {
        self.needs_refill
    }

    /// Filled with something to draw and inside the frustum.
    pub fn is_visible(&self) -> bool {
        !self.culled && self.block_id != -1
    }

    /// IDs of the held ecotype references, one per placement.
    pub fn held_ecotypes(&self) -> impl Iterator<Item = EcotypeId> + '_ {
        self.ecotypes.iter().map(EcotypeHandle::id)
    }

    pub fn held_count(&self) -> usize {
        self.ecotypes.len()
    }

    pub fn cull(&mut self, frustum: &Frustum) {
        self.culled = self.block_id == -1 || !frustum.intersects_aabb(&self.bounds);
    }

    /// Regenerate this block's vertices.
    ///
    /// Nothing is mutated unless the fill succeeds, so a deferred block can
    /// simply be retried.
    pub fn fill(&mut self, max_vertices: usize, ctx: &mut FillContext<'_>) -> FillOutcome {
        let Some(home) = self.probe_terrain(ctx.terrain) else {
            log::trace!("Flora block at {} waiting for terrain", self.center);
            return FillOutcome::Deferred;
        };
        let blur_scale = ctx.blur_amount / offset_radius();

        let Some(plan) = self.plan(max_vertices, &home, blur_scale, ctx) else {
            return FillOutcome::Deferred;
        };

        let Some(sink) = ctx.renderer.lock(self.offset, max_vertices) else {
            log::error!("Could not lock vertices for the flora block at {}", self.center);
            return FillOutcome::Deferred;
        };
        self.ecotypes.clear();
        ctx.lut.seed(self.center);

        let mut bounds = Aabb::INSIDE_OUT;
        let mut held = Vec::with_capacity(plan.len());
        let mut remaining = max_vertices;
        for (index, planned) in plan.iter().enumerate() {
            let draw = LutDraw::next(ctx.lut, blur_scale);
            debug_assert_eq!(draw.offset, planned.offset);

            held.push(EcotypeHandle::acquire(ctx.table, planned.id));
            let uv_offset = ctx.table.borrow().uv_offset(planned.id);
            let placement = Placement {
                uv_offset,
                index,
                max_vertices: remaining,
                object_to_world: planned.object_to_world,
                object_to_chunk: planned.object_to_chunk,
            };
            let written = planned.generator.generate(Some(&mut *sink), &placement, ctx.lut, &mut bounds);
            debug_assert_eq!(written, planned.vertices);
            remaining -= written.min(remaining);
        }
        sink.clear(remaining);
        ctx.renderer.unlock();

        self.ecotypes = held;
        if bounds.is_inside_out() {
            self.block_id = -1;
            self.culled = true;
        } else {
            self.block_id = home.parity();
            self.culled = false;
        }
        self.bounds = bounds;
        self.needs_refill = false;
        log::trace!(
            "Filled flora block at {}: {} placements, {} spare vertices",
            self.center,
            plan.len(),
            remaining
        );
        FillOutcome::Filled
    }

    /// Terrain block under the centre, provided the centre and all four
    /// corners have terrain.
    fn probe_terrain(&self, terrain: &dyn TerrainQuery) -> Option<TerrainBlockInfo> {
        let h = BLOCK_WIDTH * 0.5;
        let home = terrain.find_block(Vec3::new(self.center.x, 0.0, self.center.y))?;
        for corner in [Vec2::new(-h, -h), Vec2::new(h, -h), Vec2::new(-h, h), Vec2::new(h, h)] {
            let p = self.center + corner;
            terrain.find_block(Vec3::new(p.x, 0.0, p.y))?;
        }
        Some(home)
    }

    /// Dry run: resolve placements until the vertex range is used up.
    /// Returns `None` if anything the block needs is still loading.
    fn plan(
        &self,
        max_vertices: usize,
        home: &TerrainBlockInfo,
        blur_scale: f32,
        ctx: &mut FillContext<'_>,
    ) -> Option<Vec<PlannedPlacement>> {
        ctx.lut.seed(self.center);
        let mut plan = Vec::new();
        let mut remaining = max_vertices;
        let mut scratch = Aabb::INSIDE_OUT;

        while remaining > 0 {
            let draw = LutDraw::next(ctx.lut, blur_scale);
            let object_to_world = seat(ctx.terrain, self.center + draw.offset, draw.rotation)?;
            let world = object_to_world.w_axis.truncate();
            let id = resolve_ecotype(ctx, world, draw.blur)?;
            let generator = ctx.table.borrow().generator(id)?;

            let object_to_chunk = home.world_to_local * object_to_world;
            let placement = Placement {
                uv_offset: Vec2::ZERO,
                index: plan.len(),
                max_vertices: remaining,
                object_to_world,
                object_to_chunk,
            };
            let vertices = generator.generate(None, &placement, ctx.lut, &mut scratch);
            if vertices == 0 {
                break;
            }
            remaining -= vertices.min(remaining);
            plan.push(PlannedPlacement {
                offset: draw.offset,
                id,
                generator,
                object_to_world,
                object_to_chunk,
                vertices,
            });
        }
        Some(plan)
    }
}

/// Object-to-world transform of a placement: on the ground, up along the
/// terrain normal, turned by `rotation` about that axis.
fn seat(terrain: &dyn TerrainQuery, pos: Vec2, rotation: f32) -> Option<Mat4> {
    let probe = Vec3::new(pos.x, 0.0, pos.y);
    let block = terrain.find_block(probe)?;
    let local = block.to_local(probe);
    let height = terrain.height_at(&block, local);
    let normal = terrain.normal_at(&block, local).try_normalize().unwrap_or(Vec3::Y);
    let world = block.local_to_world.transform_point3(Vec3::new(local.x, height, local.y));
    let orientation = Quat::from_rotation_arc(Vec3::Y, normal) * Quat::from_rotation_y(rotation);
    Some(Mat4::from_rotation_translation(orientation, world))
}

/// Ecotype for a placement. An empty ecotype under the exact point wins
/// over the blurred sample so neighbours never spill onto bare ground.
fn resolve_ecotype(ctx: &FillContext<'_>, world: Vec3, blur: Vec2) -> Option<EcotypeId> {
    let mut table = ctx.table.borrow_mut();
    match table.lookup(world, ctx.terrain, ctx.painter) {
        EcotypeLookup::Loading => return None,
        EcotypeLookup::Ready { id, is_empty: true } => return Some(id),
        EcotypeLookup::Ready { .. } => {}
    }
    match table.lookup(world + Vec3::new(blur.x, 0.0, blur.y), ctx.terrain, ctx.painter) {
        EcotypeLookup::Loading => None,
        EcotypeLookup::Ready { id, .. } => Some(id),
    }
}

#[cfg(test)]
impl FloraBlock {
    /// A filled block with the given bounds and no held references.
    pub(crate) fn filled_for_test(center: Vec2, offset: usize, bounds: Aabb, block_id: i32) -> Self {
        Self {
            center,
            bounds,
            culled: false,
            offset,
            block_id,
            needs_refill: false,
            ecotypes: Vec::new(),
        }
    }
}
