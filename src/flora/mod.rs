//! Streaming detail vegetation.
//!
//! [`Flora`] keeps a toroidal window of `BLOCK_STRIDE x BLOCK_STRIDE`
//! blocks centred on the camera. Walking moves one edge row or column to
//! the leading edge each frame; jumping further than the window re-seeds
//! every block. Moved blocks are refilled under a per-frame cap, and a
//! block whose ecotype is still loading simply waits in the queue.

pub mod block;
pub mod config;
pub mod constants;
pub mod culling;
pub mod draw;
pub mod lut;

pub use block::{FillContext, FillOutcome, FloraBlock};
pub use config::{DensityOption, FloraConfig};
pub use culling::{MacroBox, MacroBoxes};
pub use draw::{DrawOrder, FloraStats, SortedBlock, TransformCache};
pub use lut::OffsetTable;

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use crate::core::error::Error;
use crate::core::types::{Mat4, Result, Vec2, Vec3};
use crate::ecotype::{EcotypeLookup, EcotypeTable};
use crate::math::{Aabb, Frustum};
use crate::render::FloraRenderer;
use crate::terrain::{EcotypePainter, TerrainQuery};

use constants::{BLOCK_STRIDE, BLOCK_WIDTH, MOVE_DIST, VISIBILITY};
use draw::Frame;

/// Number of blocks in the window.
pub const BLOCK_COUNT: usize = BLOCK_STRIDE * BLOCK_STRIDE;

/// The flora streaming manager.
pub struct Flora<R: FloraRenderer> {
    renderer: R,
    terrain: Arc<dyn TerrainQuery>,
    painter: Arc<dyn EcotypePainter>,
    config: Option<Arc<FloraConfig>>,
    table: Rc<RefCell<EcotypeTable>>,
    lut: OffsetTable,
    /// Row-major, `z * BLOCK_STRIDE + x`.
    blocks: Vec<FloraBlock>,
    macro_boxes: MacroBoxes,
    order: DrawOrder,
    transforms: TransformCache,
    /// Blocks waiting for a refill.
    pending: Vec<usize>,
    center_x: usize,
    center_z: usize,
    last_pos: Vec2,
    teleport: bool,
    enabled: bool,
    cull_enabled: bool,
    max_vb_size: usize,
    density_label: Option<String>,
    vb_size: usize,
    vertices_per_block: usize,
    stats: FloraStats,
}

impl<R: FloraRenderer> Flora<R> {
    /// Create an idle manager; nothing streams until [`Flora::init`].
    pub fn new(renderer: R, terrain: Arc<dyn TerrainQuery>, painter: Arc<dyn EcotypePainter>) -> Self {
        Self {
            renderer,
            terrain,
            painter,
            config: None,
            table: Rc::new(RefCell::new(EcotypeTable::new())),
            lut: OffsetTable::new(),
            blocks: (0..BLOCK_COUNT).map(|_| FloraBlock::new()).collect(),
            macro_boxes: MacroBoxes::new(),
            order: DrawOrder::new(BLOCK_COUNT),
            transforms: TransformCache::default(),
            pending: Vec::new(),
            center_x: BLOCK_STRIDE / 2,
            center_z: BLOCK_STRIDE / 2,
            last_pos: Vec2::ZERO,
            teleport: true,
            enabled: true,
            cull_enabled: true,
            max_vb_size: 0,
            density_label: None,
            vb_size: 0,
            vertices_per_block: 0,
            stats: FloraStats::default(),
        }
    }

    /// Apply a configuration: register ecotypes, size the vertex buffer
    /// and schedule a full re-seed.
    pub fn init(&mut self, config: FloraConfig) -> Result<()> {
        config.validate()?;
        let config = Arc::new(config);

        self.release_all();
        self.table.borrow_mut().configure(Arc::clone(&config))?;

        let keep_label = self
            .density_label
            .as_deref()
            .is_some_and(|label| config.density_ratio(label).is_some());
        if !keep_label {
            self.density_label = config.density_options.first().map(|o| o.label.clone());
        }
        self.max_vb_size = config.vb_size;
        self.config = Some(config);
        self.apply_density()
    }

    /// Hot-reload a changed configuration.
    pub fn reload(&mut self, config: FloraConfig) -> Result<()> {
        log::info!("Reloading flora configuration");
        self.init(config)
    }

    /// The configuration in use, if `init` has succeeded.
    pub fn config(&self) -> Option<&FloraConfig> {
        self.config.as_deref()
    }

    /// Drop every block's references and queue nothing; the next update
    /// re-seeds the window.
    fn release_all(&mut self) {
        for block in &mut self.blocks {
            block.invalidate();
        }
        self.pending.clear();
        self.teleport = true;
    }

    /// Set the full-detail vertex budget in bytes. The budget in use is
    /// this scaled by the current density option.
    pub fn set_max_vb_size(&mut self, bytes: usize) -> Result<()> {
        self.max_vb_size = bytes;
        self.apply_density()
    }

    /// Full-detail vertex budget in bytes, before the density ratio.
    pub fn max_vb_size(&self) -> usize {
        self.max_vb_size
    }

    /// Select a named density option. A ratio of 0 turns flora off.
    pub fn set_density_option(&mut self, label: &str) -> Result<()> {
        let Some(config) = &self.config else {
            return Err(Error::Config("flora is not initialised".into()));
        };
        if config.density_ratio(label).is_none() {
            return Err(Error::Config(format!("unknown flora density option '{}'", label)));
        }
        self.density_label = Some(label.to_string());
        self.apply_density()
    }

    /// Ratio of the selected density option, 1.0 without a config.
    pub fn density_ratio(&self) -> f32 {
        match (&self.config, &self.density_label) {
            (Some(config), Some(label)) => config.density_ratio(label).unwrap_or(1.0),
            _ => 1.0,
        }
    }

    fn apply_density(&mut self) -> Result<()> {
        let bytes = (self.max_vb_size as f64 * f64::from(self.density_ratio())) as usize;
        self.set_vb_size(bytes)
    }

    /// Resize the vertex buffer to at most `bytes`.
    ///
    /// The size is reduced to fit the device's primitive limit and to give
    /// every block a whole number of triangles. Zero releases the buffer
    /// and stops streaming.
    pub fn set_vb_size(&mut self, bytes: usize) -> Result<()> {
        if self.config.is_none() {
            return Ok(());
        }
        self.release_all();

        if bytes == 0 {
            self.vb_size = 0;
            self.vertices_per_block = 0;
            return self.renderer.init(0);
        }

        let vertex_size = self.renderer.vertex_size();
        let mut vertices = bytes / vertex_size;
        let max_vertices = self.renderer.max_primitive_count().saturating_mul(3);
        if vertices > max_vertices {
            vertices = max_vertices;
            log::info!("Flora vertex buffer reduced to {} bytes by the device primitive limit", vertices * vertex_size);
        }

        let mut per_block = (vertices / BLOCK_COUNT).max(3);
        if per_block % 3 != 0 {
            per_block -= per_block % 3;
            log::info!(
                "Flora vertex buffer reduced to {} bytes for triangle alignment",
                per_block * BLOCK_COUNT * vertex_size
            );
        }
        let vertices = per_block * BLOCK_COUNT;

        if let Err(e) = self.renderer.init(vertices) {
            log::error!("Failed to create the flora vertex buffer: {}", e);
            self.vb_size = 0;
            self.vertices_per_block = 0;
            return Err(e);
        }
        self.vertices_per_block = per_block;
        self.vb_size = vertices * vertex_size;
        log::info!("Flora: {} triangles per block", per_block / 3);
        log::info!("Flora: {} KB used for vertex buffer", self.vb_size / 1024);
        Ok(())
    }

    /// Bytes of vertex buffer in use.
    pub fn vb_size(&self) -> usize {
        self.vb_size
    }

    /// Vertices in each block's range; always a multiple of 3.
    pub fn vertices_per_block(&self) -> usize {
        self.vertices_per_block
    }

    /// A disabled manager neither streams nor draws.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether streaming and drawing are on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// With culling off, blocks neither move nor get frustum culled.
    pub fn set_cull_enabled(&mut self, enabled: bool) {
        self.cull_enabled = enabled;
    }

    /// Whether blocks move with the camera and get frustum culled.
    pub fn is_cull_enabled(&self) -> bool {
        self.cull_enabled
    }

    /// Re-seed every block on the next update, e.g. after terrain edits.
    pub fn repopulate(&mut self) {
        self.teleport = true;
    }

    /// True until the next update re-seeds the whole window.
    pub fn is_teleport_pending(&self) -> bool {
        self.teleport
    }

    /// Per-frame streaming step.
    pub fn update(&mut self, _dt: f32, camera: Vec3) {
        self.stats.fills = 0;
        if !self.enabled || self.vertices_per_block == 0 {
            return;
        }
        self.table.borrow_mut().poll_loads();

        let cam = Vec2::new(camera.x, camera.z);
        let jump = (self.last_pos - cam).abs();
        if jump.x > MOVE_DIST || jump.y > MOVE_DIST {
            self.teleport = true;
        }

        if self.cull_enabled {
            if self.teleport {
                self.teleport_camera(cam);
            } else {
                self.move_blocks(cam);
            }
        }
        self.last_pos = cam;

        if !self.pending.is_empty() {
            self.fill_blocks();
        }
        self.upload_atlas();
        self.transforms.reset();
    }

    fn upload_atlas(&mut self) {
        let mut table = self.table.borrow_mut();
        if !table.atlas().is_dirty() {
            return;
        }
        match self.renderer.update_atlas(table.atlas()) {
            Ok(()) => table.atlas_mut().mark_clean(),
            Err(e) => log::error!("Failed to upload the flora texture: {}", e),
        }
    }

    fn fill_block(&mut self, index: usize) -> FillOutcome {
        let blur_amount = self.config.as_ref().map_or(0.0, |c| c.blur_amount);
        let mut ctx = FillContext {
            table: &self.table,
            terrain: &*self.terrain,
            painter: &*self.painter,
            lut: &mut self.lut,
            renderer: &mut self.renderer,
            blur_amount,
        };
        let outcome = self.blocks[index].fill(self.vertices_per_block, &mut ctx);
        if outcome == FillOutcome::Filled {
            self.stats.fills += 1;
        }
        outcome
    }

    /// Lay the whole window out around `cam` and try to fill every block.
    pub fn teleport_camera(&mut self, cam: Vec2) {
        log::debug!("Flora teleport to {}", cam);
        let half = (BLOCK_STRIDE / 2) as f32 * BLOCK_WIDTH;
        let top_left = cam + Vec2::new(-half, half);
        let left = BLOCK_WIDTH * (top_left.x / BLOCK_WIDTH).floor();
        let top = BLOCK_WIDTH * (top_left.y / BLOCK_WIDTH).floor();

        // Every block lets go of its ecotypes before any block takes new ones.
        for (i, block) in self.blocks.iter_mut().enumerate() {
            let (x, z) = (i % BLOCK_STRIDE, i / BLOCK_STRIDE);
            let center = Vec2::new(
                left + BLOCK_WIDTH * (x as f32 + 0.5),
                top - BLOCK_WIDTH * (z as f32 + 0.5),
            );
            block.init(center, i * self.vertices_per_block);
        }
        self.teleport = false;
        self.pending.clear();

        for i in 0..BLOCK_COUNT {
            if self.fill_block(i) == FillOutcome::Deferred {
                self.pending.push(i);
            }
        }

        self.center_x = BLOCK_STRIDE / 2;
        self.center_z = BLOCK_STRIDE / 2;
        self.accumulate_bounding_boxes();
    }

    /// Shift one edge column, or failing that one edge row, across to the
    /// leading edge if the camera left the centre block. Returns true if
    /// anything moved.
    pub fn move_blocks(&mut self, cam: Vec2) -> bool {
        let center = self.blocks[self.center_z * BLOCK_STRIDE + self.center_x].center();
        let delta = cam - center;
        let threshold = BLOCK_WIDTH * 0.5;

        let move_x: i32 = if delta.x > threshold {
            1
        } else if delta.x < -threshold {
            -1
        } else {
            0
        };
        // Grid rows run towards -z.
        let move_z: i32 = if delta.y > threshold {
            -1
        } else if delta.y < -threshold {
            1
        } else {
            0
        };

        if move_x != 0 {
            let left = (self.center_x + BLOCK_STRIDE - BLOCK_STRIDE / 2) % BLOCK_STRIDE;
            let right = (self.center_x + BLOCK_STRIDE / 2) % BLOCK_STRIDE;
            let column = if move_x > 0 { left } else { right };
            let shift = Vec2::new(move_x as f32 * MOVE_DIST, 0.0);
            for z in 0..BLOCK_STRIDE {
                self.shift_block(z * BLOCK_STRIDE + column, shift);
            }
            self.center_x = wrap(self.center_x, move_x);
        } else if move_z != 0 {
            let front = (self.center_z + BLOCK_STRIDE - BLOCK_STRIDE / 2) % BLOCK_STRIDE;
            let rear = (self.center_z + BLOCK_STRIDE / 2) % BLOCK_STRIDE;
            let row = if move_z > 0 { front } else { rear };
            let shift = Vec2::new(0.0, -(move_z as f32) * MOVE_DIST);
            for x in 0..BLOCK_STRIDE {
                self.shift_block(row * BLOCK_STRIDE + x, shift);
            }
            self.center_z = wrap(self.center_z, move_z);
        }

        move_x != 0 || move_z != 0
    }

    /// Move a block and queue it, unless it is already waiting.
    fn shift_block(&mut self, index: usize, shift: Vec2) {
        let block = &mut self.blocks[index];
        let queued = block.needs_refill();
        block.set_center(block.center() + shift);
        if !queued {
            self.pending.push(index);
        }
    }

    /// Refill queued blocks, at most `max_per_frame_block_move` of them.
    /// Blocks that could not be filled stay queued in their original order.
    pub fn fill_blocks(&mut self) {
        let budget = self.config.as_ref().map_or(0, |c| c.max_per_frame_block_move);
        let queue = std::mem::take(&mut self.pending);
        let mut retry = Vec::new();
        let mut filled = 0;

        for &index in queue.iter().rev() {
            if filled < budget
                && self.blocks[index].needs_refill()
                && self.fill_block(index) == FillOutcome::Filled
            {
                filled += 1;
            }
            if self.blocks[index].needs_refill() {
                retry.push(index);
            }
        }
        retry.reverse();
        // Anything queued during the fills goes after the retries.
        retry.append(&mut self.pending);
        self.pending = retry;

        if filled > 0 {
            self.accumulate_bounding_boxes();
        }
    }

    /// Rebuild the macro boxes from the current block bounds.
    pub fn accumulate_bounding_boxes(&mut self) {
        self.macro_boxes.accumulate(&self.blocks, self.center_x, self.center_z);
    }

    /// Invalidate and queue the block covering a world point, e.g. after
    /// the terrain under it was edited. Points outside the window and
    /// blocks already waiting are ignored.
    pub fn reset_block_at(&mut self, x: f32, z: f32) {
        let center = self.blocks[self.center_z * BLOCK_STRIDE + self.center_x].center();
        let dx = x - center.x;
        let dz = z - center.y;
        if dx.abs() >= VISIBILITY || dz.abs() >= VISIBILITY {
            return;
        }

        let dx_index = (dx / BLOCK_WIDTH + 0.5f32.copysign(dx)) as i32;
        let dz_index = (dz / BLOCK_WIDTH + 0.5f32.copysign(dz)) as i32;
        let x_index = wrap(self.center_x, dx_index);
        let z_index = wrap(self.center_z, -dz_index);

        let index = z_index * BLOCK_STRIDE + x_index;
        let block = &mut self.blocks[index];
        if !block.needs_refill() {
            block.invalidate();
            self.pending.push(index);
        }
    }

    /// Frustum-cull every block from the view-projection matrix.
    pub fn cull(&mut self, view_proj: &Mat4) {
        let frustum = Frustum::from_view_projection(view_proj);
        self.macro_boxes.cull(&mut self.blocks, &frustum);
    }

    /// Draw the alpha-tested and alpha-blended passes.
    pub fn draw(&mut self, camera: Vec3, view_proj: &Mat4) {
        self.stats.draw_calls = 0;
        self.stats.triangles = 0;
        if !self.enabled || self.vb_size == 0 {
            return;
        }
        let Some(config) = self.config.clone() else {
            return;
        };
        if !self.renderer.pre_draw() {
            return;
        }

        if self.cull_enabled {
            self.cull(view_proj);
        }
        self.order.update(&self.blocks, Vec2::new(camera.x, camera.z));

        let mut frame = Frame {
            blocks: &self.blocks,
            order: &self.order,
            renderer: &mut self.renderer,
            terrain: &*self.terrain,
            transforms: &mut self.transforms,
            vertices_per_block: self.vertices_per_block,
            stats: &mut self.stats,
        };
        if config.alpha_test_distance > 0.0 {
            frame.alpha_test_pass(config.alpha_test_distance, config.alpha_test_fade_pct, config.alpha_test_ref);
        }
        if config.alpha_blend_distance < VISIBILITY {
            frame.alpha_blend_pass(config.alpha_blend_distance, config.alpha_blend_fade_pct);
        }
        self.renderer.post_draw();
    }

    /// Draw shadow casters within alpha-test range that touch the
    /// caster's axis-aligned shadow volume. Uses the culling and order of
    /// the last `draw`.
    pub fn draw_shadows(&mut self, shadow_volume: &Aabb) {
        if !self.enabled || self.vb_size == 0 {
            return;
        }
        let Some(config) = self.config.clone() else {
            return;
        };
        if config.alpha_test_distance <= 0.0 {
            return;
        }

        let mut frame = Frame {
            blocks: &self.blocks,
            order: &self.order,
            renderer: &mut self.renderer,
            terrain: &*self.terrain,
            transforms: &mut self.transforms,
            vertices_per_block: self.vertices_per_block,
            stats: &mut self.stats,
        };
        frame.shadow_pass(shadow_volume, config.alpha_test_distance, config.shadow_alpha_test_ref);
    }

    /// Resolve the ecotype at a world point, starting its load if needed.
    pub fn ecotype_at(&self, pos: Vec2) -> EcotypeLookup {
        self.table
            .borrow_mut()
            .lookup(Vec3::new(pos.x, 0.0, pos.y), &*self.terrain, &*self.painter)
    }

    /// Block until every background ecotype load has been applied.
    pub fn wait_for_loads(&mut self) -> usize {
        self.table.borrow_mut().wait_for_loads()
    }

    /// Counters from the last update and draw.
    pub fn stats(&self) -> FloraStats {
        FloraStats { pending_blocks: self.pending.len(), ..self.stats }
    }

    /// Blocks waiting for a refill. Each block is queued at most once.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Grid indices of the block nearest the camera.
    pub fn center_indices(&self) -> (usize, usize) {
        (self.center_x, self.center_z)
    }

    /// All blocks, row-major by grid index (`z * BLOCK_STRIDE + x`).
    pub fn blocks(&self) -> &[FloraBlock] {
        &self.blocks
    }

    /// Block at grid indices `x` and `z`, both below `BLOCK_STRIDE`.
    pub fn block(&self, x: usize, z: usize) -> &FloraBlock {
        debug_assert!(x < BLOCK_STRIDE && z < BLOCK_STRIDE, "block ({}, {}) outside the grid", x, z);
        &self.blocks[z * BLOCK_STRIDE + x]
    }

    /// Culling boxes as of the last accumulate.
    pub fn macro_boxes(&self) -> &MacroBoxes {
        &self.macro_boxes
    }

    /// Borrow the ecotype registry. Must be released before the next
    /// update or fill.
    pub fn table(&self) -> Ref<'_, EcotypeTable> {
        self.table.borrow()
    }

    /// The rendering backend.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Mutable access to the rendering backend.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}

/// `index + step` modulo the grid stride.
fn wrap(index: usize, step: i32) -> usize {
    (index as i32 + step).rem_euclid(BLOCK_STRIDE as i32) as usize
}
