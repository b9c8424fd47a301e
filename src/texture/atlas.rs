//! Shared flora texture sheet with a fixed number of ecotype slots.
//!
//! Each slot holds one ecotype's texture. A freed slot remembers which
//! ecotype last used it (tag `-(id + 1)`) so that ecotype can take it back
//! without copying its texture in again.

use glam::Vec2;
use image::RgbaImage;

use super::mip::MipChain;
use super::source::SourceTexture;
use crate::ecotype::EcotypeId;

/// Number of slots in the sheet.
pub const MAX_ECOTYPES: usize = 16;

const NEVER_USED: i32 = -1000;

/// Slot grid of the sheet, derived from slot size and device width.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasLayout {
    pub slot_width: u32,
    pub slot_height: u32,
    pub blocks_wide: u32,
    pub blocks_high: u32,
}

impl AtlasLayout {
    /// Lay out [`MAX_ECOTYPES`] slots in one row, halving the row and
    /// doubling the row count while the sheet is wider than `max_width`.
    pub fn new(slot_width: u32, slot_height: u32, max_width: u32) -> Self {
        let mut blocks_wide = MAX_ECOTYPES as u32;
        let mut blocks_high = 1;
        while blocks_wide > 1 && slot_width * blocks_wide > max_width {
            blocks_wide /= 2;
            blocks_high *= 2;
        }
        if slot_width * blocks_wide > max_width {
            log::error!(
                "Flora texture slot width {} exceeds the device limit {}",
                slot_width,
                max_width
            );
        }
        Self { slot_width, slot_height, blocks_wide, blocks_high }
    }

    pub fn width(&self) -> u32 {
        self.slot_width * self.blocks_wide
    }

    pub fn height(&self) -> u32 {
        self.slot_height * self.blocks_high
    }

    /// Resolution-independent UV offset of a slot.
    pub fn slot_offset(&self, slot: usize) -> Vec2 {
        let slot = slot as u32;
        Vec2::new(
            (slot % self.blocks_wide) as f32 / self.blocks_wide as f32,
            (slot / self.blocks_wide) as f32 / self.blocks_high as f32,
        )
    }

    /// UV scale applied to mesh UVs so they address a single slot.
    pub fn uv_scale(&self) -> Vec2 {
        Vec2::new(1.0 / self.blocks_wide as f32, 1.0 / self.blocks_high as f32)
    }
}

#[derive(Clone, Debug)]
struct Slot {
    /// Owning ecotype ID, or `-(id + 1)` of the last owner when free.
    tag: i32,
    texture: String,
    offset: Vec2,
    pixel_x: u32,
    pixel_y: u32,
}

/// The flora texture atlas.
pub struct FloraTexture {
    layout: AtlasLayout,
    slots: Vec<Slot>,
    /// Sheet mip levels, largest first.
    sheet: Vec<RgbaImage>,
    dirty: bool,
    copies: usize,
}

impl FloraTexture {
    pub fn new(layout: AtlasLayout) -> Self {
        let slots = (0..MAX_ECOTYPES)
            .map(|i| {
                let offset = layout.slot_offset(i);
                Slot {
                    tag: NEVER_USED,
                    texture: String::new(),
                    offset,
                    pixel_x: (offset.x * layout.width() as f32) as u32,
                    pixel_y: (offset.y * layout.height() as f32) as u32,
                }
            })
            .collect();

        let slot_mips = MipChain::new(layout.slot_width, layout.slot_height);
        let sheet = slot_mips
            .levels()
            .iter()
            .enumerate()
            .map(|(level, _)| RgbaImage::new((layout.width() >> level).max(1), (layout.height() >> level).max(1)))
            .collect();

        log::info!(
            "Flora texture: sheet {}x{}, blocks {}x{}, block size {}x{}",
            layout.width(),
            layout.height(),
            layout.blocks_wide,
            layout.blocks_high,
            layout.slot_width,
            layout.slot_height
        );

        Self { layout, slots, sheet, dirty: true, copies: 0 }
    }

    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    pub fn blocks_wide(&self) -> u32 {
        self.layout.blocks_wide
    }

    pub fn blocks_high(&self) -> u32 {
        self.layout.blocks_high
    }

    /// Take a slot for `id` and return its UV offset.
    ///
    /// A slot last freed by the same ecotype is reclaimed without a copy.
    /// Otherwise the first free slot receives `texture`. When every slot is
    /// taken this logs an error and returns slot 0's offset.
    pub fn allocate(&mut self, id: EcotypeId, texture: &SourceTexture) -> Vec2 {
        let id = i32::from(id);

        if let Some(slot) = self.slots.iter_mut().find(|s| s.tag == -(id + 1)) {
            log::trace!("Ecotype {} regained atlas slot at {:?}", id, slot.offset);
            slot.tag = id;
            return slot.offset;
        }

        let Some(index) = self.slots.iter().position(|s| s.tag < 0) else {
            log::error!("Flora texture: all {} blocks used, ecotype {} shares block 0", MAX_ECOTYPES, id);
            return self.slots[0].offset;
        };

        self.slots[index].tag = id;
        self.slots[index].texture = texture.name().to_string();
        self.swap_in(index, texture);
        self.slots[index].offset
    }

    /// Release the slot held by `id`, remembering the ID for reclaim.
    pub fn deallocate(&mut self, id: EcotypeId) {
        let id = i32::from(id);
        if let Some(slot) = self.slots.iter_mut().find(|s| s.tag == id) {
            slot.tag = -(id + 1);
        } else {
            log::trace!("Ecotype {} had no atlas slot to release", id);
        }
    }

    /// Forget every slot, including reclaim tags.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.tag = NEVER_USED;
            slot.texture.clear();
        }
        self.dirty = true;
    }

    fn swap_in(&mut self, index: usize, texture: &SourceTexture) {
        let slot = &self.slots[index];
        for (level, (dst, src)) in self.sheet.iter_mut().zip(texture.mips()).enumerate() {
            let x = slot.pixel_x >> level;
            let y = slot.pixel_y >> level;
            let w = (self.layout.slot_width >> level).min(src.width());
            let h = (self.layout.slot_height >> level).min(src.height());
            for sy in 0..h {
                for sx in 0..w {
                    if x + sx < dst.width() && y + sy < dst.height() {
                        dst.put_pixel(x + sx, y + sy, *src.get_pixel(sx, sy));
                    }
                }
            }
        }
        self.copies += 1;
        self.dirty = true;
    }

    /// Slot index owned by a live ecotype.
    pub fn slot_of(&self, id: EcotypeId) -> Option<usize> {
        self.slots.iter().position(|s| s.tag == i32::from(id))
    }

    /// Number of slots tagged with a live `id`.
    pub fn live_slot_count(&self, id: EcotypeId) -> usize {
        self.slots.iter().filter(|s| s.tag == i32::from(id)).count()
    }

    pub fn free_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.tag < 0).count()
    }

    /// Name of the texture last copied into a slot.
    pub fn slot_texture(&self, slot: usize) -> Option<&str> {
        self.slots.get(slot).map(|s| s.texture.as_str()).filter(|s| !s.is_empty())
    }

    /// Total texture copies into the sheet.
    pub fn copy_count(&self) -> usize {
        self.copies
    }

    pub fn sheet(&self) -> &[RgbaImage] {
        &self.sheet
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn tex(name: &str, rgba: [u8; 4]) -> SourceTexture {
        SourceTexture::from_image(name, &RgbaImage::from_pixel(16, 8, Rgba(rgba)), 16, 8)
    }

    fn atlas() -> FloraTexture {
        FloraTexture::new(AtlasLayout::new(16, 8, 4096))
    }

    #[test]
    fn test_layout_single_row() {
        let layout = AtlasLayout::new(256, 128, 4096);
        assert_eq!((layout.blocks_wide, layout.blocks_high), (16, 1));
        assert_eq!(layout.width(), 4096);
        assert_eq!(layout.slot_offset(3), Vec2::new(3.0 / 16.0, 0.0));
    }

    #[test]
    fn test_layout_wraps_rows() {
        let layout = AtlasLayout::new(256, 128, 1024);
        assert_eq!((layout.blocks_wide, layout.blocks_high), (4, 4));
        assert_eq!(layout.slot_offset(5), Vec2::new(0.25, 0.25));
        assert_eq!(layout.uv_scale(), Vec2::new(0.25, 0.25));
    }

    #[test]
    fn test_allocate_copies_texture() {
        let mut atlas = atlas();
        let offset = atlas.allocate(3, &tex("a", [200, 0, 0, 255]));
        assert_eq!(offset, Vec2::ZERO);
        assert_eq!(atlas.slot_of(3), Some(0));
        assert_eq!(atlas.copy_count(), 1);
        assert_eq!(atlas.sheet()[0].get_pixel(5, 5), &Rgba([200, 0, 0, 255]));
        assert_eq!(atlas.sheet()[1].get_pixel(2, 2), &Rgba([200, 0, 0, 255]));
        assert_eq!(atlas.slot_texture(0), Some("a"));
    }

    #[test]
    fn test_reclaim_without_copy() {
        let mut atlas = atlas();
        atlas.allocate(1, &tex("a", [1, 1, 1, 255]));
        let b = atlas.allocate(2, &tex("b", [2, 2, 2, 255]));
        atlas.deallocate(2);
        assert_eq!(atlas.slot_of(2), None);

        let again = atlas.allocate(2, &tex("b", [2, 2, 2, 255]));
        assert_eq!(again, b);
        assert_eq!(atlas.copy_count(), 2);
    }

    #[test]
    fn test_reclaim_tag_for_id_zero() {
        let mut atlas = atlas();
        atlas.allocate(0, &tex("z", [0, 0, 0, 255]));
        atlas.deallocate(0);
        atlas.allocate(0, &tex("z", [0, 0, 0, 255]));
        assert_eq!(atlas.copy_count(), 1);
        assert_eq!(atlas.slot_of(0), Some(0));
    }

    #[test]
    fn test_freed_slot_is_reused_by_other_id() {
        let mut atlas = atlas();
        for id in 0..MAX_ECOTYPES as u8 {
            atlas.allocate(id, &tex("t", [id, 0, 0, 255]));
        }
        assert_eq!(atlas.free_slots(), 0);
        atlas.deallocate(5);
        let offset = atlas.allocate(40, &tex("u", [9, 9, 9, 255]));
        assert_eq!(offset, atlas.layout().slot_offset(5));
        assert_eq!(atlas.live_slot_count(40), 1);
    }

    #[test]
    fn test_exhausted_returns_slot_zero() {
        let mut atlas = atlas();
        for id in 0..MAX_ECOTYPES as u8 {
            atlas.allocate(id, &tex("t", [0, 0, 0, 255]));
        }
        let offset = atlas.allocate(99, &tex("x", [0, 0, 0, 255]));
        assert_eq!(offset, Vec2::ZERO);
        assert_eq!(atlas.slot_of(99), None);
        assert_eq!(atlas.copy_count(), MAX_ECOTYPES);
    }

    #[test]
    fn test_dirty_flag() {
        let mut atlas = atlas();
        assert!(atlas.is_dirty());
        atlas.mark_clean();
        atlas.allocate(1, &tex("a", [1, 1, 1, 255]));
        assert!(atlas.is_dirty());
    }
}
