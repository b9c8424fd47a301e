//! Painted ecotype maps.

use std::collections::HashMap;
use std::sync::RwLock;

use glam::{IVec2, Vec2};

use super::{EcotypePainter, EcotypeSelection};
use crate::ecotype::EcotypeId;

/// Painter with nothing painted; every query derives from terrain.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoEcotypes;

impl EcotypePainter for AutoEcotypes {
    fn ecotype_at(&self, _world: Vec2) -> EcotypeSelection {
        EcotypeSelection::Auto
    }
}

/// Sparse grid of explicitly painted ecotype IDs.
///
/// Cells that were never painted (or were erased) report
/// [`EcotypeSelection::Auto`].
pub struct PaintedEcotypeMap {
    cell_size: f32,
    cells: RwLock<HashMap<IVec2, EcotypeId>>,
}

impl PaintedEcotypeMap {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(f32::EPSILON),
            cells: RwLock::new(HashMap::new()),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn cell_of(&self, world: Vec2) -> IVec2 {
        (world / self.cell_size).floor().as_ivec2()
    }

    /// Paint the cell containing a world XZ position.
    pub fn paint(&self, world: Vec2, id: EcotypeId) {
        let cell = self.cell_of(world);
        if let Ok(mut cells) = self.cells.write() {
            cells.insert(cell, id);
        }
    }

    /// Paint every cell overlapping an axis-aligned XZ rectangle.
    pub fn paint_rect(&self, min: Vec2, max: Vec2, id: EcotypeId) {
        let lo = self.cell_of(min.min(max));
        let hi = self.cell_of(min.max(max));
        if let Ok(mut cells) = self.cells.write() {
            for z in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    cells.insert(IVec2::new(x, z), id);
                }
            }
        }
    }

    /// Return a cell to automatic selection.
    pub fn erase(&self, world: Vec2) {
        let cell = self.cell_of(world);
        if let Ok(mut cells) = self.cells.write() {
            cells.remove(&cell);
        }
    }

    pub fn len(&self) -> usize {
        self.cells.read().map(|cells| cells.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EcotypePainter for PaintedEcotypeMap {
    fn ecotype_at(&self, world: Vec2) -> EcotypeSelection {
        let cell = self.cell_of(world);
        match self.cells.read() {
            Ok(cells) => cells
                .get(&cell)
                .map_or(EcotypeSelection::Auto, |&id| EcotypeSelection::Id(id)),
            Err(_) => EcotypeSelection::Auto,
        }
    }
}
