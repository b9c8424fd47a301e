//! Flora grid dimensions.

/// Edge length of one flora block in metres.
pub const BLOCK_WIDTH: f32 = 4.0;

/// Flora is drawn up to this distance from the camera.
pub const VISIBILITY: f32 = 50.0;

/// Blocks along each edge of the grid.
pub const BLOCK_STRIDE: usize = 25;

/// Extent of the whole grid; moving further than this in one frame re-seeds it.
pub const MOVE_DIST: f32 = BLOCK_STRIDE as f32 * BLOCK_WIDTH;

/// Blocks along each edge of a macro bounding box.
pub const MACRO_TILE: usize = 5;

/// Macro boxes along each edge of the grid.
pub const MACRO_STRIDE: usize = BLOCK_STRIDE / MACRO_TILE;

/// Entries in the placement lookup table.
pub const LUT_SIZE: usize = 2048;

/// Degenerate vertices consumed by one empty placement.
pub const EMPTY_PLACEMENT_VERTICES: usize = 12;

const _: () = assert!(MOVE_DIST == VISIBILITY * 2.0);
const _: () = assert!(BLOCK_STRIDE % MACRO_TILE == 0);
