//! Tile grid geometry and dirty-tile tracking for the stroke compositor.
//!
//! A destination texture is partitioned once per stroke into a grid of
//! power-of-two tiles. The tile size is derived from the texture size and the
//! stroke's initial brush footprint and stays fixed for the stroke's lifetime.

use std::fmt;

use bitvec::prelude::{BitVec, Lsb0};

pub const MIN_TILE_SIZE: u32 = 64;
pub const MAX_TILE_SIZE: u32 = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileGridError {
    ZeroTextureExtent,
    TileSizeNotPowerOfTwo,
    TileSizeOutOfRange,
    TileCountOverflow,
    TileIndexOutOfBounds,
}

impl fmt::Display for TileGridError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileGridError::ZeroTextureExtent => {
                write!(formatter, "tile grid texture extent must be at least 1x1")
            }
            TileGridError::TileSizeNotPowerOfTwo => {
                write!(formatter, "tile size must be a power of two")
            }
            TileGridError::TileSizeOutOfRange => {
                write!(
                    formatter,
                    "tile size must be within [{MIN_TILE_SIZE}, {MAX_TILE_SIZE}]"
                )
            }
            TileGridError::TileCountOverflow => write!(formatter, "tile count overflow"),
            TileGridError::TileIndexOutOfBounds => {
                write!(formatter, "tile coordinate out of grid bounds")
            }
        }
    }
}

impl std::error::Error for TileGridError {}

/// Picks the tile size for a stroke from the destination texture size and the
/// initial brush footprint. Large brushes get larger tiles (fewer, bigger GPU
/// passes); small brushes get small tiles (fine-grained dirty tracking). The
/// result is snapped to the nearest power of two so same-sized GPU buffers
/// stay reusable across strokes.
pub fn tile_size_for_stroke(texture_width: u32, texture_height: u32, brush_size: f32) -> u32 {
    assert!(
        texture_width > 0 && texture_height > 0,
        "texture extent must be positive"
    );
    assert!(
        brush_size.is_finite() && brush_size > 0.0,
        "brush size must be positive and finite"
    );

    let min_tile_size = (MIN_TILE_SIZE as f32)
        .max(texture_width.max(texture_height) as f32 / 8.0)
        .min(MAX_TILE_SIZE as f32);
    let footprint_area = brush_size * brush_size;
    let approx_tile_count = (footprint_area.sqrt() / 1024.0).ceil().max(1.0);
    let estimated_tile_size = (footprint_area / approx_tile_count)
        .sqrt()
        .clamp(min_tile_size, MAX_TILE_SIZE as f32);
    let exponent = estimated_tile_size.log2().round() as u32;
    1u32 << exponent
}

/// Axis-aligned pixel-space bounds of a dab footprint in texture-local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

/// The edge-clamped pixel rectangle covered by one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    texture_width: u32,
    texture_height: u32,
    tile_size: u32,
    x_tile_count: u32,
    y_tile_count: u32,
}

impl TileGrid {
    pub fn new(
        texture_width: u32,
        texture_height: u32,
        tile_size: u32,
    ) -> Result<Self, TileGridError> {
        if texture_width == 0 || texture_height == 0 {
            return Err(TileGridError::ZeroTextureExtent);
        }
        if !tile_size.is_power_of_two() {
            return Err(TileGridError::TileSizeNotPowerOfTwo);
        }
        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&tile_size) {
            return Err(TileGridError::TileSizeOutOfRange);
        }
        let x_tile_count = texture_width.div_ceil(tile_size);
        let y_tile_count = texture_height.div_ceil(tile_size);
        (x_tile_count as usize)
            .checked_mul(y_tile_count as usize)
            .ok_or(TileGridError::TileCountOverflow)?;
        Ok(Self {
            texture_width,
            texture_height,
            tile_size,
            x_tile_count,
            y_tile_count,
        })
    }

    pub fn texture_width(&self) -> u32 {
        self.texture_width
    }

    pub fn texture_height(&self) -> u32 {
        self.texture_height
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn x_tile_count(&self) -> u32 {
        self.x_tile_count
    }

    pub fn y_tile_count(&self) -> u32 {
        self.y_tile_count
    }

    pub fn tile_count(&self) -> usize {
        (self.x_tile_count as usize) * (self.y_tile_count as usize)
    }

    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Result<usize, TileGridError> {
        if tile_x >= self.x_tile_count || tile_y >= self.y_tile_count {
            return Err(TileGridError::TileIndexOutOfBounds);
        }
        let row = (tile_y as usize)
            .checked_mul(self.x_tile_count as usize)
            .ok_or(TileGridError::TileIndexOutOfBounds)?;
        row.checked_add(tile_x as usize)
            .ok_or(TileGridError::TileIndexOutOfBounds)
    }

    pub fn tile_coords(&self, tile_index: usize) -> Result<(u32, u32), TileGridError> {
        if tile_index >= self.tile_count() {
            return Err(TileGridError::TileIndexOutOfBounds);
        }
        let tile_x = (tile_index % self.x_tile_count as usize) as u32;
        let tile_y = (tile_index / self.x_tile_count as usize) as u32;
        Ok((tile_x, tile_y))
    }

    /// Edge tiles are clamped to the texture boundary, so the last row/column
    /// can be smaller than `tile_size`.
    pub fn tile_rect(&self, tile_x: u32, tile_y: u32) -> Result<TileRect, TileGridError> {
        if tile_x >= self.x_tile_count || tile_y >= self.y_tile_count {
            return Err(TileGridError::TileIndexOutOfBounds);
        }
        let offset_x = tile_x * self.tile_size;
        let offset_y = tile_y * self.tile_size;
        Ok(TileRect {
            x: offset_x,
            y: offset_y,
            width: self.tile_size.min(self.texture_width - offset_x),
            height: self.tile_size.min(self.texture_height - offset_y),
        })
    }

    /// Enumerates tiles whose bounds overlap `bounds`, in ascending index
    /// order. A box fully outside the texture yields no tiles.
    pub fn tiles_intersecting(&self, bounds: BoundingBox) -> Vec<(u32, u32)> {
        assert!(
            bounds.min_x.is_finite()
                && bounds.min_y.is_finite()
                && bounds.max_x.is_finite()
                && bounds.max_y.is_finite(),
            "tile query bounds must be finite"
        );
        if bounds.min_x > bounds.max_x || bounds.min_y > bounds.max_y {
            return Vec::new();
        }
        if bounds.max_x <= 0.0 || bounds.max_y <= 0.0 {
            return Vec::new();
        }
        if bounds.min_x >= self.texture_width as f32 || bounds.min_y >= self.texture_height as f32 {
            return Vec::new();
        }

        let min_pixel_x = bounds.min_x.max(0.0) as u32;
        let min_pixel_y = bounds.min_y.max(0.0) as u32;
        let max_pixel_x = (bounds.max_x.min(self.texture_width as f32).ceil() as u32)
            .saturating_sub(1)
            .max(min_pixel_x);
        let max_pixel_y = (bounds.max_y.min(self.texture_height as f32).ceil() as u32)
            .saturating_sub(1)
            .max(min_pixel_y);

        let start_tile_x = min_pixel_x / self.tile_size;
        let end_tile_x = (max_pixel_x / self.tile_size).min(self.x_tile_count - 1);
        let start_tile_y = min_pixel_y / self.tile_size;
        let end_tile_y = (max_pixel_y / self.tile_size).min(self.y_tile_count - 1);

        let mut tiles = Vec::new();
        for tile_y in start_tile_y..=end_tile_y {
            for tile_x in start_tile_x..=end_tile_x {
                tiles.push((tile_x, tile_y));
            }
        }
        tiles
    }
}

/// Per-stroke dirty bitmap, one bit per grid tile, indexed like the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyTileBitmap {
    bits: BitVec<usize, Lsb0>,
    dirty_count: usize,
}

impl DirtyTileBitmap {
    pub fn new(tile_count: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, tile_count),
            dirty_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty_count == 0
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty_count
    }

    pub fn is_dirty(&self, tile_index: usize) -> Result<bool, TileGridError> {
        self.bits
            .get(tile_index)
            .map(|bit| *bit)
            .ok_or(TileGridError::TileIndexOutOfBounds)
    }

    pub fn mark(&mut self, tile_index: usize) -> Result<(), TileGridError> {
        let Some(mut slot) = self.bits.get_mut(tile_index) else {
            return Err(TileGridError::TileIndexOutOfBounds);
        };
        if !*slot {
            *slot = true;
            self.dirty_count = self
                .dirty_count
                .checked_add(1)
                .ok_or(TileGridError::TileCountOverflow)?;
        }
        Ok(())
    }

    pub fn clear(&mut self, tile_index: usize) -> Result<(), TileGridError> {
        let Some(mut slot) = self.bits.get_mut(tile_index) else {
            return Err(TileGridError::TileIndexOutOfBounds);
        };
        if *slot {
            *slot = false;
            self.dirty_count -= 1;
        }
        Ok(())
    }

    /// Dirty tile indices in ascending order.
    pub fn iter_dirty(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .by_vals()
            .enumerate()
            .filter_map(|(index, is_dirty)| if is_dirty { Some(index) } else { None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_size_is_power_of_two_within_bounds() {
        for brush_size in [0.5, 4.0, 64.0, 300.0, 2000.0, 9000.0] {
            let tile_size = tile_size_for_stroke(1024, 1024, brush_size);
            assert!(
                tile_size.is_power_of_two(),
                "tile size {tile_size} for brush {brush_size} must be a power of two"
            );
            assert!((MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&tile_size));
        }
    }

    #[test]
    fn small_brush_on_small_texture_uses_minimum_tile_size() {
        assert_eq!(tile_size_for_stroke(512, 512, 8.0), MIN_TILE_SIZE);
    }

    #[test]
    fn large_texture_raises_the_tile_size_floor() {
        // 4096 / 8 = 512, so even a tiny brush cannot pick a 64px tile.
        let tile_size = tile_size_for_stroke(4096, 4096, 8.0);
        assert!(tile_size >= 512, "tile size {tile_size} below raised floor");
    }

    #[test]
    fn larger_brushes_never_shrink_the_tile_size() {
        let mut previous = 0;
        for brush_size in [16.0, 128.0, 512.0, 1024.0, 4096.0] {
            let tile_size = tile_size_for_stroke(2048, 2048, brush_size);
            assert!(tile_size >= previous);
            previous = tile_size;
        }
    }

    #[test]
    fn grid_counts_round_up() {
        let grid = TileGrid::new(300, 130, 128).expect("create grid");
        assert_eq!(grid.x_tile_count(), 3);
        assert_eq!(grid.y_tile_count(), 2);
        assert_eq!(grid.tile_count(), 6);
    }

    #[test]
    fn grid_rejects_invalid_tile_sizes() {
        assert_eq!(
            TileGrid::new(256, 256, 100).expect_err("non power of two"),
            TileGridError::TileSizeNotPowerOfTwo
        );
        assert_eq!(
            TileGrid::new(256, 256, 32).expect_err("below minimum"),
            TileGridError::TileSizeOutOfRange
        );
        assert_eq!(
            TileGrid::new(0, 256, 128).expect_err("zero extent"),
            TileGridError::ZeroTextureExtent
        );
    }

    #[test]
    fn edge_tiles_are_clamped_to_the_texture_boundary() {
        let grid = TileGrid::new(300, 130, 128).expect("create grid");
        assert_eq!(
            grid.tile_rect(0, 0).expect("interior tile"),
            TileRect {
                x: 0,
                y: 0,
                width: 128,
                height: 128
            }
        );
        assert_eq!(
            grid.tile_rect(2, 1).expect("corner tile"),
            TileRect {
                x: 256,
                y: 128,
                width: 44,
                height: 2
            }
        );
    }

    #[test]
    fn tile_index_round_trips_through_tile_coords() {
        let grid = TileGrid::new(300, 300, 128).expect("create grid");
        for tile_y in 0..grid.y_tile_count() {
            for tile_x in 0..grid.x_tile_count() {
                let index = grid.tile_index(tile_x, tile_y).expect("tile index");
                assert_eq!(grid.tile_coords(index).expect("tile coords"), (tile_x, tile_y));
            }
        }
        assert_eq!(
            grid.tile_index(3, 0).expect_err("out of bounds"),
            TileGridError::TileIndexOutOfBounds
        );
    }

    #[test]
    fn intersection_covers_overlapped_tiles_only() {
        let grid = TileGrid::new(512, 512, 128).expect("create grid");
        let tiles = grid.tiles_intersecting(BoundingBox {
            min_x: 100.0,
            min_y: 100.0,
            max_x: 200.0,
            max_y: 140.0,
        });
        assert_eq!(tiles, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn intersection_at_exact_tile_boundary_stays_in_one_tile() {
        let grid = TileGrid::new(512, 512, 128).expect("create grid");
        let tiles = grid.tiles_intersecting(BoundingBox {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 128.0,
            max_y: 128.0,
        });
        assert_eq!(tiles, vec![(0, 0)]);
    }

    #[test]
    fn fully_outside_bounds_yield_no_tiles() {
        let grid = TileGrid::new(512, 512, 128).expect("create grid");
        for bounds in [
            BoundingBox {
                min_x: -200.0,
                min_y: 0.0,
                max_x: -10.0,
                max_y: 50.0,
            },
            BoundingBox {
                min_x: 600.0,
                min_y: 0.0,
                max_x: 700.0,
                max_y: 50.0,
            },
            BoundingBox {
                min_x: 0.0,
                min_y: 512.0,
                max_x: 50.0,
                max_y: 600.0,
            },
        ] {
            assert!(grid.tiles_intersecting(bounds).is_empty());
        }
    }

    #[test]
    fn partially_overlapping_bounds_are_clamped() {
        let grid = TileGrid::new(256, 256, 128).expect("create grid");
        let tiles = grid.tiles_intersecting(BoundingBox {
            min_x: -50.0,
            min_y: 200.0,
            max_x: 10.0,
            max_y: 400.0,
        });
        assert_eq!(tiles, vec![(0, 1)]);
    }

    #[test]
    fn dirty_bitmap_counts_and_iterates_in_ascending_order() {
        let mut dirty = DirtyTileBitmap::new(8);
        assert!(dirty.is_empty());

        dirty.mark(5).expect("mark 5");
        dirty.mark(1).expect("mark 1");
        dirty.mark(5).expect("mark 5 again");
        assert_eq!(dirty.dirty_count(), 2);
        assert_eq!(dirty.iter_dirty().collect::<Vec<_>>(), vec![1, 5]);

        dirty.clear(1).expect("clear 1");
        dirty.clear(1).expect("clear 1 again");
        assert_eq!(dirty.dirty_count(), 1);
        assert_eq!(dirty.iter_dirty().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn dirty_bitmap_rejects_out_of_range_indices() {
        let mut dirty = DirtyTileBitmap::new(4);
        assert_eq!(
            dirty.mark(4).expect_err("mark out of range"),
            TileGridError::TileIndexOutOfBounds
        );
        assert_eq!(
            dirty.is_dirty(4).expect_err("query out of range"),
            TileGridError::TileIndexOutOfBounds
        );
    }
}
