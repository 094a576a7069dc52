//! Tile planning: splits an image into halo-padded tiles whose core
//! rectangles partition the image exactly.
//!
//! Each tile is authoritative for its core rectangle only; the surrounding
//! halo exists so the upscaler sees context past the core's edges and is
//! discarded at stitch time. Core rectangles never overlap, so assembly is a
//! plain copy with no blending.

use tracing::debug;

use crate::error::PipelineError;
use crate::types::Rect;

/// One unit of upscale work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpec {
    /// Region read from the input, core plus halo, clamped to image bounds.
    pub source: Rect,
    /// Sub-region of `source` this tile is authoritative for.
    pub core: Rect,
}

impl TileSpec {
    /// Where the core lands in output coordinates.
    pub fn dest(&self, scale: u32) -> Rect {
        self.core.scaled(scale)
    }
}

/// Ordered tile set covering the image exactly once via core rectangles.
///
/// Tiles are row-major (top to bottom, left to right); callers may rely on
/// the ordering for deterministic processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePlan {
    pub tile_edge: u32,
    pub tile_pad: u32,
    pub tiles: Vec<TileSpec>,
}

/// Compute the tile plan for an image of the given dimensions.
///
/// When the whole image fits within `tile_edge` on both axes, the plan is a
/// single unpadded tile. Otherwise cores are laid out on a
/// `tile_edge - 2 * tile_pad` stride, the final row/column clipped to the
/// image boundary, and each source rectangle is the core grown by `tile_pad`
/// per side and clamped to the image. Edge tiles therefore carry a smaller
/// halo on the boundary side, where there is no neighbor to blend against.
///
/// Re-planning after a shrink is just another call with a smaller
/// `tile_edge`; plans are never mutated in place.
pub fn plan(
    width: u32,
    height: u32,
    tile_edge: u32,
    tile_pad: u32,
) -> Result<TilePlan, PipelineError> {
    if tile_edge <= 2 * tile_pad {
        return Err(PipelineError::InvalidConfiguration(format!(
            "tile edge {tile_edge} must exceed twice the tile pad {tile_pad}, \
             otherwise no tile has a core"
        )));
    }

    if width <= tile_edge && height <= tile_edge {
        let full = Rect::new(0, 0, width, height);
        debug!(width, height, tile_edge, "image fits in one tile, direct path");
        return Ok(TilePlan {
            tile_edge,
            tile_pad,
            tiles: vec![TileSpec {
                source: full,
                core: full,
            }],
        });
    }

    let stride = tile_edge - 2 * tile_pad;
    let mut tiles = Vec::new();

    let mut y = 0;
    while y < height {
        let core_h = stride.min(height - y);
        let mut x = 0;
        while x < width {
            let core_w = stride.min(width - x);
            let core = Rect::new(x, y, core_w, core_h);

            let src_x = x.saturating_sub(tile_pad);
            let src_y = y.saturating_sub(tile_pad);
            let src_right = (core.right() + tile_pad).min(width);
            let src_bottom = (core.bottom() + tile_pad).min(height);
            let source = Rect::new(src_x, src_y, src_right - src_x, src_bottom - src_y);

            tiles.push(TileSpec { source, core });
            x += stride;
        }
        y += stride;
    }

    debug!(
        width,
        height,
        tile_edge,
        tile_pad,
        stride,
        tiles = tiles.len(),
        "planned tile grid"
    );

    Ok(TilePlan {
        tile_edge,
        tile_pad,
        tiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_pad_consuming_the_tile() {
        let err = plan(100, 100, 128, 64).err().expect("should fail");
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));

        // Strictly greater is required, equality still leaves no core.
        assert!(plan(100, 100, 129, 64).is_ok());
    }

    #[test]
    fn test_small_image_single_tile_without_padding() {
        let plan = plan(100, 100, 512, 10).unwrap();
        assert_eq!(plan.tiles.len(), 1);
        let tile = plan.tiles[0];
        assert_eq!(tile.source, Rect::new(0, 0, 100, 100));
        assert_eq!(tile.core, tile.source);
        assert_eq!(tile.dest(4), Rect::new(0, 0, 400, 400));
    }

    #[test]
    fn test_grid_dimensions_for_large_image() {
        // stride = 512 - 128 = 384; ceil(2000/384) = 6 cols, ceil(1500/384) = 4 rows.
        let plan = plan(2000, 1500, 512, 64).unwrap();
        assert_eq!(plan.tiles.len(), 24);

        // No source rectangle exceeds the tile edge.
        for tile in &plan.tiles {
            assert!(tile.source.width <= 512);
            assert!(tile.source.height <= 512);
        }
    }

    #[test]
    fn test_cores_partition_the_image() {
        let plan = plan(1000, 700, 300, 20).unwrap();

        let covered: u64 = plan.tiles.iter().map(|t| t.core.area()).sum();
        assert_eq!(covered, 1000 * 700);

        for (i, a) in plan.tiles.iter().enumerate() {
            assert!(a.core.right() <= 1000);
            assert!(a.core.bottom() <= 700);
            for b in &plan.tiles[i + 1..] {
                assert!(
                    !a.core.intersects(&b.core),
                    "cores {:?} and {:?} overlap",
                    a.core,
                    b.core
                );
            }
        }
    }

    #[test]
    fn test_sources_contain_cores_with_clamped_halo() {
        let plan = plan(1000, 700, 300, 20).unwrap();

        for tile in &plan.tiles {
            assert!(tile.source.x <= tile.core.x);
            assert!(tile.source.y <= tile.core.y);
            assert!(tile.source.right() >= tile.core.right());
            assert!(tile.source.bottom() >= tile.core.bottom());
        }

        // Interior tiles carry the full halo on every side.
        let interior = plan
            .tiles
            .iter()
            .find(|t| t.core.x > 0 && t.core.y > 0 && t.core.right() < 1000 && t.core.bottom() < 700)
            .expect("grid has an interior tile");
        assert_eq!(interior.core.x - interior.source.x, 20);
        assert_eq!(interior.core.y - interior.source.y, 20);
        assert_eq!(interior.source.right() - interior.core.right(), 20);
        assert_eq!(interior.source.bottom() - interior.core.bottom(), 20);

        // The top-left tile has no halo on the image boundary sides.
        let first = plan.tiles[0];
        assert_eq!(first.source.x, 0);
        assert_eq!(first.source.y, 0);
    }

    #[test]
    fn test_row_major_ordering() {
        let plan = plan(1000, 700, 300, 20).unwrap();
        for pair in plan.tiles.windows(2) {
            let (a, b) = (pair[0].core, pair[1].core);
            assert!(
                b.y > a.y || (b.y == a.y && b.x > a.x),
                "tiles out of row-major order: {a:?} then {b:?}"
            );
        }
    }

    #[test]
    fn test_replan_with_smaller_edge_is_fresh() {
        let coarse = plan(2000, 1500, 1024, 64).unwrap();
        let fine = plan(2000, 1500, 512, 64).unwrap();
        assert!(fine.tiles.len() > coarse.tiles.len());
        assert_eq!(fine.tile_edge, 512);

        let covered: u64 = fine.tiles.iter().map(|t| t.core.area()).sum();
        assert_eq!(covered, 2000 * 1500);
    }

    #[test]
    fn test_one_axis_oversized_still_tiles() {
        // Width fits in a tile but height does not; the grid applies anyway.
        let plan = plan(100, 900, 300, 20).unwrap();
        assert!(plan.tiles.len() > 1);
        let covered: u64 = plan.tiles.iter().map(|t| t.core.area()).sum();
        assert_eq!(covered, 100 * 900);
        for tile in &plan.tiles {
            assert_eq!(tile.core.x, 0);
            assert_eq!(tile.core.width, 100);
        }
    }
}
