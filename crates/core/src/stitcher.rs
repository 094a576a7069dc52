//! Assembles per-tile upscaler outputs into the final image.
//!
//! Each scaled tile covers its whole padded source rectangle; only the part
//! corresponding to the tile's core rectangle is copied out. Because cores
//! partition the input, every output pixel is written exactly once and the
//! result is seam-free without any blending.

use crate::error::PipelineError;
use crate::planner::TilePlan;
use crate::types::{RgbImage, CHANNELS};

/// Build the `(width * scale) x (height * scale)` output from scaled tiles.
///
/// `tiles[i]` must be the operator's output for `plan.tiles[i].source`. A
/// tile whose dimensions are not exactly `source * scale` means the operator
/// broke its sizing contract and assembly fails with
/// [`PipelineError::AssemblyMismatch`].
pub fn assemble(
    width: u32,
    height: u32,
    scale: u32,
    plan: &TilePlan,
    tiles: &[RgbImage],
) -> Result<RgbImage, PipelineError> {
    assert_eq!(
        plan.tiles.len(),
        tiles.len(),
        "one scaled tile per planned tile"
    );

    let out_w = width as usize * scale as usize;
    let mut out = RgbImage::zeroed(width * scale, height * scale);
    let out_data = out.data_mut();

    for (index, (spec, tile)) in plan.tiles.iter().zip(tiles).enumerate() {
        let expected_width = spec.source.width * scale;
        let expected_height = spec.source.height * scale;
        if tile.width() != expected_width || tile.height() != expected_height {
            return Err(PipelineError::AssemblyMismatch {
                index,
                expected_width,
                expected_height,
                actual_width: tile.width(),
                actual_height: tile.height(),
            });
        }

        // Offset of the core within the scaled tile; everything outside it
        // is halo and gets dropped.
        let crop_x = ((spec.core.x - spec.source.x) * scale) as usize;
        let crop_y = ((spec.core.y - spec.source.y) * scale) as usize;
        let dest = spec.dest(scale);

        let tile_w = tile.width() as usize;
        let row_bytes = dest.width as usize * CHANNELS;
        for row in 0..dest.height as usize {
            let src = ((crop_y + row) * tile_w + crop_x) * CHANNELS;
            let dst = ((dest.y as usize + row) * out_w + dest.x as usize) * CHANNELS;
            out_data[dst..dst + row_bytes].copy_from_slice(&tile.data()[src..src + row_bytes]);
        }
    }

    Ok(out)
}
