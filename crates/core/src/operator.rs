use crate::error::OperatorError;
use crate::types::{RgbImage, CHANNELS};

/// The upscale capability consumed by the pipeline.
///
/// Implementations take a bounded-size tile and return the same tile scaled
/// by their native ratio: a `w x h` input must come back as
/// `w * scale() x h * scale()`. The receiver is `&mut` because concrete
/// backends carry mutable session state; calls are strictly sequential within
/// one pipeline run (see [`crate::executor`]).
pub trait UpscaleOperator {
    /// Native upscale ratio, fixed for the operator's lifetime.
    fn scale(&self) -> u32;

    /// Upscale one tile.
    ///
    /// [`OperatorError::ResourceExhausted`] signals a transient device memory
    /// failure the pipeline recovers from by shrinking tiles; any other
    /// failure is [`OperatorError::Fatal`] and ends the run.
    fn invoke(&mut self, tile: &RgbImage) -> Result<RgbImage, OperatorError>;
}

/// Pixel-replication upscaler.
///
/// Deterministic and model-free; used by tests and available as a dry-run
/// backend to exercise the tiling machinery without ONNX weights.
pub struct NearestUpscaler {
    scale: u32,
}

impl NearestUpscaler {
    pub fn new(scale: u32) -> Self {
        Self { scale }
    }
}

impl UpscaleOperator for NearestUpscaler {
    fn scale(&self) -> u32 {
        self.scale
    }

    fn invoke(&mut self, tile: &RgbImage) -> Result<RgbImage, OperatorError> {
        let s = self.scale as usize;
        let w = tile.width() as usize;
        let h = tile.height() as usize;
        let out_w = w * s;

        let mut out = RgbImage::zeroed(tile.width() * self.scale, tile.height() * self.scale);
        let out_data = out.data_mut();

        let mut row = vec![0u8; out_w * CHANNELS];
        for y in 0..h {
            // Expand one source row horizontally, then stamp it `s` times.
            for x in 0..w {
                let src = (y * w + x) * CHANNELS;
                let px = &tile.data()[src..src + CHANNELS];
                for dx in 0..s {
                    let dst = (x * s + dx) * CHANNELS;
                    row[dst..dst + CHANNELS].copy_from_slice(px);
                }
            }
            for dy in 0..s {
                let dst = (y * s + dy) * out_w * CHANNELS;
                out_data[dst..dst + row.len()].copy_from_slice(&row);
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_replicates_pixels() {
        // 2x1 image: red pixel then green pixel.
        let img = RgbImage::new(2, 1, vec![255, 0, 0, 0, 255, 0]).unwrap();
        let mut op = NearestUpscaler::new(2);
        let out = op.invoke(&img).unwrap();

        assert_eq!(out.width(), 4);
        assert_eq!(out.height(), 2);
        let expected = vec![
            255, 0, 0, 255, 0, 0, 0, 255, 0, 0, 255, 0, // row 0
            255, 0, 0, 255, 0, 0, 0, 255, 0, 0, 255, 0, // row 1
        ];
        assert_eq!(out.data(), &expected[..]);
    }

    #[test]
    fn test_nearest_scale_one_is_identity() {
        let img = RgbImage::new(3, 2, (0..18).collect()).unwrap();
        let mut op = NearestUpscaler::new(1);
        let out = op.invoke(&img).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_nearest_reports_scale() {
        assert_eq!(NearestUpscaler::new(4).scale(), 4);
    }
}
