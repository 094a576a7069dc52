//! Top-level pipeline entry point.
//!
//! This is the only function external collaborators call: they hand over a
//! decoded raster buffer and a scale factor and get back a raster buffer or
//! a typed failure to translate into a user-facing message. The indirection
//! over [`ResourceAwareExecutor`] keeps the external contract stable if an
//! alternate execution strategy is ever substituted.

use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::executor::ResourceAwareExecutor;
use crate::operator::UpscaleOperator;
use crate::types::RgbImage;

/// Upscale `image` by the integer factor `scale`.
///
/// Whether the run takes the direct single-call path or the tiled path falls
/// out of the plan: an image fitting within `config.tile_edge` on both axes
/// yields a single unpadded tile. Each call is stateless end to end; nothing
/// is retained across invocations.
pub fn upscale(
    image: &RgbImage,
    scale: u32,
    config: &PipelineConfig,
    operator: &mut dyn UpscaleOperator,
) -> Result<RgbImage, PipelineError> {
    if scale == 0 {
        return Err(PipelineError::InvalidConfiguration(
            "scale factor must be a positive integer".to_string(),
        ));
    }

    debug!(
        width = image.width(),
        height = image.height(),
        scale,
        tile_edge = config.tile_edge,
        tile_pad = config.tile_pad,
        "upscale requested"
    );

    ResourceAwareExecutor::run(image, scale, config, operator)
}
