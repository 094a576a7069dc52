//! Drives a tile plan through the upscale operator with out-of-memory
//! recovery.
//!
//! A pass runs the current plan's tiles strictly in order. The first
//! `ResourceExhausted` abandons the whole pass: tiles produced under one tile
//! edge are never mixed with tiles from another, since their halo geometry
//! differs. The executor then re-plans at half the edge and starts over,
//! down to a configured floor.

use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{OperatorError, PipelineError};
use crate::operator::UpscaleOperator;
use crate::planner;
use crate::stitcher;
use crate::types::RgbImage;

pub struct ResourceAwareExecutor;

impl ResourceAwareExecutor {
    /// Upscale `image` by `scale`, shrinking tiles and retrying on device
    /// memory exhaustion.
    ///
    /// Each attempt computes a fresh plan from immutable inputs, so a retry
    /// can never leak state into a concurrent invocation. The number of
    /// attempts is bounded: the edge halves (clamped to
    /// `config.min_tile_edge`) until a pass at the floor itself exhausts,
    /// which surfaces as [`PipelineError::Exhausted`]. Non-resource operator
    /// failures are never retried.
    pub fn run(
        image: &RgbImage,
        scale: u32,
        config: &PipelineConfig,
        operator: &mut dyn UpscaleOperator,
    ) -> Result<RgbImage, PipelineError> {
        let mut tile_edge = config.tile_edge;

        loop {
            let plan = planner::plan(image.width(), image.height(), tile_edge, config.tile_pad)?;
            debug!(tile_edge, tiles = plan.tiles.len(), "starting upscale pass");

            match Self::run_pass(image, &plan, operator) {
                Ok(tiles) => {
                    return stitcher::assemble(image.width(), image.height(), scale, &plan, &tiles)
                }
                Err(OperatorError::Fatal(reason)) => {
                    return Err(PipelineError::OperatorFatal(reason))
                }
                Err(OperatorError::ResourceExhausted) => {
                    if tile_edge <= config.min_tile_edge {
                        warn!(
                            tile_edge,
                            min_tile_edge = config.min_tile_edge,
                            "operator out of memory at the tile edge floor, giving up"
                        );
                        return Err(PipelineError::Exhausted {
                            min_tile_edge: config.min_tile_edge,
                        });
                    }
                    let shrunk = (tile_edge / 2).max(config.min_tile_edge);
                    warn!(
                        from = tile_edge,
                        to = shrunk,
                        "operator out of memory, re-planning with smaller tiles"
                    );
                    tile_edge = shrunk;
                }
            }
        }
    }

    /// One full pass over the plan. Partial outputs are dropped on failure.
    fn run_pass(
        image: &RgbImage,
        plan: &planner::TilePlan,
        operator: &mut dyn UpscaleOperator,
    ) -> Result<Vec<RgbImage>, OperatorError> {
        let mut tiles = Vec::with_capacity(plan.tiles.len());
        for spec in &plan.tiles {
            let input = image.crop(spec.source);
            tiles.push(operator.invoke(&input)?);
        }
        Ok(tiles)
    }
}
