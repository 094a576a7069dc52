//! The `tessera` command line front end.
//!
//! Decodes an input image, drives the tiled super-resolution pipeline in
//! `tessera-core`, and encodes the result. Everything transport-shaped
//! (queues, bots, servers) lives outside this repository; this binary is the
//! reference collaborator.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;

use tessera_core::backend::InferenceBackend;
use tessera_core::config::{
    config_path, data_dir, initialize_data_dir, AppConfig, PipelineConfig,
};
use tessera_core::error::PipelineError;
use tessera_core::logging::{self, LoggingOptions};
use tessera_core::operator::{NearestUpscaler, UpscaleOperator};
use tessera_core::pipeline;
use tessera_core::types::RgbImage;
use tessera_core::upscaler::OrtUpscaler;

#[derive(Parser)]
#[command(name = "tessera", about = "Tiled AI image upscaler")]
struct Cli {
    #[arg(help = "Input image path")]
    input: PathBuf,

    #[arg(short = 'o', long, help = "Output image path")]
    output: PathBuf,

    #[arg(long, help = "Upscale factor (defaults to the configured model scale)")]
    scale: Option<u32>,

    #[arg(long, help = "ONNX model path (overrides the config file)")]
    model: Option<PathBuf>,

    #[arg(
        long,
        help = "Inference backend: cuda, tensorrt, or nearest (model-free dry run)"
    )]
    backend: Option<String>,

    #[arg(long, help = "Maximum tile side before halo padding")]
    tile_edge: Option<u32>,

    #[arg(long, help = "Halo width in input pixels")]
    tile_pad: Option<u32>,

    #[arg(long, help = "Tile edge floor for out-of-memory retries")]
    min_tile_edge: Option<u32>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    let _log_guard = logging::init(&LoggingOptions {
        verbose: cli.verbose,
        cli_log_filter: cli.log_filter.clone(),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        data_dir: Some(resolved_data_dir.clone()),
    });

    initialize_data_dir(&resolved_data_dir)?;
    let config = AppConfig::load_from_path(&config_path(&resolved_data_dir))?;

    let tiling = apply_tiling_overrides(
        config.tiling,
        cli.tile_edge,
        cli.tile_pad,
        cli.min_tile_edge,
    );
    let scale = cli.scale.unwrap_or(config.model.scale);
    let backend_name = cli
        .backend
        .clone()
        .unwrap_or_else(|| config.model.backend.clone());

    let input = decode_image(&cli.input)?;
    info!(
        input = %cli.input.display(),
        width = input.width(),
        height = input.height(),
        scale,
        backend = %backend_name,
        "Upscaling image"
    );

    let output = if backend_name.eq_ignore_ascii_case("nearest") {
        let mut operator = NearestUpscaler::new(scale);
        run_pipeline(&input, scale, &tiling, &mut operator)?
    } else {
        let model_path = cli.model.clone().unwrap_or_else(|| config.model.path.clone());
        let backend = InferenceBackend::from_str_lossy(&backend_name);
        let mut operator = OrtUpscaler::load(
            &model_path,
            scale,
            &backend,
            Some(&resolved_data_dir.join("trt_cache")),
        )?;
        run_pipeline(&input, scale, &tiling, &mut operator)?
    };

    encode_image(&output, &cli.output)?;
    info!(
        output = %cli.output.display(),
        width = output.width(),
        height = output.height(),
        "Wrote upscaled image"
    );

    Ok(())
}

fn apply_tiling_overrides(
    mut tiling: PipelineConfig,
    tile_edge: Option<u32>,
    tile_pad: Option<u32>,
    min_tile_edge: Option<u32>,
) -> PipelineConfig {
    if let Some(edge) = tile_edge {
        tiling.tile_edge = edge;
    }
    if let Some(pad) = tile_pad {
        tiling.tile_pad = pad;
    }
    if let Some(floor) = min_tile_edge {
        tiling.min_tile_edge = floor;
    }
    tiling
}

fn run_pipeline(
    image: &RgbImage,
    scale: u32,
    tiling: &PipelineConfig,
    operator: &mut dyn UpscaleOperator,
) -> Result<RgbImage> {
    pipeline::upscale(image, scale, tiling, operator).map_err(|error| {
        let too_large = matches!(error, PipelineError::Exhausted { .. });
        let error = anyhow::Error::new(error);
        if too_large {
            error.context(
                "image is too large for the available device memory; \
                 try a smaller image or a lower scale",
            )
        } else {
            error
        }
    })
}

fn decode_image(path: &Path) -> Result<RgbImage> {
    let decoded =
        image::open(path).with_context(|| format!("failed to read image: {}", path.display()))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    RgbImage::new(width, height, rgb.into_raw())
}

fn encode_image(img: &RgbImage, path: &Path) -> Result<()> {
    let buffer = image::RgbImage::from_raw(img.width(), img.height(), img.data().to_vec())
        .context("output buffer does not match its dimensions")?;
    buffer
        .save(path)
        .with_context(|| format!("failed to write image: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn tiling_overrides_apply_individually() {
        let base = PipelineConfig::default();

        let merged = apply_tiling_overrides(base, Some(512), None, None);
        assert_eq!(merged.tile_edge, 512);
        assert_eq!(merged.tile_pad, base.tile_pad);
        assert_eq!(merged.min_tile_edge, base.min_tile_edge);

        let merged = apply_tiling_overrides(base, None, Some(32), Some(128));
        assert_eq!(merged.tile_edge, base.tile_edge);
        assert_eq!(merged.tile_pad, 32);
        assert_eq!(merged.min_tile_edge, 128);
    }

    #[test]
    fn exhaustion_gets_a_user_facing_hint() {
        struct AlwaysExhausted;
        impl UpscaleOperator for AlwaysExhausted {
            fn scale(&self) -> u32 {
                2
            }
            fn invoke(
                &mut self,
                _tile: &RgbImage,
            ) -> std::result::Result<RgbImage, tessera_core::error::OperatorError> {
                Err(tessera_core::error::OperatorError::ResourceExhausted)
            }
        }

        let image = RgbImage::zeroed(16, 16);
        let tiling = PipelineConfig {
            tile_edge: 8,
            tile_pad: 1,
            min_tile_edge: 4,
        };
        let err = run_pipeline(&image, 2, &tiling, &mut AlwaysExhausted)
            .err()
            .expect("should fail");
        assert!(format!("{err:#}").contains("too large"));
    }
}
