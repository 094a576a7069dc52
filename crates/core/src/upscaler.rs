//! ONNX-backed upscale operator: `ort::Session` + CUDA/TensorRT EP.
//!
//! Supports FP32 models (e.g. Real-ESRGAN, value range 0-255) and FP16
//! models (value range 0-1). Device memory exhaustion is reported as
//! [`OperatorError::ResourceExhausted`] so the pipeline can shrink tiles and
//! retry; every other session failure is fatal.

use std::path::Path;

use anyhow::{bail, Result};
use half::f16;
use half::slice::HalfFloatSliceExt;
use ndarray::{s, ArrayD, IxDyn};
use ort::{session::Session, value::Tensor};
use tracing::{debug, info};

use crate::backend::{build_session, InferenceBackend, SessionConfig};
use crate::error::OperatorError;
use crate::operator::UpscaleOperator;
use crate::types::{RgbImage, CHANNELS};

/// Model requires spatial dimensions to be multiples of this.
const PAD_ALIGN: usize = 4;

pub struct OrtUpscaler {
    session: Session,
    scale: u32,
    input_name: String,
    output_name: String,
    is_fp16_model: bool,
}

impl OrtUpscaler {
    /// Load an ONNX super-resolution model.
    ///
    /// Input/output tensor names and the element type are detected from the
    /// session; `scale` must be the model's native upscale ratio.
    pub fn load(
        model_path: &Path,
        scale: u32,
        backend: &InferenceBackend,
        trt_cache_dir: Option<&Path>,
    ) -> Result<Self> {
        let session = build_session(&SessionConfig {
            model_path,
            backend,
            trt_cache_dir,
        })?;

        let input_name = session.inputs()[0].name().to_string();
        let output_name = session.outputs()[0].name().to_string();
        let is_fp16_model = match session.inputs()[0].dtype() {
            ort::value::ValueType::Tensor { ty, .. } => {
                *ty == ort::tensor::TensorElementType::Float16
            }
            _ => false,
        };

        debug!(%input_name, %output_name, is_fp16_model, "Detected model IO");
        info!(
            model = %model_path.display(),
            scale,
            backend = %backend,
            "Super-resolution model loaded"
        );

        Ok(Self {
            session,
            scale,
            input_name,
            output_name,
            is_fp16_model,
        })
    }

    fn infer_f32(&mut self, tile: &RgbImage) -> Result<RgbImage> {
        let h = tile.height() as usize;
        let w = tile.width() as usize;
        let scale = self.scale as usize;

        let nchw = rgb_to_nchw(tile)?;
        let padded = reflection_pad(&nchw, h, w, 0.0f32);

        let input_tensor = Tensor::from_array(padded)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => &input_tensor])?;
        let output = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;

        let out_h = h * scale;
        let out_w = w * scale;
        ensure_output_covers(output.shape(), h, w, out_h, out_w, scale)?;

        let cropped = output.slice(s![.., .., ..out_h, ..out_w]).to_owned().into_dyn();
        nchw_to_rgb(&cropped, out_w as u32, out_h as u32)
    }

    fn infer_f16(&mut self, tile: &RgbImage) -> Result<RgbImage> {
        let h = tile.height() as usize;
        let w = tile.width() as usize;
        let scale = self.scale as usize;

        let nchw = rgb_to_f16_nchw(tile)?;
        let padded = reflection_pad(&nchw, h, w, f16::ZERO);

        let input_tensor = Tensor::from_array(padded)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => &input_tensor])?;
        let output = outputs[self.output_name.as_str()].try_extract_array::<f16>()?;

        let out_h = h * scale;
        let out_w = w * scale;
        ensure_output_covers(output.shape(), h, w, out_h, out_w, scale)?;

        let cropped = output.slice(s![.., .., ..out_h, ..out_w]).to_owned().into_dyn();
        f16_nchw_to_rgb(&cropped, out_w as u32, out_h as u32)
    }
}

impl UpscaleOperator for OrtUpscaler {
    fn scale(&self) -> u32 {
        self.scale
    }

    fn invoke(&mut self, tile: &RgbImage) -> Result<RgbImage, OperatorError> {
        let result = if self.is_fp16_model {
            self.infer_f16(tile)
        } else {
            self.infer_f32(tile)
        };
        result.map_err(classify_failure)
    }
}

/// Sort session failures into recoverable memory exhaustion vs fatal.
fn classify_failure(error: anyhow::Error) -> OperatorError {
    let message = format!("{error:#}");
    if is_resource_exhausted(&message) {
        OperatorError::ResourceExhausted
    } else {
        OperatorError::Fatal(message)
    }
}

fn is_resource_exhausted(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("out of memory")
        || lower.contains("failed to allocate")
        || lower.contains("alloc_failed")
        || lower.contains("memory allocation")
}

fn ensure_output_covers(
    shape: &[usize],
    h: usize,
    w: usize,
    out_h: usize,
    out_w: usize,
    scale: usize,
) -> Result<()> {
    if shape.len() != 4 || shape[2] < out_h || shape[3] < out_w {
        bail!(
            "model output shape {shape:?} for a {w}x{h} tile cannot cover \
             [1, 3, {out_h}, {out_w}]; configured scale {scale} does not match the model"
        );
    }
    Ok(())
}

/// Convert interleaved HWC RGB bytes to NCHW `[1,3,H,W]` float32.
///
/// Real-ESRGAN style FP32 models expect the 0-255 range, not 0-1.
fn rgb_to_nchw(tile: &RgbImage) -> Result<ArrayD<f32>> {
    let h = tile.height() as usize;
    let w = tile.width() as usize;
    let hw = h * w;
    let data = tile.data();

    let mut nchw = vec![0.0f32; 3 * hw];
    for i in 0..hw {
        let src = i * CHANNELS;
        nchw[i] = data[src] as f32;
        nchw[hw + i] = data[src + 1] as f32;
        nchw[2 * hw + i] = data[src + 2] as f32;
    }

    Ok(ArrayD::from_shape_vec(IxDyn(&[1, 3, h, w]), nchw)?)
}

/// Convert interleaved HWC RGB bytes to NCHW `[1,3,H,W]` f16 with /255
/// normalization, for FP16 models that expect the 0-1 range.
fn rgb_to_f16_nchw(tile: &RgbImage) -> Result<ArrayD<f16>> {
    let h = tile.height() as usize;
    let w = tile.width() as usize;
    let hw = h * w;
    let data = tile.data();

    let mut planes = vec![0.0f32; 3 * hw];
    for i in 0..hw {
        let src = i * CHANNELS;
        planes[i] = data[src] as f32 / 255.0;
        planes[hw + i] = data[src + 1] as f32 / 255.0;
        planes[2 * hw + i] = data[src + 2] as f32 / 255.0;
    }

    let mut half_data = vec![f16::ZERO; 3 * hw];
    half_data.convert_from_f32_slice(&planes);

    Ok(ArrayD::from_shape_vec(IxDyn(&[1, 3, h, w]), half_data)?)
}

/// Convert NCHW `[1,3,H,W]` float32 to interleaved RGB u8, clamping to 0-255.
fn nchw_to_rgb(arr: &ArrayD<f32>, out_w: u32, out_h: u32) -> Result<RgbImage> {
    let owned_contig;
    let slice = if let Some(s) = arr.as_slice() {
        s
    } else {
        owned_contig = arr.as_standard_layout().into_owned();
        owned_contig.as_slice().unwrap()
    };
    let hw = out_h as usize * out_w as usize;

    let mut out = RgbImage::zeroed(out_w, out_h);
    let rgb = out.data_mut();
    for i in 0..hw {
        rgb[i * CHANNELS] = slice[i].clamp(0.0, 255.0) as u8;
        rgb[i * CHANNELS + 1] = slice[hw + i].clamp(0.0, 255.0) as u8;
        rgb[i * CHANNELS + 2] = slice[2 * hw + i].clamp(0.0, 255.0) as u8;
    }
    Ok(out)
}

/// Convert f16 NCHW `[1,3,H,W]` (0-1 range) to interleaved RGB u8.
fn f16_nchw_to_rgb(arr: &ArrayD<f16>, out_w: u32, out_h: u32) -> Result<RgbImage> {
    let owned_contig;
    let slice = if let Some(s) = arr.as_slice() {
        s
    } else {
        owned_contig = arr.as_standard_layout().into_owned();
        owned_contig.as_slice().unwrap()
    };
    let hw = out_h as usize * out_w as usize;

    let mut planes = vec![0.0f32; 3 * hw];
    slice.convert_to_f32_slice(&mut planes);

    let mut out = RgbImage::zeroed(out_w, out_h);
    let rgb = out.data_mut();
    for i in 0..hw {
        rgb[i * CHANNELS] = (planes[i] * 255.0).clamp(0.0, 255.0) as u8;
        rgb[i * CHANNELS + 1] = (planes[hw + i] * 255.0).clamp(0.0, 255.0) as u8;
        rgb[i * CHANNELS + 2] = (planes[2 * hw + i] * 255.0).clamp(0.0, 255.0) as u8;
    }
    Ok(out)
}

fn pad_amount(dim: usize) -> usize {
    (PAD_ALIGN - (dim % PAD_ALIGN)) % PAD_ALIGN
}

/// Reflection-pad an NCHW array so H and W are multiples of [`PAD_ALIGN`].
fn reflection_pad<T: Copy>(arr: &ArrayD<T>, h: usize, w: usize, fill: T) -> ArrayD<T> {
    let pad_h = pad_amount(h);
    let pad_w = pad_amount(w);

    if pad_h == 0 && pad_w == 0 {
        return arr.clone();
    }

    let new_h = h + pad_h;
    let new_w = w + pad_w;
    let mut padded = ArrayD::from_elem(IxDyn(&[1, 3, new_h, new_w]), fill);

    padded
        .slice_mut(s![.., .., ..h, ..w])
        .assign(&arr.slice(s![.., .., ..h, ..w]));

    for y in 0..pad_h {
        let src_y = h - 1 - y;
        for c in 0..3usize {
            for x in 0..w {
                padded[[0, c, h + y, x]] = arr[[0, c, src_y, x]];
            }
        }
    }

    for x in 0..pad_w {
        let src_x = w - 1 - x;
        for c in 0..3usize {
            for y in 0..new_h {
                let src_y = if y < h { y } else { h - 1 - (y - h) };
                padded[[0, c, y, w + x]] = arr[[0, c, src_y, src_x]];
            }
        }
    }

    padded
}
