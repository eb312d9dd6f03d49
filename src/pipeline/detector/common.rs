use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::landmarks::{FACE_LANDMARK_COUNT, Keypoint};
use crate::types::Frame;

pub const FACE_INPUT_SIZE: u32 = 192;
/// Face regions smaller than this many source pixels fall back to the full frame.
const MIN_REGION_SIDE: f32 = 32.0;

/// Mapping from the square model input back to the source frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl LetterboxInfo {
    /// Model-input coordinates to source pixels; z shares the x/y unit.
    pub fn to_source(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        (
            (x - self.pad_x) / self.scale,
            (y - self.pad_y) / self.scale,
            z / self.scale,
        )
    }
}

/// Square crop of the source frame scaled to the model input.
#[derive(Clone, Debug, PartialEq)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub output_size: u32,
}

impl CropTransform {
    pub fn to_source(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        (
            self.center.0 + (x - half) * scale,
            self.center.1 + (y - half) * scale,
            z * scale,
        )
    }
}

/// How model-input coordinates relate to the source frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InputMapping {
    Letterbox(LetterboxInfo),
    Crop(CropTransform),
}

impl InputMapping {
    pub fn to_source(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        match self {
            InputMapping::Letterbox(letterbox) => letterbox.to_source(x, y, z),
            InputMapping::Crop(crop) => crop.to_source(x, y, z),
        }
    }
}

/// Axis-aligned square around the face of the previous frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceRegion {
    pub center: (f32, f32),
    pub side: f32,
}

impl FaceRegion {
    /// Bounding square of `keypoints` grown by `margin`, or `None` when the
    /// face is too small to crop.
    pub fn around(keypoints: &[Keypoint], margin: f32) -> Option<Self> {
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for kp in keypoints.iter().filter(|kp| kp.x.is_finite() && kp.y.is_finite()) {
            min_x = min_x.min(kp.x);
            min_y = min_y.min(kp.y);
            max_x = max_x.max(kp.x);
            max_y = max_y.max(kp.y);
        }
        let side = (max_x - min_x).max(max_y - min_y) * margin;
        if !side.is_finite() || side < MIN_REGION_SIDE {
            return None;
        }
        Some(Self {
            center: ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0),
            side,
        })
    }
}

/// Sample `region` into an `output_size` square NHWC tensor in [0, 1].
/// Parts of the region outside the frame read as black.
pub fn crop_region(
    frame: &Frame,
    region: FaceRegion,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;
    let transform = CropTransform {
        center: region.center,
        side: region.side,
        output_size,
    };

    let side = output_size as usize;
    let mut data = vec![0.0f32; side * side * 3];
    data.par_chunks_exact_mut(side * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let (sx, sy, _) = transform.to_source(x as f32 + 0.5, y as f32 + 0.5, 0.0);
                px.copy_from_slice(&sample_rgb(frame, sx - 0.5, sy - 0.5));
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), data)
        .map_err(|err| anyhow!("failed to build crop tensor: {err}"))?;
    Ok((input, transform))
}

/// Bilinear RGB lookup at a pixel-center coordinate.
fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    let fetch = |ix: i64, iy: i64| -> [f32; 3] {
        if ix < 0 || iy < 0 || ix >= frame.width as i64 || iy >= frame.height as i64 {
            return [0.0; 3];
        }
        let idx = (iy as usize * frame.width as usize + ix as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (ix, iy) = (x0 as i64, y0 as i64);
    let (c00, c10) = (fetch(ix, iy), fetch(ix + 1, iy));
    let (c01, c11) = (fetch(ix, iy + 1), fetch(ix + 1, iy + 1));
    std::array::from_fn(|c| {
        let top = c00[c] + (c10[c] - c00[c]) * fx;
        let bottom = c01[c] + (c11[c] - c01[c]) * fx;
        top + (bottom - top) * fy
    })
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Resize the whole frame into a `target_size` square, padding the short side,
/// as an NHWC tensor in [0, 1].
pub fn letterbox_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().clamp(1.0, target_size as f32) as u32;
    let new_h = (frame.height as f32 * scale).round().clamp(1.0, target_size as f32) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let side = target_size as usize;
    let pad_x = (side - new_w as usize) / 2;
    let pad_y = (side - new_h as usize) / 2;
    let mut canvas = vec![0.0f32; side * side * 3];
    let src_stride = new_w as usize * 4;
    canvas
        .par_chunks_exact_mut(side * 3)
        .enumerate()
        .skip(pad_y)
        .take(new_h as usize)
        .for_each(|(row, dst)| {
            let src = &resized[(row - pad_y) * src_stride..(row - pad_y + 1) * src_stride];
            for (dst_px, src_px) in dst[pad_x * 3..].chunks_exact_mut(3).zip(src.chunks_exact(4)) {
                dst_px[0] = src_px[0] as f32 / 255.0;
                dst_px[1] = src_px[1] as f32 / 255.0;
                dst_px[2] = src_px[2] as f32 / 255.0;
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), canvas)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    };
    Ok((input, letterbox))
}

/// Flat `[x0, y0, z0, x1, ...]` model output to source-pixel keypoints.
pub fn decode_face_mesh(flat: &[f32], mapping: &InputMapping) -> Result<Vec<Keypoint>> {
    if flat.len() < FACE_LANDMARK_COUNT * 3 {
        return Err(anyhow!(
            "unexpected face mesh length: got {}, need {}",
            flat.len(),
            FACE_LANDMARK_COUNT * 3
        ));
    }

    Ok(flat
        .chunks_exact(3)
        .take(FACE_LANDMARK_COUNT)
        .map(|c| {
            let (x, y, z) = mapping.to_source(c[0], c[1], c[2]);
            Keypoint { x, y, z, name: None }
        })
        .collect())
}

pub fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}
