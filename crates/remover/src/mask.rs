//! Alpha-mask helpers shared by in-process removers.

use image::{DynamicImage, GrayImage, RgbaImage};

use crate::RemoveError;

/// Min-max normalizes a raw saliency prediction into `0..=255`.
///
/// A flat prediction (max == min) maps to all zeros rather than dividing by
/// zero.
pub fn normalize_prediction(values: &[f32]) -> Vec<u8> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return vec![0; values.len()];
    }
    values
        .iter()
        .map(|&v| (((v - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect()
}

/// Cuts `image` out with `mask`: each pixel's alpha becomes its original
/// alpha scaled by the mask value.
pub fn apply_mask(image: &DynamicImage, mask: &GrayImage) -> Result<RgbaImage, RemoveError> {
    let mut rgba = image.to_rgba8();
    if rgba.dimensions() != mask.dimensions() {
        return Err(RemoveError::UnsupportedImage(format!(
            "mask is {:?} but image is {:?}",
            mask.dimensions(),
            rgba.dimensions()
        )));
    }
    for (pixel, m) in rgba.pixels_mut().zip(mask.pixels()) {
        let alpha = u16::from(pixel[3]) * u16::from(m[0]) / 255;
        pixel[3] = alpha as u8;
    }
    Ok(rgba)
}
