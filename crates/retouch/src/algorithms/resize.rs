use image::{RgbaImage, imageops::{self, FilterType}};
use tracing::debug;

use crate::{
    config::SizeLimit,
    error::Result,
    traits::{ImageStage, StageContext},
    types::FileState,
};

/// Scaled size, never below one pixel per side
pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

/// Lanczos resize to exactly `width` x `height`
pub fn resample(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    imageops::resize(image, width, height, FilterType::Lanczos3)
}

/// Uniform Lanczos downscale into `limit`. Never upscales.
pub fn downscale_to_fit(image: &RgbaImage, limit: &SizeLimit) -> Option<RgbaImage> {
    let (width, height) = image.dimensions();
    let scale = limit.downscale_factor(width, height)?;
    let (new_w, new_h) = scaled_dimensions(width, height, scale);
    if (new_w, new_h) == (width, height) {
        return None;
    }
    debug!(from = ?(width, height), to = ?(new_w, new_h), "Downscaling");
    Some(resample(image, new_w, new_h))
}

/// Downscale applied right after decoding
#[derive(Debug, Clone, Copy)]
pub struct PreResizer {
    pub limit: SizeLimit,
}

impl ImageStage for PreResizer {
    fn state(&self) -> FileState {
        FileState::PreResized
    }

    fn apply(&self, image: &RgbaImage, _ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
        Ok(downscale_to_fit(image, &self.limit))
    }
}

/// Final maximum-dimension clamp
#[derive(Debug, Clone, Copy)]
pub struct MaxSizeClamp {
    pub limit: SizeLimit,
}

impl ImageStage for MaxSizeClamp {
    fn state(&self) -> FileState {
        FileState::MaxClamped
    }

    fn apply(&self, image: &RgbaImage, _ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
        Ok(downscale_to_fit(image, &self.limit))
    }
}

/// Scale each image to its share of the first image's size. Ratios are
/// clamped to at least 0.01; images without a ratio use 1.0.
pub fn scale_proportionally(images: Vec<RgbaImage>, ratios: &[f64]) -> Vec<RgbaImage> {
    let Some((base_w, base_h)) = images.first().map(|img| img.dimensions()) else {
        return images;
    };
    if base_w == 0 || base_h == 0 {
        return images;
    }

    images
        .into_iter()
        .enumerate()
        .map(|(i, img)| {
            let ratio = ratios.get(i).copied().filter(|r| r.is_finite()).unwrap_or(1.0).max(0.01);
            let target_w = (base_w as f64 * ratio).round();
            let target_h = (base_h as f64 * ratio).round();
            let (w, h) = img.dimensions();
            if w == 0 || h == 0 || target_w < 1.0 || target_h < 1.0 {
                return img;
            }
            let scale = (target_w / w as f64).min(target_h / h as f64);
            let (new_w, new_h) = scaled_dimensions(w, h, scale);
            if (new_w, new_h) == (w, h) {
                img
            } else {
                debug!(index = i, ratio, to = ?(new_w, new_h), "Proportional scaling");
                resample(&img, new_w, new_h)
            }
        })
        .collect()
}
