use image::{Rgb, RgbImage, Rgba, RgbaImage, imageops};
use tracing::debug;

use crate::{
    algorithms::{blend_over, centre_offset, resample, scaled_dimensions},
    config::{AspectRatio, CanvasSize},
    error::{Result, RetouchError},
    traits::{ImageStage, StageContext},
    types::FileState,
};

/// Ratios closer than this are treated as equal
pub const ASPECT_TOLERANCE: f64 = 0.01;

/// Grows the short axis with transparent space until the image has the
/// requested aspect ratio. Content stays centred and is never scaled.
#[derive(Debug, Clone, Copy)]
pub struct AspectRatioEnforcer {
    pub ratio: AspectRatio,
}

impl AspectRatioEnforcer {
    pub fn target_size(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let desired = self.ratio.value();
        if width == 0 || height == 0 || !desired.is_finite() || desired <= 0.0 {
            return None;
        }
        let current = width as f64 / height as f64;
        if (current - desired).abs() <= ASPECT_TOLERANCE {
            return None;
        }
        let size = if current > desired {
            (width, ((width as f64 / desired).round() as u32).max(height))
        } else {
            (((height as f64 * desired).round() as u32).max(width), height)
        };
        (size != (width, height)).then_some(size)
    }
}

impl ImageStage for AspectRatioEnforcer {
    fn state(&self) -> FileState {
        FileState::RatioEnforced
    }

    fn apply(&self, image: &RgbaImage, _ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
        let (width, height) = image.dimensions();
        let Some((new_w, new_h)) = self.target_size(width, height) else {
            return Ok(None);
        };
        debug!(from = ?(width, height), to = ?(new_w, new_h), "Enforcing aspect ratio");
        let mut canvas = RgbaImage::new(new_w, new_h);
        imageops::replace(
            &mut canvas,
            image,
            centre_offset(new_w, width),
            centre_offset(new_h, height),
        );
        Ok(Some(canvas))
    }
}

/// Fits the content into an exact canvas, preserving its aspect ratio.
/// `background` fills the canvas for outputs without alpha; transparent otherwise.
#[derive(Debug, Clone, Copy)]
pub struct ExactCanvas {
    pub size: CanvasSize,
    pub background: Option<[u8; 3]>,
}

impl ImageStage for ExactCanvas {
    fn state(&self) -> FileState {
        FileState::CanvasComposed
    }

    fn apply(&self, image: &RgbaImage, _ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
        let (width, height) = image.dimensions();
        let CanvasSize { width: target_w, height: target_h } = self.size;
        if (width, height) == (target_w, target_h) {
            return Ok(None);
        }
        if width == 0 || height == 0 || target_w == 0 || target_h == 0 {
            return Err(RetouchError::transform(
                self.state(),
                format!("cannot fit {width}x{height} into {target_w}x{target_h}"),
            ));
        }

        let scale = (target_w as f64 / width as f64).min(target_h as f64 / height as f64);
        let (fit_w, fit_h) = scaled_dimensions(width, height, scale);
        let (fit_w, fit_h) = (fit_w.min(target_w), fit_h.min(target_h));
        let content = resample(image, fit_w, fit_h);

        let fill = match self.background {
            Some([r, g, b]) => Rgba([r, g, b, 255]),
            None => Rgba([0, 0, 0, 0]),
        };
        let mut canvas = RgbaImage::from_pixel(target_w, target_h, fill);
        imageops::overlay(
            &mut canvas,
            &content,
            centre_offset(target_w, fit_w),
            centre_offset(target_h, fit_h),
        );
        debug!(content = ?(fit_w, fit_h), canvas = ?(target_w, target_h), "Composed exact canvas");
        Ok(Some(canvas))
    }
}

/// Composite onto an opaque background for formats without alpha
pub fn flatten(image: &RgbaImage, background: [u8; 3]) -> RgbImage {
    let (width, height) = image.dimensions();
    RgbImage::from_fn(width, height, |x, y| Rgb(blend_over(image.get_pixel(x, y), background)))
}
