use image::{RgbaImage, imageops};
use tracing::debug;

use crate::{
    error::{Result, RetouchError},
    traits::{ImageStage, StageContext},
    types::FileState,
};

/// Border width for a `width` x `height` image: `round(max side * percent / 100)`
pub fn padding_pixels(width: u32, height: u32, percent: f64) -> u32 {
    if percent <= 0.0 {
        return 0;
    }
    (width.max(height) as f64 * percent / 100.0).round() as u32
}

/// `(width + 2 * pixels, height + 2 * pixels)`, or `None` past `u32::MAX`
pub fn padded_dimensions(width: u32, height: u32, pixels: u32) -> Option<(u32, u32)> {
    let border = pixels.checked_mul(2)?;
    Some((width.checked_add(border)?, height.checked_add(border)?))
}

/// Paste `image` centred on a transparent canvas `2 * pixels` larger per axis
pub fn add_padding(image: &RgbaImage, pixels: u32) -> Result<RgbaImage> {
    let (width, height) = image.dimensions();
    let (padded_w, padded_h) = padded_dimensions(width, height, pixels).ok_or_else(|| {
        RetouchError::transform(FileState::Padded, format!("{pixels}px border overflows a {width}x{height} image"))
    })?;
    let mut canvas = RgbaImage::new(padded_w, padded_h);
    imageops::replace(&mut canvas, image, pixels as i64, pixels as i64);
    Ok(canvas)
}

/// Adds a transparent border. Only applied when the perimeter check did not
/// fail and the result stays within the size the image had before cropping,
/// unless expansion is allowed.
#[derive(Debug, Clone, Copy)]
pub struct Padder {
    pub percent: f64,
    pub allow_expansion: bool,
}

impl Padder {
    pub fn new(percent: f64, allow_expansion: bool) -> Self {
        Self { percent, allow_expansion }
    }

    pub fn pad(&self, image: &RgbaImage, ctx: &StageContext) -> Result<Option<RgbaImage>> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let pixels = padding_pixels(width, height, self.percent);
        if pixels == 0 {
            return Ok(None);
        }

        if ctx.perimeter_white == Some(false) {
            debug!("Perimeter is not white, padding skipped");
            return Ok(None);
        }

        let padded = padded_dimensions(width, height, pixels).ok_or_else(|| {
            RetouchError::transform(FileState::Padded, format!("{pixels}px border overflows a {width}x{height} image"))
        })?;
        let (limit_w, limit_h) = ctx.pre_crop_size.unwrap_or((width, height));
        let fits = padded.0 <= limit_w && padded.1 <= limit_h;
        if !fits && !self.allow_expansion {
            debug!(
                padded = ?padded,
                pre_crop = ?(limit_w, limit_h),
                "Padding would grow the image past its pre-crop size, skipped"
            );
            return Ok(None);
        }

        add_padding(image, pixels).map(Some)
    }
}

impl ImageStage for Padder {
    fn state(&self) -> FileState {
        FileState::Padded
    }

    fn apply(&self, image: &RgbaImage, ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
        self.pad(image, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn create_test_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
    }

    fn roomy_context() -> StageContext {
        StageContext {
            pre_crop_size: Some((1000, 1000)),
            perimeter_white: None,
        }
    }

    #[test]
    fn test_padding_size_law() {
        let img = create_test_image(80, 40);
        let padded = Padder::new(5.0, false).pad(&img, &roomy_context()).unwrap().expect("Should pad");
        // round(80 * 0.05) = 4
        assert_eq!(padded.dimensions(), (88, 48));
        assert_eq!(padded.get_pixel(0, 0)[3], 0);
        assert_eq!(padded.get_pixel(4, 4), &Rgba([10, 20, 30, 255]));
        assert_eq!(padded.get_pixel(83, 43), &Rgba([10, 20, 30, 255]));
        assert_eq!(padded.get_pixel(84, 44)[3], 0);
    }

    #[test]
    fn test_zero_padding_is_unchanged() {
        let img = create_test_image(10, 10);
        assert!(Padder::new(0.0, true).pad(&img, &roomy_context()).unwrap().is_none());
        // round(10 * 0.04) = 0
        assert!(Padder::new(4.0, true).pad(&img, &roomy_context()).unwrap().is_none());
    }

    #[test]
    fn test_expansion_gate() {
        let img = create_test_image(100, 100);
        let tight = StageContext {
            pre_crop_size: Some((105, 200)),
            perimeter_white: None,
        };
        assert!(Padder::new(5.0, false).pad(&img, &tight).unwrap().is_none());

        let padded = Padder::new(5.0, true).pad(&img, &tight).unwrap().expect("Expansion allowed");
        assert_eq!(padded.dimensions(), (110, 110));
    }

    #[test]
    fn test_failed_perimeter_check_blocks_padding() {
        let img = create_test_image(100, 100);
        let ctx = StageContext {
            pre_crop_size: Some((1000, 1000)),
            perimeter_white: Some(false),
        };
        assert!(Padder::new(5.0, true).pad(&img, &ctx).unwrap().is_none());
    }

    #[test]
    fn test_oversized_border_is_a_transform_error() {
        let img = create_test_image(100, 100);
        let err = Padder::new(1e10, true).pad(&img, &roomy_context()).unwrap_err();
        assert!(matches!(err, RetouchError::Transform { stage: FileState::Padded, .. }));
        assert!(!err.is_fatal_for_file());
        assert_eq!(padded_dimensions(u32::MAX - 1, 1, 1), None);
        assert_eq!(padded_dimensions(10, 20, 3), Some((16, 26)));
    }
}
