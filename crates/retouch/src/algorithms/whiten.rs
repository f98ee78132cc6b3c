use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::{
    config::WhiteningConfig,
    error::Result,
    traits::{ImageStage, StageContext},
    types::{FileState, PerimeterSample},
};

/// Darkest pixel (by R+G+B) of the one-pixel ring around the image.
/// Images narrower or shorter than two pixels have no usable ring.
pub fn darkest_perimeter_pixel(image: &RgbaImage) -> Option<PerimeterSample> {
    let (width, height) = image.dimensions();
    if width <= 1 || height <= 1 {
        return None;
    }

    let top_bottom = (0..width).flat_map(|x| [(x, 0), (x, height - 1)]);
    let sides = (1..height - 1).flat_map(|y| [(0, y), (width - 1, y)]);

    top_bottom
        .chain(sides)
        .map(|(x, y)| {
            let p = image.get_pixel(x, y);
            let rgb = [p[0], p[1], p[2]];
            PerimeterSample {
                rgb,
                sum: rgb.iter().map(|&c| c as u32).sum(),
            }
        })
        .min_by_key(|sample| sample.sum)
}

/// Per-channel lookup stretching `reference` to pure white
fn channel_lut(reference: u8) -> [u8; 256] {
    let denominator = reference.max(1) as u32;
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = (i as u32 * 255 / denominator).min(255) as u8;
    }
    lut
}

/// Colour-corrects the image so that its darkest perimeter pixel becomes
/// white. Skipped when that pixel is already white or darker than the
/// cancellation threshold, since a dark edge usually belongs to the object.
#[derive(Debug, Clone, Copy, Default)]
pub struct Whitener {
    pub config: WhiteningConfig,
}

impl Whitener {
    pub fn new(cancel_threshold_sum: u32) -> Self {
        Self {
            config: WhiteningConfig { cancel_threshold_sum },
        }
    }

    pub fn whiten(&self, image: &RgbaImage) -> Option<RgbaImage> {
        let Some(sample) = darkest_perimeter_pixel(image) else {
            debug!("Image too small for perimeter analysis, whitening skipped");
            return None;
        };

        if sample.sum < self.config.cancel_threshold_sum {
            debug!(
                sum = sample.sum,
                threshold = self.config.cancel_threshold_sum,
                "Darkest perimeter pixel below threshold, whitening cancelled"
            );
            return None;
        }
        if sample.is_white() {
            return None;
        }

        debug!(reference = ?sample.rgb, "Whitening against perimeter reference");
        let [lut_r, lut_g, lut_b] = sample.rgb.map(channel_lut);
        Some(imageproc::map::map_colors(image, |p: Rgba<u8>| {
            Rgba([
                lut_r[p[0] as usize],
                lut_g[p[1] as usize],
                lut_b[p[2] as usize],
                p[3],
            ])
        }))
    }
}

impl ImageStage for Whitener {
    fn state(&self) -> FileState {
        FileState::Whitened
    }

    fn apply(&self, image: &RgbaImage, _ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
        Ok(self.whiten(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Grey border of the given shade around a mid-grey centre
    fn create_test_image(border: u8, alpha: u8) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([border, border, border, alpha]));
        for y in 3..7 {
            for x in 3..7 {
                img.put_pixel(x, y, Rgba([100, 100, 100, alpha]));
            }
        }
        img
    }

    #[test]
    fn test_darkest_perimeter_ignores_interior() {
        let mut img = create_test_image(240, 255);
        img.put_pixel(9, 5, Rgba([230, 240, 240, 255]));
        let sample = darkest_perimeter_pixel(&img).expect("Should find a perimeter pixel");
        assert_eq!(sample.rgb, [230, 240, 240]);
        assert_eq!(sample.sum, 710);
    }

    #[test]
    fn test_degenerate_image_has_no_perimeter() {
        assert!(darkest_perimeter_pixel(&RgbaImage::new(1, 5)).is_none());
        assert!(darkest_perimeter_pixel(&RgbaImage::new(5, 1)).is_none());
    }

    #[test]
    fn test_cancellation_threshold_boundary() {
        // 3 * 200 = 600
        let img = create_test_image(200, 255);

        let below = Whitener::new(601);
        assert!(below.whiten(&img).is_none(), "Sum one below threshold must cancel");

        let at = Whitener::new(600);
        let whitened = at.whiten(&img).expect("Sum equal to threshold must whiten");
        assert_eq!(whitened.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        // 100 * 255 / 200
        assert_eq!(whitened.get_pixel(5, 5), &Rgba([127, 127, 127, 255]));
    }

    #[test]
    fn test_white_reference_is_unchanged() {
        let img = create_test_image(255, 255);
        assert!(Whitener::new(0).whiten(&img).is_none());
    }

    #[test]
    fn test_alpha_is_preserved() {
        let img = create_test_image(220, 77);
        let whitened = Whitener::new(500).whiten(&img).expect("Should whiten");
        assert!(whitened.pixels().all(|p| p[3] == 77));
    }

    #[test]
    fn test_lut_saturates() {
        let lut = channel_lut(200);
        assert_eq!(lut[0], 0);
        assert_eq!(lut[200], 255);
        assert_eq!(lut[255], 255);
        assert_eq!(channel_lut(0)[1], 255);
    }
}
