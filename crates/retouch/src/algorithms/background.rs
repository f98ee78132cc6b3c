use image::RgbaImage;
use tracing::debug;

use crate::{
    algorithms::is_near_white,
    error::Result,
    traits::{ImageStage, StageContext},
    types::FileState,
};

/// Punches near-white pixels out to full transparency, leaving their colour
/// channels untouched. Applying it twice with the same tolerance is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundRemover {
    pub tolerance: u8,
}

impl Default for BackgroundRemover {
    fn default() -> Self {
        Self { tolerance: 10 }
    }
}

impl BackgroundRemover {
    pub fn remove(&self, image: &RgbaImage) -> Option<RgbaImage> {
        let is_background = |p: &image::Rgba<u8>| p[3] > 0 && is_near_white([p[0], p[1], p[2]], self.tolerance);

        if !image.pixels().any(is_background) {
            debug!("No near-white pixels to remove");
            return None;
        }

        let mut out = image.clone();
        let mut cleared = 0usize;
        for pixel in out.pixels_mut() {
            if is_background(&*pixel) {
                pixel[3] = 0;
                cleared += 1;
            }
        }
        debug!(cleared, tolerance = self.tolerance, "Background pixels made transparent");
        Some(out)
    }
}

impl ImageStage for BackgroundRemover {
    fn state(&self) -> FileState {
        FileState::BackgroundRemoved
    }

    fn apply(&self, image: &RgbaImage, _ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
        Ok(self.remove(image))
    }
}
