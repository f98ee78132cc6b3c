use image::RgbaImage;
use tracing::debug;

use crate::{
    algorithms::{blend_over, is_near_white},
    error::Result,
    traits::{ImageStage, StageContext},
    types::FileState,
};

const WHITE: [u8; 3] = [255, 255, 255];

/// Whether a `margin`-pixel ring at the image edges is near-white once the
/// image is composited over white. Margins larger than half a side are
/// clamped, and never drop below one pixel.
pub fn is_perimeter_white(image: &RgbaImage, tolerance: u8, margin: u32) -> bool {
    let (width, height) = image.dimensions();
    if margin == 0 || width == 0 || height == 0 {
        return false;
    }
    let mh = margin.min(height / 2).max(1);
    let mw = margin.min(width / 2).max(1);

    let white_at = |x: u32, y: u32| is_near_white(blend_over(image.get_pixel(x, y), WHITE), tolerance);

    let rows = (0..mh).chain(height.saturating_sub(mh)..height);
    for y in rows {
        if !(0..width).all(|x| white_at(x, y)) {
            return false;
        }
    }

    let columns = (0..mw).chain(width.saturating_sub(mw)..width);
    for x in columns {
        if !(mh..height.saturating_sub(mh)).all(|y| white_at(x, y)) {
            return false;
        }
    }
    true
}

/// Records whether the image edges are white. Never changes the image;
/// the padder reads the outcome from the stage context.
#[derive(Debug, Clone, Copy)]
pub struct PerimeterCheck {
    pub tolerance: u8,
    pub margin: u32,
}

impl ImageStage for PerimeterCheck {
    fn state(&self) -> FileState {
        FileState::PerimeterChecked
    }

    fn apply(&self, image: &RgbaImage, ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
        let white = is_perimeter_white(image, self.tolerance, self.margin);
        debug!(white, margin = self.margin, tolerance = self.tolerance, "Perimeter check");
        ctx.perimeter_white = Some(white);
        Ok(None)
    }
}
