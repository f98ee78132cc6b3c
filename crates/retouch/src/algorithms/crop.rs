use image::{RgbaImage, imageops};
use tracing::debug;

use crate::{
    config::CropMode,
    error::Result,
    traits::{ImageStage, StageContext},
    types::{BoundingBox, FileState},
};

/// Margin kept around the content so anti-aliased edges survive the crop
pub const SAFETY_MARGIN: u32 = 1;

/// Smallest box holding every pixel with non-zero alpha
pub fn content_bounds(image: &RgbaImage) -> Option<BoundingBox> {
    let (width, height) = image.dimensions();
    let mut bbox: Option<BoundingBox> = None;

    for y in 0..height {
        for x in 0..width {
            if image.get_pixel(x, y)[3] == 0 {
                continue;
            }
            bbox = Some(match bbox {
                None => BoundingBox::new(x, y, x + 1, y + 1),
                Some(b) => BoundingBox::new(
                    b.left.min(x),
                    b.top.min(y),
                    b.right.max(x + 1),
                    b.bottom.max(y + 1),
                ),
            });
        }
    }
    bbox
}

/// Final crop rectangle for `image`, or `None` when nothing would be removed
pub fn crop_box(image: &RgbaImage, mode: CropMode) -> Option<BoundingBox> {
    let (width, height) = image.dimensions();
    let content = content_bounds(image)?;
    if content.is_degenerate() {
        return None;
    }

    let [left, top, right, bottom] = content.margins(width, height);
    let candidate = match mode {
        CropMode::Standard => content,
        CropMode::SymmetricAxes => {
            let horizontal = left.min(right);
            let vertical = top.min(bottom);
            BoundingBox::new(
                content.left - horizontal,
                content.top - vertical,
                content.right + horizontal,
                content.bottom + vertical,
            )
        }
        CropMode::SymmetricAbsolute => {
            let margin = left.min(top).min(right).min(bottom);
            BoundingBox::new(margin, margin, width - margin, height - margin)
        }
    };
    let base = if candidate.is_degenerate() {
        debug!(%mode, "Symmetric box is invalid, falling back to the content box");
        content
    } else {
        candidate
    };

    let final_box = base.expand(SAFETY_MARGIN, width, height);
    if final_box == BoundingBox::full(width, height) || final_box.is_degenerate() {
        return None;
    }
    Some(final_box)
}

/// Crops transparent borders away according to a [`CropMode`]
#[derive(Debug, Clone, Copy, Default)]
pub struct Cropper {
    pub mode: CropMode,
}

impl Cropper {
    pub fn new(mode: CropMode) -> Self {
        Self { mode }
    }

    pub fn crop(&self, image: &RgbaImage) -> Option<RgbaImage> {
        let bbox = crop_box(image, self.mode)?;
        debug!(?bbox, mode = %self.mode, "Cropping to content");
        Some(imageops::crop_imm(image, bbox.left, bbox.top, bbox.width(), bbox.height()).to_image())
    }
}

impl ImageStage for Cropper {
    fn state(&self) -> FileState {
        FileState::Cropped
    }

    fn apply(&self, image: &RgbaImage, _ctx: &mut StageContext) -> Result<Option<RgbaImage>> {
        Ok(self.crop(image))
    }
}
