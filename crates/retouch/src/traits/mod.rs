use image::RgbaImage;
use crate::{error::Result, types::FileState};

/// Facts gathered by earlier stages that later stages decide on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageContext {
    /// Image size right before background removal and cropping
    pub pre_crop_size: Option<(u32, u32)>,
    /// Outcome of the perimeter-whiteness check, `None` when it did not run
    pub perimeter_white: Option<bool>,
}

impl StageContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Trait for a single step of the per-image pipeline
pub trait ImageStage: Send + Sync {
    /// State a file reaches once this stage has run
    fn state(&self) -> FileState;

    /// Transform the image. `Ok(None)` leaves it unchanged.
    fn apply(&self, image: &RgbaImage, ctx: &mut StageContext) -> Result<Option<RgbaImage>>;
}

/// Trait for placing a set of images on one canvas
pub trait CollageComposer: Send + Sync {
    /// Compose the images in order onto a single RGBA canvas
    fn compose(&self, images: Vec<RgbaImage>) -> Result<RgbaImage>;
}
