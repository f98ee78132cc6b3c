use std::path::PathBuf;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoStaticStr};

/// States a file passes through on its way from input to saved output.
/// A disabled stage leaves the file in the previous state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash,
    Serialize, Deserialize,
    Display, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileState {
    Opened,
    PreResized,
    Whitened,
    PerimeterChecked,
    BackgroundRemoved,
    Cropped,
    Padded,
    RatioEnforced,
    MaxClamped,
    CanvasComposed,
    Saved,
}

/// Axis-aligned box of non-transparent content. `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Box covering a whole `width` x `height` image
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_degenerate(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Grow by `margin` on every side, clamped to a `width` x `height` image
    pub fn expand(&self, margin: u32, width: u32, height: u32) -> Self {
        Self {
            left: self.left.saturating_sub(margin),
            top: self.top.saturating_sub(margin),
            right: self.right.saturating_add(margin).min(width),
            bottom: self.bottom.saturating_add(margin).min(height),
        }
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Distances from the box to the left, top, right and bottom image edges
    pub fn margins(&self, width: u32, height: u32) -> [u32; 4] {
        [
            self.left,
            self.top,
            width.saturating_sub(self.right),
            height.saturating_sub(self.bottom),
        ]
    }
}

/// Darkest pixel of the one-pixel perimeter ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerimeterSample {
    pub rgb: [u8; 3],
    pub sum: u32,
}

impl PerimeterSample {
    pub fn is_white(&self) -> bool {
        self.rgb == [255, 255, 255]
    }
}

/// An output written by the batch, waiting to be renamed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFileRecord {
    pub output: PathBuf,
    /// File name of the source image without its extension
    pub original_base: String,
}

/// One populated grid cell of a collage
#[derive(Debug, Clone)]
pub struct CollageCell {
    pub row: u32,
    pub col: u32,
    pub image: RgbaImage,
}
