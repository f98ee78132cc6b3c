use image::{RgbaImage, imageops};
use tracing::{debug, info};

use crate::{
    algorithms::centre_offset,
    config::CollageConfig,
    error::{Result, RetouchError},
    traits::CollageComposer,
    types::{BoundingBox, CollageCell},
};

/// Grid geometry for a set of image sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    pub count: u32,
    pub cols: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub h_spacing: u32,
    pub v_spacing: u32,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl GridGeometry {
    /// Lay out `sizes` in row-major order. `columns` of `None` picks
    /// `ceil(sqrt(n))`.
    pub fn compute(sizes: &[(u32, u32)], columns: Option<u32>, spacing_percent: f64) -> Result<Self> {
        let count = sizes.len() as u32;
        if count == 0 {
            return Err(RetouchError::InvalidConfig("collage needs at least one image".into()));
        }
        let cols = match columns.filter(|&c| c > 0) {
            Some(c) => c,
            None => ((count as f64).sqrt().ceil() as u32).max(1),
        };
        let rows = count.div_ceil(cols).max(1);

        let cell_width = sizes.iter().map(|&(w, _)| w).max().unwrap_or(1).max(1);
        let cell_height = sizes.iter().map(|&(_, h)| h).max().unwrap_or(1).max(1);
        let spacing = |side: u32| (side as f64 * spacing_percent.max(0.0) / 100.0).round() as u32;
        let h_spacing = spacing(cell_width);
        let v_spacing = spacing(cell_height);

        // n * cell + (n + 1) * gap
        let extent = |n: u32, cell: u32, gap: u32| {
            n.checked_mul(cell)?.checked_add(n.checked_add(1)?.checked_mul(gap)?)
        };
        let (Some(canvas_width), Some(canvas_height)) =
            (extent(cols, cell_width, h_spacing), extent(rows, cell_height, v_spacing))
        else {
            return Err(RetouchError::InvalidConfig(format!(
                "collage of {cols}x{rows} cells of {cell_width}x{cell_height} with {spacing_percent}% spacing is too large"
            )));
        };

        Ok(Self {
            count,
            cols,
            rows,
            cell_width,
            cell_height,
            h_spacing,
            v_spacing,
            canvas_width,
            canvas_height,
        })
    }

    /// Images placed in `row`; only the last row can be short
    pub fn items_in_row(&self, row: u32) -> u32 {
        self.count.saturating_sub(row * self.cols).min(self.cols)
    }

    /// Top-left corner of the cell at (`row`, `col`). Rows with fewer items
    /// are centred as a block.
    pub fn cell_origin(&self, row: u32, col: u32) -> (i64, i64) {
        let items = self.items_in_row(row) as i64;
        let (cw, ch) = (self.cell_width as i64, self.cell_height as i64);
        let (hs, vs) = (self.h_spacing as i64, self.v_spacing as i64);

        let row_content = items * cw + (items - 1).max(0) * hs;
        let start_x = (self.canvas_width as i64 - (row_content + 2 * hs)) / 2;
        let x = start_x + hs + col as i64 * (cw + hs);
        let y = vs + row as i64 * (ch + vs);
        (x, y)
    }

    /// Paste rectangle of an image of `size` in the cell at (`row`, `col`)
    pub fn placement(&self, row: u32, col: u32, size: (u32, u32)) -> BoundingBox {
        let (x, y) = self.cell_origin(row, col);
        let left = (x + centre_offset(self.cell_width, size.0)).max(0) as u32;
        let top = (y + centre_offset(self.cell_height, size.1)).max(0) as u32;
        BoundingBox::new(left, top, left + size.0, top + size.1)
    }
}

/// Arranges images in a grid on a transparent canvas
#[derive(Debug, Clone, Default)]
pub struct CollageLayout {
    pub columns: Option<u32>,
    pub spacing_percent: f64,
}

impl CollageLayout {
    pub fn new(columns: Option<u32>, spacing_percent: f64) -> Self {
        Self { columns, spacing_percent }
    }

    pub fn from_config(config: &CollageConfig) -> Self {
        Self::new(config.columns, config.spacing_percent)
    }

    pub fn geometry(&self, images: &[RgbaImage]) -> Result<GridGeometry> {
        let sizes: Vec<(u32, u32)> = images.iter().map(|img| img.dimensions()).collect();
        GridGeometry::compute(&sizes, self.columns, self.spacing_percent)
    }

    /// Assign images to cells in row-major order
    pub fn cells(&self, images: Vec<RgbaImage>) -> Vec<CollageCell> {
        let cols = match self.geometry(&images) {
            Ok(geometry) => geometry.cols,
            Err(_) => return Vec::new(),
        };
        images
            .into_iter()
            .enumerate()
            .map(|(i, image)| CollageCell {
                row: i as u32 / cols,
                col: i as u32 % cols,
                image,
            })
            .collect()
    }
}

impl CollageComposer for CollageLayout {
    fn compose(&self, images: Vec<RgbaImage>) -> Result<RgbaImage> {
        let geometry = self.geometry(&images)?;
        info!(
            rows = geometry.rows,
            cols = geometry.cols,
            cell = ?(geometry.cell_width, geometry.cell_height),
            canvas = ?(geometry.canvas_width, geometry.canvas_height),
            "🧩 Composing collage"
        );

        let mut canvas = RgbaImage::new(geometry.canvas_width, geometry.canvas_height);
        for cell in self.cells(images) {
            let rect = geometry.placement(cell.row, cell.col, cell.image.dimensions());
            debug!(row = cell.row, col = cell.col, ?rect, "Placing image");
            imageops::overlay(&mut canvas, &cell.image, rect.left as i64, rect.top as i64);
        }
        Ok(canvas)
    }
}
