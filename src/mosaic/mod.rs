//! Mosaic composition.
//!
//! All crops of one source object are packed into a single raster so the
//! downstream recognizer is called once per object. Every crop is centred in
//! a white square tile sized to the largest crop plus a buffer, and tiles are
//! laid out row-major in crop order on a roughly square grid.

use image::{Rgb, RgbImage};
use serde::Serialize;

use crate::crop::CircleCrop;

/// Default white border around each crop inside its tile.
pub const DEFAULT_TILE_BUFFER: u32 = 5;

/// Default hard cap on the mosaic pixel area.
pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

/// Mosaic composition options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MosaicOptions {
    pub buffer: u32,
    /// Mosaics with a larger pixel area are not built.
    pub max_pixels: u64,
}

impl Default for MosaicOptions {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_TILE_BUFFER,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

/// Grid geometry for a set of crops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MosaicLayout {
    pub count: usize,
    pub columns: u32,
    pub rows: u32,
    /// Largest crop width or height.
    pub max_dim: u32,
    /// Side of each square tile (`max_dim + 2 × buffer`).
    pub tile_side: u32,
    pub buffer: u32,
}

impl MosaicLayout {
    /// Plans the grid for crops of the given `(width, height)` dimensions.
    ///
    /// Returns `None` when there are no crops.
    pub fn plan(dims: &[(u32, u32)], buffer: u32) -> Option<Self> {
        if dims.is_empty() {
            return None;
        }

        let count = dims.len();
        let max_dim = dims.iter().map(|&(w, h)| w.max(h)).max().unwrap_or(0);
        let columns = (count as f64).sqrt().floor().max(1.0) as u32;
        let rows = (count as u32).div_ceil(columns);

        Some(Self {
            count,
            columns,
            rows,
            max_dim,
            tile_side: max_dim + 2 * buffer,
            buffer,
        })
    }

    pub fn width(&self) -> u64 {
        self.columns as u64 * self.tile_side as u64
    }

    pub fn height(&self) -> u64 {
        self.rows as u64 * self.tile_side as u64
    }

    pub fn pixel_area(&self) -> u64 {
        self.width() * self.height()
    }

    /// Grid cell `(row, column)` of crop `index`.
    #[inline]
    pub fn cell(&self, index: usize) -> (u32, u32) {
        let columns = self.columns as usize;
        ((index / columns) as u32, (index % columns) as u32)
    }

    /// Top-left pixel where a crop of size `(w, h)` lands in cell `index`.
    pub fn placement(&self, index: usize, w: u32, h: u32) -> (u32, u32) {
        let (row, col) = self.cell(index);
        let x = col * self.tile_side + self.buffer + (self.max_dim - w) / 2;
        let y = row * self.tile_side + self.buffer + (self.max_dim - h) / 2;
        (x, y)
    }
}

/// Composes crops into one mosaic raster.
///
/// Returns `None` for an empty crop list, and also when the mosaic would
/// exceed `options.max_pixels`; the check happens before any allocation.
pub fn compose_mosaic(crops: &[CircleCrop], options: &MosaicOptions) -> Option<RgbImage> {
    let dims: Vec<(u32, u32)> = crops.iter().map(CircleCrop::dimensions).collect();
    let layout = MosaicLayout::plan(&dims, options.buffer)?;

    if layout.pixel_area() > options.max_pixels {
        tracing::warn!(
            "mosaic of {} crops would be {}x{} ({} px), over the {} px cap",
            layout.count,
            layout.width(),
            layout.height(),
            layout.pixel_area(),
            options.max_pixels
        );
        return None;
    }

    let mut mosaic = RgbImage::from_pixel(
        layout.width() as u32,
        layout.height() as u32,
        Rgb([255, 255, 255]),
    );
    for (index, crop) in crops.iter().enumerate() {
        let (w, h) = crop.dimensions();
        let (x, y) = layout.placement(index, w, h);
        image::imageops::replace(&mut mosaic, &crop.image, x as i64, y as i64);
    }

    Some(mosaic)
}
