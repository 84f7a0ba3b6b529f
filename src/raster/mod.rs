//! Raster image collaborators.
//!
//! Decoding and encoding go through [`ImageCodec`] so the detector, exporter,
//! and composer only ever see decoded [`RgbImage`] buffers. PDF documents are
//! rasterized by a [`pdf::PdfRasterizer`].

pub mod pdf;

use std::io::Cursor;

use image::{ImageFormat, RgbImage};

use crate::error::RowmarkError;

/// Lower-cased extensions that are treated as single already-rasterized objects.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "tif", "tiff", "png"];

/// Converts between encoded image bytes and RGB rasters.
pub trait ImageCodec {
    /// Decodes bytes of any supported format into an 8-bit RGB raster.
    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, RowmarkError>;

    /// Encodes a raster in this codec's output format.
    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, RowmarkError>;

    /// File extension (without the dot) of the encoded output.
    fn extension(&self) -> &'static str;
}

/// [`ImageCodec`] backed by the `image` crate.
#[derive(Clone, Copy, Debug)]
pub struct StandardCodec {
    output: ImageFormat,
}

impl StandardCodec {
    pub fn png() -> Self {
        Self {
            output: ImageFormat::Png,
        }
    }

    pub fn jpeg() -> Self {
        Self {
            output: ImageFormat::Jpeg,
        }
    }
}

impl Default for StandardCodec {
    fn default() -> Self {
        Self::png()
    }
}

impl ImageCodec for StandardCodec {
    fn decode(&self, bytes: &[u8]) -> Result<RgbImage, RowmarkError> {
        let image = image::load_from_memory(bytes).map_err(|source| RowmarkError::Decode {
            context: format!("{} byte image", bytes.len()),
            source,
        })?;
        Ok(image.to_rgb8())
    }

    fn encode(&self, image: &RgbImage) -> Result<Vec<u8>, RowmarkError> {
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, self.output)
            .map_err(|source| RowmarkError::Encode {
                context: format!("{}x{} raster", image.width(), image.height()),
                source,
            })?;
        Ok(out.into_inner())
    }

    fn extension(&self) -> &'static str {
        match self.output {
            ImageFormat::Jpeg => "jpg",
            _ => "png",
        }
    }
}

/// What kind of object a storage key refers to, judged by its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Pdf,
    Image,
    Other,
}

impl ObjectKind {
    /// Classifies an object name by its case-insensitive extension.
    pub fn from_name(name: &str) -> Self {
        let extension = std::path::Path::new(name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());
        match extension.as_deref() {
            Some("pdf") => ObjectKind::Pdf,
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => ObjectKind::Image,
            _ => ObjectKind::Other,
        }
    }
}
