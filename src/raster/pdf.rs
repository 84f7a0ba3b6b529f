//! PDF rasterization collaborator.
//!
//! A rasterizer never fails outward: malformed, empty, or unrenderable
//! documents come back as a [`PdfConversion`] with no images and a
//! diagnostic message, and the caller decides whether to skip the object.

use image::RgbImage;

/// Resolution used to render PDF pages.
pub const DEFAULT_PDF_DPI: f32 = 300.0;

/// Result of converting one PDF document.
#[derive(Clone, Debug, Default)]
pub struct PdfConversion {
    /// One raster per page, in page order.
    pub images: Vec<RgbImage>,
    /// Number of pages rendered.
    pub page_count: usize,
    /// Diagnostic message; empty on full success.
    pub message: String,
}

impl PdfConversion {
    /// A conversion that produced nothing, with the reason.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            images: Vec::new(),
            page_count: 0,
            message: message.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Converts PDF bytes into page rasters.
pub trait PdfRasterizer {
    fn rasterize(&self, pdf: &[u8]) -> PdfConversion;
}

/// Rasterizer used when the binary was built without PDF support.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableRasterizer;

impl PdfRasterizer for UnavailableRasterizer {
    fn rasterize(&self, pdf: &[u8]) -> PdfConversion {
        if pdf.is_empty() {
            return PdfConversion::failed("empty PDF input");
        }
        PdfConversion::failed("PDF rasterization unavailable: built without the `pdfium` feature")
    }
}

/// Returns the best rasterizer available in this build.
///
/// With the `pdfium` feature this binds the pdfium library, falling back to
/// [`UnavailableRasterizer`] (with a warning) when the library cannot be loaded.
pub fn default_rasterizer() -> Box<dyn PdfRasterizer> {
    #[cfg(feature = "pdfium")]
    {
        match pdfium::PdfiumRasterizer::new(DEFAULT_PDF_DPI) {
            Ok(rasterizer) => return Box::new(rasterizer),
            Err(message) => tracing::warn!("pdfium unavailable, PDFs will be skipped: {}", message),
        }
    }
    Box::new(UnavailableRasterizer)
}

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use pdfium_render::prelude::*;

    use super::{PdfConversion, PdfRasterizer};

    /// Renders pages with pdfium at a fixed DPI.
    pub struct PdfiumRasterizer {
        pdfium: Pdfium,
        dpi: f32,
    }

    impl PdfiumRasterizer {
        /// Binds pdfium from the working directory or the system library path.
        pub fn new(dpi: f32) -> Result<Self, String> {
            let bindings =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                    .or_else(|_| Pdfium::bind_to_system_library())
                    .map_err(|err| format!("failed to bind pdfium library: {err}"))?;
            Ok(Self {
                pdfium: Pdfium::new(bindings),
                dpi,
            })
        }
    }

    impl PdfRasterizer for PdfiumRasterizer {
        fn rasterize(&self, pdf: &[u8]) -> PdfConversion {
            if pdf.is_empty() {
                return PdfConversion::failed("empty PDF input");
            }

            let document = match self.pdfium.load_pdf_from_byte_slice(pdf, None) {
                Ok(document) => document,
                Err(err) => return PdfConversion::failed(format!("failed to load PDF: {err}")),
            };

            // PDF points are 72 per inch
            let config = PdfRenderConfig::new().scale_page_by_factor(self.dpi / 72.0);
            let mut conversion = PdfConversion::default();
            let total = document.pages().len();

            for (index, page) in document.pages().iter().enumerate() {
                match page.render_with_config(&config) {
                    Ok(bitmap) => conversion.images.push(bitmap.as_image().to_rgb8()),
                    Err(err) => {
                        conversion.message =
                            format!("failed to render page {}/{}: {err}", index + 1, total);
                        break;
                    }
                }
            }

            conversion.page_count = conversion.images.len();
            conversion
        }
    }
}
