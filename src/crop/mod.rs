//! Circle masking and cropping.
//!
//! Each detected circle is shrunk by the detection inset (to drop the drawn
//! ring itself), masked so everything outside the shrunk circle is white, and
//! cut out with a fixed safety margin. Crop origins are clamped into the image
//! rather than rejected, so a circle found right at an edge can legitimately
//! produce a narrow or even zero-area crop.

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use serde::Serialize;

use crate::detect::{DetectedCircle, Detection};
use crate::error::RowmarkError;
use crate::raster::ImageCodec;

/// Pixels of context kept around the masked circle on every side.
pub const CROP_MARGIN: u32 = 20;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Where a crop was taken from in its source raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CropBox {
    /// Clamped left edge.
    pub x: u32,
    /// Clamped top edge.
    pub y: u32,
    /// Requested side length (`2 × radius + 2 × margin`).
    pub side: u32,
    /// Width actually available inside the image.
    pub width: u32,
    /// Height actually available inside the image.
    pub height: u32,
}

impl CropBox {
    /// Builds the crop box around a circle centre.
    ///
    /// The origin is `centre - radius - margin`, clamped to `[0, image_width]`
    /// and `[0, image_height]`. Only the origin is clamped; the extent is then
    /// clipped to what remains of the image.
    pub fn around(cx: i64, cy: i64, radius: u32, image_width: u32, image_height: u32) -> Self {
        let reach = radius as i64 + CROP_MARGIN as i64;
        let x = (cx - reach).clamp(0, image_width as i64) as u32;
        let y = (cy - reach).clamp(0, image_height as i64) as u32;
        let side = 2 * radius + 2 * CROP_MARGIN;
        Self {
            x,
            y,
            side,
            width: side.min(image_width - x),
            height: side.min(image_height - y),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One masked circle cut out of a source raster.
#[derive(Clone, Debug, PartialEq)]
pub struct CircleCrop {
    /// Position in detection order.
    pub ordinal: usize,
    pub bounds: CropBox,
    pub image: RgbImage,
}

impl CircleCrop {
    /// Wraps an already-cropped raster, e.g. one read back from disk.
    pub fn from_image(ordinal: usize, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            ordinal,
            bounds: CropBox {
                x: 0,
                y: 0,
                side: width.max(height),
                width,
                height,
            },
            image,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Masks and crops a single circle.
pub fn crop_circle(image: &RgbImage, circle: &DetectedCircle, inset: u32, ordinal: usize) -> CircleCrop {
    let (width, height) = image.dimensions();
    let radius = (circle.radius.round() as i64 - inset as i64).max(0) as u32;
    let cx = circle.x.round() as i64;
    let cy = circle.y.round() as i64;
    let bounds = CropBox::around(cx, cy, radius, width, height);

    let mut crop =
        image::imageops::crop_imm(image, bounds.x, bounds.y, bounds.width, bounds.height)
            .to_image();

    // Mask canvas covers the crop window; the circle is drawn in crop coordinates
    let mut mask = GrayImage::new(bounds.width, bounds.height);
    draw_filled_circle_mut(
        &mut mask,
        ((cx - bounds.x as i64) as i32, (cy - bounds.y as i64) as i32),
        radius as i32,
        Luma([255u8]),
    );
    for (x, y, pixel) in crop.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] == 0 {
            *pixel = WHITE;
        }
    }

    CircleCrop {
        ordinal,
        bounds,
        image: crop,
    }
}

/// Turns every circle of a detection into a crop, in detection order.
pub fn export_crops(image: &RgbImage, detection: &Detection) -> Vec<CircleCrop> {
    detection
        .circles
        .iter()
        .enumerate()
        .map(|(ordinal, circle)| crop_circle(image, circle, detection.inset, ordinal))
        .collect()
}

/// Writes each crop as `{basename}_{ordinal}.{ext}` under `dir`.
///
/// Zero-area crops cannot be encoded and are skipped. Returns the written paths.
pub fn save_crops(
    dir: &Path,
    basename: &str,
    crops: &[CircleCrop],
    codec: &dyn ImageCodec,
) -> Result<Vec<PathBuf>, RowmarkError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(crops.len());
    for crop in crops {
        if crop.bounds.is_empty() {
            tracing::debug!("skipping zero-area crop {} of {}", crop.ordinal, basename);
            continue;
        }
        let path = dir.join(format!("{}_{}.{}", basename, crop.ordinal, codec.extension()));
        std::fs::write(&path, codec.encode(&crop.image)?)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SearchOutcome;
    use crate::raster::StandardCodec;

    fn circle(x: f32, y: f32, radius: f32) -> DetectedCircle {
        DetectedCircle {
            x,
            y,
            radius,
            votes: 100,
        }
    }

    fn gray_page(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([40, 40, 40]))
    }

    #[test]
    fn interior_crop_has_full_side() {
        let image = gray_page(400, 400);
        let crop = crop_circle(&image, &circle(200.0, 200.0, 33.0), 3, 0);

        assert_eq!(crop.bounds.x, 200 - 30 - 20);
        assert_eq!(crop.bounds.y, 200 - 30 - 20);
        assert_eq!(crop.dimensions(), (100, 100));
    }

    #[test]
    fn mask_whitens_outside_and_keeps_inside() {
        let image = gray_page(400, 400);
        let crop = crop_circle(&image, &circle(200.0, 200.0, 33.0), 3, 0);

        assert_eq!(*crop.image.get_pixel(50, 50), Rgb([40, 40, 40]));
        assert_eq!(*crop.image.get_pixel(0, 0), WHITE);
        assert_eq!(*crop.image.get_pixel(99, 50), WHITE);
        // Just outside the inset radius of 30
        assert_eq!(*crop.image.get_pixel(50 + 32, 50), WHITE);
    }

    #[test]
    fn origin_is_clamped_at_top_left() {
        let image = gray_page(300, 300);
        let crop = crop_circle(&image, &circle(10.0, 5.0, 25.0), 2, 0);

        assert_eq!(crop.bounds.x, 0);
        assert_eq!(crop.bounds.y, 0);
        assert_eq!(crop.bounds.side, 2 * 23 + 40);
        assert_eq!(crop.dimensions(), (86, 86));
    }

    #[test]
    fn extent_is_clipped_at_bottom_right() {
        let image = gray_page(300, 200);
        let crop = crop_circle(&image, &circle(290.0, 195.0, 20.0), 0, 0);

        assert_eq!(crop.bounds.x, 250);
        assert_eq!(crop.bounds.y, 155);
        assert_eq!(crop.dimensions(), (50, 45));
    }

    #[test]
    fn circle_beyond_the_edge_gives_zero_area_crop() {
        let image = gray_page(100, 100);
        let crop = crop_circle(&image, &circle(200.0, 50.0, 20.0), 0, 0);

        assert_eq!(crop.bounds.x, 100);
        assert!(crop.bounds.is_empty());
        assert_eq!(crop.dimensions().0, 0);
    }

    #[test]
    fn inset_larger_than_radius_saturates_at_zero() {
        let image = gray_page(100, 100);
        let crop = crop_circle(&image, &circle(50.0, 50.0, 2.0), 10, 0);
        assert_eq!(crop.bounds.side, 40);
    }

    #[test]
    fn export_keeps_detection_order() {
        let image = gray_page(500, 200);
        let detection = Detection {
            circles: vec![circle(400.0, 100.0, 30.0), circle(100.0, 100.0, 30.0)],
            inset: 3,
            outcome: SearchOutcome::Accepted,
        };

        let crops = export_crops(&image, &detection);
        assert_eq!(crops.len(), 2);
        assert_eq!(crops[0].ordinal, 0);
        assert!(crops[0].bounds.x > crops[1].bounds.x);
    }

    #[test]
    fn no_circles_no_crops() {
        let image = gray_page(50, 50);
        let detection = Detection {
            circles: Vec::new(),
            inset: 0,
            outcome: SearchOutcome::Exhausted,
        };
        assert!(export_crops(&image, &detection).is_empty());
    }

    #[test]
    fn save_crops_names_files_by_ordinal() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let out = temp.path().join("data").join("nested");
        let image = gray_page(300, 300);
        let crops = vec![
            crop_circle(&image, &circle(80.0, 80.0, 25.0), 2, 0),
            crop_circle(&image, &circle(400.0, 80.0, 25.0), 2, 1),
            crop_circle(&image, &circle(200.0, 200.0, 25.0), 2, 2),
        ];

        let written = save_crops(&out, "plat", &crops, &StandardCodec::jpeg()).expect("save");
        assert_eq!(written.len(), 2);
        assert!(out.join("plat_0.jpg").is_file());
        assert!(!out.join("plat_1.jpg").exists());
        assert!(out.join("plat_2.jpg").is_file());
    }
}
