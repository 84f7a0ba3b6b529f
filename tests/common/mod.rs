#![allow(dead_code)]

use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use rowmark::raster::{ImageCodec, StandardCodec};

/// Ring centres used by the five-circle page.
pub const FIVE_CENTRES: [(f32, f32); 5] = [
    (100.0, 100.0),
    (300.0, 100.0),
    (500.0, 100.0),
    (200.0, 350.0),
    (400.0, 350.0),
];

/// A white page with black rings (pen strokes) between `inner` and `outer`.
pub fn ring_page(w: u32, h: u32, centres: &[(f32, f32)], outer: f32, inner: f32) -> RgbImage {
    let mut img = RgbImage::from_pixel(w, h, Rgb([255, 255, 255]));
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        for &(cx, cy) in centres {
            let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            if d >= inner && d <= outer {
                *pixel = Rgb([0, 0, 0]);
            }
        }
    }
    img
}

/// 600×600 page with five separated circles of radius ~25.
pub fn five_circle_page() -> RgbImage {
    ring_page(600, 600, &FIVE_CENTRES, 27.0, 24.0)
}

/// Ring centres on the tall page, where the widest band expects r≈83.
pub const TALL_CENTRES: [(f32, f32); 3] = [(250.0, 600.0), (700.0, 1500.0), (400.0, 2600.0)];

/// 1000×3300 page (letter height at 300 DPI) with three circles of radius ~80.
pub fn tall_page() -> RgbImage {
    ring_page(1000, 3300, &TALL_CENTRES, 82.0, 78.0)
}

pub fn blank_page() -> RgbImage {
    RgbImage::from_pixel(600, 600, Rgb([255, 255, 255]))
}

pub fn png_bytes(image: &RgbImage) -> Vec<u8> {
    StandardCodec::png().encode(image).expect("encode png")
}

pub fn write_png(path: &Path, image: &RgbImage) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, png_bytes(image)).expect("write png file");
}

pub fn write_index(path: &Path, entries: &[&str]) {
    let mut text = entries.join("\n");
    text.push('\n');
    fs::write(path, text).expect("write index file");
}
