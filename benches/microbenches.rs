//! Criterion microbenches for rowmark's per-page hot paths.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - Reading a task's slice of a large index (read_range)
//! - Adaptive circle detection on a synthetic scan (AdaptiveCircleDetector::detect),
//!   including a full 300 DPI letter page covered in pen strokes
//! - Cropping and mosaic composition (export_crops, compose_mosaic)

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use std::io::Cursor;

use image::{Rgb, RgbImage};
use rowmark::crop::export_crops;
use rowmark::detect::{AdaptiveCircleDetector, DetectorConfig};
use rowmark::mosaic::{compose_mosaic, MosaicOptions};
use rowmark::partition::{read_range, WorkRange};

/// A white page with black pen rings at a 3×2 grid of centres.
fn ring_page() -> RgbImage {
    let centres: Vec<(f32, f32)> = [100.0f32, 300.0, 500.0]
        .iter()
        .flat_map(|&x| [150.0f32, 450.0].map(move |y| (x, y)))
        .collect();
    let mut img = RgbImage::from_pixel(600, 600, Rgb([255, 255, 255]));
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        for &(cx, cy) in &centres {
            let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            if (24.0..=27.0).contains(&d) {
                *pixel = Rgb([0, 0, 0]);
            }
        }
    }
    img
}

/// A 2550×3300 (letter at 300 DPI) page: text-like strokes plus five r≈80 rings.
fn scan_page() -> RgbImage {
    let centres = [
        (500.0f32, 600.0f32),
        (1300.0, 600.0),
        (2000.0, 1200.0),
        (800.0, 2400.0),
        (1800.0, 2900.0),
    ];
    let mut img = RgbImage::from_pixel(2550, 3300, Rgb([255, 255, 255]));

    // Lines of "words": short strokes with uneven lengths and gaps
    for line in 0..100u32 {
        let y = 40 + line * 32;
        let mut x = 60 + (line * 37) % 50;
        let mut word = line;
        while x < 2450 {
            let len = 10 + (word * 7) % 30;
            let clear = centres.iter().all(|&(cx, cy)| {
                let (dx, dy) = (x as f32 + len as f32 / 2.0 - cx, y as f32 - cy);
                (dx * dx + dy * dy).sqrt() > 110.0
            });
            if clear {
                for py in y..(y + 3).min(3300) {
                    for px in x..(x + len).min(2550) {
                        img.put_pixel(px, py, Rgb([0, 0, 0]));
                    }
                }
            }
            x += len + 8 + (word * 13) % 20;
            word += 1;
        }
    }

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        for &(cx, cy) in &centres {
            let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            if (78.0..=82.0).contains(&d) {
                *pixel = Rgb([0, 0, 0]);
            }
        }
    }
    img
}

/// Benchmark reading the last task's slice of a 100k-entry index.
fn bench_index_range(c: &mut Criterion) {
    let index: String = (0..100_000)
        .map(|i| format!("county_{:03}/plat_{:06}.pdf\n", i % 97, i))
        .collect();
    let range = WorkRange::for_task(9, 10, 100_000).unwrap();

    let mut group = c.benchmark_group("partition");
    group.throughput(Throughput::Bytes(index.len() as u64));
    group.bench_function("read_range_last_task", |b| {
        b.iter(|| {
            let entries = read_range(Cursor::new(black_box(index.as_bytes())), range).unwrap();
            black_box(entries)
        })
    });
    group.finish();
}

/// Benchmark the full band search on a 600×600 page.
fn bench_detect(c: &mut Criterion) {
    let page = ring_page();
    let detector = AdaptiveCircleDetector::new(DetectorConfig::default());

    let mut group = c.benchmark_group("detect");
    group.sample_size(20);
    group.bench_function("six_rings_600px", |b| {
        b.iter(|| black_box(detector.detect(black_box(&page))))
    });
    group.finish();

    let scan = scan_page();
    let mut group = c.benchmark_group("detect_scan");
    group.sample_size(10);
    group.bench_function("letter_300dpi_with_strokes", |b| {
        b.iter(|| black_box(detector.detect(black_box(&scan))))
    });
    group.finish();
}

/// Benchmark cropping a detection and composing its mosaic.
fn bench_crop_and_mosaic(c: &mut Criterion) {
    let page = ring_page();
    let detection = AdaptiveCircleDetector::new(DetectorConfig::default()).detect(&page);
    let options = MosaicOptions::default();

    let mut group = c.benchmark_group("mosaic");
    group.bench_function("export_and_compose", |b| {
        b.iter(|| {
            let crops = export_crops(black_box(&page), black_box(&detection));
            black_box(compose_mosaic(&crops, &options))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_index_range, bench_detect, bench_crop_and_mosaic);
criterion_main!(benches);
