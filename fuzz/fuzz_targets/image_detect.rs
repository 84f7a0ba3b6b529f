//! Fuzz target for decoding and scanning untrusted image bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rowmark::crop::export_crops;
use rowmark::detect::{AdaptiveCircleDetector, DetectorConfig};
use rowmark::raster::{ImageCodec, StandardCodec};

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let Ok(image) = StandardCodec::png().decode(data) else {
        return;
    };
    // Decoded dimensions are attacker controlled; keep the scan bounded
    if u64::from(image.width()) * u64::from(image.height()) > 4_000_000 {
        return;
    }
    let detector = AdaptiveCircleDetector::new(DetectorConfig::default());
    let detection = detector.detect(&image);
    let _ = export_crops(&image, &detection);
});
