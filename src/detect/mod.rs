//! Adaptive circle detection.
//!
//! Hand-drawn circles vary in size from sheet to sheet, so the detector
//! searches a table of radius bands, each expressed relative to the image
//! height. Bands are tried from the last table entry to the first (widest
//! tolerance first) and the search stops at the first band that yields a
//! plausible number of circles. The search is an explicit state machine,
//! [`RadiusSearch`], so the stopping rule lives in one place.

pub mod hough;

use std::path::Path;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

pub use hough::{CircleTransform, DetectedCircle, HoughGradient, HoughParams};

use crate::error::RowmarkError;
use crate::raster::ImageCodec;

/// Expected circle size: radius ≈ `ratio × image height`, ± `tolerance` pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RadiusBand {
    pub ratio: f64,
    pub tolerance: u32,
}

impl RadiusBand {
    pub const fn new(ratio: f64, tolerance: u32) -> Self {
        Self { ratio, tolerance }
    }
}

/// Concrete radius bounds and inset derived from a band for one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RadiusBounds {
    pub min_radius: u32,
    pub max_radius: u32,
    /// Pixels trimmed off each detected radius before masking.
    pub inset: u32,
}

/// Detector configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Radius bands in insertion order; searched from last to first.
    pub bands: Vec<RadiusBand>,
    /// Hard lower bound for the minimum radius.
    pub min_radius_floor: u32,
    /// Hard lower bound for the maximum radius.
    pub max_radius_floor: u32,
    /// Fraction of the maximum radius used as the inset.
    pub inset_fraction: f64,
    /// A band is accepted when it yields between 1 and this many circles.
    pub max_circles: usize,
    /// Upper Canny threshold passed to the transform.
    pub edge_threshold: f32,
    /// Accumulator threshold passed to the transform.
    pub accumulator_threshold: u32,
    /// Gaussian sigma of the preprocessing blur.
    pub blur_sigma: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            bands: vec![
                RadiusBand::new(0.010, 4),
                RadiusBand::new(0.012, 6),
                RadiusBand::new(0.015, 8),
                RadiusBand::new(0.018, 10),
                RadiusBand::new(0.020, 15),
                RadiusBand::new(0.025, 20),
            ],
            min_radius_floor: 15,
            max_radius_floor: 30,
            inset_fraction: 0.1,
            max_circles: 100,
            edge_threshold: 50.0,
            accumulator_threshold: 50,
            blur_sigma: 1.0,
        }
    }
}

impl DetectorConfig {
    /// Loads a configuration from a YAML file; missing fields take defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, RowmarkError> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|source| RowmarkError::DetectorConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Radius bounds of `band` for an image `height` pixels tall.
    pub fn bounds_for(&self, band: &RadiusBand, height: u32) -> RadiusBounds {
        let expected = (band.ratio * height as f64).ceil() as i64;
        let tolerance = band.tolerance as i64;
        let min_radius = (expected - tolerance).max(self.min_radius_floor as i64) as u32;
        let max_radius = (expected + tolerance).max(self.max_radius_floor as i64) as u32;
        let inset = (self.inset_fraction * max_radius as f64).floor() as u32;
        RadiusBounds {
            min_radius,
            max_radius,
            inset,
        }
    }

    /// True if `count` circles is a usable detection.
    #[inline]
    pub fn accepts(&self, count: usize) -> bool {
        count > 0 && count <= self.max_circles
    }
}

/// How a radius search ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// A band produced an acceptable number of circles.
    Accepted,
    /// Every band was tried; the last result is returned as-is.
    Exhausted,
}

/// Circles found in one raster plus the inset to apply when cropping them.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub circles: Vec<DetectedCircle>,
    pub inset: u32,
    pub outcome: SearchOutcome,
}

impl Detection {
    /// True when the circles can be used downstream.
    pub fn is_usable(&self, config: &DetectorConfig) -> bool {
        self.outcome == SearchOutcome::Accepted && config.accepts(self.circles.len())
    }
}

/// State of the band search: how many bands are left and the last result.
#[derive(Debug)]
pub struct RadiusSearch<'a> {
    config: &'a DetectorConfig,
    remaining: usize,
    last: Option<(Vec<DetectedCircle>, u32)>,
}

impl<'a> RadiusSearch<'a> {
    pub fn new(config: &'a DetectorConfig) -> Self {
        Self {
            config,
            remaining: config.bands.len(),
            last: None,
        }
    }

    /// The band to try next, or `None` once the search has stopped.
    pub fn pending_band(&self) -> Option<&'a RadiusBand> {
        if self.is_accepted() || self.remaining == 0 {
            return None;
        }
        self.config.bands.get(self.remaining - 1)
    }

    /// Records the result of the pending band and advances.
    pub fn record(&mut self, circles: Vec<DetectedCircle>, inset: u32) {
        self.remaining = self.remaining.saturating_sub(1);
        self.last = Some((circles, inset));
    }

    fn is_accepted(&self) -> bool {
        self.last
            .as_ref()
            .is_some_and(|(circles, _)| self.config.accepts(circles.len()))
    }

    /// Ends the search, returning the last recorded result.
    pub fn finish(self) -> Detection {
        let outcome = if self.is_accepted() {
            SearchOutcome::Accepted
        } else {
            SearchOutcome::Exhausted
        };
        let (circles, inset) = self.last.unwrap_or_default();
        Detection {
            circles,
            inset,
            outcome,
        }
    }
}

/// Runs the radius-band search over a raster with an injected transform.
#[derive(Clone, Debug, Default)]
pub struct AdaptiveCircleDetector<T = HoughGradient> {
    config: DetectorConfig,
    transform: T,
}

impl AdaptiveCircleDetector<HoughGradient> {
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_transform(config, HoughGradient::default())
    }
}

impl<T: CircleTransform> AdaptiveCircleDetector<T> {
    pub fn with_transform(config: DetectorConfig, transform: T) -> Self {
        Self { config, transform }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Grayscale conversion followed by a light gaussian blur.
    pub fn preprocess(&self, image: &RgbImage) -> GrayImage {
        let gray = image::imageops::grayscale(image);
        if self.config.blur_sigma > 0.0 {
            imageproc::filter::gaussian_blur_f32(&gray, self.config.blur_sigma)
        } else {
            gray
        }
    }

    /// Detects circles in an RGB raster.
    pub fn detect(&self, image: &RgbImage) -> Detection {
        let gray = self.preprocess(image);
        let height = gray.height();
        let mut search = RadiusSearch::new(&self.config);

        while let Some(band) = search.pending_band() {
            let bounds = self.config.bounds_for(band, height);
            let params = HoughParams {
                min_distance: bounds.min_radius as f32,
                edge_threshold: self.config.edge_threshold,
                accumulator_threshold: self.config.accumulator_threshold,
                min_radius: bounds.min_radius,
                max_radius: bounds.max_radius,
            };
            let circles = self.transform.find_circles(&gray, &params);
            tracing::debug!(
                "band ratio={} tolerance={}: radius {}..={} found {} circle(s)",
                band.ratio,
                band.tolerance,
                bounds.min_radius,
                bounds.max_radius,
                circles.len()
            );
            search.record(circles, bounds.inset);
        }

        search.finish()
    }

    /// Decodes `bytes` with `codec` and detects circles in the result.
    ///
    /// # Errors
    /// Returns [`RowmarkError::Decode`] if the bytes are not a decodable image.
    pub fn detect_bytes(
        &self,
        codec: &dyn ImageCodec,
        bytes: &[u8],
    ) -> Result<(RgbImage, Detection), RowmarkError> {
        let image = codec.decode(bytes)?;
        let detection = self.detect(&image);
        Ok((image, detection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Returns a scripted number of circles per call and records the params.
    struct Scripted {
        counts: RefCell<Vec<usize>>,
        seen: RefCell<Vec<HoughParams>>,
    }

    impl Scripted {
        fn new(counts: &[usize]) -> Self {
            Self {
                counts: RefCell::new(counts.iter().rev().copied().collect()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl CircleTransform for Scripted {
        fn find_circles(&self, _gray: &GrayImage, params: &HoughParams) -> Vec<DetectedCircle> {
            self.seen.borrow_mut().push(*params);
            let n = self.counts.borrow_mut().pop().unwrap_or(0);
            (0..n)
                .map(|i| DetectedCircle {
                    x: i as f32,
                    y: 0.0,
                    radius: 20.0,
                    votes: 60,
                })
                .collect()
        }
    }

    fn blank(height: u32) -> RgbImage {
        RgbImage::from_pixel(50, height, image::Rgb([255, 255, 255]))
    }

    #[test]
    fn bounds_apply_floors() {
        let config = DetectorConfig::default();
        let bounds = config.bounds_for(&RadiusBand::new(0.01, 4), 1000);
        assert_eq!(
            bounds,
            RadiusBounds {
                min_radius: 15,
                max_radius: 30,
                inset: 3
            }
        );
    }

    #[test]
    fn bounds_scale_with_height() {
        let config = DetectorConfig::default();
        // ceil(0.025 * 3300) = 83
        let bounds = config.bounds_for(&RadiusBand::new(0.025, 20), 3300);
        assert_eq!(bounds.min_radius, 63);
        assert_eq!(bounds.max_radius, 103);
        assert_eq!(bounds.inset, 10);
    }

    #[test]
    fn search_visits_bands_last_to_first() {
        let config = DetectorConfig::default();
        let transform = Scripted::new(&[0, 0, 0, 0, 0, 0]);
        let detector = AdaptiveCircleDetector::with_transform(config.clone(), transform);

        let detection = detector.detect(&blank(3300));
        assert_eq!(detection.outcome, SearchOutcome::Exhausted);
        assert!(detection.circles.is_empty());

        let seen = detector.transform.seen.borrow();
        assert_eq!(seen.len(), 6);
        let first = config.bounds_for(&config.bands[5], 3300);
        let last = config.bounds_for(&config.bands[0], 3300);
        assert_eq!(seen[0].max_radius, first.max_radius);
        assert_eq!(seen[5].max_radius, last.max_radius);
        assert_eq!(seen[0].min_distance, first.min_radius as f32);
        assert_eq!(detection.inset, last.inset);
    }

    #[test]
    fn search_stops_at_first_acceptable_band() {
        let transform = Scripted::new(&[0, 250, 7, 3]);
        let detector = AdaptiveCircleDetector::with_transform(DetectorConfig::default(), transform);

        let detection = detector.detect(&blank(1000));
        assert_eq!(detection.outcome, SearchOutcome::Accepted);
        assert_eq!(detection.circles.len(), 7);
        assert_eq!(detector.transform.seen.borrow().len(), 3);
    }

    #[test]
    fn exactly_max_circles_is_accepted() {
        let transform = Scripted::new(&[100]);
        let detector = AdaptiveCircleDetector::with_transform(DetectorConfig::default(), transform);
        let detection = detector.detect(&blank(1000));
        assert_eq!(detection.outcome, SearchOutcome::Accepted);
        assert_eq!(detection.circles.len(), 100);
    }

    #[test]
    fn excessive_count_after_exhaustion_is_returned_but_unusable() {
        let config = DetectorConfig {
            bands: vec![RadiusBand::new(0.01, 4), RadiusBand::new(0.02, 4)],
            ..Default::default()
        };
        let transform = Scripted::new(&[0, 101]);
        let detector = AdaptiveCircleDetector::with_transform(config.clone(), transform);

        let detection = detector.detect(&blank(1000));
        assert_eq!(detection.outcome, SearchOutcome::Exhausted);
        assert_eq!(detection.circles.len(), 101);
        assert!(!detection.is_usable(&config));
    }

    #[test]
    fn empty_band_table_yields_empty_detection() {
        let config = DetectorConfig {
            bands: Vec::new(),
            ..Default::default()
        };
        let detector = AdaptiveCircleDetector::new(config);
        let detection = detector.detect(&blank(100));
        assert!(detection.circles.is_empty());
        assert_eq!(detection.inset, 0);
        assert_eq!(detection.outcome, SearchOutcome::Exhausted);
    }

    #[test]
    fn partial_yaml_config_keeps_defaults() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("detector.yaml");
        std::fs::write(
            &path,
            "bands:\n  - ratio: 0.02\n    tolerance: 5\nmax_circles: 40\n",
        )
        .expect("write yaml");

        let config = DetectorConfig::from_yaml_file(&path).expect("parse yaml");
        assert_eq!(config.bands, vec![RadiusBand::new(0.02, 5)]);
        assert_eq!(config.max_circles, 40);
        assert_eq!(config.min_radius_floor, 15);
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("detector.yaml");
        std::fs::write(&path, "bands: [not, a, band]\n").expect("write yaml");

        let err = DetectorConfig::from_yaml_file(&path).unwrap_err();
        assert!(matches!(err, RowmarkError::DetectorConfigParse { .. }));
    }
}
