//! Gradient Hough transform for circles.
//!
//! Edge pixels (Canny) vote along their gradient direction, in both senses,
//! at every distance in `[min_radius, max_radius]`. Circle centres collect
//! votes from all around their rim. Peaks above the accumulator threshold are
//! visited strongest first, suppressed if they fall within `min_distance` of
//! an accepted centre, and kept only if some radius in range is supported by
//! enough edge pixels.

use std::f32::consts::PI;

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// A circle found in a raster, in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedCircle {
    /// Centre x (pixels).
    pub x: f32,
    /// Centre y (pixels).
    pub y: f32,
    /// Radius (pixels).
    pub radius: f32,
    /// Accumulator support at the centre.
    pub votes: u32,
}

/// Parameters for one run of a circle transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HoughParams {
    /// Minimum distance between accepted centres.
    pub min_distance: f32,
    /// Upper Canny threshold; the lower one is half of it.
    pub edge_threshold: f32,
    /// Minimum accumulator support for a centre candidate.
    pub accumulator_threshold: u32,
    pub min_radius: u32,
    pub max_radius: u32,
}

/// Finds circles in a preprocessed grayscale image.
///
/// Implementations must be deterministic: the same image and parameters
/// yield the same circles in the same order.
pub trait CircleTransform {
    fn find_circles(&self, gray: &GrayImage, params: &HoughParams) -> Vec<DetectedCircle>;
}

/// Default [`CircleTransform`] built on `imageproc` edges and gradients.
#[derive(Clone, Copy, Debug)]
pub struct HoughGradient {
    /// Fraction of the circumference that must be covered by edge pixels
    /// for a radius to be accepted.
    pub min_rim_support: f32,
}

impl Default for HoughGradient {
    fn default() -> Self {
        Self {
            min_rim_support: 0.35,
        }
    }
}

impl CircleTransform for HoughGradient {
    fn find_circles(&self, gray: &GrayImage, params: &HoughParams) -> Vec<DetectedCircle> {
        let (w, h) = gray.dimensions();
        if w < 3 || h < 3 || params.max_radius == 0 || params.max_radius < params.min_radius {
            return Vec::new();
        }

        let edges = imageproc::edges::canny(gray, params.edge_threshold * 0.5, params.edge_threshold);
        let gx = imageproc::gradients::horizontal_sobel(gray);
        let gy = imageproc::gradients::vertical_sobel(gray);

        let stride = w as usize;
        let mut accum = vec![0u32; stride * h as usize];
        let mut edge_points: Vec<(f32, f32)> = Vec::new();
        let (wf, hf) = (w as f32, h as f32);

        for (x, y, pixel) in edges.enumerate_pixels() {
            if pixel[0] == 0 {
                continue;
            }
            let gxv = gx.get_pixel(x, y)[0] as f32;
            let gyv = gy.get_pixel(x, y)[0] as f32;
            let mag = (gxv * gxv + gyv * gyv).sqrt();
            if mag < 1e-3 {
                continue;
            }

            let (xf, yf) = (x as f32, y as f32);
            edge_points.push((xf, yf));
            let (dx, dy) = (gxv / mag, gyv / mag);

            for sign in [1.0f32, -1.0] {
                for r in params.min_radius..=params.max_radius {
                    let cx = (xf + sign * dx * r as f32).round();
                    let cy = (yf + sign * dy * r as f32).round();
                    if cx < 0.0 || cy < 0.0 || cx >= wf || cy >= hf {
                        break;
                    }
                    accum[cy as usize * stride + cx as usize] += 1;
                }
            }
        }

        let support = box_sum_3x3(&accum, w as usize, h as usize);
        let candidates = local_maxima(&support, w as usize, h as usize, params.accumulator_threshold);

        let grid = EdgeGrid::new(&edge_points, w, h, params.max_radius + 2);
        let min_dist_sq = params.min_distance * params.min_distance;
        let mut circles: Vec<DetectedCircle> = Vec::new();
        for (idx, votes) in candidates {
            let cx = (idx % stride) as f32;
            let cy = (idx / stride) as f32;

            let too_close = circles.iter().any(|c| {
                let (ddx, ddy) = (c.x - cx, c.y - cy);
                ddx * ddx + ddy * ddy < min_dist_sq
            });
            if too_close {
                continue;
            }

            if let Some(radius) = self.estimate_radius(grid.near(cx, cy), cx, cy, params) {
                circles.push(DetectedCircle {
                    x: cx,
                    y: cy,
                    radius,
                    votes,
                });
            }
        }

        circles
    }
}

impl HoughGradient {
    /// Picks the radius whose ±1px shell holds the most edge pixels.
    fn estimate_radius<'a>(
        &self,
        edge_points: impl Iterator<Item = &'a (f32, f32)>,
        cx: f32,
        cy: f32,
        params: &HoughParams,
    ) -> Option<f32> {
        let min_r = params.min_radius as usize;
        let max_r = params.max_radius as usize;
        // One spare bin on each side so the shell window never goes out of range
        let mut histogram = vec![0u32; max_r + 3];

        for &(x, y) in edge_points {
            let d = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt().round() as usize;
            if d + 1 >= min_r && d <= max_r + 1 {
                histogram[d] += 1;
            }
        }

        let mut best: Option<(usize, u32)> = None;
        for r in min_r.max(1)..=max_r {
            let shell = histogram[r - 1] + histogram[r] + histogram[r + 1];
            match best {
                Some((_, count)) if count >= shell => {}
                _ => best = Some((r, shell)),
            }
        }

        let (radius, count) = best?;
        let circumference = 2.0 * PI * radius as f32;
        (count as f32 >= self.min_rim_support * circumference).then_some(radius as f32)
    }
}

/// Edge pixels bucketed into square cells of side `reach`.
///
/// Every point closer than `reach` to a position lies in the 3×3 block of
/// cells around it, so radius histograms only visit nearby edges.
struct EdgeGrid {
    cell: usize,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<(f32, f32)>>,
}

impl EdgeGrid {
    fn new(points: &[(f32, f32)], width: u32, height: u32, reach: u32) -> Self {
        let cell = reach.max(1) as usize;
        let cols = (width as usize).div_ceil(cell).max(1);
        let rows = (height as usize).div_ceil(cell).max(1);
        let mut cells = vec![Vec::new(); cols * rows];
        for &(x, y) in points {
            let col = (x as usize / cell).min(cols - 1);
            let row = (y as usize / cell).min(rows - 1);
            cells[row * cols + col].push((x, y));
        }
        Self {
            cell,
            cols,
            rows,
            cells,
        }
    }

    /// Points in the cell holding `(x, y)` and its 8 neighbours.
    fn near(&self, x: f32, y: f32) -> impl Iterator<Item = &(f32, f32)> + '_ {
        let col = (x.max(0.0) as usize / self.cell).min(self.cols - 1);
        let row = (y.max(0.0) as usize / self.cell).min(self.rows - 1);
        let (c0, c1) = (col.saturating_sub(1), (col + 1).min(self.cols - 1));
        let (r0, r1) = (row.saturating_sub(1), (row + 1).min(self.rows - 1));
        (r0..=r1).flat_map(move |r| {
            (c0..=c1).flat_map(move |c| self.cells[r * self.cols + c].iter())
        })
    }
}

/// Sums every cell with its 8 neighbours (out-of-bounds cells count as zero).
fn box_sum_3x3(accum: &[u32], w: usize, h: usize) -> Vec<u32> {
    let mut rows = vec![0u32; w * h];
    for y in 0..h {
        let row = &accum[y * w..(y + 1) * w];
        for x in 0..w {
            let left = if x > 0 { row[x - 1] } else { 0 };
            let right = if x + 1 < w { row[x + 1] } else { 0 };
            rows[y * w + x] = left + row[x] + right;
        }
    }

    let mut out = vec![0u32; w * h];
    for y in 0..h {
        for x in 0..w {
            let up = if y > 0 { rows[(y - 1) * w + x] } else { 0 };
            let down = if y + 1 < h { rows[(y + 1) * w + x] } else { 0 };
            out[y * w + x] = up + rows[y * w + x] + down;
        }
    }
    out
}

/// Returns `(index, value)` of 4-neighbour local maxima strictly above
/// `threshold`, sorted by value (highest first) then index.
fn local_maxima(values: &[u32], w: usize, h: usize, threshold: u32) -> Vec<(usize, u32)> {
    let mut peaks = Vec::new();
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let idx = y * w + x;
            let v = values[idx];
            if v <= threshold {
                continue;
            }
            // Asymmetric comparison keeps exactly one cell of a flat plateau edge
            if v > values[idx - 1]
                && v >= values[idx + 1]
                && v > values[idx - w]
                && v >= values[idx + w]
            {
                peaks.push((idx, v));
            }
        }
    }
    peaks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    peaks
}

/// Fuzz-only entrypoint for the accumulator peak search.
#[cfg(feature = "fuzzing")]
pub fn fuzz_peak_search(votes: &[u8], width: usize, threshold: u32) -> Vec<(usize, u32)> {
    if width == 0 {
        return Vec::new();
    }
    let height = votes.len() / width;
    let accum: Vec<u32> = votes[..width * height].iter().map(|&v| u32::from(v)).collect();
    let support = box_sum_3x3(&accum, width, height);
    local_maxima(&support, width, height, threshold)
}
