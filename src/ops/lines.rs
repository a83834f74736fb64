// ============================================================================
// LINE SEGMENTS - hit testing and the built-in horizontal scan
// ============================================================================

use egui::{Pos2, pos2};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A straight segment in image space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl LineSegment {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn start(&self) -> Pos2 {
        pos2(self.x1, self.y1)
    }

    pub fn end(&self) -> Pos2 {
        pos2(self.x2, self.y2)
    }

    pub fn length(&self) -> f32 {
        self.start().distance(self.end())
    }

    pub fn distance_to(&self, p: Pos2) -> f32 {
        distance_to_segment(p, self.start(), self.end())
    }
}

/// Perpendicular distance from `p` to the segment `a`-`b`, with the
/// projection clamped to the endpoints.
pub fn distance_to_segment(p: Pos2, a: Pos2, b: Pos2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Index of the segment closest to `p`, if any lies strictly within `threshold`.
pub fn nearest_segment(segments: &[LineSegment], p: Pos2, threshold: f32) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, seg) in segments.iter().enumerate() {
        let d = seg.distance_to(p);
        if d < threshold && best.is_none_or(|(_, bd)| d < bd) {
            best = Some((idx, d));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Source of candidate lines for the line-toggle tool. The built-in
/// [`HorizontalRunScan`] is a fallback; a dedicated detector can be plugged
/// in behind this trait.
pub trait LineDetector {
    fn detect(&self, buffer: &RgbaImage) -> Result<Vec<LineSegment>>;
}

/// Finds horizontal runs of opaque pixels. Runs stacked on consecutive rows
/// with (nearly) the same extent are merged into one segment on the middle
/// row, so a 3px-thick rule yields one line rather than three.
///
/// Only horizontal lines are found.
#[derive(Clone, Copy, Debug)]
pub struct HorizontalRunScan {
    /// Shortest run (pixels) that counts as a line.
    pub min_length: u32,
    /// Allowed drift of run endpoints between stacked rows.
    pub merge_tolerance: u32,
}

impl Default for HorizontalRunScan {
    fn default() -> Self {
        Self {
            min_length: 20,
            merge_tolerance: 2,
        }
    }
}

struct Band {
    x0: u32,
    x1: u32,
    y_start: u32,
    y_end: u32,
}

impl Band {
    fn into_segment(self) -> LineSegment {
        let y = (self.y_start + self.y_end) as f32 * 0.5;
        LineSegment::new(self.x0 as f32, y, self.x1 as f32, y)
    }
}

impl HorizontalRunScan {
    pub fn new(min_length: u32) -> Self {
        Self {
            min_length: min_length.max(1),
            ..Default::default()
        }
    }

    fn row_runs(&self, img: &RgbaImage, y: u32) -> Vec<(u32, u32)> {
        let mut runs = Vec::new();
        let mut start: Option<u32> = None;
        for x in 0..img.width() {
            let on = img.get_pixel(x, y)[3] > 0;
            match (on, start) {
                (true, None) => start = Some(x),
                (false, Some(s)) => {
                    if x - s >= self.min_length {
                        runs.push((s, x - 1));
                    }
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start
            && img.width() - s >= self.min_length
        {
            runs.push((s, img.width() - 1));
        }
        runs
    }

    pub fn scan(&self, img: &RgbaImage) -> Vec<LineSegment> {
        let tol = self.merge_tolerance;
        let mut open: Vec<Band> = Vec::new();
        let mut done: Vec<LineSegment> = Vec::new();

        for y in 0..img.height() {
            let runs = self.row_runs(img, y);
            let mut next_open: Vec<Band> = Vec::with_capacity(runs.len());
            for (x0, x1) in runs {
                let hit = open.iter().position(|b| {
                    b.x0.abs_diff(x0) <= tol && b.x1.abs_diff(x1) <= tol
                });
                match hit {
                    Some(i) => {
                        let mut band = open.swap_remove(i);
                        band.x0 = band.x0.min(x0);
                        band.x1 = band.x1.max(x1);
                        band.y_end = y;
                        next_open.push(band);
                    }
                    None => next_open.push(Band {
                        x0,
                        x1,
                        y_start: y,
                        y_end: y,
                    }),
                }
            }
            // Bands without a continuation on this row are finished.
            done.extend(open.drain(..).map(Band::into_segment));
            open = next_open;
        }
        done.extend(open.into_iter().map(Band::into_segment));

        done.sort_by(|a, b| a.y1.total_cmp(&b.y1).then(a.x1.total_cmp(&b.x1)));
        done
    }
}

impl LineDetector for HorizontalRunScan {
    fn detect(&self, buffer: &RgbaImage) -> Result<Vec<LineSegment>> {
        Ok(self.scan(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgba;

    fn draw_hline(img: &mut RgbaImage, y: u32, x0: u32, x1: u32) {
        for x in x0..=x1 {
            img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
        }
    }

    #[test]
    fn distance_clamps_to_endpoints() {
        let a = pos2(0.0, 0.0);
        let b = pos2(10.0, 0.0);
        assert_abs_diff_eq!(distance_to_segment(pos2(5.0, 3.0), a, b), 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(distance_to_segment(pos2(13.0, 4.0), a, b), 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(distance_to_segment(pos2(-3.0, 0.0), a, b), 3.0, epsilon = 1e-6);
        // Degenerate segment behaves like a point.
        assert_abs_diff_eq!(distance_to_segment(pos2(3.0, 4.0), a, a), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn nearest_respects_threshold() {
        let segs = [
            LineSegment::new(0.0, 0.0, 100.0, 0.0),
            LineSegment::new(0.0, 10.0, 100.0, 10.0),
        ];
        assert_eq!(nearest_segment(&segs, pos2(50.0, 7.0), 15.0), Some(1));
        assert_eq!(nearest_segment(&segs, pos2(50.0, 2.0), 15.0), Some(0));
        assert_eq!(nearest_segment(&segs, pos2(50.0, 40.0), 15.0), None);
        assert_eq!(nearest_segment(&[], pos2(0.0, 0.0), 15.0), None);
    }

    #[test]
    fn scan_finds_long_runs_only() {
        let mut img = RgbaImage::new(100, 20);
        draw_hline(&mut img, 5, 10, 60);
        draw_hline(&mut img, 12, 0, 5); // too short
        let segs = HorizontalRunScan::new(20).scan(&img);
        assert_eq!(segs, vec![LineSegment::new(10.0, 5.0, 60.0, 5.0)]);
    }

    #[test]
    fn scan_merges_thick_lines() {
        let mut img = RgbaImage::new(100, 20);
        for y in 8..=10 {
            draw_hline(&mut img, y, 20, 80);
        }
        draw_hline(&mut img, 15, 30, 99);
        let segs = HorizontalRunScan::new(20).scan(&img);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0], LineSegment::new(20.0, 9.0, 80.0, 9.0));
        assert_eq!(segs[1], LineSegment::new(30.0, 15.0, 99.0, 15.0));
    }

    #[test]
    fn scan_ignores_vertical_strokes() {
        let mut img = RgbaImage::new(30, 30);
        for y in 0..30 {
            img.put_pixel(12, y, Rgba([0, 255, 0, 255]));
        }
        assert!(HorizontalRunScan::default().scan(&img).is_empty());
    }
}
