use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::settings::EditorSettings;

/// Which way round a drawing is inked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    /// Dark strokes on a light sheet (scans, printed plans).
    DarkOnLight,
    /// Light strokes on a dark sheet (blueprints, inverted exports).
    LightOnDark,
}

/// Thresholds for the polarity vote and the per-pixel split.
#[derive(Clone, Copy, Debug)]
pub struct Classifier {
    /// All channels above this count as near-white.
    pub white_threshold: u8,
    /// All channels below this count as near-black.
    pub black_threshold: u8,
    /// Grid spacing (pixels) of the polarity sample.
    pub sample_step: u32,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            white_threshold: 240,
            black_threshold: 15,
            sample_step: 10,
        }
    }
}

impl From<&EditorSettings> for Classifier {
    fn from(s: &EditorSettings) -> Self {
        Self {
            white_threshold: s.white_threshold,
            black_threshold: s.black_threshold,
            sample_step: s.sample_step.max(1),
        }
    }
}

impl Classifier {
    fn is_near_white(&self, p: &[u8]) -> bool {
        p[0] > self.white_threshold && p[1] > self.white_threshold && p[2] > self.white_threshold
    }

    fn is_near_black(&self, p: &[u8]) -> bool {
        p[0] < self.black_threshold && p[1] < self.black_threshold && p[2] < self.black_threshold
    }

    /// Majority vote over a sparse grid. Ties (including a sample with no
    /// extreme pixels at all) resolve to dark-on-light, the common case.
    pub fn detect_polarity(&self, img: &RgbaImage) -> Polarity {
        let step = self.sample_step.max(1) as usize;
        let mut white = 0usize;
        let mut black = 0usize;
        for y in (0..img.height()).step_by(step) {
            for x in (0..img.width()).step_by(step) {
                let p = img.get_pixel(x, y);
                if p[3] == 0 {
                    continue;
                }
                if self.is_near_white(&p.0) {
                    white += 1;
                } else if self.is_near_black(&p.0) {
                    black += 1;
                }
            }
        }
        if black > white {
            Polarity::LightOnDark
        } else {
            Polarity::DarkOnLight
        }
    }

    /// True when the pixel belongs to the sheet rather than the line-work.
    pub fn is_background(&self, p: &[u8], polarity: Polarity) -> bool {
        if p[3] == 0 {
            return true;
        }
        match polarity {
            Polarity::DarkOnLight => self.is_near_white(p),
            Polarity::LightOnDark => self.is_near_black(p),
        }
    }

    /// Full pass: background becomes transparent, line-work becomes `hue`
    /// at full alpha. Rows are processed in parallel.
    pub fn recolor(&self, src: &RgbaImage, hue: Rgba<u8>) -> (RgbaImage, Polarity) {
        let polarity = self.detect_polarity(src);
        let (w, h) = src.dimensions();
        let mut out = RgbaImage::new(w, h);
        let row_bytes = w as usize * 4;
        let ink = [hue[0], hue[1], hue[2], 255];

        out.par_chunks_mut(row_bytes)
            .zip(src.par_chunks(row_bytes))
            .for_each(|(dst_row, src_row)| {
                for (d, s) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                    if !self.is_background(s, polarity) {
                        d.copy_from_slice(&ink);
                    }
                }
            });

        (out, polarity)
    }
}
