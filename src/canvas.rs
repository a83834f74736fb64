use std::fmt;
use std::sync::Arc;

use egui::{Pos2, Rect, pos2};
use image::{GrayImage, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::error::{EditorError, Result};
use crate::ops::lines::distance_to_segment;
use crate::ops::transform::{Projection, scale_to_fit};

/// Smallest user scale accepted by the transform controls.
pub const MIN_SCALE: f32 = 0.01;
/// Largest user scale accepted by the transform controls.
pub const MAX_SCALE: f32 = 20.0;
/// Widest stroke thickening, in image pixels.
pub const MAX_THICKNESS: u32 = 10;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// LAYER IDENTITY
// ============================================================================

/// One of the two compared drawings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerId {
    First,
    Second,
}

impl LayerId {
    pub const ALL: [LayerId; 2] = [LayerId::First, LayerId::Second];

    /// 0-based slot in per-layer arrays.
    pub fn index(self) -> usize {
        match self {
            LayerId::First => 0,
            LayerId::Second => 1,
        }
    }

    /// 1-based number shown to users.
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer {}", self.number())
    }
}

// ============================================================================
// LAYER TRANSFORM
// ============================================================================

/// User-controlled placement of a layer on the display surface.
/// `x`/`y` are display pixels; `scale` multiplies the shared fit factor and
/// `scale_x`/`scale_y` stretch width and height on top of it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerTransform {
    pub x: f32,
    pub y: f32,
    pub rotation_degrees: f32,
    pub scale: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub opacity: f32,
    /// Display-only stroke thickening (1 = as drawn). Pixels are untouched.
    pub thickness: u32,
}

impl Default for LayerTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            rotation_degrees: 0.0,
            scale: 1.0,
            scale_x: 1.0,
            scale_y: 1.0,
            opacity: 1.0,
            thickness: 1,
        }
    }
}

impl LayerTransform {
    /// Clamp every field into its valid range. Non-finite values fall back to
    /// the identity value for that field.
    pub fn clamped(self) -> Self {
        let finite_or = |v: f32, fallback: f32| if v.is_finite() { v } else { fallback };
        Self {
            x: finite_or(self.x, 0.0),
            y: finite_or(self.y, 0.0),
            rotation_degrees: finite_or(self.rotation_degrees, 0.0) % 360.0,
            scale: finite_or(self.scale, 1.0).clamp(MIN_SCALE, MAX_SCALE),
            scale_x: finite_or(self.scale_x, 1.0).clamp(MIN_SCALE, MAX_SCALE),
            scale_y: finite_or(self.scale_y, 1.0).clamp(MIN_SCALE, MAX_SCALE),
            opacity: finite_or(self.opacity, 1.0).clamp(0.0, 1.0),
            thickness: self.thickness.clamp(1, MAX_THICKNESS),
        }
    }
}

// ============================================================================
// SOURCE IMAGE
// ============================================================================

/// Original raster for a layer. Loaded once, never mutated.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pixels: Arc<RgbaImage>,
}

impl SourceImage {
    pub fn new(layer: LayerId, pixels: RgbaImage) -> Result<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(EditorError::EmptyImage { layer });
        }
        Ok(Self {
            pixels: Arc::new(pixels),
        })
    }

    /// Build from an already-rasterized RGBA8 byte buffer.
    pub fn from_raw(layer: LayerId, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(EditorError::LoadFailure {
                layer,
                reason: format!(
                    "expected {} bytes for {}x{} RGBA, got {}",
                    expected,
                    width,
                    height,
                    data.len()
                ),
            });
        }
        let img = RgbaImage::from_raw(width, height, data).ok_or_else(|| EditorError::LoadFailure {
            layer,
            reason: "pixel buffer rejected".to_string(),
        })?;
        Self::new(layer, img)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

// ============================================================================
// RASTER BUFFER - the editable surface of a layer
// ============================================================================

/// Mutable raster exclusively owned by one layer. Tools only reach it through
/// bounded-region erase calls; history only through copy-out snapshots.
#[derive(Clone, Debug)]
pub struct RasterBuffer {
    pixels: RgbaImage,
}

impl RasterBuffer {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Read-only view for rendering and line detection.
    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.width() && y < self.height() {
            Some(*self.pixels.get_pixel(x, y))
        } else {
            None
        }
    }

    /// Deep copy of the whole buffer.
    pub fn snapshot(&self) -> RgbaImage {
        self.pixels.clone()
    }

    /// Replace the pixels with a snapshot taken from this buffer earlier.
    /// A snapshot of the wrong size is ignored.
    pub fn restore(&mut self, snapshot: RgbaImage) -> bool {
        if snapshot.dimensions() != self.pixels.dimensions() {
            log::warn!(
                "snapshot {:?} does not match buffer {:?}; restore skipped",
                snapshot.dimensions(),
                self.pixels.dimensions()
            );
            return false;
        }
        self.pixels = snapshot;
        true
    }

    /// Clamp an image-space float rect to integer pixel bounds `[min, max)`.
    fn clamp_region(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Option<(u32, u32, u32, u32)> {
        let w = self.width() as f32;
        let h = self.height() as f32;
        let x0 = min_x.max(0.0).min(w) as u32;
        let y0 = min_y.max(0.0).min(h) as u32;
        let x1 = max_x.max(0.0).min(w) as u32;
        let y1 = max_y.max(0.0).min(h) as u32;
        if x0 >= x1 || y0 >= y1 {
            None
        } else {
            Some((x0, y0, x1, y1))
        }
    }

    /// Clear every pixel whose coordinate lies within `radius` of the segment
    /// `a`-`b`. With `a == b` this is a filled circle. Returns the number of
    /// pixels that changed.
    pub fn erase_capsule(&mut self, a: Pos2, b: Pos2, radius: f32) -> usize {
        if !(radius.is_finite() && radius >= 0.0) {
            return 0;
        }
        let Some((x0, y0, x1, y1)) = self.clamp_region(
            a.x.min(b.x) - radius,
            a.y.min(b.y) - radius,
            (a.x.max(b.x) + radius).floor() + 1.0,
            (a.y.max(b.y) + radius).floor() + 1.0,
        ) else {
            return 0;
        };

        let mut changed = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                let p = pos2(x as f32, y as f32);
                if distance_to_segment(p, a, b) <= radius {
                    let px = self.pixels.get_pixel_mut(x, y);
                    if *px != TRANSPARENT {
                        *px = TRANSPARENT;
                        changed += 1;
                    }
                }
            }
        }
        changed
    }

    pub fn erase_circle(&mut self, center: Pos2, radius: f32) -> usize {
        self.erase_capsule(center, center, radius)
    }

    /// Clear the axis-aligned rectangle spanned by two corners in either
    /// order. Corners are rounded to the pixel grid; a zero-area rectangle
    /// touches nothing.
    pub fn erase_rect(&mut self, corner_a: Pos2, corner_b: Pos2) -> usize {
        let r = Rect::from_two_pos(corner_a, corner_b);
        let Some((x0, y0, x1, y1)) =
            self.clamp_region(r.min.x.round(), r.min.y.round(), r.max.x.round(), r.max.y.round())
        else {
            return 0;
        };
        let mut changed = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                let px = self.pixels.get_pixel_mut(x, y);
                if *px != TRANSPARENT {
                    *px = TRANSPARENT;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Clear every pixel whose mask value is non-zero. The mask must match the
    /// buffer size exactly.
    pub fn erase_mask(&mut self, mask: &GrayImage) -> Result<usize> {
        if mask.dimensions() != self.pixels.dimensions() {
            return Err(EditorError::MaskSize {
                expected: self.pixels.dimensions(),
                actual: mask.dimensions(),
            });
        }
        let row_bytes = self.width() as usize * 4;
        let mask_w = mask.width() as usize;
        let mask_raw = mask.as_raw();
        let changed: usize = self
            .pixels
            .par_chunks_mut(row_bytes)
            .enumerate()
            .map(|(y, row)| {
                let mask_row = &mask_raw[y * mask_w..(y + 1) * mask_w];
                let mut n = 0;
                for (px, &m) in row.chunks_exact_mut(4).zip(mask_row) {
                    if m > 0 && px.iter().any(|&c| c != 0) {
                        px.fill(0);
                        n += 1;
                    }
                }
                n
            })
            .sum();
        Ok(changed)
    }
}

// ============================================================================
// LAYER
// ============================================================================

pub struct Layer {
    pub id: LayerId,
    pub visible: bool,
    pub transform: LayerTransform,
    source: SourceImage,
    /// Produced once by the recolor pass; `None` until the session is prepared.
    recolored: Option<RasterBuffer>,
}

impl Layer {
    pub fn new(id: LayerId, source: SourceImage) -> Self {
        Self {
            id,
            visible: true,
            transform: LayerTransform::default(),
            source,
            recolored: None,
        }
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    pub fn buffer(&self) -> Option<&RasterBuffer> {
        self.recolored.as_ref()
    }

    pub fn buffer_mut(&mut self) -> Option<&mut RasterBuffer> {
        self.recolored.as_mut()
    }

    pub fn set_buffer(&mut self, buffer: RasterBuffer) {
        self.recolored = Some(buffer);
    }

    /// Whatever the compositor should draw: the edited buffer if present,
    /// the untouched source otherwise.
    pub fn display_image(&self) -> &RgbaImage {
        match &self.recolored {
            Some(buf) => buf.image(),
            None => self.source.image(),
        }
    }

    /// Identity transform, fully opaque, visible.
    pub fn reset(&mut self) {
        self.transform = LayerTransform::default();
        self.visible = true;
    }
}

// ============================================================================
// LAYER ORDER
// ============================================================================

/// Paint order, bottom to top. Always a permutation of both layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerOrder([LayerId; 2]);

impl Default for LayerOrder {
    fn default() -> Self {
        Self([LayerId::First, LayerId::Second])
    }
}

impl LayerOrder {
    pub fn swap(&mut self) {
        self.0.swap(0, 1);
    }

    pub fn bottom_to_top(&self) -> [LayerId; 2] {
        self.0
    }

    pub fn top(&self) -> LayerId {
        self.0[1]
    }
}

// ============================================================================
// CANVAS STATE
// ============================================================================

/// Both layers plus everything needed to place them on the display surface.
pub struct CanvasState {
    layers: [Layer; 2],
    pub order: LayerOrder,
    active: LayerId,
    surface: (u32, u32),
}

impl CanvasState {
    pub fn new(first: SourceImage, second: SourceImage, surface: (u32, u32)) -> Self {
        Self {
            layers: [Layer::new(LayerId::First, first), Layer::new(LayerId::Second, second)],
            order: LayerOrder::default(),
            active: LayerId::First,
            surface: (surface.0.max(1), surface.1.max(1)),
        }
    }

    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id.index()]
    }

    pub fn layer_mut(&mut self, id: LayerId) -> &mut Layer {
        &mut self.layers[id.index()]
    }

    pub fn active(&self) -> LayerId {
        self.active
    }

    pub fn set_active(&mut self, id: LayerId) {
        self.active = id;
    }

    pub fn active_layer_mut(&mut self) -> &mut Layer {
        let id = self.active;
        self.layer_mut(id)
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.surface
    }

    /// True once every layer carries its recolored buffer.
    pub fn is_prepared(&self) -> bool {
        self.layers.iter().all(|l| l.buffer().is_some())
    }

    pub fn scale_to_fit(&self) -> f32 {
        let dims = [self.layers[0].dimensions(), self.layers[1].dimensions()];
        scale_to_fit(&dims, self.surface)
    }

    pub fn projection(&self, id: LayerId) -> Projection {
        let layer = self.layer(id);
        Projection::new(&layer.transform, layer.dimensions(), self.surface, self.scale_to_fit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(w: u32, h: u32) -> RasterBuffer {
        RasterBuffer::new(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    fn alpha(buf: &RasterBuffer, x: u32, y: u32) -> u8 {
        buf.pixel(x, y).unwrap()[3]
    }

    #[test]
    fn raw_source_checks_length() {
        let err = SourceImage::from_raw(LayerId::Second, 2, 2, vec![0; 15]).unwrap_err();
        assert!(matches!(err, EditorError::LoadFailure { layer: LayerId::Second, .. }));
        assert!(SourceImage::from_raw(LayerId::First, 2, 2, vec![0; 16]).is_ok());
        let err = SourceImage::new(LayerId::First, RgbaImage::new(0, 5)).unwrap_err();
        assert!(matches!(err, EditorError::EmptyImage { .. }));
    }

    #[test]
    fn circle_erase_is_exact() {
        let mut buf = filled(64, 64);
        let center = pos2(30.0, 30.0);
        buf.erase_circle(center, 10.0);
        for y in 0..64 {
            for x in 0..64 {
                let d = ((x as f32 - 30.0).powi(2) + (y as f32 - 30.0).powi(2)).sqrt();
                let expected = if d <= 10.0 { 0 } else { 255 };
                assert_eq!(alpha(&buf, x, y), expected, "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn erase_clamps_at_edges() {
        let mut buf = filled(10, 10);
        let n = buf.erase_circle(pos2(-2.0, -2.0), 4.0);
        assert!(n > 0);
        assert_eq!(alpha(&buf, 0, 0), 0);
        assert_eq!(alpha(&buf, 9, 9), 255);
        assert_eq!(buf.erase_circle(pos2(500.0, 500.0), 3.0), 0);
        assert_eq!(buf.erase_rect(pos2(-50.0, -50.0), pos2(-10.0, 400.0)), 0);
    }

    #[test]
    fn rect_erase_normalizes_corners() {
        let mut a = filled(20, 20);
        let mut b = filled(20, 20);
        a.erase_rect(pos2(2.0, 3.0), pos2(8.0, 9.0));
        b.erase_rect(pos2(8.0, 9.0), pos2(2.0, 3.0));
        assert_eq!(a.image(), b.image());
        assert_eq!(alpha(&a, 2, 3), 0);
        assert_eq!(alpha(&a, 7, 8), 0);
        assert_eq!(alpha(&a, 8, 8), 255);
        assert_eq!(alpha(&a, 1, 3), 255);
    }

    #[test]
    fn zero_area_rect_changes_nothing() {
        let mut buf = filled(20, 20);
        let before = buf.snapshot();
        assert_eq!(buf.erase_rect(pos2(5.0, 5.0), pos2(5.0, 15.0)), 0);
        assert_eq!(buf.erase_rect(pos2(5.0, 5.0), pos2(5.0, 5.0)), 0);
        assert_eq!(buf.image(), &before);
    }

    #[test]
    fn mask_erase_requires_matching_size() {
        let mut buf = filled(4, 4);
        let bad = GrayImage::new(3, 4);
        assert!(matches!(buf.erase_mask(&bad), Err(EditorError::MaskSize { .. })));

        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(1, 2, image::Luma([255]));
        assert_eq!(buf.erase_mask(&mask).unwrap(), 1);
        assert_eq!(alpha(&buf, 1, 2), 0);
        assert_eq!(alpha(&buf, 2, 1), 255);
    }

    #[test]
    fn snapshot_is_a_deep_copy() {
        let mut buf = filled(8, 8);
        let snap = buf.snapshot();
        buf.erase_circle(pos2(4.0, 4.0), 2.0);
        assert_eq!(snap.get_pixel(4, 4)[3], 255);
        assert!(buf.restore(snap));
        assert_eq!(alpha(&buf, 4, 4), 255);
        assert!(!buf.restore(RgbaImage::new(2, 2)));
    }

    #[test]
    fn transform_clamps_degenerate_values() {
        let t = LayerTransform {
            scale: 0.0,
            opacity: 3.0,
            x: f32::NAN,
            scale_y: f32::INFINITY,
            thickness: 0,
            ..Default::default()
        }
        .clamped();
        assert_eq!(t.scale, MIN_SCALE);
        assert_eq!(t.opacity, 1.0);
        assert_eq!(t.x, 0.0);
        assert_eq!(t.scale_y, 1.0);
        assert_eq!(t.thickness, 1);
        let wide = LayerTransform { thickness: 40, ..Default::default() }.clamped();
        assert_eq!(wide.thickness, MAX_THICKNESS);
    }

    #[test]
    fn order_swap_is_an_involution() {
        let mut order = LayerOrder::default();
        order.swap();
        assert_eq!(order.bottom_to_top(), [LayerId::Second, LayerId::First]);
        assert_eq!(order.top(), LayerId::First);
        order.swap();
        assert_eq!(order, LayerOrder::default());
    }
}
