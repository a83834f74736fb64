// ============================================================================
// TRANSFORM MATH - image space <-> display space for one layer
// ============================================================================
//
// Forward (image -> display):
//   q = R(rotation) * ((p - image_center) * (sx, sy))
//       + surface_center + (x, y)
//   sx = scale * scale_x * scale_to_fit, sy = scale * scale_y * scale_to_fit
// Inverse undoes each step in reverse order: un-rotate first, then divide per
// axis. A non-uniform stretch does not commute with the rotation.

use egui::{Pos2, Rect, Vec2, pos2, vec2};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::canvas::LayerTransform;

/// Sampling used when a layer buffer is drawn onto the display surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Crisp pixels; line-work stays one color.
    #[default]
    Nearest,
    Bilinear,
}

/// Uniform factor that makes the larger of the images fit the display surface.
///
/// Uses the widest width and the tallest height across all images so both
/// layers share one factor. Returns 1.0 when no image has any area.
pub fn scale_to_fit(images: &[(u32, u32)], surface: (u32, u32)) -> f32 {
    let max_w = images.iter().map(|(w, _)| *w).max().unwrap_or(0);
    let max_h = images.iter().map(|(_, h)| *h).max().unwrap_or(0);
    if max_w == 0 || max_h == 0 {
        return 1.0;
    }
    let sx = surface.0 as f32 / max_w as f32;
    let sy = surface.1 as f32 / max_h as f32;
    sx.min(sy)
}

/// Precomputed mapping for one layer between its pixel space and the
/// display surface. Cheap to build; rebuild whenever the transform changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    /// Display-space position of the image center.
    origin: Pos2,
    /// Image center in image space.
    center: Vec2,
    /// Per-axis `scale * scale_{x,y} * scale_to_fit`, applied before rotation.
    scale: Vec2,
    sin: f32,
    cos: f32,
}

impl Projection {
    pub fn new(
        transform: &LayerTransform,
        image_size: (u32, u32),
        surface_size: (u32, u32),
        scale_to_fit: f32,
    ) -> Self {
        let (sin, cos) = transform.rotation_degrees.to_radians().sin_cos();
        Self {
            origin: pos2(
                surface_size.0 as f32 * 0.5 + transform.x,
                surface_size.1 as f32 * 0.5 + transform.y,
            ),
            center: vec2(image_size.0 as f32 * 0.5, image_size.1 as f32 * 0.5),
            scale: vec2(transform.scale_x, transform.scale_y) * (transform.scale * scale_to_fit),
            sin,
            cos,
        }
    }

    /// Image space -> display space.
    pub fn forward(&self, p: Pos2) -> Pos2 {
        let d = (p.to_vec2() - self.center) * self.scale;
        let r = vec2(
            d.x * self.cos - d.y * self.sin,
            d.x * self.sin + d.y * self.cos,
        );
        self.origin + r
    }

    /// Display space -> image space.
    pub fn inverse(&self, q: Pos2) -> Pos2 {
        let d = q - self.origin;
        let r = vec2(
            d.x * self.cos + d.y * self.sin,
            -d.x * self.sin + d.y * self.cos,
        );
        (r / self.scale + self.center).to_pos2()
    }

    /// Combined scale factor (display pixels per image pixel). With a
    /// stretched layer this is the geometric mean of the two axes.
    pub fn total_scale(&self) -> f32 {
        (self.scale.x * self.scale.y).sqrt()
    }

    /// Convert a display-space length (brush radius, hit distance) to image space.
    pub fn to_image_len(&self, display_len: f32) -> f32 {
        display_len / self.total_scale()
    }

    /// Axis-aligned display-space bounds of an image-space rectangle.
    pub fn forward_bounds(&self, rect: Rect) -> Rect {
        let corners = [
            rect.left_top(),
            rect.right_top(),
            rect.right_bottom(),
            rect.left_bottom(),
        ];
        let mut out = Rect::NOTHING;
        for c in corners {
            out.extend_with(self.forward(c));
        }
        out
    }
}

/// Nearest-neighbour lookup; anything outside the image is transparent.
pub fn nearest_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let sx = x.floor();
    let sy = y.floor();
    if sx < 0.0 || sy < 0.0 || sx >= img.width() as f32 || sy >= img.height() as f32 {
        return Rgba([0, 0, 0, 0]);
    }
    *img.get_pixel(sx as u32, sy as u32)
}

/// Bilinear interpolation sampling from an RgbaImage. `(x, y)` addresses the
/// continuous plane where pixel `(i, j)` covers `[i, i+1) x [j, j+1)`.
pub fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x = x - 0.5;
    let y = y - 0.5;
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i32 || sy >= img.height() as i32 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

pub fn sample(img: &RgbaImage, p: Pos2, interp: Interpolation) -> Rgba<u8> {
    match interp {
        Interpolation::Nearest => nearest_sample(img, p.x, p.y),
        Interpolation::Bilinear => bilinear_sample(img, p.x, p.y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn transform(x: f32, y: f32, rot: f32, scale: f32) -> LayerTransform {
        LayerTransform {
            x,
            y,
            rotation_degrees: rot,
            scale,
            ..Default::default()
        }
    }

    fn stretched(rot: f32, scale_x: f32, scale_y: f32) -> LayerTransform {
        LayerTransform {
            scale_x,
            scale_y,
            ..transform(15.0, -8.0, rot, 1.3)
        }
    }

    #[test]
    fn fit_uses_largest_extent() {
        let s = scale_to_fit(&[(1000, 800), (2000, 500)], (1200, 800));
        // widest 2000 -> 0.6, tallest 800 -> 1.0
        assert_abs_diff_eq!(s, 0.6, epsilon = 1e-6);
        assert_eq!(scale_to_fit(&[], (10, 10)), 1.0);
    }

    #[test]
    fn identity_centers_image_on_surface() {
        let p = Projection::new(&LayerTransform::default(), (100, 50), (200, 100), 1.0);
        let q = p.forward(pos2(50.0, 25.0));
        assert_abs_diff_eq!(q.x, 100.0, epsilon = 1e-4);
        assert_abs_diff_eq!(q.y, 50.0, epsilon = 1e-4);
        let corner = p.forward(pos2(0.0, 0.0));
        assert_abs_diff_eq!(corner.x, 50.0, epsilon = 1e-4);
        assert_abs_diff_eq!(corner.y, 25.0, epsilon = 1e-4);
    }

    #[test]
    fn rotation_is_clockwise_in_y_down_space() {
        let p = Projection::new(&transform(0.0, 0.0, 90.0, 1.0), (100, 100), (100, 100), 1.0);
        // Point right of center ends up below center.
        let q = p.forward(pos2(60.0, 50.0));
        assert_abs_diff_eq!(q.x, 50.0, epsilon = 1e-3);
        assert_abs_diff_eq!(q.y, 60.0, epsilon = 1e-3);
    }

    #[test]
    fn inverse_undoes_forward() {
        let cases = [
            transform(0.0, 0.0, 0.0, 1.0),
            transform(50.0, -30.0, 10.0, 1.0),
            transform(-120.5, 33.0, -245.0, 0.37),
            transform(7.0, 900.0, 359.0, 4.2),
            stretched(0.0, 2.0, 0.5),
            stretched(33.0, 0.25, 3.0),
            stretched(-271.0, 1.7, 1.1),
        ];
        let points = [pos2(0.0, 0.0), pos2(999.0, 799.0), pos2(123.4, 567.8), pos2(-40.0, 2000.0)];
        for t in &cases {
            let p = Projection::new(t, (1000, 800), (1200, 800), 0.8);
            for &pt in &points {
                let back = p.inverse(p.forward(pt));
                assert_abs_diff_eq!(back.x, pt.x, epsilon = 1e-2);
                assert_abs_diff_eq!(back.y, pt.y, epsilon = 1e-2);
                let disp = p.forward(p.inverse(pt));
                assert_abs_diff_eq!(disp.x, pt.x, epsilon = 1e-2);
                assert_abs_diff_eq!(disp.y, pt.y, epsilon = 1e-2);
            }
        }
    }

    #[test]
    fn stretch_applies_before_rotation() {
        let t = LayerTransform {
            scale_x: 2.0,
            ..transform(0.0, 0.0, 90.0, 1.0)
        };
        let p = Projection::new(&t, (100, 100), (100, 100), 1.0);
        // 10 px right of center is stretched to 20, then turned to point down.
        let q = p.forward(pos2(60.0, 50.0));
        assert_abs_diff_eq!(q.x, 50.0, epsilon = 1e-3);
        assert_abs_diff_eq!(q.y, 70.0, epsilon = 1e-3);
        // The vertical axis is unstretched: 10 px below center lands 10 px left.
        let q = p.forward(pos2(50.0, 60.0));
        assert_abs_diff_eq!(q.x, 40.0, epsilon = 1e-3);
        assert_abs_diff_eq!(q.y, 50.0, epsilon = 1e-3);
        assert_abs_diff_eq!(p.total_scale(), 2.0f32.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn lengths_scale_with_total_factor() {
        let p = Projection::new(&transform(0.0, 0.0, 30.0, 2.0), (10, 10), (10, 10), 0.5);
        assert_abs_diff_eq!(p.total_scale(), 1.0, epsilon = 1e-6);
        let p = Projection::new(&transform(0.0, 0.0, 0.0, 4.0), (10, 10), (10, 10), 0.5);
        assert_abs_diff_eq!(p.to_image_len(20.0), 10.0, epsilon = 1e-6);
    }

    #[test]
    fn samplers_return_transparent_outside() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        assert_eq!(nearest_sample(&img, -0.1, 1.0), Rgba([0, 0, 0, 0]));
        assert_eq!(nearest_sample(&img, 4.0, 1.0), Rgba([0, 0, 0, 0]));
        assert_eq!(nearest_sample(&img, 3.9, 3.9), Rgba([9, 9, 9, 255]));
        assert_eq!(bilinear_sample(&img, 2.0, 2.0), Rgba([9, 9, 9, 255]));
    }
}
