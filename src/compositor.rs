// ============================================================================
// COMPOSITOR - both layers plus tool overlays onto the fixed display surface
// ============================================================================

use egui::{Pos2, Rect, pos2, vec2};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::distance_transform::Norm;
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};
use imageproc::morphology::dilate;
use rayon::prelude::*;

use crate::canvas::{CanvasState, Layer, LayerId};
use crate::components::tools::{EditTool, ToolState};
use crate::ops::transform::{Interpolation, Projection, sample};
use crate::settings::EditorSettings;

/// Source-over blend of `top` onto `base`, with `opacity` scaling the top alpha.
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>, opacity: f32) -> Rgba<u8> {
    // Fast path: fully transparent top pixel - nothing to blend
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    // Fast path: full opacity, fully opaque top pixel - just overwrite
    if opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let b = base[c] as f32 / 255.0;
        let t = top[c] as f32 / 255.0;
        let v = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Grow strokes for display: every channel is dilated with a square kernel
/// of side `2 * (thickness / 2) + 1`, so ink spreads over transparent pixels.
pub fn thicken(image: &RgbaImage, thickness: u32) -> RgbaImage {
    let k = (thickness / 2).min(u8::MAX as u32) as u8;
    if k == 0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();
    let planes: Vec<GrayImage> = (0..4usize)
        .into_par_iter()
        .map(|c| {
            let plane = GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y)[c]]));
            dilate(&plane, Norm::LInf, k)
        })
        .collect();
    RgbaImage::from_fn(w, h, |x, y| Rgba([0, 1, 2, 3].map(|c| planes[c].get_pixel(x, y)[0])))
}

/// Everything needed to draw one layer, resolved once per frame.
struct LayerPass<'a> {
    image: &'a RgbaImage,
    projection: Projection,
    opacity: f32,
    /// Display-space pixel bounds `[x0, x1) x [y0, y1)` the layer can cover.
    bounds: (u32, u32, u32, u32),
}

impl LayerPass<'_> {
    fn covers(&self, x: u32, y: u32) -> bool {
        let (x0, y0, x1, y1) = self.bounds;
        x >= x0 && x < x1 && y >= y0 && y < y1
    }
}

/// Clamp a display-space rect to integer surface bounds, padded by a pixel so
/// rounding at the edges never drops a row.
fn surface_bounds(rect: Rect, surface: (u32, u32)) -> (u32, u32, u32, u32) {
    let clamp = |v: f32, max: u32| v.max(0.0).min(max as f32) as u32;
    (
        clamp(rect.min.x.floor() - 1.0, surface.0),
        clamp(rect.min.y.floor() - 1.0, surface.1),
        clamp(rect.max.x.ceil() + 1.0, surface.0),
        clamp(rect.max.y.ceil() + 1.0, surface.1),
    )
}

fn image_rect(size: (u32, u32)) -> Rect {
    Rect::from_min_max(Pos2::ZERO, pos2(size.0 as f32, size.1 as f32))
}

/// Owns the display surface and redraws it from session state on demand.
pub struct Compositor {
    surface: RgbaImage,
}

impl Compositor {
    pub fn new(size: (u32, u32)) -> Self {
        Self {
            surface: RgbaImage::new(size.0.max(1), size.1.max(1)),
        }
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    pub fn into_image(self) -> RgbaImage {
        self.surface
    }

    /// Redraw the whole surface. `tools` adds the interactive overlays; pass
    /// `None` for a clean composite (export).
    pub fn render(
        &mut self,
        canvas: &CanvasState,
        tools: Option<&ToolState>,
        settings: &EditorSettings,
    ) -> &RgbaImage {
        if self.surface.dimensions() != canvas.surface_size() {
            let (w, h) = canvas.surface_size();
            self.surface = RgbaImage::new(w, h);
        }
        self.composite_layers(canvas, settings);
        if let Some(tools) = tools {
            self.draw_overlays(canvas, tools, settings);
        }
        &self.surface
    }

    /// Clear to the background, then paint visible layers bottom to top with
    /// inverse-mapped sampling.
    fn composite_layers(&mut self, canvas: &CanvasState, settings: &EditorSettings) {
        let surface = canvas.surface_size();
        let layers: Vec<&Layer> = canvas
            .order
            .bottom_to_top()
            .iter()
            .map(|&id| canvas.layer(id))
            .filter(|layer| layer.visible && layer.transform.opacity > 0.0)
            .collect();
        // Thickening only applies to recolored ink, never to the raw source.
        let thickened: Vec<Option<RgbaImage>> = layers
            .iter()
            .map(|layer| {
                let t = layer.transform.thickness;
                layer.buffer().filter(|_| t > 1).map(|buf| thicken(buf.image(), t))
            })
            .collect();
        let passes: Vec<LayerPass<'_>> = layers
            .iter()
            .zip(&thickened)
            .map(|(layer, grown)| {
                let projection = canvas.projection(layer.id);
                let image = grown.as_ref().unwrap_or(layer.display_image());
                let rect = projection.forward_bounds(image_rect(image.dimensions()));
                LayerPass {
                    image,
                    projection,
                    opacity: layer.transform.opacity,
                    bounds: surface_bounds(rect, surface),
                }
            })
            .collect();

        let background = Rgba(settings.background);
        let overlap = settings.highlight_overlap.then_some(Rgba(settings.overlap_color));
        let interpolation = settings.interpolation;
        let row_bytes = surface.0 as usize * 4;

        self.surface
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                let y = y as u32;
                for (x, px) in row.chunks_exact_mut(4).enumerate() {
                    let x = x as u32;
                    let (color, covered) = composite_pixel(&passes, x, y, background, interpolation);
                    let color = match overlap {
                        Some(c) if covered >= 2 => c,
                        _ => color,
                    };
                    px.copy_from_slice(&color.0);
                }
            });
    }

    fn draw_overlays(&mut self, canvas: &CanvasState, tools: &ToolState, settings: &EditorSettings) {
        if tools.is_editing_with(EditTool::Line) {
            self.draw_lines(canvas, tools, settings);
        }
        if tools.is_editing_with(EditTool::Box)
            && let Some(drag) = tools.boxes.drag
        {
            self.draw_box_preview(canvas, drag.layer, drag.rect(), Rgba(settings.box_fill));
        }
        if tools.is_editing_with(EditTool::Brush)
            && let Some(cursor) = tools.brush.cursor
        {
            let r = tools.brush.radius.round().max(1.0) as i32;
            draw_hollow_circle_mut(
                &mut self.surface,
                (cursor.x.round() as i32, cursor.y.round() as i32),
                r,
                Rgba(settings.brush_ring),
            );
        }
    }

    /// Candidate lines of the active layer; selected ones are drawn thicker in
    /// the highlight color.
    fn draw_lines(&mut self, canvas: &CanvasState, tools: &ToolState, settings: &EditorSettings) {
        let active = canvas.active();
        if tools.lines.layer() != Some(active) {
            return;
        }
        let projection = canvas.projection(active);
        let muted = Rgba(settings.line_muted);
        let selected = Rgba(settings.line_selected);
        for (idx, seg) in tools.lines.segments().iter().enumerate() {
            let a = projection.forward(seg.start());
            let b = projection.forward(seg.end());
            if tools.lines.is_selected(idx) {
                let dir = (b - a).normalized();
                let normal = if dir.length_sq() > 0.0 { vec2(-dir.y, dir.x) } else { vec2(0.0, 1.0) };
                for k in [-1.0f32, 0.0, 1.0] {
                    let off = normal * k;
                    draw_line_segment_mut(
                        &mut self.surface,
                        ((a + off).x, (a + off).y),
                        ((b + off).x, (b + off).y),
                        selected,
                    );
                }
            } else {
                draw_line_segment_mut(&mut self.surface, (a.x, a.y), (b.x, b.y), muted);
            }
        }
    }

    /// Translucent fill over the drag rectangle, which lives in image space
    /// and therefore rotates and scales with its layer.
    fn draw_box_preview(&mut self, canvas: &CanvasState, layer: LayerId, rect: Rect, fill: Rgba<u8>) {
        let projection = canvas.projection(layer);
        let (x0, y0, x1, y1) = surface_bounds(projection.forward_bounds(rect), canvas.surface_size());
        for y in y0..y1 {
            for x in x0..x1 {
                let p = projection.inverse(pos2(x as f32 + 0.5, y as f32 + 0.5));
                if rect.contains(p) {
                    let px = self.surface.get_pixel_mut(x, y);
                    *px = blend_over(*px, fill, 1.0);
                }
            }
        }
    }
}

/// Color of one surface pixel and how many layers contributed to it.
fn composite_pixel(
    passes: &[LayerPass<'_>],
    x: u32,
    y: u32,
    background: Rgba<u8>,
    interpolation: Interpolation,
) -> (Rgba<u8>, usize) {
    let center = pos2(x as f32 + 0.5, y as f32 + 0.5);
    let mut out = background;
    let mut covered = 0;
    for pass in passes {
        if !pass.covers(x, y) {
            continue;
        }
        let p = pass.projection.inverse(center);
        let s = sample(pass.image, p, interpolation);
        if s[3] > 0 {
            covered += 1;
            out = blend_over(out, s, pass.opacity);
        }
    }
    (out, covered)
}
