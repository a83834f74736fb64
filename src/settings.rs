use std::path::Path;

use image::Rgba;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ops::transform::Interpolation;

/// Editor configuration. Every field has a default so a settings file only
/// needs to name what it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Fixed display surface size in pixels.
    pub surface_width: u32,
    pub surface_height: u32,
    /// Clear color of the display surface.
    pub background: [u8; 4],
    /// Recolor hue for layer 1 and layer 2.
    pub layer_colors: [[u8; 4]; 2],

    /// Brush radius in display pixels.
    pub brush_radius: f32,
    /// Maximum number of undo (and redo) entries.
    pub history_depth: usize,

    /// Line pick distance in display pixels.
    pub line_hit_threshold: f32,
    /// Stroke width (image pixels) used when erasing selected lines.
    pub line_erase_width: f32,
    /// Shortest run (image pixels) the built-in scan reports as a line.
    pub min_line_length: u32,

    // Polarity classification
    pub white_threshold: u8,
    pub black_threshold: u8,
    pub sample_step: u32,

    pub interpolation: Interpolation,

    // Overlay colors
    pub box_fill: [u8; 4],
    pub brush_ring: [u8; 4],
    pub line_muted: [u8; 4],
    pub line_selected: [u8; 4],

    /// Paint pixels covered by both layers with `overlap_color`.
    pub highlight_overlap: bool,
    pub overlap_color: [u8; 4],

    /// Keyboard nudge distance in display pixels (plain / large step).
    pub nudge_step: f32,
    pub nudge_step_large: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            surface_width: 1200,
            surface_height: 800,
            background: [255, 255, 255, 255],
            layer_colors: [[255, 0, 0, 255], [0, 255, 0, 255]],
            brush_radius: 20.0,
            history_depth: 10,
            line_hit_threshold: 15.0,
            line_erase_width: 5.0,
            min_line_length: 20,
            white_threshold: 240,
            black_threshold: 15,
            sample_step: 10,
            interpolation: Interpolation::Nearest,
            box_fill: [0, 120, 255, 64],
            brush_ring: [0, 0, 0, 255],
            line_muted: [200, 200, 200, 255],
            line_selected: [0, 200, 255, 255],
            highlight_overlap: false,
            overlap_color: [0, 0, 255, 255],
            nudge_step: 1.0,
            nudge_step_large: 10.0,
        }
    }
}

impl EditorSettings {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let settings: EditorSettings = serde_json::from_str(text)?;
        Ok(settings.sanitized())
    }

    /// Read a JSON settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Clamp values that would otherwise produce an unusable session.
    pub fn sanitized(mut self) -> Self {
        self.surface_width = self.surface_width.max(1);
        self.surface_height = self.surface_height.max(1);
        self.history_depth = self.history_depth.max(1);
        self.sample_step = self.sample_step.max(1);
        if !(self.brush_radius.is_finite() && self.brush_radius > 0.0) {
            self.brush_radius = 1.0;
        }
        if !(self.line_hit_threshold.is_finite() && self.line_hit_threshold > 0.0) {
            self.line_hit_threshold = 1.0;
        }
        if !(self.line_erase_width.is_finite() && self.line_erase_width > 0.0) {
            self.line_erase_width = 1.0;
        }
        self
    }

    pub fn layer_color(&self, index: usize) -> Rgba<u8> {
        Rgba(self.layer_colors[index.min(1)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let s = EditorSettings::from_json_str(r#"{ "brush_radius": 8.0, "highlight_overlap": true }"#)
            .unwrap();
        assert_eq!(s.brush_radius, 8.0);
        assert!(s.highlight_overlap);
        assert_eq!(s.history_depth, 10);
        assert_eq!(s.surface_width, 1200);
    }

    #[test]
    fn interpolation_parses_lowercase() {
        let s = EditorSettings::from_json_str(r#"{ "interpolation": "bilinear" }"#).unwrap();
        assert_eq!(s.interpolation, Interpolation::Bilinear);
    }

    #[test]
    fn sanitize_rejects_zero_sizes() {
        let s = EditorSettings {
            surface_width: 0,
            history_depth: 0,
            brush_radius: -3.0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(s.surface_width, 1);
        assert_eq!(s.history_depth, 1);
        assert_eq!(s.brush_radius, 1.0);
    }

    #[test]
    fn malformed_json_is_a_settings_error() {
        let err = EditorSettings::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, crate::error::EditorError::Settings(_)));
    }
}
