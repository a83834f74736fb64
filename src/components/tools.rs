use std::collections::BTreeSet;

use egui::{Pos2, Rect, Vec2};

use crate::canvas::{CanvasState, LayerId};
use crate::components::history::HistoryManager;
use crate::ops::lines::{LineSegment, nearest_segment};
use crate::settings::EditorSettings;

/// Primary tool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    /// Drag moves the active layer.
    #[default]
    Overlay,
    /// Drag edits the active layer's pixels with the current [`EditTool`].
    Edit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EditTool {
    #[default]
    Brush,
    Box,
    Line,
}

impl EditTool {
    pub fn label(&self) -> &'static str {
        match self {
            EditTool::Brush => "Brush Erase",
            EditTool::Box => "Box Erase",
            EditTool::Line => "Line Erase",
        }
    }
}

/// What a pointer event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Nothing happened (no buffer, no hit, degenerate input).
    NoOp,
    /// Only transient visuals changed.
    Redraw,
    /// Pixels of a layer changed.
    Edited(LayerId),
}

impl ToolOutcome {
    pub fn needs_render(self) -> bool {
        !matches!(self, ToolOutcome::NoOp)
    }
}

/// Mutable pieces of the session a tool may touch during one event.
pub struct ToolContext<'a> {
    pub canvas: &'a mut CanvasState,
    pub history: &'a mut HistoryManager,
    pub settings: &'a EditorSettings,
}

// ============================================================================
// BRUSH ERASE
// ============================================================================

/// Tracks one brush stroke: the layer it started on and the last image-space
/// point that was erased.
#[derive(Clone, Copy, Debug)]
struct StrokeTracker {
    layer: LayerId,
    last: Pos2,
}

#[derive(Clone, Debug)]
pub struct BrushState {
    /// Radius in display pixels.
    pub radius: f32,
    /// Last known pointer position in display space, for the cursor ring.
    pub cursor: Option<Pos2>,
    stroke: Option<StrokeTracker>,
}

impl BrushState {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            cursor: None,
            stroke: None,
        }
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    /// Pointer-down: one snapshot for the whole stroke, then a first dab.
    pub fn begin(&mut self, ctx: &mut ToolContext<'_>, display: Pos2) -> ToolOutcome {
        self.cursor = Some(display);
        let layer = ctx.canvas.active();
        if ctx.canvas.layer(layer).buffer().is_none() {
            log::debug!("brush: {} not prepared yet, ignoring", layer);
            return ToolOutcome::NoOp;
        }
        ctx.history.push_undo(EditTool::Brush.label(), layer, ctx.canvas);
        let p = ctx.canvas.projection(layer).inverse(display);
        self.stroke = Some(StrokeTracker { layer, last: p });
        self.erase_segment(ctx, layer, p, p);
        ToolOutcome::Edited(layer)
    }

    /// Continue the stroke to `display`, clearing everything the brush swept
    /// since the previous point.
    pub fn stroke_to(&mut self, ctx: &mut ToolContext<'_>, display: Pos2) -> ToolOutcome {
        let Some(stroke) = self.stroke else {
            return ToolOutcome::NoOp;
        };
        let p = ctx.canvas.projection(stroke.layer).inverse(display);
        self.erase_segment(ctx, stroke.layer, stroke.last, p);
        self.stroke = Some(StrokeTracker { last: p, ..stroke });
        ToolOutcome::Edited(stroke.layer)
    }

    pub fn end(&mut self) {
        self.stroke = None;
    }

    fn erase_segment(&self, ctx: &mut ToolContext<'_>, layer: LayerId, a: Pos2, b: Pos2) {
        let r = ctx.canvas.projection(layer).to_image_len(self.radius);
        if let Some(buf) = ctx.canvas.layer_mut(layer).buffer_mut() {
            buf.erase_capsule(a, b, r);
        }
    }
}

// ============================================================================
// BOX ERASE
// ============================================================================

/// Drag rectangle with both corners in image space of `layer`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxDrag {
    pub layer: LayerId,
    pub start: Pos2,
    pub end: Pos2,
}

impl BoxDrag {
    pub fn rect(&self) -> Rect {
        Rect::from_two_pos(self.start, self.end)
    }
}

#[derive(Clone, Debug, Default)]
pub struct BoxState {
    pub drag: Option<BoxDrag>,
}

impl BoxState {
    pub fn begin(&mut self, ctx: &mut ToolContext<'_>, display: Pos2) -> ToolOutcome {
        let layer = ctx.canvas.active();
        if ctx.canvas.layer(layer).buffer().is_none() {
            log::debug!("box: {} not prepared yet, ignoring", layer);
            return ToolOutcome::NoOp;
        }
        let p = ctx.canvas.projection(layer).inverse(display);
        self.drag = Some(BoxDrag {
            layer,
            start: p,
            end: p,
        });
        ToolOutcome::Redraw
    }

    pub fn drag_to(&mut self, ctx: &mut ToolContext<'_>, display: Pos2) -> ToolOutcome {
        let Some(drag) = self.drag.as_mut() else {
            return ToolOutcome::NoOp;
        };
        drag.end = ctx.canvas.projection(drag.layer).inverse(display);
        ToolOutcome::Redraw
    }

    /// Pointer-up: snapshot, erase the rectangle, drop the drag. A zero-area
    /// box still records its snapshot.
    pub fn finish(&mut self, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        let Some(drag) = self.drag.take() else {
            return ToolOutcome::NoOp;
        };
        ctx.history.push_undo(EditTool::Box.label(), drag.layer, ctx.canvas);
        if let Some(buf) = ctx.canvas.layer_mut(drag.layer).buffer_mut() {
            let n = buf.erase_rect(drag.start, drag.end);
            log::debug!("box erase on {} cleared {} px", drag.layer, n);
        }
        ToolOutcome::Edited(drag.layer)
    }

    pub fn cancel(&mut self) {
        self.drag = None;
    }
}

// ============================================================================
// LINE TOGGLE ERASE
// ============================================================================

/// Candidate lines for one layer plus the user's picks.
#[derive(Clone, Debug, Default)]
pub struct LineSelection {
    layer: Option<LayerId>,
    segments: Vec<LineSegment>,
    selected: BTreeSet<usize>,
}

impl LineSelection {
    pub fn set_segments(&mut self, layer: LayerId, segments: Vec<LineSegment>) {
        self.layer = Some(layer);
        self.segments = segments;
        self.selected.clear();
    }

    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    pub fn segments(&self) -> &[LineSegment] {
        &self.segments
    }

    pub fn selected(&self) -> &BTreeSet<usize> {
        &self.selected
    }

    pub fn is_selected(&self, idx: usize) -> bool {
        self.selected.contains(&idx)
    }

    /// Flip membership of `idx`. Out-of-range indices are ignored.
    pub fn toggle(&mut self, idx: usize) -> bool {
        if idx >= self.segments.len() {
            return false;
        }
        if !self.selected.remove(&idx) {
            self.selected.insert(idx);
        }
        true
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Pointer-down: toggle the segment nearest the click, if one lies
    /// within the hit threshold.
    pub fn click(&mut self, ctx: &mut ToolContext<'_>, display: Pos2) -> ToolOutcome {
        let active = ctx.canvas.active();
        if self.layer != Some(active) || self.segments.is_empty() {
            return ToolOutcome::NoOp;
        }
        let proj = ctx.canvas.projection(active);
        let p = proj.inverse(display);
        let threshold = proj.to_image_len(ctx.settings.line_hit_threshold);
        match nearest_segment(&self.segments, p, threshold) {
            Some(idx) => {
                self.toggle(idx);
                ToolOutcome::Redraw
            }
            None => ToolOutcome::NoOp,
        }
    }

    /// Stroke every selected segment out of the layer as one undoable edit,
    /// then empty the selection.
    pub fn erase_selected(&mut self, ctx: &mut ToolContext<'_>) -> ToolOutcome {
        let Some(layer) = self.layer else {
            return ToolOutcome::NoOp;
        };
        if self.selected.is_empty() || ctx.canvas.layer(layer).buffer().is_none() {
            return ToolOutcome::NoOp;
        }
        ctx.history.push_undo(EditTool::Line.label(), layer, ctx.canvas);
        let half_width = ctx.settings.line_erase_width * 0.5;
        if let Some(buf) = ctx.canvas.layer_mut(layer).buffer_mut() {
            for &idx in &self.selected {
                let seg = self.segments[idx];
                buf.erase_capsule(seg.start(), seg.end(), half_width);
            }
        }
        log::info!("erased {} selected line(s) on {}", self.selected.len(), layer);
        self.selected.clear();
        ToolOutcome::Edited(layer)
    }
}

// ============================================================================
// TOOL STATE
// ============================================================================

/// Current tool selection and every in-progress gesture.
#[derive(Clone, Debug)]
pub struct ToolState {
    tool: Tool,
    edit_tool: EditTool,
    pub brush: BrushState,
    pub boxes: BoxState,
    pub lines: LineSelection,
    /// Last display position of an overlay move drag.
    pub overlay_drag: Option<Pos2>,
}

impl ToolState {
    pub fn new(settings: &EditorSettings) -> Self {
        Self {
            tool: Tool::default(),
            edit_tool: EditTool::default(),
            brush: BrushState::new(settings.brush_radius),
            boxes: BoxState::default(),
            lines: LineSelection::default(),
            overlay_drag: None,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn edit_tool(&self) -> EditTool {
        self.edit_tool
    }

    /// True when `edit` is the sub-tool receiving pointer input.
    pub fn is_editing_with(&self, edit: EditTool) -> bool {
        self.tool == Tool::Edit && self.edit_tool == edit
    }

    fn reset_edit_tool(&mut self, edit: EditTool) {
        match edit {
            EditTool::Brush => {
                self.brush.end();
                self.brush.cursor = None;
            }
            EditTool::Box => self.boxes.cancel(),
            EditTool::Line => self.lines.clear_selection(),
        }
    }

    /// Switch primary tool; whatever the old tool had in flight is dropped.
    pub fn set_tool(&mut self, tool: Tool) {
        if tool == self.tool {
            return;
        }
        match self.tool {
            Tool::Overlay => self.overlay_drag = None,
            Tool::Edit => self.reset_edit_tool(self.edit_tool),
        }
        self.tool = tool;
    }

    pub fn set_edit_tool(&mut self, edit: EditTool) {
        if edit == self.edit_tool {
            return;
        }
        self.reset_edit_tool(self.edit_tool);
        self.edit_tool = edit;
    }

    /// Overlay move: record the new pointer position and return how far it
    /// moved since the previous event.
    pub fn overlay_move(&mut self, display: Pos2) -> Option<Vec2> {
        let last = self.overlay_drag.replace(display)?;
        Some(display - last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{RasterBuffer, SourceImage};
    use egui::pos2;
    use image::{Rgba, RgbaImage};

    const SIZE: u32 = 100;

    /// Surface the same size as the images: scale_to_fit == 1, identity
    /// transform maps display == image.
    fn canvas() -> CanvasState {
        let src = |id| SourceImage::new(id, RgbaImage::new(SIZE, SIZE)).unwrap();
        let mut canvas = CanvasState::new(src(LayerId::First), src(LayerId::Second), (SIZE, SIZE));
        for id in LayerId::ALL {
            let buf = RasterBuffer::new(RgbaImage::from_pixel(SIZE, SIZE, Rgba([255, 0, 0, 255])));
            canvas.layer_mut(id).set_buffer(buf);
        }
        canvas
    }

    fn alpha(canvas: &CanvasState, id: LayerId, x: u32, y: u32) -> u8 {
        canvas.layer(id).buffer().unwrap().pixel(x, y).unwrap()[3]
    }

    #[test]
    fn brush_stroke_takes_one_snapshot() {
        let mut canvas = canvas();
        let mut history = HistoryManager::default();
        let settings = EditorSettings::default();
        let mut ctx = ToolContext {
            canvas: &mut canvas,
            history: &mut history,
            settings: &settings,
        };
        let mut brush = BrushState::new(5.0);
        assert_eq!(brush.begin(&mut ctx, pos2(20.0, 20.0)), ToolOutcome::Edited(LayerId::First));
        brush.stroke_to(&mut ctx, pos2(40.0, 20.0));
        brush.stroke_to(&mut ctx, pos2(60.0, 20.0));
        brush.end();
        assert_eq!(history.undo_count(), 1);
        // Swept path is cleared, including between the sampled points.
        assert_eq!(alpha(&canvas, LayerId::First, 30, 20), 0);
        assert_eq!(alpha(&canvas, LayerId::First, 50, 22), 0);
        assert_eq!(alpha(&canvas, LayerId::First, 30, 30), 255);
        assert_eq!(alpha(&canvas, LayerId::Second, 30, 20), 255);
    }

    #[test]
    fn brush_radius_follows_zoom() {
        let mut canvas = canvas();
        canvas.layer_mut(LayerId::First).transform.scale = 2.0;
        let mut history = HistoryManager::default();
        let settings = EditorSettings::default();
        let mut ctx = ToolContext {
            canvas: &mut canvas,
            history: &mut history,
            settings: &settings,
        };
        let mut brush = BrushState::new(10.0);
        // Display center == image center (50, 50) regardless of scale.
        brush.begin(&mut ctx, pos2(50.0, 50.0));
        brush.end();
        // 10 display px at 2x zoom is 5 image px.
        assert_eq!(alpha(&canvas, LayerId::First, 55, 50), 0);
        assert_eq!(alpha(&canvas, LayerId::First, 57, 50), 255);
    }

    #[test]
    fn tools_ignore_unprepared_layers() {
        let src = |id| SourceImage::new(id, RgbaImage::new(10, 10)).unwrap();
        let mut canvas = CanvasState::new(src(LayerId::First), src(LayerId::Second), (10, 10));
        let mut history = HistoryManager::default();
        let settings = EditorSettings::default();
        let mut ctx = ToolContext {
            canvas: &mut canvas,
            history: &mut history,
            settings: &settings,
        };
        assert_eq!(BrushState::new(3.0).begin(&mut ctx, pos2(5.0, 5.0)), ToolOutcome::NoOp);
        assert_eq!(BoxState::default().begin(&mut ctx, pos2(5.0, 5.0)), ToolOutcome::NoOp);
        assert_eq!(history.undo_count(), 0);
    }

    #[test]
    fn box_erase_any_direction() {
        let mut canvas = canvas();
        let mut history = HistoryManager::default();
        let settings = EditorSettings::default();
        let mut ctx = ToolContext {
            canvas: &mut canvas,
            history: &mut history,
            settings: &settings,
        };
        let mut boxes = BoxState::default();
        boxes.begin(&mut ctx, pos2(40.0, 40.0));
        boxes.drag_to(&mut ctx, pos2(10.0, 20.0));
        assert_eq!(boxes.finish(&mut ctx), ToolOutcome::Edited(LayerId::First));
        assert!(boxes.drag.is_none());
        assert_eq!(alpha(&canvas, LayerId::First, 10, 20), 0);
        assert_eq!(alpha(&canvas, LayerId::First, 39, 39), 0);
        assert_eq!(alpha(&canvas, LayerId::First, 40, 40), 255);
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn box_anchor_stays_in_image_space() {
        let mut canvas = canvas();
        let mut history = HistoryManager::default();
        let settings = EditorSettings::default();
        let mut boxes = BoxState::default();
        {
            let mut ctx = ToolContext {
                canvas: &mut canvas,
                history: &mut history,
                settings: &settings,
            };
            boxes.begin(&mut ctx, pos2(10.0, 10.0));
        }
        // Layer moves mid-drag; the stored anchor does not.
        canvas.layer_mut(LayerId::First).transform.x = 30.0;
        let mut ctx = ToolContext {
            canvas: &mut canvas,
            history: &mut history,
            settings: &settings,
        };
        boxes.drag_to(&mut ctx, pos2(60.0, 30.0));
        let drag = boxes.drag.unwrap();
        assert_eq!(drag.start, pos2(10.0, 10.0));
        assert_eq!(drag.end, pos2(30.0, 30.0));
    }

    #[test]
    fn line_click_toggles_nearest() {
        let mut canvas = canvas();
        let mut history = HistoryManager::default();
        let settings = EditorSettings::default();
        let mut ctx = ToolContext {
            canvas: &mut canvas,
            history: &mut history,
            settings: &settings,
        };
        let mut lines = LineSelection::default();
        lines.set_segments(
            LayerId::First,
            vec![
                LineSegment::new(0.0, 10.0, 90.0, 10.0),
                LineSegment::new(0.0, 50.0, 90.0, 50.0),
            ],
        );
        assert_eq!(lines.click(&mut ctx, pos2(30.0, 47.0)), ToolOutcome::Redraw);
        assert!(lines.is_selected(1));
        assert_eq!(lines.click(&mut ctx, pos2(30.0, 80.0)), ToolOutcome::NoOp);
        lines.click(&mut ctx, pos2(31.0, 52.0));
        assert!(lines.selected().is_empty());
    }

    #[test]
    fn line_click_on_other_layer_is_ignored() {
        let mut canvas = canvas();
        canvas.set_active(LayerId::Second);
        let mut history = HistoryManager::default();
        let settings = EditorSettings::default();
        let mut ctx = ToolContext {
            canvas: &mut canvas,
            history: &mut history,
            settings: &settings,
        };
        let mut lines = LineSelection::default();
        lines.set_segments(LayerId::First, vec![LineSegment::new(0.0, 10.0, 90.0, 10.0)]);
        assert_eq!(lines.click(&mut ctx, pos2(30.0, 10.0)), ToolOutcome::NoOp);
    }

    #[test]
    fn erase_selected_with_nothing_selected_is_a_no_op() {
        let mut canvas = canvas();
        let mut history = HistoryManager::default();
        let settings = EditorSettings::default();
        let mut ctx = ToolContext {
            canvas: &mut canvas,
            history: &mut history,
            settings: &settings,
        };
        let mut lines = LineSelection::default();
        lines.set_segments(LayerId::First, vec![LineSegment::new(0.0, 10.0, 90.0, 10.0)]);
        assert_eq!(lines.erase_selected(&mut ctx), ToolOutcome::NoOp);
        assert_eq!(history.undo_count(), 0);
    }

    #[test]
    fn switching_sub_tool_drops_the_old_gesture() {
        let settings = EditorSettings::default();
        let mut tools = ToolState::new(&settings);
        tools.set_tool(Tool::Edit);
        tools.set_edit_tool(EditTool::Box);
        tools.boxes.drag = Some(BoxDrag {
            layer: LayerId::First,
            start: pos2(1.0, 1.0),
            end: pos2(5.0, 5.0),
        });
        tools.set_edit_tool(EditTool::Line);
        assert!(tools.boxes.drag.is_none());

        tools.lines.set_segments(LayerId::First, vec![LineSegment::new(0.0, 0.0, 1.0, 0.0)]);
        tools.lines.toggle(0);
        tools.set_tool(Tool::Overlay);
        assert!(tools.lines.selected().is_empty());
        assert_eq!(tools.lines.segments().len(), 1);
    }

    #[test]
    fn overlay_move_reports_deltas() {
        let settings = EditorSettings::default();
        let mut tools = ToolState::new(&settings);
        assert_eq!(tools.overlay_move(pos2(1.0, 1.0)), None);
        tools.overlay_drag = Some(pos2(10.0, 10.0));
        assert_eq!(tools.overlay_move(pos2(14.0, 7.0)), Some(egui::vec2(4.0, -3.0)));
        assert_eq!(tools.overlay_drag, Some(pos2(14.0, 7.0)));
    }
}
