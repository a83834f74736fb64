use egui::{Pos2, Vec2, vec2};
use image::{GrayImage, RgbaImage};
use uuid::Uuid;

use crate::canvas::{CanvasState, LayerId, LayerTransform, RasterBuffer, SourceImage};
use crate::components::history::HistoryManager;
use crate::components::tools::{EditTool, Tool, ToolContext, ToolOutcome, ToolState};
use crate::compositor::Compositor;
use crate::error::Result;
use crate::frame::FrameScheduler;
use crate::io;
use crate::ops::lines::{HorizontalRunScan, LineDetector, LineSegment};
use crate::ops::recolor::Classifier;
use crate::ops::segmentation::{PointPrompt, Segmenter, check_mask};
use crate::settings::EditorSettings;

/// One comparison session: two drawings, their edits and everything the
/// display needs. All state lives here; nothing is global.
pub struct Session {
    /// External job/session key used by whatever persists around the editor.
    pub key: String,
    canvas: CanvasState,
    history: HistoryManager,
    tools: ToolState,
    frame: FrameScheduler,
    compositor: Compositor,
    settings: EditorSettings,
}

impl Session {
    /// Build a session around two decoded drawings. A fresh UUID is used as
    /// the key when none is supplied. Layers are not recolored until
    /// [`prepare`](Self::prepare) runs.
    pub fn new(key: Option<String>, first: SourceImage, second: SourceImage, settings: EditorSettings) -> Self {
        let settings = settings.sanitized();
        let key = key.unwrap_or_else(|| Uuid::new_v4().to_string());
        let surface = (settings.surface_width, settings.surface_height);
        let canvas = CanvasState::new(first, second, surface);
        log::info!(
            "session {}: {:?} + {:?} on {}x{} (fit {:.3})",
            key,
            canvas.layer(LayerId::First).dimensions(),
            canvas.layer(LayerId::Second).dimensions(),
            surface.0,
            surface.1,
            canvas.scale_to_fit()
        );
        let mut frame = FrameScheduler::new();
        frame.request_render();
        Self {
            key,
            canvas,
            history: HistoryManager::new(settings.history_depth),
            tools: ToolState::new(&settings),
            frame,
            compositor: Compositor::new(surface),
            settings,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    /// Last rendered frame.
    pub fn surface(&self) -> &RgbaImage {
        self.compositor.surface()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn tool_context(&mut self) -> (ToolContext<'_>, &mut ToolState) {
        (
            ToolContext {
                canvas: &mut self.canvas,
                history: &mut self.history,
                settings: &self.settings,
            },
            &mut self.tools,
        )
    }

    fn apply(&mut self, outcome: ToolOutcome) -> ToolOutcome {
        if outcome.needs_render() {
            self.frame.request_render();
        }
        outcome
    }

    // ------------------------------------------------------------------
    // Preparation
    // ------------------------------------------------------------------

    /// Recolor every layer that has no buffer yet. Runs at most once per
    /// layer; edits made afterwards are never overwritten by a later call.
    pub fn prepare(&mut self) {
        let classifier = Classifier::from(&self.settings);
        for id in LayerId::ALL {
            if self.canvas.layer(id).buffer().is_some() {
                continue;
            }
            let hue = self.settings.layer_color(id.index());
            let (pixels, polarity) = classifier.recolor(self.canvas.layer(id).source().image(), hue);
            log::info!("{}: recolored as {:?}", id, polarity);
            self.canvas.layer_mut(id).set_buffer(RasterBuffer::new(pixels));
        }
        self.frame.request_render();
    }

    pub fn is_prepared(&self) -> bool {
        self.canvas.is_prepared()
    }

    /// Re-run the recolor pass from the untouched source as one undoable
    /// edit, discarding every erase made on the layer.
    pub fn restore_original(&mut self, layer: LayerId) -> bool {
        if self.canvas.layer(layer).buffer().is_none() {
            log::debug!("restore: {} not prepared yet, ignoring", layer);
            return false;
        }
        self.history.push_undo("Restore Original", layer, &self.canvas);
        let classifier = Classifier::from(&self.settings);
        let hue = self.settings.layer_color(layer.index());
        let (pixels, _) = classifier.recolor(self.canvas.layer(layer).source().image(), hue);
        if let Some(buf) = self.canvas.layer_mut(layer).buffer_mut() {
            buf.restore(pixels);
        }
        if self.tools.lines.layer() == Some(layer) {
            self.tools.lines.clear_selection();
        }
        self.frame.request_render();
        true
    }

    // ------------------------------------------------------------------
    // Pointer input (display space)
    // ------------------------------------------------------------------

    pub fn pointer_down(&mut self, pos: Pos2) -> ToolOutcome {
        let outcome = match self.tools.tool() {
            Tool::Overlay => {
                self.tools.overlay_drag = Some(pos);
                ToolOutcome::NoOp
            }
            Tool::Edit => {
                let edit = self.tools.edit_tool();
                let (mut ctx, tools) = self.tool_context();
                match edit {
                    EditTool::Brush => tools.brush.begin(&mut ctx, pos),
                    EditTool::Box => tools.boxes.begin(&mut ctx, pos),
                    EditTool::Line => tools.lines.click(&mut ctx, pos),
                }
            }
        };
        self.apply(outcome)
    }

    /// High-frequency moves only queue work; [`tick`](Self::tick) applies it.
    pub fn pointer_move(&mut self, pos: Pos2) -> ToolOutcome {
        let outcome = match self.tools.tool() {
            Tool::Overlay => match self.tools.overlay_move(pos) {
                Some(delta) => {
                    self.frame.queue_pan(delta);
                    ToolOutcome::Redraw
                }
                None => ToolOutcome::NoOp,
            },
            Tool::Edit => match self.tools.edit_tool() {
                EditTool::Brush => {
                    self.tools.brush.cursor = Some(pos);
                    if self.tools.brush.is_stroking() {
                        self.frame.queue_brush(pos);
                    }
                    ToolOutcome::Redraw
                }
                EditTool::Box => {
                    let (mut ctx, tools) = self.tool_context();
                    tools.boxes.drag_to(&mut ctx, pos)
                }
                EditTool::Line => ToolOutcome::NoOp,
            },
        };
        self.apply(outcome)
    }

    pub fn pointer_up(&mut self, pos: Pos2) -> ToolOutcome {
        self.flush_pending();
        let outcome = match self.tools.tool() {
            Tool::Overlay => {
                if let Some(delta) = self.tools.overlay_move(pos) {
                    self.translate_active(delta);
                }
                self.tools.overlay_drag = None;
                ToolOutcome::Redraw
            }
            Tool::Edit => match self.tools.edit_tool() {
                EditTool::Brush => {
                    let (mut ctx, tools) = self.tool_context();
                    let outcome = tools.brush.stroke_to(&mut ctx, pos);
                    tools.brush.end();
                    outcome
                }
                EditTool::Box => {
                    let (mut ctx, tools) = self.tool_context();
                    tools.boxes.drag_to(&mut ctx, pos);
                    tools.boxes.finish(&mut ctx)
                }
                EditTool::Line => ToolOutcome::NoOp,
            },
        };
        self.apply(outcome)
    }

    fn translate_active(&mut self, delta: Vec2) {
        let t = &mut self.canvas.active_layer_mut().transform;
        t.x += delta.x;
        t.y += delta.y;
    }

    /// Apply queued overlay moves and brush positions.
    fn flush_pending(&mut self) {
        if let Some(delta) = self.frame.take_pan() {
            self.translate_active(delta);
        }
        if let Some(pos) = self.frame.take_brush() {
            let (mut ctx, tools) = self.tool_context();
            tools.brush.stroke_to(&mut ctx, pos);
        }
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Per-frame callback: drain queued input, then render once if anything
    /// asked for it. Returns the new frame, or `None` when nothing changed.
    pub fn tick(&mut self) -> Option<&RgbaImage> {
        self.flush_pending();
        if !self.frame.begin_frame() {
            return None;
        }
        Some(self.compositor.render(&self.canvas, Some(&self.tools), &self.settings))
    }

    pub fn request_render(&mut self) {
        self.frame.request_render();
    }

    /// Drain and render immediately, regardless of the schedule.
    pub fn render_now(&mut self) -> &RgbaImage {
        self.flush_pending();
        self.frame.request_render();
        self.frame.begin_frame();
        self.compositor.render(&self.canvas, Some(&self.tools), &self.settings)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame.frames_rendered()
    }

    /// Composite both layers without tool overlays and encode as PNG at the
    /// surface's native resolution.
    pub fn export_png(&mut self) -> Result<Vec<u8>> {
        self.flush_pending();
        let image = self.export_image();
        io::encode_png(&image)
    }

    /// Clean composite, no tool overlays.
    pub fn export_image(&self) -> RgbaImage {
        let mut compositor = Compositor::new(self.canvas.surface_size());
        compositor.render(&self.canvas, None, &self.settings);
        compositor.into_image()
    }

    // ------------------------------------------------------------------
    // Tool selection
    // ------------------------------------------------------------------

    pub fn set_tool(&mut self, tool: Tool) {
        self.tools.set_tool(tool);
        self.frame.request_render();
    }

    pub fn set_edit_tool(&mut self, edit: EditTool) {
        self.tools.set_tool(Tool::Edit);
        self.tools.set_edit_tool(edit);
        self.frame.request_render();
    }

    /// Brush radius in display pixels. Non-positive values are ignored.
    pub fn set_brush_radius(&mut self, radius: f32) {
        if radius.is_finite() && radius > 0.0 {
            self.tools.brush.radius = radius;
            self.frame.request_render();
        }
    }

    // ------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------

    pub fn set_active_layer(&mut self, layer: LayerId) {
        if self.canvas.active() == layer {
            return;
        }
        // Queued moves and in-progress gestures belong to the old layer.
        self.flush_pending();
        self.tools.boxes.cancel();
        self.tools.brush.end();
        self.tools.overlay_drag = None;
        self.canvas.set_active(layer);
        self.frame.request_render();
    }

    pub fn toggle_visibility(&mut self, layer: LayerId) {
        let visible = !self.canvas.layer(layer).visible;
        self.set_visible(layer, visible);
    }

    pub fn set_visible(&mut self, layer: LayerId, visible: bool) {
        self.canvas.layer_mut(layer).visible = visible;
        self.frame.request_render();
    }

    pub fn set_transform(&mut self, layer: LayerId, transform: LayerTransform) {
        self.canvas.layer_mut(layer).transform = transform.clamped();
        self.frame.request_render();
    }

    fn update_active_transform(&mut self, f: impl FnOnce(&mut LayerTransform)) {
        let layer = self.canvas.active();
        let mut t = self.canvas.layer(layer).transform;
        f(&mut t);
        self.set_transform(layer, t);
    }

    pub fn set_offset(&mut self, x: f32, y: f32) {
        self.update_active_transform(|t| {
            t.x = x;
            t.y = y;
        });
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.update_active_transform(|t| t.rotation_degrees = degrees);
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.update_active_transform(|t| t.scale = scale);
    }

    /// Stretch width and height independently, on top of the uniform scale.
    pub fn set_scale_xy(&mut self, scale_x: f32, scale_y: f32) {
        self.update_active_transform(|t| {
            t.scale_x = scale_x;
            t.scale_y = scale_y;
        });
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.update_active_transform(|t| t.opacity = opacity);
    }

    /// Thicken the active layer's strokes on screen, 1 to 10 image pixels.
    pub fn set_thickness(&mut self, thickness: u32) {
        self.update_active_transform(|t| t.thickness = thickness);
    }

    /// Keyboard nudge of the active layer by whole steps.
    pub fn nudge(&mut self, dx: i32, dy: i32, large: bool) {
        let step = if large {
            self.settings.nudge_step_large
        } else {
            self.settings.nudge_step
        };
        let delta = vec2(dx as f32, dy as f32) * step;
        self.update_active_transform(|t| {
            t.x += delta.x;
            t.y += delta.y;
        });
    }

    /// Identity transform, full opacity, no thickening, visible. Pixels are
    /// untouched.
    pub fn reset_transform(&mut self, layer: LayerId) {
        self.canvas.layer_mut(layer).reset();
        self.frame.request_render();
    }

    pub fn swap_order(&mut self) {
        self.canvas.order.swap();
        log::debug!("layer order now {:?}", self.canvas.order.bottom_to_top());
        self.frame.request_render();
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Drop any half-finished gesture along with its queued brush position.
    fn abort_gestures(&mut self) {
        self.frame.take_brush();
        self.tools.brush.end();
        self.tools.boxes.cancel();
    }

    pub fn undo(&mut self) -> Option<LayerId> {
        self.abort_gestures();
        let layer = self.history.undo(&mut self.canvas)?;
        log::debug!("undo on {}", layer);
        self.frame.request_render();
        Some(layer)
    }

    pub fn redo(&mut self) -> Option<LayerId> {
        self.abort_gestures();
        let layer = self.history.redo(&mut self.canvas)?;
        log::debug!("redo on {}", layer);
        self.frame.request_render();
        Some(layer)
    }

    // ------------------------------------------------------------------
    // Line toggle erase
    // ------------------------------------------------------------------

    /// Run `detector` on the active layer's buffer and make its output the
    /// candidate set. Returns the number of segments found.
    pub fn detect_lines(&mut self, detector: &dyn LineDetector) -> Result<usize> {
        let layer = self.canvas.active();
        let Some(buf) = self.canvas.layer(layer).buffer() else {
            log::debug!("detect lines: {} not prepared yet, ignoring", layer);
            return Ok(0);
        };
        let segments = detector.detect(buf.image())?;
        let n = segments.len();
        log::info!("{}: {} candidate line(s)", layer, n);
        self.set_detected_lines(layer, segments);
        Ok(n)
    }

    /// [`detect_lines`](Self::detect_lines) with the built-in horizontal scan.
    pub fn detect_lines_builtin(&mut self) -> Result<usize> {
        let scan = HorizontalRunScan::new(self.settings.min_line_length);
        self.detect_lines(&scan)
    }

    pub fn set_detected_lines(&mut self, layer: LayerId, segments: Vec<LineSegment>) {
        self.tools.lines.set_segments(layer, segments);
        self.frame.request_render();
    }

    /// Toggle a candidate line by index, as a click on it would.
    pub fn toggle_line(&mut self, idx: usize) -> bool {
        let toggled = self.tools.lines.toggle(idx);
        if toggled {
            self.frame.request_render();
        }
        toggled
    }

    pub fn erase_selected_lines(&mut self) -> ToolOutcome {
        let (mut ctx, tools) = self.tool_context();
        let outcome = tools.lines.erase_selected(&mut ctx);
        self.apply(outcome)
    }

    pub fn clear_line_selection(&mut self) {
        self.tools.lines.clear_selection();
        self.frame.request_render();
    }

    // ------------------------------------------------------------------
    // Mask erase
    // ------------------------------------------------------------------

    /// Erase every pixel the mask marks, as one undoable edit. A mask of the
    /// wrong size is rejected before anything is recorded.
    pub fn apply_mask(&mut self, layer: LayerId, mask: &GrayImage) -> Result<usize> {
        let Some(buf) = self.canvas.layer(layer).buffer() else {
            log::debug!("mask: {} not prepared yet, ignoring", layer);
            return Ok(0);
        };
        check_mask(mask, buf.dimensions())?;
        self.history.push_undo("Mask Erase", layer, &self.canvas);
        let n = match self.canvas.layer_mut(layer).buffer_mut() {
            Some(buf) => buf.erase_mask(mask)?,
            None => 0,
        };
        log::info!("mask erase on {} cleared {} px", layer, n);
        self.frame.request_render();
        Ok(n)
    }

    /// Ask `segmenter` for a mask on the active layer and erase it.
    pub fn apply_segmentation(&mut self, prompts: &[PointPrompt], segmenter: &dyn Segmenter) -> Result<usize> {
        let layer = self.canvas.active();
        let Some(buf) = self.canvas.layer(layer).buffer() else {
            log::debug!("segmentation: {} not prepared yet, ignoring", layer);
            return Ok(0);
        };
        let mask = segmenter.segment(buf.image(), prompts)?;
        self.apply_mask(layer, &mask)
    }

    // ------------------------------------------------------------------
    // Coordinates
    // ------------------------------------------------------------------

    /// Display point to image space of the active layer.
    pub fn display_to_image(&self, pos: Pos2) -> Pos2 {
        self.canvas.projection(self.canvas.active()).inverse(pos)
    }

    pub fn image_to_display(&self, layer: LayerId, p: Pos2) -> Pos2 {
        self.canvas.projection(layer).forward(p)
    }
}
