//! Frame scheduling for high-frequency pointer input.
//!
//! Pointer-move events can arrive far faster than the surface can be
//! recomposited. Moves only queue work here; the host's frame tick applies
//! the queued work once and renders once.

use egui::{Pos2, Vec2};

#[derive(Debug, Default)]
pub struct FrameScheduler {
    render_scheduled: bool,
    /// Accumulated overlay translation not yet applied to the layer.
    pending_pan: Option<Vec2>,
    /// Most recent brush position (display space) not yet erased.
    pending_brush: Option<Pos2>,
    frames_rendered: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for one render at the next tick. Repeated requests coalesce.
    pub fn request_render(&mut self) {
        self.render_scheduled = true;
    }

    pub fn is_render_scheduled(&self) -> bool {
        self.render_scheduled
    }

    /// Add to the pending overlay move. Deltas accumulate so no motion is lost.
    pub fn queue_pan(&mut self, delta: Vec2) {
        let total = self.pending_pan.unwrap_or(Vec2::ZERO) + delta;
        self.pending_pan = Some(total);
        self.render_scheduled = true;
    }

    /// Replace the pending brush position; only the latest one is kept.
    pub fn queue_brush(&mut self, pos: Pos2) {
        self.pending_brush = Some(pos);
        self.render_scheduled = true;
    }

    pub fn take_pan(&mut self) -> Option<Vec2> {
        self.pending_pan.take()
    }

    pub fn take_brush(&mut self) -> Option<Pos2> {
        self.pending_brush.take()
    }

    pub fn has_pending_work(&self) -> bool {
        self.pending_pan.is_some() || self.pending_brush.is_some()
    }

    /// Consume the render request. Returns true when a frame should be drawn.
    pub fn begin_frame(&mut self) -> bool {
        if !self.render_scheduled {
            return false;
        }
        self.render_scheduled = false;
        self.frames_rendered += 1;
        true
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    #[test]
    fn many_requests_one_frame() {
        let mut frame = FrameScheduler::new();
        for _ in 0..50 {
            frame.request_render();
        }
        assert!(frame.begin_frame());
        assert!(!frame.begin_frame());
        assert_eq!(frame.frames_rendered(), 1);
    }

    #[test]
    fn pan_deltas_accumulate() {
        let mut frame = FrameScheduler::new();
        frame.queue_pan(vec2(3.0, 1.0));
        frame.queue_pan(vec2(-1.0, 4.0));
        assert!(frame.is_render_scheduled());
        assert_eq!(frame.take_pan(), Some(vec2(2.0, 5.0)));
        assert_eq!(frame.take_pan(), None);
    }

    #[test]
    fn brush_keeps_latest_position() {
        let mut frame = FrameScheduler::new();
        frame.queue_brush(pos2(1.0, 1.0));
        frame.queue_brush(pos2(9.0, 2.0));
        assert!(frame.has_pending_work());
        assert_eq!(frame.take_brush(), Some(pos2(9.0, 2.0)));
        assert!(!frame.has_pending_work());
    }
}
