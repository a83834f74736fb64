use std::collections::VecDeque;

use image::RgbaImage;

use crate::canvas::{CanvasState, LayerId};

// ============================================================================
// LAYER SNAPSHOT - whole-buffer copy of one layer
// ============================================================================

/// Full copy of one layer's recolored buffer at a point in time.
pub struct LayerSnapshot {
    pub layer: LayerId,
    description: String,
    pixels: RgbaImage,
}

impl LayerSnapshot {
    /// Copy the layer's buffer out. `None` while the layer is unprepared.
    pub fn capture(description: &str, layer: LayerId, canvas: &CanvasState) -> Option<Self> {
        let buffer = canvas.layer(layer).buffer()?;
        Some(Self {
            layer,
            description: description.to_string(),
            pixels: buffer.snapshot(),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn memory_size(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// Write the snapshot back into its layer.
    fn restore_into(self, canvas: &mut CanvasState) -> bool {
        match canvas.layer_mut(self.layer).buffer_mut() {
            Some(buf) => buf.restore(self.pixels),
            None => false,
        }
    }
}

// ============================================================================
// HISTORY MANAGER - bounded undo/redo stacks of layer snapshots
// ============================================================================

/// Linear undo/redo history. Both stacks hold at most `max_history_size`
/// entries; pushing past the bound drops the oldest entry.
pub struct HistoryManager {
    undo_stack: VecDeque<LayerSnapshot>,
    redo_stack: VecDeque<LayerSnapshot>,
    max_history_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(10)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
        }
    }

    fn push_bounded(stack: &mut VecDeque<LayerSnapshot>, entry: LayerSnapshot, max: usize) {
        stack.push_back(entry);
        while stack.len() > max {
            stack.pop_front();
        }
    }

    /// Snapshot `layer` before a destructive edit. Clears the redo stack.
    /// Returns false (and records nothing) when the layer has no buffer yet.
    pub fn push_undo(&mut self, description: &str, layer: LayerId, canvas: &CanvasState) -> bool {
        let Some(snapshot) = LayerSnapshot::capture(description, layer, canvas) else {
            log::debug!("history: {} has no buffer, nothing to snapshot", layer);
            return false;
        };
        self.redo_stack.clear();
        Self::push_bounded(&mut self.undo_stack, snapshot, self.max_history_size);
        true
    }

    /// Restore the most recent snapshot. The layer's current pixels move to
    /// the redo stack. Returns the restored layer, or `None` when empty.
    pub fn undo(&mut self, canvas: &mut CanvasState) -> Option<LayerId> {
        let entry = self.undo_stack.pop_back()?;
        let layer = entry.layer;
        if let Some(current) = LayerSnapshot::capture(&entry.description, layer, canvas) {
            Self::push_bounded(&mut self.redo_stack, current, self.max_history_size);
        }
        entry.restore_into(canvas);
        Some(layer)
    }

    /// Mirror of [`undo`](Self::undo).
    pub fn redo(&mut self, canvas: &mut CanvasState) -> Option<LayerId> {
        let entry = self.redo_stack.pop_back()?;
        let layer = entry.layer;
        if let Some(current) = LayerSnapshot::capture(&entry.description, layer, canvas) {
            Self::push_bounded(&mut self.undo_stack, current, self.max_history_size);
        }
        entry.restore_into(canvas);
        Some(layer)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|s| s.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|s| s.description())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<&str> {
        self.undo_stack.iter().rev().map(|s| s.description()).collect()
    }

    /// Bytes held by both stacks.
    pub fn memory_usage(&self) -> usize {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(LayerSnapshot::memory_size)
            .sum()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}
