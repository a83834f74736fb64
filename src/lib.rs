//! Two-layer drawing comparison: recolor two rasters, place them over each
//! other with per-layer affine transforms, erase unwanted marks with brush,
//! box, line and mask tools, and export the composite as PNG.

pub mod canvas;
pub mod cli;
pub mod components;
pub mod compositor;
pub mod error;
pub mod frame;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;
pub mod settings;

pub use canvas::{LayerId, LayerTransform, SourceImage};
pub use components::tools::{EditTool, Tool, ToolOutcome};
pub use error::{EditorError, Result};
pub use project::Session;
pub use settings::EditorSettings;
