pub mod lines;
pub mod recolor;
pub mod segmentation;
pub mod transform;
