//! Point-prompt segmentation contract.
//!
//! The mask model itself runs outside this crate. The editor collects
//! include/exclude clicks in image space, hands them to a [`Segmenter`] and
//! erases whatever the returned mask covers.

use image::{GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptLabel {
    Include,
    Exclude,
}

/// One click in image space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointPrompt {
    pub x: f32,
    pub y: f32,
    pub label: PromptLabel,
}

pub trait Segmenter {
    /// Return a mask the size of `buffer`; non-zero marks pixels to erase.
    fn segment(&self, buffer: &RgbaImage, prompts: &[PointPrompt]) -> Result<GrayImage>;
}

/// Reject masks that do not line up with the buffer they will be applied to.
pub fn check_mask(mask: &GrayImage, buffer: (u32, u32)) -> Result<()> {
    if mask.dimensions() != buffer {
        return Err(EditorError::MaskSize {
            expected: buffer,
            actual: mask.dimensions(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_use_lowercase_labels() {
        let p: PointPrompt = serde_json::from_str(r#"{"x": 1.5, "y": 2.0, "label": "exclude"}"#).unwrap();
        assert_eq!(p.label, PromptLabel::Exclude);
        assert_eq!(p.x, 1.5);
    }

    #[test]
    fn mask_size_must_match() {
        assert!(check_mask(&GrayImage::new(4, 4), (4, 4)).is_ok());
        assert!(matches!(
            check_mask(&GrayImage::new(4, 5), (4, 4)),
            Err(EditorError::MaskSize { expected: (4, 4), actual: (4, 5) })
        ));
    }
}
