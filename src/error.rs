//! Error type shared by the editing engine, its I/O edges and the CLI.

use thiserror::Error;

use crate::canvas::LayerId;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EditorError>;

#[derive(Error, Debug)]
pub enum EditorError {
    /// A source image could not be decoded. Fatal to the session.
    #[error("failed to load {layer}: {reason}")]
    LoadFailure { layer: LayerId, reason: String },

    #[error("{layer} has zero width or height")]
    EmptyImage { layer: LayerId },

    #[error("PNG export failed: {0}")]
    Export(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    /// A collaborator handed back a mask that does not cover the buffer 1:1.
    #[error("mask is {actual:?}, buffer is {expected:?}")]
    MaskSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for EditorError {
    fn from(e: serde_json::Error) -> Self {
        EditorError::Settings(e.to_string())
    }
}
