use thiserror::Error;

use crate::layer::LayerId;

pub type Result<T> = std::result::Result<T, EditorError>;

/// Errors surfaced by the editing core.
///
/// None of these abort a render pass: decode failures are collected per
/// layer and rejected mutations leave the layer stack untouched.
#[derive(Debug, Error)]
pub enum EditorError {
    /// A layer's image payload could not be decoded.
    #[error("layer {layer}: image decode failed: {reason}")]
    Decode { layer: LayerId, reason: String },

    /// An update addressed a layer index that does not exist (any more).
    #[error("layer index {index} out of range (stack has {len} layers)")]
    InvalidMutation { index: usize, len: usize },

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("action file error: {0}")]
    Actions(#[from] serde_json::Error),
}

impl EditorError {
    /// True for failures that only affect one layer for one render pass.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EditorError::Decode { .. } | EditorError::InvalidMutation { .. })
    }
}
