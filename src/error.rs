use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by loading, exporting and layer configuration.
#[derive(Error, Debug)]
pub enum LayerError {
    #[error("could not load image '{}': {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("could not write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("layer configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid layer set: {0}")]
    InvalidLayers(String),

    #[error("buffer size mismatch: expected {expected} pixels, got {actual}")]
    Dimensions { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, LayerError>;
