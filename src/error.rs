use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("Image loading error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Degenerate mask: no pixel has opacity above {threshold}, cannot locate the subject's foot point")]
    DegenerateMask { threshold: f32 },

    #[error("Cannot write output {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl CompositeError {
    /// Malformed, missing or zero-sized input images.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::ImageLoad(_) | Self::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, CompositeError>;
