//! Error types for the flora system

use thiserror::Error;

/// Main error type for the flora crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Renderer error: {0}")]
    Renderer(String),
}
