use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("could not decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed model configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A file the model directory must provide is not there
    #[error("missing model artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("invalid label mapping: {0}")]
    InvalidLabels(String),

    #[error("SavedModel signature: {0}")]
    Signature(String),

    #[error("tensorflow: {0}")]
    TensorFlow(#[from] tensorflow::Status),

    /// Model produced a score vector that does not line up with the labels
    #[error("model returned {scores} scores for {labels} labels")]
    LabelMismatch { scores: usize, labels: usize },

    #[error("could not fetch image: {0}")]
    Fetch(#[from] reqwest::Error),
}
