use std::time::Duration;
use thiserror::Error;

/// Failures talking to the hosted vision model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model call timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Model API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Model response is missing {0}")]
    MissingField(&'static str),

    #[error("Failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything that can stop a counting request
#[derive(Debug, Error)]
pub enum CountError {
    /// Missing, unnamed or unreadable upload
    #[error("{0}")]
    Upload(String),

    /// Upload larger than the configured limit
    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to build sprite: {0:#}")]
    Sprite(anyhow::Error),

    #[error(transparent)]
    ModelCall(#[from] ModelError),

    #[error("Scratch file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl CountError {
    /// HTTP status reported for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            CountError::Upload(_) => 400,
            CountError::TooLarge { .. } => 413,
            CountError::Decode(_)
            | CountError::Sprite(_)
            | CountError::ModelCall(_)
            | CountError::Io(_)
            | CountError::Worker(_) => 500,
        }
    }
}

impl From<CountError> for String {
    fn from(err: CountError) -> Self {
        err.to_string()
    }
}
