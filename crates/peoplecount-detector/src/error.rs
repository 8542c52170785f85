use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("model error: {0}")]
    Model(String),

    #[error("could not write annotated image {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl DetectError {
    /// Wraps a tract error, keeping its full context chain in the message.
    pub(crate) fn model(error: &impl std::fmt::Display) -> Self {
        Self::Model(format!("{error:#}"))
    }
}
