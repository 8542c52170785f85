//! Person detection: the model contract, YOLO inference, and annotated output.

pub mod annotate;
pub mod boxes;
pub mod error;
pub mod yolo;

use std::path::{Path, PathBuf};

pub use annotate::{load_image, output_file_name, render_detection};
pub use boxes::{non_max_suppression, PersonBox};
pub use error::DetectError;
pub use yolo::{YoloConfig, YoloDetector};

/// Outcome of one detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Annotated copy of the input; `None` when nothing survived filtering.
    pub annotated: Option<PathBuf>,
    /// Number of accepted person detections.
    pub count: u32,
}

/// A person detector shared by all request handlers.
///
/// Implementations must tolerate concurrent calls, either by being
/// internally stateless or by serializing access themselves.
pub trait Detector: Send + Sync {
    /// Runs detection on the image at `image_path`.
    ///
    /// Writes exactly one annotated image when `count > 0` and nothing
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError`] if the image cannot be read or decoded, the
    /// model fails, or the annotated image cannot be written.
    fn detect(&self, image_path: &Path) -> Result<Detection, DetectError>;
}
