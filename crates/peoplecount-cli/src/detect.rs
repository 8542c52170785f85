use std::path::{Path, PathBuf};

use peoplecount_detector::{Detector, YoloConfig, YoloDetector};

/// Run the configured model on a local image and print the outcome.
///
/// Nothing is written to the database. The annotated image lands in
/// `output_dir`, or the configured static dir when unset.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded or detection fails.
pub(crate) async fn run_detect(
    config: &peoplecount_core::AppConfig,
    image: &Path,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut yolo_config = YoloConfig::from_app_config(config);
    if let Some(dir) = output_dir {
        yolo_config.output_dir = dir;
    }
    let image = image.to_path_buf();

    let detection = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let detector = YoloDetector::load(yolo_config)?;
        Ok(detector.detect(&image)?)
    })
    .await??;

    println!("persons: {}", detection.count);
    match detection.annotated {
        Some(path) => println!("annotated: {}", path.display()),
        None => println!("annotated: none (no persons detected)"),
    }

    Ok(())
}
