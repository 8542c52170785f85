//! Fakes and fixtures shared by the server's unit tests.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::{ImageFormat, Rgb, RgbImage};
use peoplecount_detector::{load_image, render_detection, DetectError, Detection, Detector, PersonBox};

use crate::pipeline::MediaConfig;

#[derive(Debug, Clone, Copy)]
pub(crate) enum FakeOutcome {
    Persons(u32),
    Fail,
    Panic,
}

/// Detector double that decodes the staged file and reports a fixed outcome.
///
/// Records every path it was asked to inspect so tests can check that the
/// staged upload existed during detection and is gone afterwards.
#[derive(Debug)]
pub(crate) struct FakeDetector {
    outcome: FakeOutcome,
    output_dir: PathBuf,
    seen: Mutex<Vec<(PathBuf, bool)>>,
}

impl FakeDetector {
    pub(crate) fn new(outcome: FakeOutcome, output_dir: &Path) -> Self {
        Self {
            outcome,
            output_dir: output_dir.to_path_buf(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// `(path, existed_during_detect)` for every call so far.
    pub(crate) fn seen(&self) -> Vec<(PathBuf, bool)> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl Detector for FakeDetector {
    fn detect(&self, image_path: &Path) -> Result<Detection, DetectError> {
        self.seen
            .lock()
            .expect("seen lock")
            .push((image_path.to_path_buf(), image_path.exists()));

        match self.outcome {
            FakeOutcome::Fail => Err(DetectError::Model("model exploded".to_string())),
            FakeOutcome::Panic => panic!("detector crashed"),
            FakeOutcome::Persons(n) => {
                let image = load_image(image_path)?;
                let boxes: Vec<PersonBox> = (0..n)
                    .map(|i| {
                        let offset = 2.0 * f32::from(u16::try_from(i).unwrap_or(u16::MAX));
                        PersonBox {
                            x1: offset,
                            y1: offset,
                            x2: offset + 4.0,
                            y2: offset + 6.0,
                            confidence: 0.9,
                        }
                    })
                    .collect();
                render_detection(&image, &boxes, &self.output_dir)
            }
        }
    }
}

/// Static and upload directories rooted in a fresh temp dir.
pub(crate) struct MediaDirs {
    _root: tempfile::TempDir,
    pub(crate) media: MediaConfig,
}

impl MediaDirs {
    pub(crate) fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let static_dir = root.path().join("static");
        let upload_dir = root.path().join("temp_uploads");
        std::fs::create_dir_all(&static_dir).expect("create static dir");
        std::fs::create_dir_all(&upload_dir).expect("create upload dir");
        Self {
            _root: root,
            media: MediaConfig {
                static_dir,
                static_url_prefix: "/static".to_string(),
                upload_dir,
            },
        }
    }

    pub(crate) fn static_files(&self) -> Vec<PathBuf> {
        list_dir(&self.media.static_dir)
    }

    pub(crate) fn upload_files(&self) -> Vec<PathBuf> {
        list_dir(&self.media.upload_dir)
    }
}

fn list_dir(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// A small PNG encoded in memory.
pub(crate) fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_pixel(24, 24, Rgb([120, 130, 140]));
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

pub(crate) async fn row_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM detection_results")
        .fetch_one(pool)
        .await
        .expect("count rows")
}
