//! Image loading and annotated-output rendering.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use uuid::Uuid;

use crate::{DetectError, Detection, PersonBox};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Decodes the image at `path`, sniffing the format from its content.
///
/// # Errors
///
/// Returns [`DetectError::Io`] if the file cannot be opened or
/// [`DetectError::Decode`] if it is not a supported raster image.
pub fn load_image(path: &Path) -> Result<DynamicImage, DetectError> {
    let io_error = |source| DetectError::Io {
        path: path.to_path_buf(),
        source,
    };
    ImageReader::open(path)
        .map_err(io_error)?
        .with_guessed_format()
        .map_err(io_error)?
        .decode()
        .map_err(DetectError::Decode)
}

/// A fresh, collision-resistant filename for an annotated image.
#[must_use]
pub fn output_file_name() -> String {
    format!("{}.jpg", Uuid::new_v4().simple())
}

/// Turns accepted boxes into a [`Detection`].
///
/// With no boxes nothing is written. Otherwise the boxes are drawn onto an RGB
/// copy of `image`, saved as a JPEG under a new name in `output_dir`, and the
/// saved path is returned alongside the count.
///
/// # Errors
///
/// Returns [`DetectError::Io`] if `output_dir` cannot be created or
/// [`DetectError::Save`] if encoding or writing the JPEG fails.
pub fn render_detection(
    image: &DynamicImage,
    boxes: &[PersonBox],
    output_dir: &Path,
) -> Result<Detection, DetectError> {
    let count = u32::try_from(boxes.len()).unwrap_or(u32::MAX);
    if boxes.is_empty() {
        return Ok(Detection {
            annotated: None,
            count,
        });
    }

    let mut canvas = image.to_rgb8();
    draw_boxes(&mut canvas, boxes);

    std::fs::create_dir_all(output_dir).map_err(|source| DetectError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;
    let path: PathBuf = output_dir.join(output_file_name());
    canvas
        .save_with_format(&path, ImageFormat::Jpeg)
        .map_err(|source| DetectError::Save {
            path: path.clone(),
            source,
        })?;

    tracing::debug!(path = %path.display(), count, "annotated image written");

    Ok(Detection {
        annotated: Some(path),
        count,
    })
}

/// Draws a 2px hollow rectangle per box, clipped to the canvas.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn draw_boxes(canvas: &mut RgbImage, boxes: &[PersonBox]) {
    let (width, height) = canvas.dimensions();
    for b in boxes {
        let x1 = b.x1.max(0.0).round() as u32;
        let y1 = b.y1.max(0.0).round() as u32;
        let x2 = (b.x2.round().max(0.0) as u32).min(width.saturating_sub(1));
        let y2 = (b.y2.round().max(0.0) as u32).min(height.saturating_sub(1));
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        let (w, h) = (x2 - x1 + 1, y2 - y1 + 1);
        let x = i32::try_from(x1).unwrap_or(i32::MAX);
        let y = i32::try_from(y1).unwrap_or(i32::MAX);
        draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w, h), BOX_COLOR);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(
                canvas,
                Rect::at(x + 1, y + 1).of_size(w - 2, h - 2),
                BOX_COLOR,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(x1: f32, y1: f32, x2: f32, y2: f32) -> PersonBox {
        PersonBox {
            x1,
            y1,
            x2,
            y2,
            confidence: 0.9,
        }
    }

    fn grey_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 90, 90])))
    }

    #[test]
    fn output_file_names_are_unique_jpegs() {
        let a = output_file_name();
        let b = output_file_name();
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
        // 32 hex chars + ".jpg"
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn render_without_boxes_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let detection = render_detection(&grey_image(32, 32), &[], dir.path()).expect("render");

        assert_eq!(detection.count, 0);
        assert!(detection.annotated.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn render_with_boxes_writes_one_decodable_jpeg() {
        let dir = tempfile::tempdir().expect("tempdir");
        let boxes = [person(4.0, 4.0, 20.0, 28.0), person(24.0, 2.0, 30.0, 12.0)];
        let detection =
            render_detection(&grey_image(32, 32), &boxes, dir.path()).expect("render");

        assert_eq!(detection.count, 2);
        let path = detection.annotated.expect("annotated path");
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let reloaded = load_image(&path).expect("reload");
        assert_eq!((reloaded.width(), reloaded.height()), (32, 32));
    }

    #[test]
    fn render_creates_missing_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("static").join("out");
        let detection = render_detection(&grey_image(16, 16), &[person(1.0, 1.0, 10.0, 10.0)], &nested)
            .expect("render");
        assert!(detection.annotated.expect("path").exists());
    }

    #[test]
    fn draw_boxes_paints_outline_and_leaves_interior() {
        let mut canvas = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        draw_boxes(&mut canvas, &[person(2.0, 2.0, 15.0, 15.0)]);

        assert_eq!(*canvas.get_pixel(2, 2), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(3, 8), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(8, 8), Rgb([0, 0, 0]));
    }

    #[test]
    fn draw_boxes_clips_out_of_bounds_boxes() {
        let mut canvas = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        draw_boxes(
            &mut canvas,
            &[person(-5.0, -5.0, 50.0, 50.0), person(3.0, 3.0, 3.0, 3.0)],
        );
        assert_eq!(*canvas.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(9, 9), BOX_COLOR);
    }

    #[test]
    fn load_image_rejects_non_image_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.jpg");
        std::fs::write(&path, b"definitely not a jpeg").unwrap();

        let err = load_image(&path).unwrap_err();
        assert!(matches!(err, DetectError::Decode(_)), "got: {err:?}");
    }

    #[test]
    fn load_image_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_image(&dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, DetectError::Io { .. }), "got: {err:?}");
    }
}
