//! YOLO person detector running an ONNX export through tract.
//!
//! Expects a single-output detection head (`[1, 4 + nc, anchors]`, as produced
//! by YOLOv8/YOLO11 exports) where the first four attributes are
//! `cx, cy, w, h` in input pixels and the rest are per-class scores.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tract_onnx::prelude::*;
use tract_onnx::prelude::tract_ndarray::{Array4, ArrayView3, Ix3};

use crate::annotate::{load_image, render_detection};
use crate::{non_max_suppression, DetectError, Detection, Detector, PersonBox};

/// COCO class index for "person".
pub const PERSON_CLASS_ID: usize = 0;

/// Letterbox padding value (114 grey), normalized.
const PAD_VALUE: f32 = 114.0 / 255.0;

type Plan = TypedRunnableModel<TypedModel>;

#[derive(Debug, Clone)]
pub struct YoloConfig {
    pub model_path: PathBuf,
    /// Square model input side in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Where annotated images are written.
    pub output_dir: PathBuf,
}

impl YoloConfig {
    #[must_use]
    pub fn from_app_config(config: &peoplecount_core::AppConfig) -> Self {
        Self {
            model_path: config.model_path.clone(),
            input_size: config.model_input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            output_dir: config.static_dir.clone(),
        }
    }
}

pub struct YoloDetector {
    plan: Mutex<Plan>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    output_dir: PathBuf,
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("input_size", &self.input_size)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("iou_threshold", &self.iou_threshold)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl YoloDetector {
    /// Loads and optimizes the ONNX model for a fixed `1x3xNxN` input.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Model`] if the model cannot be loaded or
    /// optimized, or [`DetectError::Io`] if the output directory cannot be
    /// created.
    pub fn load(config: YoloConfig) -> Result<Self, DetectError> {
        let started = Instant::now();
        let side = config.input_size as usize;

        let plan = tract_onnx::onnx()
            .model_for_path(&config.model_path)
            .map_err(|e| {
                DetectError::Model(format!(
                    "failed to load ONNX model from {}: {e:#}",
                    config.model_path.display()
                ))
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .map_err(|e| DetectError::model(&e))?
            .into_optimized()
            .map_err(|e| DetectError::model(&e))?
            .into_runnable()
            .map_err(|e| DetectError::model(&e))?;

        std::fs::create_dir_all(&config.output_dir).map_err(|source| DetectError::Io {
            path: config.output_dir.clone(),
            source,
        })?;

        tracing::info!(
            model = %config.model_path.display(),
            input_size = config.input_size,
            elapsed_ms = started.elapsed().as_millis(),
            "detection model loaded"
        );

        Ok(Self {
            plan: Mutex::new(plan),
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            output_dir: config.output_dir,
        })
    }

    /// Runs one inference so the first request does not pay first-run costs.
    ///
    /// Nothing is written to disk. Returns the number of persons found.
    ///
    /// # Errors
    ///
    /// Propagates any error from decoding `image_path` or running the model.
    pub fn warm_up(&self, image_path: &Path) -> Result<usize, DetectError> {
        let started = Instant::now();
        let image = load_image(image_path)?;
        let boxes = self.infer(&image)?;
        tracing::info!(
            image = %image_path.display(),
            persons = boxes.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "detector warm-up complete"
        );
        Ok(boxes.len())
    }

    /// Person boxes for `image` after thresholding and suppression.
    fn infer(&self, image: &DynamicImage) -> Result<Vec<PersonBox>, DetectError> {
        let (input, ratio) = letterbox(image, self.input_size);

        let outputs = {
            let plan = lock_plan(&self.plan);
            plan.run(tvec!(input.into()))
                .map_err(|e| DetectError::Model(format!("inference failed: {e:#}")))?
        };

        let output = outputs
            .first()
            .ok_or_else(|| DetectError::Model("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| DetectError::model(&e))?;
        let shape = view.shape().to_vec();
        let view = view
            .into_dimensionality::<Ix3>()
            .map_err(|_| DetectError::Model(format!("unexpected output shape {shape:?}")))?;

        let mut boxes = decode_predictions(
            view,
            ratio,
            image.dimensions(),
            self.confidence_threshold,
        )?;
        non_max_suppression(&mut boxes, self.iou_threshold);
        Ok(boxes)
    }
}

impl Detector for YoloDetector {
    fn detect(&self, image_path: &Path) -> Result<Detection, DetectError> {
        let image = load_image(image_path)?;
        let boxes = self.infer(&image)?;
        render_detection(&image, &boxes, &self.output_dir)
    }
}

/// Locks the plan even if an earlier inference panicked while holding it.
///
/// Running a plan takes `&self`, so a panic cannot leave it half-updated.
fn lock_plan<T>(plan: &Mutex<T>) -> MutexGuard<'_, T> {
    plan.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resizes `image` to fit an `input_size` square, anchored top-left and padded,
/// returning the NCHW tensor and the scale ratio applied.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn letterbox(image: &DynamicImage, input_size: u32) -> (Tensor, f32) {
    let (w0, h0) = image.dimensions();
    let side = input_size as f32;
    let ratio = (side / w0.max(1) as f32).min(side / h0.max(1) as f32);
    let w = ((w0 as f32 * ratio).round() as u32).clamp(1, input_size);
    let h = ((h0 as f32 * ratio).round() as u32).clamp(1, input_size);

    let resized = image.resize_exact(w, h, FilterType::Triangle).to_rgb8();
    let n = input_size as usize;
    let input = Array4::from_shape_fn((1, 3, n, n), |(_, channel, y, x)| {
        if x < w as usize && y < h as usize {
            f32::from(resized.get_pixel(x as u32, y as u32)[channel]) / 255.0
        } else {
            PAD_VALUE
        }
    });

    (input.into_tensor(), ratio)
}

/// Decodes raw YOLO predictions into person boxes in source-image coordinates.
///
/// Accepts both `[1, attrs, anchors]` and `[1, anchors, attrs]`; the smaller
/// trailing dimension is taken as the attribute axis. Only anchors whose
/// arg-max class is [`PERSON_CLASS_ID`] and whose score is strictly above
/// `confidence_threshold` are kept. Suppression is left to the caller.
///
/// # Errors
///
/// Returns [`DetectError::Model`] if the tensor is not a single-batch detection
/// head.
#[allow(clippy::cast_precision_loss)]
pub fn decode_predictions(
    output: ArrayView3<'_, f32>,
    ratio: f32,
    (width, height): (u32, u32),
    confidence_threshold: f32,
) -> Result<Vec<PersonBox>, DetectError> {
    let (batch, rows, cols) = output.dim();
    let channels_first = rows <= cols;
    let (attrs, anchors) = if channels_first {
        (rows, cols)
    } else {
        (cols, rows)
    };
    if batch != 1 || attrs <= 4 {
        return Err(DetectError::Model(format!(
            "unexpected output shape [{batch}, {rows}, {cols}]"
        )));
    }

    let at = |attr: usize, anchor: usize| {
        if channels_first {
            output[[0, attr, anchor]]
        } else {
            output[[0, anchor, attr]]
        }
    };

    let ratio = if ratio > 0.0 { ratio } else { 1.0 };
    let (max_x, max_y) = (width as f32, height as f32);
    let mut boxes = Vec::new();

    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..attrs - 4 {
            let score = at(4 + class, anchor);
            if score > best_score {
                best_class = class;
                best_score = score;
            }
        }
        if best_class != PERSON_CLASS_ID || best_score <= confidence_threshold {
            continue;
        }

        let cx = at(0, anchor) / ratio;
        let cy = at(1, anchor) / ratio;
        let w = at(2, anchor) / ratio;
        let h = at(3, anchor) / ratio;

        boxes.push(PersonBox {
            x1: (cx - w / 2.0).clamp(0.0, max_x),
            y1: (cy - h / 2.0).clamp(0.0, max_y),
            x2: (cx + w / 2.0).clamp(0.0, max_x),
            y2: (cy + h / 2.0).clamp(0.0, max_y),
            confidence: best_score,
        });
    }

    Ok(boxes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tract_onnx::prelude::tract_ndarray::Array3;

    /// Builds a channels-first `[1, 4 + nc, anchors]` tensor from anchor rows
    /// of `[cx, cy, w, h, score_0, .., score_nc-1]`.
    fn channels_first(anchors: &[Vec<f32>]) -> Array3<f32> {
        let attrs = anchors[0].len();
        Array3::from_shape_fn((1, attrs, anchors.len()), |(_, attr, anchor)| {
            anchors[anchor][attr]
        })
    }

    #[test]
    fn keeps_confident_person_anchors_only() {
        let preds = channels_first(&[
            // person, confident
            vec![100.0, 100.0, 40.0, 80.0, 0.90, 0.05, 0.01],
            // person, below threshold
            vec![300.0, 100.0, 40.0, 80.0, 0.30, 0.05, 0.01],
            // dog wins arg-max even though person score is high
            vec![500.0, 100.0, 40.0, 80.0, 0.70, 0.95, 0.01],
            // person exactly at threshold is rejected
            vec![200.0, 300.0, 40.0, 80.0, 0.50, 0.00, 0.00],
            // a padding anchor to keep attrs < anchors
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ]);

        let boxes = decode_predictions(preds.view(), 1.0, (640, 640), 0.5).expect("decode");
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert!((b.x1 - 80.0).abs() < 1e-4);
        assert!((b.y1 - 60.0).abs() < 1e-4);
        assert!((b.x2 - 120.0).abs() < 1e-4);
        assert!((b.y2 - 140.0).abs() < 1e-4);
        assert!((b.confidence - 0.90).abs() < 1e-6);
    }

    #[test]
    fn rescales_by_ratio_and_clamps_to_source() {
        let mut rows = vec![vec![10.0, 20.0, 40.0, 40.0, 0.8, 0.1]];
        rows.extend(std::iter::repeat(vec![0.0; 6]).take(7));
        let preds = channels_first(&rows);

        // Source 1280x1280 letterboxed into 640: ratio 0.5.
        let boxes = decode_predictions(preds.view(), 0.5, (1280, 1280), 0.5).expect("decode");
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert!(b.x1.abs() < 1e-4, "x1 should clamp to 0, got {}", b.x1);
        assert!((b.y1 - 0.0).abs() < 1e-4);
        assert!((b.x2 - 60.0).abs() < 1e-4);
        assert!((b.y2 - 80.0).abs() < 1e-4);
    }

    #[test]
    fn accepts_anchors_first_layout() {
        // [1, anchors=2, attrs=6] where attrs > anchors.
        let preds = Array3::from_shape_vec(
            (1, 2, 6),
            vec![
                50.0, 50.0, 20.0, 20.0, 0.9, 0.0, //
                150.0, 50.0, 20.0, 20.0, 0.1, 0.0,
            ],
        )
        .unwrap();

        let boxes = decode_predictions(preds.view(), 1.0, (640, 640), 0.5).expect("decode");
        assert_eq!(boxes.len(), 1);
        assert!((boxes[0].x1 - 40.0).abs() < 1e-4);
    }

    #[test]
    fn rejects_heads_without_class_scores() {
        let preds = Array3::<f32>::zeros((1, 4, 100));
        let err = decode_predictions(preds.view(), 1.0, (640, 640), 0.5).unwrap_err();
        assert!(matches!(err, DetectError::Model(_)));
    }

    #[test]
    fn letterbox_pads_and_reports_ratio() {
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            64,
            32,
            image::Rgb([255, 0, 0]),
        ));
        let (tensor, ratio) = letterbox(&image, 16);
        assert!((ratio - 0.25).abs() < 1e-6);
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);

        let view = tensor.to_array_view::<f32>().unwrap();
        // Top half holds the resized red image, bottom half is padding.
        assert!((view[[0, 0, 2, 2]] - 1.0).abs() < 1e-6);
        assert!(view[[0, 1, 2, 2]].abs() < 1e-6);
        assert!((view[[0, 0, 12, 2]] - PAD_VALUE).abs() < 1e-6);
    }

    #[test]
    fn load_fails_for_missing_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = YoloDetector::load(YoloConfig {
            model_path: dir.path().join("missing.onnx"),
            input_size: 640,
            confidence_threshold: 0.5,
            iou_threshold: 0.4,
            output_dir: dir.path().join("static"),
        })
        .unwrap_err();
        assert!(matches!(err, DetectError::Model(_)), "got: {err:?}");
    }

    #[test]
    fn plan_lock_survives_a_panicking_holder() {
        let plan = std::sync::Arc::new(Mutex::new(7_u32));
        let poisoner = std::sync::Arc::clone(&plan);
        let joined = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("inference blew up");
        })
        .join();
        assert!(joined.is_err());
        assert!(plan.is_poisoned());

        assert_eq!(*lock_plan(&*plan), 7);
    }
}
