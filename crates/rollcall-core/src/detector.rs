//! YOLO face detector via ONNX Runtime.
//!
//! Runs a single-class YOLO face model (e.g. yolov8n-face exported to ONNX)
//! on a letterboxed RGB frame, decodes the dense prediction tensor, and
//! applies NMS post-processing.

use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const YOLO_INPUT_SIZE: usize = 640;
const YOLO_PAD_VALUE: f32 = 114.0;
const YOLO_SCALE: f32 = 255.0;
const YOLO_CONFIDENCE_THRESHOLD: f32 = 0.5;
const YOLO_NMS_THRESHOLD: f32 = 0.45;
/// cx, cy, w, h precede the face score in every prediction.
const YOLO_SCORE_CHANNEL: usize = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — export a YOLO face model to ONNX and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that can find face regions in an RGB frame.
///
/// An empty result means "no faces", not failure.
pub trait Detector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// YOLO-based face detector.
pub struct YoloFaceDetector {
    session: Session,
    input_size: usize,
    confidence_threshold: f32,
}

impl YoloFaceDetector {
    /// Load the YOLO face ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded YOLO face model"
        );

        Ok(Self {
            session,
            input_size: YOLO_INPUT_SIZE,
            confidence_threshold: YOLO_CONFIDENCE_THRESHOLD,
        })
    }
}

impl Detector for YoloFaceDetector {
    /// Detect faces, returning boxes in source pixel space sorted by confidence.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let threshold = self.confidence_threshold;
        let (input, letterbox) = letterbox(image, self.input_size);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("predictions: {e}")))?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        let candidates = decode_predictions(&dims, data, &letterbox, threshold, width, height)?;
        let candidate_count = candidates.len();

        let mut result = nms(candidates, YOLO_NMS_THRESHOLD);
        result.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::debug!(candidates = candidate_count, faces = result.len(), "YOLO detection");
        Ok(result)
    }
}

/// Resize `image` to fit a square `size` canvas preserving aspect ratio, pad
/// with gray, and lay it out as a NCHW float tensor scaled to [0, 1].
fn letterbox(image: &RgbImage, size: usize) -> (Array4<f32>, LetterboxInfo) {
    let (width, height) = image.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);

    let new_w = ((width as f32 * scale).round() as usize).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as usize).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = imageops::resize(image, new_w as u32, new_h as u32, FilterType::Triangle);

    let mut tensor = Array4::<f32>::from_elem((1, 3, size, size), YOLO_PAD_VALUE / YOLO_SCALE);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + pad_x, y as usize + pad_y);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = pixel.0[c] as f32 / YOLO_SCALE;
        }
    }

    let info = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    };
    (tensor, info)
}

/// Decode the raw YOLO prediction tensor into boxes in source-image space.
///
/// Accepts both `[1, channels, anchors]` (the default ultralytics export) and
/// the transposed `[1, anchors, channels]` layout. Anything after the score
/// channel (e.g. keypoints) is ignored.
fn decode_predictions(
    shape: &[i64],
    data: &[f32],
    letterbox: &LetterboxInfo,
    threshold: f32,
    image_width: u32,
    image_height: u32,
) -> Result<Vec<BoundingBox>, DetectorError> {
    if shape.len() != 3 || shape.iter().any(|&d| d <= 0) {
        return Err(DetectorError::InferenceFailed(format!(
            "expected a [1, C, N] prediction tensor, got {shape:?}"
        )));
    }

    let (a, b) = (shape[1] as usize, shape[2] as usize);
    // Anchor count is always far larger than the channel count.
    let (channels, anchors, channels_first) = if a <= b { (a, b, true) } else { (b, a, false) };

    if channels <= YOLO_SCORE_CHANNEL {
        return Err(DetectorError::InferenceFailed(format!(
            "prediction tensor has {channels} channels, need at least {}",
            YOLO_SCORE_CHANNEL + 1
        )));
    }
    if data.len() < channels * anchors {
        return Err(DetectorError::InferenceFailed(format!(
            "prediction tensor holds {} values, shape {shape:?} needs {}",
            data.len(),
            channels * anchors
        )));
    }

    let at = |anchor: usize, channel: usize| {
        if channels_first {
            data[channel * anchors + anchor]
        } else {
            data[anchor * channels + channel]
        }
    };

    let max_x = image_width as f32;
    let max_y = image_height as f32;
    let mut detections = Vec::new();

    for anchor in 0..anchors {
        let score = at(anchor, YOLO_SCORE_CHANNEL);
        if score <= threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3));

        // Map from letterboxed space to original frame space
        let x1 = ((cx - w / 2.0 - letterbox.pad_x) / letterbox.scale).clamp(0.0, max_x);
        let y1 = ((cy - h / 2.0 - letterbox.pad_y) / letterbox.scale).clamp(0.0, max_y);
        let x2 = ((cx + w / 2.0 - letterbox.pad_x) / letterbox.scale).clamp(0.0, max_x);
        let y2 = ((cy + h / 2.0 - letterbox.pad_y) / letterbox.scale).clamp(0.0, max_y);

        detections.push(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
        });
    }

    Ok(detections)
}

/// Non-Maximum Suppression: remove overlapping detections.
fn nms(mut detections: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i]);

        for j in (i + 1)..detections.len() {
            if !suppressed[j] && iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Compute Intersection-over-Union between two bounding boxes.
fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}
