//! FaceNet face embedder via ONNX Runtime.
//!
//! Extracts 512-dimensional embeddings from 160×160 face crops produced by
//! [`prepare_face`](crate::preprocess::prepare_face), using a Keras FaceNet
//! model exported to ONNX (NHWC input).

use crate::preprocess::{ChannelOrder, FACE_INPUT_SIZE};
use crate::types::Embedding;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const FACENET_INPUT_SIZE: usize = FACE_INPUT_SIZE as usize;
const FACENET_EMBEDDING_DIM: usize = 512;
const FACENET_MODEL_VERSION: &str = "facenet512";
/// Channel order the Keras FaceNet weights were trained on.
pub const FACENET_CHANNEL_ORDER: ChannelOrder = ChannelOrder::Rgb;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} — export FaceNet to ONNX and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop must be {expected}×{expected}, got {width}×{height}")]
    BadInputSize { expected: u32, width: u32, height: u32 },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that turns a prepared face crop into an embedding.
pub trait Recognizer {
    /// Channel order [`embed`](Self::embed) expects its crop in.
    fn channel_order(&self) -> ChannelOrder;

    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, RecognizerError>;
}

/// FaceNet-based face embedder.
pub struct FaceNetRecognizer {
    session: Session,
}

impl FaceNetRecognizer {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }

    /// Standardize a 160×160 crop into a NHWC float tensor.
    ///
    /// Per-image whitening: `(x - mean) / max(std, 1/sqrt(N))` over all
    /// channel values, matching how the Keras weights were trained.
    fn preprocess(face: &RgbImage) -> Array4<f32> {
        let size = FACENET_INPUT_SIZE;
        let raw = face.as_raw();
        let n = raw.len().max(1) as f64;

        let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = raw.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt().max(1.0 / n.sqrt()) as f32;
        let mean = mean as f32;

        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
        for (x, y, pixel) in face.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = (pixel.0[c] as f32 - mean) / std;
            }
        }

        tensor
    }
}

impl Recognizer for FaceNetRecognizer {
    fn channel_order(&self) -> ChannelOrder {
        FACENET_CHANNEL_ORDER
    }

    fn embed(&mut self, face: &RgbImage) -> Result<Embedding, RecognizerError> {
        let (width, height) = face.dimensions();
        if width != FACE_INPUT_SIZE || height != FACE_INPUT_SIZE {
            return Err(RecognizerError::BadInputSize {
                expected: FACE_INPUT_SIZE,
                width,
                height,
            });
        }

        let input = Self::preprocess(face);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != FACENET_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {FACENET_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: Some(FACENET_MODEL_VERSION.to_string()),
        })
    }
}

/// Scale to unit length; the zero vector is returned unchanged.
fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_output_shape() {
        let face = RgbImage::from_pixel(160, 160, Rgb([128, 128, 128]));
        let tensor = FaceNetRecognizer::preprocess(&face);
        assert_eq!(tensor.shape(), &[1, FACENET_INPUT_SIZE, FACENET_INPUT_SIZE, 3]);
    }

    #[test]
    fn test_preprocess_uniform_is_zero() {
        let face = RgbImage::from_pixel(160, 160, Rgb([90, 90, 90]));
        let tensor = FaceNetRecognizer::preprocess(&face);
        assert!(tensor.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_preprocess_standardizes() {
        let face = RgbImage::from_fn(160, 160, |x, y| {
            let v = if (x + y) % 2 == 0 { 0 } else { 200 };
            Rgb([v, v, v])
        });
        let tensor = FaceNetRecognizer::preprocess(&face);
        let n = tensor.len() as f32;
        let mean = tensor.iter().sum::<f32>() / n;
        let var = tensor.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        assert!(mean.abs() < 1e-4, "mean = {mean}");
        assert!((var - 1.0).abs() < 1e-3, "var = {var}");
        // Checkerboard: dark pixels map to -1, bright to +1
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-4);
        assert!((tensor[[0, 0, 1, 2]] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_preprocess_keeps_channel_positions() {
        let face = RgbImage::from_pixel(160, 160, Rgb([0, 100, 200]));
        let tensor = FaceNetRecognizer::preprocess(&face);
        assert!(tensor[[0, 5, 5, 0]] < tensor[[0, 5, 5, 1]]);
        assert!(tensor[[0, 5, 5, 1]] < tensor[[0, 5, 5, 2]]);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
