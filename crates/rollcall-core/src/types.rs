use serde::{Deserialize, Serialize};

/// Identity reported for a face that matched no enrolled student.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Bounding box for a detected face, in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Integer pixel rectangle, already clamped to the image it was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Truncate to integer corners and clamp to an `image_width` × `image_height` frame.
    ///
    /// Returns `None` when the clamped rectangle has zero area. Coordinates must
    /// be finite; callers check [`is_finite`](Self::is_finite) first.
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> Option<PixelRect> {
        let clamp = |v: f32, max: u32| (v.trunc() as i64).clamp(0, max as i64) as u32;

        let x1 = clamp(self.x, image_width);
        let y1 = clamp(self.y, image_height);
        let x2 = clamp(self.x + self.width, image_width);
        let y2 = clamp(self.y + self.height, image_height);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(PixelRect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}

/// Face embedding vector (512-dimensional for FaceNet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "facenet512").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Vectors of different length never match: the distance is infinite.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Element-wise arithmetic mean of a set of embeddings.
    ///
    /// Returns `None` for an empty set or when dimensions disagree. The model
    /// version is kept only if every input agrees on it.
    pub fn mean(embeddings: &[Embedding]) -> Option<Embedding> {
        let first = embeddings.first()?;
        let dim = first.dim();
        if embeddings.iter().any(|e| e.dim() != dim) {
            return None;
        }

        let mut sum = vec![0.0f64; dim];
        for e in embeddings {
            for (acc, v) in sum.iter_mut().zip(&e.values) {
                *acc += *v as f64;
            }
        }
        let n = embeddings.len() as f64;
        let values = sum.into_iter().map(|s| (s / n) as f32).collect();

        let model_version = first
            .model_version
            .clone()
            .filter(|v| embeddings.iter().all(|e| e.model_version.as_deref() == Some(v)));

        Some(Embedding {
            values,
            model_version,
        })
    }
}

/// An enrolled student: identity key plus ordered reference embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Identity key, conventionally `"Name (ID)"`.
    pub identity: String,
    pub references: Vec<Embedding>,
    /// RFC 3339 timestamp of enrollment.
    pub created_at: String,
}
