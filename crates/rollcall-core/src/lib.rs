//! rollcall-core — Face detection, embedding, and matching engine.
//!
//! Uses a YOLO face detector and a FaceNet embedder, both running via ONNX
//! Runtime for CPU inference. Matching is nearest-neighbor over Euclidean
//! distance with a fixed rejection threshold.

pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use detector::{Detector, DetectorError, YoloFaceDetector};
pub use extractor::{ExtractError, FaceExtractor, FaceOutcome, FaceStatus, Recognition};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use recognizer::{FaceNetRecognizer, Recognizer, RecognizerError};
pub use types::{BoundingBox, Embedding, Enrollment, PixelRect, UNKNOWN_IDENTITY};
