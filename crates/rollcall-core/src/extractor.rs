//! Detection + embedding pipeline.
//!
//! [`FaceExtractor`] owns exactly one detector and one recognizer. The same
//! instance must serve both enrollment and recognition; two separately loaded
//! embedders can disagree on scale and silently break every distance.

use crate::detector::{Detector, DetectorError};
use crate::matcher::Matcher;
use crate::preprocess::{crop, prepare_face};
use crate::recognizer::{Recognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding, Enrollment};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("malformed face region: {0}")]
    MalformedRegion(String),
}

/// What happened to one detected face during a recognition pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FaceStatus {
    Recognized { identity: String, distance: f32 },
    /// Closest enrolled student was further than the threshold.
    Unknown { distance: f32 },
    /// Zero-area region after clamping to the image.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceOutcome {
    /// 1-based position in detector output order.
    pub index: usize,
    pub region: BoundingBox,
    pub status: FaceStatus,
}

/// Outcome of matching every face in one photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub faces: Vec<FaceOutcome>,
}

impl Recognition {
    /// Number of faces the detector reported.
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Identities recognized at least once.
    pub fn present(&self) -> BTreeSet<String> {
        self.faces
            .iter()
            .filter_map(|f| match &f.status {
                FaceStatus::Recognized { identity, .. } => Some(identity.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn recognized_count(&self) -> usize {
        self.faces
            .iter()
            .filter(|f| matches!(f.status, FaceStatus::Recognized { .. }))
            .count()
    }
}

pub struct FaceExtractor<D, R> {
    detector: D,
    recognizer: R,
}

impl<D: Detector, R: Recognizer> FaceExtractor<D, R> {
    pub fn new(detector: D, recognizer: R) -> Self {
        Self {
            detector,
            recognizer,
        }
    }

    /// Face regions in `image`, best first. Empty is a valid answer.
    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError> {
        Ok(self.detector.detect(image)?)
    }

    /// Embed one face region of `image`.
    ///
    /// Returns `Ok(None)` for a region with no area inside the image; callers
    /// skip it and move on.
    pub fn extract(
        &mut self,
        image: &RgbImage,
        region: &BoundingBox,
    ) -> Result<Option<Embedding>, ExtractError> {
        if !region.is_finite() {
            return Err(ExtractError::MalformedRegion(format!("{region:?}")));
        }
        let Some(rect) = region.to_pixel_rect(image.width(), image.height()) else {
            return Ok(None);
        };

        let face = prepare_face(&crop(image, &rect), self.recognizer.channel_order());
        Ok(Some(self.recognizer.embed(&face)?))
    }

    /// Embed the highest-confidence face; `Ok(None)` if there is none usable.
    pub fn extract_primary(&mut self, image: &RgbImage) -> Result<Option<Embedding>, ExtractError> {
        let faces = self.detect(image)?;
        match faces.first() {
            Some(face) => self.extract(image, face),
            None => Ok(None),
        }
    }

    /// Detect every face in `image` and match each against `gallery`.
    ///
    /// Only a detector failure aborts the pass. A face that cannot be embedded
    /// is logged and reported as [`FaceStatus::Failed`].
    pub fn recognize<M: Matcher>(
        &mut self,
        image: &RgbImage,
        gallery: &[Enrollment],
        matcher: &M,
        threshold: f32,
    ) -> Result<Recognition, ExtractError> {
        let regions = self.detect(image)?;
        tracing::info!(faces = regions.len(), threshold, "recognition pass");

        let mut faces = Vec::with_capacity(regions.len());
        for (i, region) in regions.into_iter().enumerate() {
            let index = i + 1;
            let status = match self.extract(image, &region) {
                Ok(Some(embedding)) => {
                    let result = matcher.compare(&embedding, gallery, threshold);
                    if result.matched {
                        tracing::info!(face = index, identity = %result.identity, distance = result.distance, "recognized");
                        FaceStatus::Recognized {
                            identity: result.identity,
                            distance: result.distance,
                        }
                    } else {
                        tracing::info!(face = index, distance = result.distance, threshold, "unknown face");
                        FaceStatus::Unknown {
                            distance: result.distance,
                        }
                    }
                }
                Ok(None) => {
                    tracing::warn!(face = index, ?region, "empty face region, skipping");
                    FaceStatus::Skipped
                }
                Err(e) => {
                    tracing::error!(face = index, error = %e, "face processing failed");
                    FaceStatus::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            faces.push(FaceOutcome {
                index,
                region,
                status,
            });
        }

        Ok(Recognition { faces })
    }
}
