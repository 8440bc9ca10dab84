//! Nearest-neighbor identity matching over Euclidean distance.

use crate::types::{Embedding, Enrollment, UNKNOWN_IDENTITY};
use serde::{Deserialize, Serialize};

/// Largest Euclidean distance between unit-length FaceNet embeddings
/// accepted as the same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.8;

/// Result of matching an embedding against enrolled students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Matched identity, or [`UNKNOWN_IDENTITY`] on rejection.
    pub identity: String,
    /// Distance to the closest reference found, even when rejected.
    /// Infinite when there was nothing to compare against.
    pub distance: f32,
}

impl MatchResult {
    fn unknown(distance: f32) -> Self {
        Self {
            matched: false,
            identity: UNKNOWN_IDENTITY.to_string(),
            distance,
        }
    }
}

/// Strategy for comparing an embedding against enrolled students.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &[Enrollment], threshold: f32) -> MatchResult;
}

/// Euclidean nearest-neighbor matcher.
///
/// Each identity is scored by its closest reference embedding. The best
/// identity overall wins if its distance is at most `threshold`. Ties keep
/// the identity that appears first in the gallery.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Embedding, gallery: &[Enrollment], threshold: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, enrollment) in gallery.iter().enumerate() {
            let dist = enrollment
                .references
                .iter()
                .map(|r| query.euclidean_distance(r))
                .fold(f32::INFINITY, f32::min);

            tracing::trace!(identity = %enrollment.identity, distance = dist, "candidate distance");

            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= threshold => MatchResult {
                matched: true,
                identity: gallery[idx].identity.clone(),
                distance: best_dist,
            },
            _ => MatchResult::unknown(best_dist),
        }
    }
}
