//! Nearest-identity matching against the enrollment set.

use crate::types::{Descriptor, EnrolledIdentity};
use std::fmt;
use std::str::FromStr;

/// Name reported for a face that matches no enrolled identity.
pub const UNKNOWN_NAME: &str = "unknown";

/// Distance between two descriptors.
///
/// ArcFace descriptors are unit length, so euclidean distance is
/// `sqrt(2 - 2cos)` and only very close faces fall inside `1 - threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// L2 distance.
    Euclidean,
    /// `1 - cosine_similarity`.
    #[default]
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &Descriptor, b: &Descriptor) -> f64 {
        match self {
            DistanceMetric::Euclidean => a.euclidean_distance(b),
            DistanceMetric::Cosine => 1.0 - a.similarity(b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

/// Result of matching one probe descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    pub matched: bool,
    /// Enrolled name, or [`UNKNOWN_NAME`].
    pub name: String,
    /// `1 - distance` rounded to 3 places on acceptance, 0 otherwise.
    pub confidence: f64,
    /// Distance to the nearest enrolled identity, if any were enrolled.
    pub distance: Option<f64>,
}

impl FaceMatch {
    pub fn unknown(distance: Option<f64>) -> Self {
        Self {
            matched: false,
            name: UNKNOWN_NAME.to_string(),
            confidence: 0.0,
            distance,
        }
    }
}

/// Strategy for comparing a probe descriptor against the enrolled identities.
pub trait Matcher {
    fn compare(&self, probe: &Descriptor, gallery: &[EnrolledIdentity], threshold: f64) -> FaceMatch;
}

/// Linear-scan nearest neighbour with a distance acceptance radius of `1 - threshold`.
///
/// Ties go to the identity enrolled first.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestMatcher {
    pub metric: DistanceMetric,
}

impl NearestMatcher {
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric }
    }
}

impl Matcher for NearestMatcher {
    fn compare(&self, probe: &Descriptor, gallery: &[EnrolledIdentity], threshold: f64) -> FaceMatch {
        let mut best: Option<(usize, f64)> = None;

        for (i, identity) in gallery.iter().enumerate() {
            let d = self.metric.distance(probe, &identity.descriptor);
            // Strict `<` keeps the first minimum.
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }

        let Some((idx, distance)) = best else {
            return FaceMatch::unknown(None);
        };

        match accept(distance, threshold) {
            Some(confidence) => FaceMatch {
                matched: true,
                name: gallery[idx].name.clone(),
                confidence,
                distance: Some(distance),
            },
            None => FaceMatch::unknown(Some(distance)),
        }
    }
}

/// Apply the acceptance rule: `distance <= 1 - threshold`.
///
/// Returns the rounded confidence on acceptance.
pub fn accept(distance: f64, threshold: f64) -> Option<f64> {
    if distance <= 1.0 - threshold {
        Some(round3(1.0 - distance))
    } else {
        None
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
