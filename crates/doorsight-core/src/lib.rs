//! doorsight-core — face detection, descriptors and identity matching.
//!
//! Uses SCRFD for face detection and ArcFace for descriptors, both via
//! ONNX Runtime on the CPU. Matching is a linear nearest-neighbour scan
//! over the enrolled identities.

pub mod alignment;
pub mod detector;
pub mod enrollment;
pub mod extractor;
pub mod matcher;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use enrollment::{load_enrollment, EnrollmentError, EnrollmentSet, SkipReason};
pub use extractor::{decode_rgb, DetectedFace, ExtractError, FaceExtractor, OnnxExtractor};
pub use matcher::{DistanceMetric, FaceMatch, Matcher, NearestMatcher, UNKNOWN_NAME};
pub use types::{BoundingBox, Descriptor, EnrolledIdentity, FaceLocation, RecognizedFace};

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/doorsight/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("doorsight/models")
}
