//! Image bytes in, face regions and descriptors out.

use crate::alignment;
use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Descriptor};
use crate::{DETECTOR_MODEL_FILE, RECOGNIZER_MODEL_FILE};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// One face found in an image.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub descriptor: Descriptor,
}

/// Anything that can find faces in an encoded image and describe them.
///
/// Faces come back in the order the implementation reports them; callers
/// do not re-sort.
pub trait FaceExtractor: Send {
    fn extract(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError>;
}

/// Decode any format the `image` crate understands into RGB.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// SCRFD + ArcFace extractor backed by ONNX Runtime.
pub struct OnnxExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxExtractor {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceExtractor for OnnxExtractor {
    fn extract(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError> {
        let rgb = decode_rgb(image)?;
        let boxes = self.detector.detect(&rgb)?;
        tracing::debug!(width = rgb.width(), height = rgb.height(), faces = boxes.len(), "detected");

        boxes
            .into_iter()
            .map(|bbox| -> Result<DetectedFace, ExtractError> {
                let landmarks = bbox.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
                let aligned = alignment::align_face(&rgb, landmarks);
                let descriptor = self.recognizer.describe(&aligned)?;
                Ok(DetectedFace { bbox, descriptor })
            })
            .collect()
    }
}
