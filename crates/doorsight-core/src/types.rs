use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face location in integer pixel coordinates, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub left: i64,
}

impl From<&BoundingBox> for FaceLocation {
    fn from(b: &BoundingBox) -> Self {
        Self {
            top: b.y.round().max(0.0) as i64,
            right: (b.x + b.width).round() as i64,
            bottom: (b.y + b.height).round() as i64,
            left: b.x.round().max(0.0) as i64,
        }
    }
}

/// Face descriptor (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f64>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Descriptor {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Cosine similarity in [-1, 1]. Zero-length vectors compare as 0.
    pub fn similarity(&self, other: &Descriptor) -> f64 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Euclidean (L2) distance.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// A known identity loaded from the enrollment directory.
///
/// `name` is the reference image's filename stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrolledIdentity {
    pub name: String,
    pub descriptor: Descriptor,
}

/// Per-face outcome of a recognition request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedFace {
    pub name: String,
    pub confidence: f64,
    pub location: FaceLocation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Descriptor::new(vec![1.0, 0.0, 0.0]);
        let b = Descriptor::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Descriptor::new(vec![1.0, 0.0]);
        let b = Descriptor::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-12);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_location_from_bbox() {
        let b = BoundingBox {
            x: 10.4, y: 20.6, width: 50.0, height: 60.0,
            confidence: 0.9, landmarks: None,
        };
        let loc = FaceLocation::from(&b);
        assert_eq!(loc, FaceLocation { top: 21, right: 60, bottom: 81, left: 10 });
    }

    #[test]
    fn test_location_clamps_negative_origin() {
        let b = BoundingBox {
            x: -3.0, y: -1.0, width: 10.0, height: 10.0,
            confidence: 0.9, landmarks: None,
        };
        let loc = FaceLocation::from(&b);
        assert_eq!(loc.top, 0);
        assert_eq!(loc.left, 0);
    }

    #[test]
    fn test_recognized_face_json_shape() {
        let face = RecognizedFace {
            name: "alice".into(),
            confidence: 0.7,
            location: FaceLocation { top: 1, right: 2, bottom: 3, left: 4 },
        };
        let v = serde_json::to_value(&face).unwrap();
        assert_eq!(v["name"], "alice");
        assert_eq!(v["confidence"], 0.7);
        assert_eq!(v["location"]["right"], 2);
    }
}
