use doorsight_core::DistanceMetric;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_THRESHOLD: f64 = 0.6;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen address (default: 0.0.0.0:5001).
    pub bind: SocketAddr,
    /// One reference image per known identity; stem = name.
    pub known_faces_dir: PathBuf,
    /// Where snapshots and their metadata sidecars are archived.
    pub detections_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Match acceptance threshold; a match needs `distance <= 1 - threshold`.
    pub confidence_threshold: f64,
    pub distance_metric: DistanceMetric,
    /// Extraction worker threads, each with its own model sessions.
    pub engine_workers: usize,
    /// Request body limit for uploads.
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            known_faces_dir: PathBuf::from("./known_faces"),
            detections_dir: PathBuf::from("./detections"),
            model_dir: doorsight_core::default_model_dir(),
            confidence_threshold: DEFAULT_THRESHOLD,
            distance_metric: DistanceMetric::default(),
            engine_workers: 1,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    /// Load configuration from `DOORSIGHT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let distance_metric = match get("DOORSIGHT_DISTANCE_METRIC") {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                tracing::warn!(%err, fallback = %defaults.distance_metric, "ignoring DOORSIGHT_DISTANCE_METRIC");
                defaults.distance_metric
            }),
            None => defaults.distance_metric,
        };

        Self {
            bind: parsed(&get, "DOORSIGHT_BIND", defaults.bind),
            known_faces_dir: get("DOORSIGHT_KNOWN_FACES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.known_faces_dir),
            detections_dir: get("DOORSIGHT_DETECTIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.detections_dir),
            model_dir: get("DOORSIGHT_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            confidence_threshold: parsed(&get, "DOORSIGHT_CONFIDENCE_THRESHOLD", defaults.confidence_threshold),
            distance_metric,
            engine_workers: parsed(&get, "DOORSIGHT_ENGINE_WORKERS", defaults.engine_workers).max(1),
            max_upload_bytes: parsed(&get, "DOORSIGHT_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5001))
}

fn parsed<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
