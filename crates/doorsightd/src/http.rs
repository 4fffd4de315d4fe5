//! HTTP surface.
//!
//! | Method | Path        |                                              |
//! |--------|-------------|----------------------------------------------|
//! | GET    | /health     | liveness and enrollment size                 |
//! | POST   | /recognize  | multipart `file` upload, match and archive   |
//! | POST   | /reload     | rescan the known-faces directory             |

use crate::archive::{ArchiveError, Archiver};
use crate::engine::{EngineError, EngineHandle};
use crate::store::EnrollmentStore;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use doorsight_core::{FaceLocation, Matcher, NearestMatcher, RecognizedFace};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

const UPLOAD_FIELD: &str = "file";

/// Shared, read-only request state.
pub struct AppState {
    pub store: Arc<EnrollmentStore>,
    pub engine: EngineHandle,
    pub archiver: Archiver,
    pub matcher: NearestMatcher,
    pub threshold: f64,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No file provided")]
    MissingFile,
    #[error("{0}")]
    BadUpload(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::BadUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) | ApiError::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "rejected request");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub known_faces: usize,
    pub confidence_threshold: f64,
    pub models_preloaded: bool,
    pub distance_metric: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub success: bool,
    pub faces: Vec<RecognizedFace>,
    pub face_count: usize,
    pub saved_as: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub known_faces: usize,
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/recognize", post(recognize))
        .route("/reload", post(reload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        known_faces: state.store.len(),
        confidence_threshold: state.threshold,
        models_preloaded: true,
        distance_metric: state.matcher.metric.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn recognize(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "not a multipart upload");
        ApiError::MissingFile
    })?;
    let image = read_upload(multipart).await?;

    let detected = state.engine.extract(image.clone()).await?;
    let faces: Vec<RecognizedFace> = {
        let enrollment = state.store.snapshot();
        detected
            .iter()
            .map(|face| {
                let m = state.matcher.compare(&face.descriptor, enrollment.identities(), state.threshold);
                RecognizedFace {
                    name: m.name,
                    confidence: m.confidence,
                    location: FaceLocation::from(&face.bbox),
                }
            })
            .collect()
    };

    let saved_as = state.archiver.archive(image, faces.clone()).await?;

    tracing::info!(
        face_count = faces.len(),
        names = ?faces.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        %saved_as,
        "recognized"
    );

    Ok(Json(RecognizeResponse {
        success: true,
        face_count: faces.len(),
        faces,
        saved_as,
    }))
}

async fn reload(State(state): State<Arc<AppState>>) -> Result<Json<ReloadResponse>, ApiError> {
    let set = state.store.reload(&state.engine).await?;
    Ok(Json(ReloadResponse {
        success: true,
        known_faces: set.len(),
    }))
}

/// Pull the bytes of the `file` field; other fields are ignored.
async fn read_upload(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadUpload(e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let data = field.bytes().await.map_err(|e| ApiError::BadUpload(e.body_text()))?;
        if data.is_empty() {
            return Err(ApiError::MissingFile);
        }
        return Ok(data);
    }
    Err(ApiError::MissingFile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::engine::stub::StubExtractor;
    use axum::body::Body;
    use axum::http::{header, Request};
    use doorsight_core::{Descriptor, EnrolledIdentity, EnrollmentSet, FaceExtractor};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "doorsight-test-boundary";

    struct Harness {
        app: Router,
        detections: TempDir,
        known: TempDir,
    }

    fn harness(stub: StubExtractor, enrolled: Vec<EnrolledIdentity>) -> Harness {
        harness_with_limit(stub, enrolled, 1024 * 1024)
    }

    fn harness_with_limit(stub: StubExtractor, enrolled: Vec<EnrolledIdentity>, max_upload_bytes: usize) -> Harness {
        let detections = tempfile::tempdir().unwrap();
        let known = tempfile::tempdir().unwrap();
        let engine = spawn_engine(vec![Box::new(stub) as Box<dyn FaceExtractor>]).unwrap();
        let state = Arc::new(AppState {
            store: Arc::new(EnrollmentStore::with_set(known.path(), EnrollmentSet::from_identities(enrolled))),
            engine,
            archiver: Archiver::new(detections.path()).unwrap(),
            matcher: NearestMatcher::default(),
            threshold: 0.6,
        });
        Harness {
            app: router(state, max_upload_bytes),
            detections,
            known,
        }
    }

    fn multipart_request(field: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"snap.jpg\"\r\n").as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/recognize")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn archived(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(
            StubExtractor::default(),
            vec![EnrolledIdentity { name: "alice".into(), descriptor: Descriptor::new(vec![0.0]) }],
        );
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(h.app, req).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["known_faces"], 1);
        assert_eq!(body["confidence_threshold"], 0.6);
        assert_eq!(body["models_preloaded"], true);
        assert_eq!(body["distance_metric"], "cosine");
    }

    #[tokio::test]
    async fn test_recognize_known_face() {
        // Cosine similarity 0.7 to alice's reference.
        let seen = [0.7, 0.51f64.sqrt()];
        let h = harness(
            StubExtractor::default().with(b"snapshot", &[&seen[..]]),
            vec![EnrolledIdentity { name: "alice".into(), descriptor: Descriptor::new(vec![1.0, 0.0]) }],
        );
        let (status, body) = send(h.app, multipart_request("file", b"snapshot")).await;

        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
        assert_eq!(body["face_count"], 1);
        assert_eq!(body["faces"][0]["name"], "alice");
        assert_eq!(body["faces"][0]["confidence"], 0.7);
        assert_eq!(body["faces"][0]["location"]["left"], 10);
        assert_eq!(body["faces"][0]["location"]["top"], 20);
    }

    #[tokio::test]
    async fn test_recognize_with_empty_enrollment() {
        let h = harness(StubExtractor::default().with(b"two people", &[&[1.0], &[2.0]]), Vec::new());
        let (status, body) = send(h.app, multipart_request("file", b"two people")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["face_count"], 2);
        for face in body["faces"].as_array().unwrap() {
            assert_eq!(face["name"], "unknown");
            assert_eq!(face["confidence"], 0.0);
        }
        // Order follows the extractor.
        assert!(body["faces"][0]["location"]["left"].as_i64() < body["faces"][1]["location"]["left"].as_i64());

        let saved_as = body["saved_as"].as_str().unwrap();
        assert!(saved_as.starts_with("detection_") && saved_as.ends_with("_2faces.jpg"), "{saved_as}");

        let stem = saved_as.trim_end_matches(".jpg");
        assert_eq!(archived(&h.detections), vec![saved_as.to_string(), format!("{stem}_metadata.json")]);
        assert_eq!(std::fs::read(h.detections.path().join(saved_as)).unwrap(), b"two people");
    }

    #[tokio::test]
    async fn test_zero_faces_still_archived() {
        let h = harness(StubExtractor::default().with(b"empty porch", &[]), Vec::new());
        let (status, body) = send(h.app, multipart_request("file", b"empty porch")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["face_count"], 0);
        assert!(body["saved_as"].as_str().unwrap().ends_with("_0faces.jpg"));
        assert_eq!(archived(&h.detections).len(), 2);
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let h = harness(StubExtractor::default(), Vec::new());
        let (status, body) = send(h.app, multipart_request("attachment", b"snapshot")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, serde_json::json!({ "error": "No file provided" }));
        assert!(archived(&h.detections).is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_field() {
        let h = harness(StubExtractor::default(), Vec::new());
        let (status, body) = send(h.app, multipart_request("file", b"")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file provided");
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let h = harness(StubExtractor::default(), Vec::new());
        let req = Request::builder()
            .method("POST")
            .uri("/recognize")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send(h.app, req).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file provided");
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let big = vec![b'x'; 8 * 1024];
        let h = harness_with_limit(StubExtractor::default().with(&big, &[&[1.0]]), Vec::new(), 1024);
        let (status, body) = send(h.app, multipart_request("file", &big)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()), "{body}");
        assert!(archived(&h.detections).is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_500_and_not_archived() {
        let h = harness(StubExtractor::default(), Vec::new());
        let (status, body) = send(h.app, multipart_request("file", b"\x00garbage bytes")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("cannot decode image"), "{body}");
        assert!(archived(&h.detections).is_empty());
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_reference() {
        let h = harness(StubExtractor::default().with(b"bob-ref", &[&[1.0]]), Vec::new());
        std::fs::write(h.known.path().join("bob.jpg"), b"bob-ref").unwrap();

        let req = Request::builder().method("POST").uri("/reload").body(Body::empty()).unwrap();
        let (status, body) = send(h.app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "success": true, "known_faces": 1 }));

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (_, body) = send(h.app, req).await;
        assert_eq!(body["known_faces"], 1);
    }
}
