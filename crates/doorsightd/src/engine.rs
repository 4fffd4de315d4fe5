use axum::body::Bytes;
use doorsight_core::{load_enrollment, DetectedFace, EnrollmentError, EnrollmentSet, ExtractError, FaceExtractor};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cannot decode image: {0}")]
    DecodeFailed(String),
    #[error("face extraction failed: {0}")]
    ExtractionFailed(String),
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no extractors supplied")]
    NoWorkers,
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<ExtractError> for EngineError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Decode(e) => EngineError::DecodeFailed(e.to_string()),
            other => EngineError::ExtractionFailed(other.to_string()),
        }
    }
}

/// Messages sent from HTTP handlers to the engine workers.
enum EngineRequest {
    Extract {
        image: Bytes,
        reply: oneshot::Sender<Result<Vec<DetectedFace>, EngineError>>,
    },
    LoadEnrollment {
        dir: PathBuf,
        reply: oneshot::Sender<Result<EnrollmentSet, EngineError>>,
    },
}

/// Clone-safe handle to the engine workers.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    workers: usize,
}

impl EngineHandle {
    /// Find and describe every face in an encoded image.
    pub async fn extract(&self, image: Bytes) -> Result<Vec<DetectedFace>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Extract { image, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Build a fresh enrollment set from `dir`.
    pub async fn load_enrollment(&self, dir: PathBuf) -> Result<EnrollmentSet, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::LoadEnrollment { dir, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    async fn send(&self, req: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(req).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn one OS thread per extractor, all fed from a shared request queue.
///
/// Extractors are built by the caller so model loading fails before any
/// thread starts. Workers exit once every handle is dropped.
pub fn spawn_engine(extractors: Vec<Box<dyn FaceExtractor>>) -> Result<EngineHandle, EngineError> {
    if extractors.is_empty() {
        return Err(EngineError::NoWorkers);
    }

    let workers = extractors.len();
    let (tx, rx) = mpsc::channel::<EngineRequest>(QUEUE_DEPTH);
    let rx = Arc::new(Mutex::new(rx));

    for (id, mut extractor) in extractors.into_iter().enumerate() {
        let rx = Arc::clone(&rx);
        std::thread::Builder::new()
            .name(format!("doorsight-engine-{id}"))
            .spawn(move || {
                tracing::info!(worker = id, "engine worker started");
                loop {
                    // Lock only while waiting; the request runs unlocked.
                    let next = rx.lock().unwrap_or_else(PoisonError::into_inner).blocking_recv();
                    let Some(req) = next else { break };
                    handle(req, extractor.as_mut());
                }
                tracing::info!(worker = id, "engine worker exiting");
            })?;
    }

    Ok(EngineHandle { tx, workers })
}

fn handle(req: EngineRequest, extractor: &mut dyn FaceExtractor) {
    match req {
        EngineRequest::Extract { image, reply } => {
            let result = extractor.extract(&image).map_err(EngineError::from);
            if let Err(err) = &result {
                tracing::debug!(error = %err, bytes = image.len(), "extraction failed");
            }
            let _ = reply.send(result);
        }
        EngineRequest::LoadEnrollment { dir, reply } => {
            let result = load_enrollment(&dir, extractor).map_err(EngineError::from);
            let _ = reply.send(result);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::stub::StubExtractor;
    use super::*;

    fn engine(stub: StubExtractor, workers: usize) -> EngineHandle {
        let extractors = (0..workers)
            .map(|_| Box::new(stub.clone()) as Box<dyn FaceExtractor>)
            .collect();
        spawn_engine(extractors).unwrap()
    }

    #[tokio::test]
    async fn test_extract_returns_faces_in_order() {
        let handle = engine(StubExtractor::default().with(b"two", &[&[1.0], &[2.0]]), 1);
        let faces = handle.extract(Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].descriptor.values, vec![1.0]);
        assert_eq!(faces[1].descriptor.values, vec![2.0]);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_map_to_decode_failed() {
        let handle = engine(StubExtractor::default(), 1);
        let err = handle.extract(Bytes::from_static(b"garbage")).await.unwrap_err();
        assert!(matches!(err, EngineError::DecodeFailed(_)), "{err}");
    }

    #[tokio::test]
    async fn test_load_enrollment_runs_on_worker() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("alice.jpg"), b"alice-ref").unwrap();
        let handle = engine(StubExtractor::default().with(b"alice-ref", &[&[0.0, 1.0]]), 1);

        let set = handle.load_enrollment(tmp.path().to_path_buf()).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.identities()[0].name, "alice");
    }

    #[tokio::test]
    async fn test_multiple_workers_serve_concurrent_requests() {
        let handle = engine(StubExtractor::default().with(b"one", &[&[1.0]]), 3);
        assert_eq!(handle.workers(), 3);

        let jobs: Vec<_> = (0..12)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move { h.extract(Bytes::from_static(b"one")).await })
            })
            .collect();
        for job in jobs {
            assert_eq!(job.await.unwrap().unwrap().len(), 1);
        }
    }

    #[test]
    fn test_no_extractors_is_an_error() {
        assert!(matches!(spawn_engine(Vec::new()), Err(EngineError::NoWorkers)));
    }
}
