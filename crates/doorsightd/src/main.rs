use anyhow::{Context, Result};
use doorsight_core::{FaceExtractor, NearestMatcher, OnnxExtractor};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod archive;
mod config;
mod engine;
mod http;
mod store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        bind = %config.bind,
        known_faces_dir = %config.known_faces_dir.display(),
        detections_dir = %config.detections_dir.display(),
        model_dir = %config.model_dir.display(),
        threshold = config.confidence_threshold,
        metric = %config.distance_metric,
        workers = config.engine_workers,
        "doorsightd starting"
    );

    // Every worker gets its own sessions; load them all before serving.
    let extractors = (0..config.engine_workers)
        .map(|_| OnnxExtractor::load(&config.model_dir).map(|e| Box::new(e) as Box<dyn FaceExtractor>))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let engine = engine::spawn_engine(extractors).context("starting engine workers")?;

    let store = Arc::new(store::EnrollmentStore::new(&config.known_faces_dir));
    store.reload(&engine).await.context("loading known faces")?;

    let archiver = archive::Archiver::new(&config.detections_dir)
        .with_context(|| format!("preparing {}", config.detections_dir.display()))?;

    let archive_dir = archiver.dir().to_path_buf();
    let engine_workers = engine.workers();

    let state = Arc::new(http::AppState {
        store: Arc::clone(&store),
        engine,
        archiver,
        matcher: NearestMatcher::new(config.distance_metric),
        threshold: config.confidence_threshold,
    });
    let app = http::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(
        addr = %config.bind,
        known_faces = store.len(),
        enrollment_dir = %store.dir().display(),
        archive_dir = %archive_dir.display(),
        workers = engine_workers,
        "doorsightd ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("doorsightd shutting down");
        })
        .await?;

    Ok(())
}
