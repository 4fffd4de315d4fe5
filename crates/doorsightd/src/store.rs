use crate::engine::{EngineError, EngineHandle};
use doorsight_core::EnrollmentSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

/// The live enrollment set: an immutable snapshot that `reload` swaps wholesale.
///
/// Readers take a cheap `Arc` clone and match without holding any lock.
pub struct EnrollmentStore {
    dir: PathBuf,
    current: RwLock<Arc<EnrollmentSet>>,
    writer: Mutex<()>,
}

impl EnrollmentStore {
    /// An empty store for `dir`. Call [`reload`](Self::reload) to populate it.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_set(dir, EnrollmentSet::default())
    }

    pub fn with_set(dir: impl Into<PathBuf>, set: EnrollmentSet) -> Self {
        Self {
            dir: dir.into(),
            current: RwLock::new(Arc::new(set)),
            writer: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot(&self) -> Arc<EnrollmentSet> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Rescan the directory and swap in the new set.
    ///
    /// Reloads are serialized. On failure the previous set stays live.
    pub async fn reload(&self, engine: &EngineHandle) -> Result<Arc<EnrollmentSet>, EngineError> {
        let _writer = self.writer.lock().await;

        let fresh = Arc::new(engine.load_enrollment(self.dir.clone()).await?);
        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, Arc::clone(&fresh))
        };

        tracing::info!(
            dir = %self.dir.display(),
            previous = previous.len(),
            known_faces = fresh.len(),
            "enrollment set swapped"
        );
        Ok(fresh)
    }
}
