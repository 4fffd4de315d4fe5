//! Detection archive: every processed snapshot is kept verbatim next to a
//! JSON sidecar describing what was recognized in it.
//!
//! Names are `detection_<YYYYmmdd_HHMMSS>_<n>faces.jpg` and
//! `detection_<YYYYmmdd_HHMMSS>_<n>faces_metadata.json`. Two requests that
//! finish in the same second with the same face count write the same pair,
//! and the later one wins. Nothing is ever pruned.

use axum::body::Bytes;
use chrono::{DateTime, Local};
use doorsight_core::RecognizedFace;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode detection metadata: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("archive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// JSON sidecar written alongside each archived snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// RFC 3339 local time the snapshot was archived.
    pub timestamp: String,
    /// File name of the archived image.
    pub filename: String,
    pub faces_detected: usize,
    pub results: Vec<RecognizedFace>,
}

#[derive(Debug, Clone)]
pub struct Archiver {
    dir: PathBuf,
}

impl Archiver {
    /// Archive into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive on the blocking pool, stamped with the current local time.
    pub async fn archive(&self, image: Bytes, results: Vec<RecognizedFace>) -> Result<String, ArchiveError> {
        let archiver = self.clone();
        tokio::task::spawn_blocking(move || archiver.archive_at(&image, &results, Local::now())).await?
    }

    /// Write the metadata sidecar and the raw image; returns the image file name.
    ///
    /// On failure neither file is left behind for this stem.
    pub fn archive_at(
        &self,
        image: &[u8],
        results: &[RecognizedFace],
        at: DateTime<Local>,
    ) -> Result<String, ArchiveError> {
        let stem = format!("detection_{}_{}faces", at.format("%Y%m%d_%H%M%S"), results.len());
        let filename = format!("{stem}.jpg");
        let sidecar = self.dir.join(format!("{stem}_metadata.json"));

        let record = DetectionRecord {
            timestamp: at.to_rfc3339(),
            filename: filename.clone(),
            faces_detected: results.len(),
            results: results.to_vec(),
        };
        let metadata = serde_json::to_vec_pretty(&record)?;

        fs::create_dir_all(&self.dir)?;
        fs::write(&sidecar, metadata)?;
        if let Err(err) = fs::write(self.dir.join(&filename), image) {
            if let Err(cleanup) = fs::remove_file(&sidecar) {
                tracing::warn!(path = %sidecar.display(), error = %cleanup, "cannot remove orphaned sidecar");
            }
            return Err(err.into());
        }

        tracing::debug!(dir = %self.dir.display(), %filename, "archived detection");
        Ok(filename)
    }
}
