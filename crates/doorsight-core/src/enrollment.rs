//! Known-face enrollment from a directory of reference images.
//!
//! Each image whose stem names an identity contributes the descriptor of the
//! first face the extractor reports. Files that cannot be read or contain no
//! face are skipped and logged; they never abort the load.

use crate::extractor::{ExtractError, FaceExtractor};
use crate::types::EnrolledIdentity;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File extensions considered reference images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("cannot create enrollment directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("cannot list enrollment directory {path}: {source}")]
    ReadDir { path: PathBuf, source: std::io::Error },
}

/// Why a reference image was left out of the enrollment set.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("unreadable: {0}")]
    Unreadable(std::io::Error),
    #[error("{0}")]
    Extraction(#[from] ExtractError),
    #[error("no face found")]
    NoFaceExtracted,
    #[error("file stem is not valid UTF-8")]
    BadName,
}

#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Immutable snapshot of the known identities, in load order.
#[derive(Debug, Default)]
pub struct EnrollmentSet {
    identities: Vec<EnrolledIdentity>,
    skipped: Vec<SkippedFile>,
}

impl EnrollmentSet {
    pub fn from_identities(identities: Vec<EnrolledIdentity>) -> Self {
        Self { identities, skipped: Vec::new() }
    }

    pub fn identities(&self) -> &[EnrolledIdentity] {
        &self.identities
    }

    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// True if `path` has one of [`IMAGE_EXTENSIONS`].
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Load every reference image in `dir`, creating the directory if it is missing.
///
/// Files are visited in lexicographic path order so repeated loads of an
/// unchanged directory produce the same set in the same order.
pub fn load_enrollment(dir: &Path, extractor: &mut dyn FaceExtractor) -> Result<EnrollmentSet, EnrollmentError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| EnrollmentError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        tracing::info!(dir = %dir.display(), "created enrollment directory");
    }

    let entries = fs::read_dir(dir).map_err(|source| EnrollmentError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        // Broken symlinks stay in so they are reported as unreadable.
        .filter(|path| !path.is_dir() && is_image_path(path))
        .collect();
    candidates.sort();

    let mut set = EnrollmentSet::default();
    for path in candidates {
        match enroll_file(&path, extractor) {
            Ok(identity) => {
                if set.identities.iter().any(|known| known.name == identity.name) {
                    tracing::warn!(name = %identity.name, path = %path.display(), "duplicate identity name; keeping both");
                }
                tracing::debug!(name = %identity.name, "enrolled");
                set.identities.push(identity);
            }
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "skipping reference image");
                set.skipped.push(SkippedFile { path, reason });
            }
        }
    }

    tracing::info!(
        dir = %dir.display(),
        enrolled = set.identities.len(),
        skipped = set.skipped.len(),
        "enrollment loaded"
    );
    Ok(set)
}

fn enroll_file(path: &Path, extractor: &mut dyn FaceExtractor) -> Result<EnrolledIdentity, SkipReason> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or(SkipReason::BadName)?
        .to_string();
    let bytes = fs::read(path).map_err(SkipReason::Unreadable)?;

    // Only the first face counts; extra faces in a reference image are ignored.
    let face = extractor
        .extract(&bytes)?
        .into_iter()
        .next()
        .ok_or(SkipReason::NoFaceExtracted)?;

    Ok(EnrolledIdentity { name, descriptor: face.descriptor })
}
