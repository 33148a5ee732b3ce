//! Staging area for fabricated artifacts
//!
//! Every payload is written to a per-run directory before it is uploaded.
//! The directory is removed by [`StagingArea::cleanup`], or by `Drop` when
//! the run ends any other way (error, panic, cancelled task).
//!
//! # Example
//!
//! ```no_run
//! use upload_verifier::fabricate::StagingArea;
//! use bytes::Bytes;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let staging = StagingArea::create(None)?;
//! let staged = staging.stage("test-cv.pdf", Bytes::from("%PDF-1.4"))?;
//!
//! println!("File: {:?}", staged.path());
//! println!("SHA256: {}", staged.content_hash());
//! staging.cleanup()?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Staging errors
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Failed to create staging directory {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("Failed to write staged file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to remove staging directory {path}: {source}")]
    Cleanup { path: PathBuf, source: io::Error },
}

/// Per-run directory holding fabricated payloads
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
    counter: AtomicUsize,
    removed: bool,
}

/// A fabricated payload written to the staging area
#[derive(Debug, Clone)]
pub struct StagedArtifact {
    path: PathBuf,
    file_name: String,
    size: u64,
    content_hash: String,
}

impl StagingArea {
    /// Create a fresh staging directory under `parent` (system temp dir if `None`)
    pub fn create(parent: Option<&Path>) -> Result<Self, StagingError> {
        let parent = parent
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let root = parent.join(format!("upload-verifier-{}", uuid::Uuid::new_v4()));

        fs::create_dir_all(&root).map_err(|source| StagingError::Create {
            path: root.clone(),
            source,
        })?;
        tracing::debug!(path = %root.display(), "Created staging area");

        Ok(Self {
            root,
            counter: AtomicUsize::new(0),
            removed: false,
        })
    }

    /// Directory holding the staged files
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` to the staging area.
    ///
    /// `file_name` is the name reported to the API; on disk each file gets a
    /// unique prefix so identical display names never collide.
    pub fn stage(&self, file_name: &str, data: Bytes) -> Result<StagedArtifact, StagingError> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let on_disk = file_name.replace(['/', '\\'], "_");
        let path = self.root.join(format!("{seq:03}-{on_disk}"));

        let write = || -> io::Result<()> {
            let mut file = File::create(&path)?;
            file.write_all(&data)?;
            file.flush()
        };
        write().map_err(|source| StagingError::Write {
            path: path.clone(),
            source,
        })?;

        Ok(StagedArtifact {
            path,
            file_name: file_name.to_string(),
            size: data.len() as u64,
            content_hash: compute_sha256(&data),
        })
    }

    /// Number of files currently on disk in the staging area
    pub fn file_count(&self) -> usize {
        fs::read_dir(&self.root)
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or(0)
    }

    /// Remove the staging directory and everything in it
    pub fn cleanup(mut self) -> Result<(), StagingError> {
        self.removed = true;
        remove_root(&self.root).map_err(|source| StagingError::Cleanup {
            path: self.root.clone(),
            source,
        })?;
        tracing::debug!(path = %self.root.display(), "Removed staging area");
        Ok(())
    }
}

fn remove_root(root: &Path) -> io::Result<()> {
    match fs::remove_dir_all(root) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = remove_root(&self.root) {
            tracing::warn!(
                path = %self.root.display(),
                error = %e,
                "Failed to clean up staging area"
            );
        }
    }
}

impl StagedArtifact {
    /// Path of the staged file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name reported to the API
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Size of the file in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// SHA256 of the content (hex encoded)
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Read the staged bytes back for upload
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

/// Compute SHA256 hash of data
fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
