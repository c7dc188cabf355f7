//! Scratch storage for uploaded videos.

use crate::config;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Name used when the client sends no usable filename
const FALLBACK_FILENAME: &str = "upload.bin";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to create scratch directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write upload {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Live [`Upload`] handles per scratch path
type Holders = Arc<Mutex<HashMap<PathBuf, usize>>>;

/// Directory uploads are written into.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
    keep_files: bool,
    holders: Holders,
}

impl ScratchDir {
    /// Scratch storage rooted at `root`, resolved against the working
    /// directory. With `keep_files` unset, a scratch file is removed once the
    /// last [`Upload`] handle for its path is dropped.
    pub fn new(root: impl AsRef<Path>, keep_files: bool) -> Self {
        Self {
            root: config::absolute(root),
            keep_files,
            holders: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an upload named `filename` is stored at.
    ///
    /// Only the final component of `filename` is used, so the same name
    /// always maps to the same file inside the scratch directory.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.root.join(sanitize_filename(filename))
    }

    /// Write `bytes` to the scratch file for `filename`, replacing any
    /// earlier upload of the same name. Creates the directory on first use.
    pub async fn ingest(&self, filename: &str, bytes: &[u8]) -> Result<Upload, UploadError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| UploadError::CreateDir {
                path: self.root.clone(),
                source,
            })?;

        // Claimed before writing so a finishing request cannot remove the
        // file between our write and our use of it
        let upload = self.claim(filename);
        tokio::fs::write(&upload.path, bytes)
            .await
            .map_err(|source| UploadError::Write {
                path: upload.path.clone(),
                source,
            })?;

        debug!("Stored {} bytes at {}", bytes.len(), upload.path.display());
        Ok(upload)
    }

    /// Number of live handles for the scratch file of `filename`.
    pub fn holders(&self, filename: &str) -> usize {
        let path = self.path_for(filename);
        self.holders.lock().get(&path).copied().unwrap_or(0)
    }

    fn claim(&self, filename: &str) -> Upload {
        let path = self.path_for(filename);
        *self.holders.lock().entry(path.clone()).or_insert(0) += 1;
        Upload {
            filename: filename.to_string(),
            path,
            remove_on_drop: !self.keep_files,
            holders: self.holders.clone(),
        }
    }
}

/// An ingested file, valid while this handle lives.
///
/// Uploads of the same name share one path; the file is removed only when
/// the last handle for that path goes away.
#[derive(Debug)]
pub struct Upload {
    filename: String,
    path: PathBuf,
    remove_on_drop: bool,
    holders: Holders,
}

impl Upload {
    /// Filename as sent by the client
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Absolute on-disk location
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Upload {
    fn drop(&mut self) {
        // Held across the removal so a concurrent claim sees either the
        // file or a fresh count
        let mut holders = self.holders.lock();
        let remaining = match holders.get_mut(&self.path) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining > 0 {
            debug!(
                "Upload {} still held by {} request(s)",
                self.path.display(),
                remaining
            );
            return;
        }
        holders.remove(&self.path);

        if !self.remove_on_drop {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed upload {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove upload {}: {}", self.path.display(), e),
        }
    }
}

fn sanitize_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string())
}
