//! Session-scoped image storage.
//!
//! Each session owns at most one temporary directory. It is created on the
//! first stored image and removed at every cycle boundary and on drop, so no
//! two sessions ever share a path.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::protocol::DEFAULT_FILENAME;
use crate::error::SessionError;

const DIR_PREFIX: &str = "aether-session-";

/// An image stored for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    /// Name supplied by the client
    pub filename: String,
    /// Absolute path inside the session directory
    pub path: PathBuf,
}

/// Exclusively owned scratch directory plus the ordered image list.
#[derive(Debug, Default)]
pub struct SessionWorkspace {
    dir: Option<TempDir>,
    images: Vec<StoredImage>,
    next_seq: usize,
}

impl SessionWorkspace {
    /// Empty workspace; nothing touches the filesystem yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory backing the workspace, if one has been created.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Images stored this cycle, in upload order.
    #[must_use]
    pub fn images(&self) -> &[StoredImage] {
        &self.images
    }

    /// Paths of the stored images, in upload order.
    #[must_use]
    pub fn image_paths(&self) -> Vec<PathBuf> {
        self.images.iter().map(|img| img.path.clone()).collect()
    }

    /// Number of images stored this cycle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// True when no image has been stored this cycle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Writes `bytes` under a fresh `<seq>_<name>` path and appends it to the
    /// image list. Duplicate client names never collide.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the directory or file cannot be
    /// created.
    pub async fn store(&mut self, filename: &str, bytes: &[u8]) -> Result<PathBuf, SessionError> {
        let path = self.next_path(filename)?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| SessionError::Storage {
                path: path.clone(),
                source,
            })?;

        self.images.push(StoredImage {
            filename: filename.to_string(),
            path: path.clone(),
        });
        Ok(path)
    }

    fn next_path(&mut self, filename: &str) -> Result<PathBuf, SessionError> {
        let name = format!("{}_{}", self.next_seq, sanitize_filename(filename));
        self.next_seq += 1;
        Ok(self.ensure_dir()?.join(name))
    }

    fn ensure_dir(&mut self) -> Result<&Path, SessionError> {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(DIR_PREFIX)
                    .tempdir()
                    .map_err(|source| SessionError::Storage {
                        path: std::env::temp_dir(),
                        source,
                    })?;
                debug!(dir = %dir.path().display(), "Created session directory");
                dir
            }
        };
        Ok(self.dir.insert(dir).path())
    }

    /// Clears the image list and removes the directory.
    ///
    /// Safe to call repeatedly; removal failures are logged, not returned.
    pub fn release(&mut self) {
        self.images.clear();
        self.next_seq = 0;
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(dir = %path.display(), "Released session directory"),
                Err(e) => warn!(dir = %path.display(), "Failed to remove session directory: {e}"),
            }
        }
    }
}

impl Drop for SessionWorkspace {
    fn drop(&mut self) {
        self.release();
    }
}

/// Reduces a client-supplied name to a safe base name.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}
