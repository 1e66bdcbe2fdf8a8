//! Per-request staging workspaces.
//!
//! Every request gets an isolated directory under the configured staging
//! root, keyed by a hash of (requester id, url). A stale directory for the
//! same key is wiped and recreated rather than reused, so an interrupted
//! run can never contaminate the next one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Errors that can occur while preparing a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("stale workspace contains a subdirectory: {0:?}")]
    UnexpectedSubdirectory(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Derive the staging key for a (requester, url) pair.
///
/// First 16 hex characters of SHA-256 over the requester id and the url.
/// Collision resistance across concurrently active requests is all that is
/// required here, not secrecy.
pub fn workspace_key(requester_id: i64, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(requester_id.to_le_bytes());
    hasher.update(url.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// Allocates and resets keyed staging directories under an explicit root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The staging root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Prepare an empty directory for the given key.
    ///
    /// If a directory for the key already exists, every regular file inside
    /// it is unlinked and the directory is removed before being recreated.
    /// A subdirectory inside a stale workspace is unexpected and fails the
    /// request rather than being deleted recursively.
    pub async fn prepare(&self, key: &str) -> Result<PathBuf, WorkspaceError> {
        let dir = self.root.join(key);

        if fs::metadata(&dir).await.is_ok() {
            debug!(path = %dir.display(), "wiping stale workspace");

            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    return Err(WorkspaceError::UnexpectedSubdirectory(entry.path()));
                }
                fs::remove_file(entry.path()).await?;
            }
            fs::remove_dir(&dir).await?;
        }

        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }
}

/// Single-flight guard over workspace keys.
///
/// Two simultaneous requests for the same (requester, url) pair would race
/// to wipe and recreate the same directory; the second request is rejected
/// while the first holds the key.
#[derive(Debug, Clone, Default)]
pub struct InFlightKeys {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl InFlightKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a key. Returns `None` when the key is already held.
    pub fn acquire(&self, key: &str) -> Option<KeyGuard> {
        let mut held = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if held.contains(key) {
            return None;
        }
        held.insert(key.to_string());
        Some(KeyGuard {
            key: key.to_string(),
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Releases its key when dropped.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    inner: Arc<Mutex<HashSet<String>>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut held = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.key);
    }
}
