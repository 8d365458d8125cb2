//! Locked file access for cached image bytes
//!
//! Every read, write and delete of an image file holds that path's lock for
//! the duration of the filesystem call. Locks live in a table keyed by path:
//! they are registered when an image enters the pool and created on demand
//! for paths not yet registered. An entry is dropped once its path has left
//! the pool and no operation still holds its lock, so two tasks touching the
//! same path always share one mutex.

use bytes::Bytes;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// File store errors
#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    /// Creating the parent directory failed
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// Directory path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Reading a file failed
    #[error("failed to read {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Writing a file failed
    #[error("failed to write {path}: {source}")]
    Write {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Deleting a file failed
    #[error("failed to remove {path}: {source}")]
    Remove {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a successful delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The file existed and was deleted
    Removed,
    /// The file was already gone
    AlreadyMissing,
}

type PathLock = Arc<Mutex<()>>;

#[derive(Debug)]
struct LockEntry {
    lock: PathLock,
    /// Set while an image in the pool lives at this path
    pooled: bool,
}

impl LockEntry {
    fn new(pooled: bool) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            pooled,
        }
    }

    /// Only the table references the lock and no pooled image needs it
    fn is_idle(&self) -> bool {
        !self.pooled && Arc::strong_count(&self.lock) == 1
    }
}

/// Per-path locked access to image files
#[derive(Debug, Default)]
pub struct FileStore {
    locks: Mutex<HashMap<PathBuf, LockEntry>>,
}

impl FileStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the lock for a path entering the pool
    pub async fn register(&self, path: &Path) {
        self.locks
            .lock()
            .await
            .entry(path.to_path_buf())
            .or_insert_with(|| LockEntry::new(true))
            .pooled = true;
    }

    /// Release the lock of a path that left the pool
    ///
    /// The entry stays while an in-flight operation holds the lock; the last
    /// one to finish drops it.
    pub async fn forget(&self, path: &Path) {
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get_mut(path) {
            entry.pooled = false;
            if entry.is_idle() {
                locks.remove(path);
            }
        }
    }

    /// Number of paths with a registered lock
    pub async fn tracked_paths(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Whether `path` has a registered lock
    pub async fn is_tracked(&self, path: &Path) -> bool {
        self.locks.lock().await.contains_key(path)
    }

    pub(crate) async fn lock_for(&self, path: &Path) -> PathLock {
        let mut locks = self.locks.lock().await;
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| LockEntry::new(false))
            .lock
            .clone()
    }

    /// Hand back a lock taken by [`Self::lock_for`]
    async fn release(&self, path: &Path, lock: PathLock) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(path).is_some_and(LockEntry::is_idle) {
            locks.remove(path);
        }
    }

    /// Write `data` to `path`, creating parent directories if absent
    pub async fn write(&self, path: &Path, data: &[u8]) -> Result<(), FileStoreError> {
        debug!(path = %path.display(), size = data.len(), "Saving file");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|source| {
                error!(path = %parent.display(), error = %source, "Failed to create directory");
                FileStoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                }
            })?;
        }

        let lock = self.lock_for(path).await;
        let written = {
            let _guard = lock.lock().await;
            tokio::fs::write(path, data).await
        };
        self.release(path, lock).await;
        written.map_err(|source| {
            error!(path = %path.display(), error = %source, "Failed to write file");
            FileStoreError::Write {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Read the whole file at `path`
    pub async fn read(&self, path: &Path) -> Result<Bytes, FileStoreError> {
        debug!(path = %path.display(), "Reading file");
        let lock = self.lock_for(path).await;
        let contents = {
            let _guard = lock.lock().await;
            tokio::fs::read(path).await
        };
        self.release(path, lock).await;
        contents.map(Bytes::from).map_err(|source| {
            warn!(path = %path.display(), error = %source, "Failed to read file");
            FileStoreError::Read {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Delete the file at `path`
    ///
    /// A file that is already gone is reported as [`RemoveOutcome::AlreadyMissing`].
    pub async fn remove(&self, path: &Path) -> Result<RemoveOutcome, FileStoreError> {
        debug!(path = %path.display(), "Removing file");
        let lock = self.lock_for(path).await;
        let removed = {
            let _guard = lock.lock().await;
            tokio::fs::remove_file(path).await
        };
        self.release(path, lock).await;
        match removed {
            Ok(()) => Ok(RemoveOutcome::Removed),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Remove skipped, file does not exist");
                Ok(RemoveOutcome::AlreadyMissing)
            }
            Err(source) => {
                error!(path = %path.display(), error = %source, "Failed to remove file");
                Err(FileStoreError::Remove {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }
}
