//! Session snapshot file format and atomic persistence
//!
//! Writes go through a temp file in the same directory followed by a rename,
//! under an advisory `fd-lock` on a sibling `.lock` file.

use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::Image;

/// File name of the snapshot inside the image directory
pub const SESSION_FILE_NAME: &str = "session_img_data.json";

/// Current snapshot schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed snapshot size (10 MB) to prevent memory exhaustion
pub const MAX_SESSION_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// One pooled image as stored in the snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotImage {
    /// Remote photo identifier
    pub id: String,
    /// HTML attribution
    pub attribution: String,
    /// Location of the image bytes
    pub file_path: PathBuf,
}

impl SnapshotImage {
    /// Rebuild the pool record for `topic`
    pub fn into_image(self, topic: &str) -> Image {
        Image {
            id: self.id,
            attribution: self.attribution,
            file_path: self.file_path,
            topic: topic.to_string(),
        }
    }
}

impl From<&Image> for SnapshotImage {
    fn from(image: &Image) -> Self {
        Self {
            id: image.id.clone(),
            attribution: image.attribution.clone(),
            file_path: image.file_path.clone(),
        }
    }
}

/// Serialized form of the rotation pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    schema_version: String,
    saved_at: i64,
    topics: BTreeMap<String, Vec<SnapshotImage>>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            saved_at: chrono::Utc::now().timestamp_millis(),
            topics: BTreeMap::new(),
        }
    }

    /// Record `topic` with no images yet
    pub fn add_topic(&mut self, topic: &str) {
        self.topics.entry(topic.to_string()).or_default();
    }

    /// Record an image under its topic
    pub fn add_image(&mut self, image: &Image) {
        self.topics
            .entry(image.topic.clone())
            .or_default()
            .push(SnapshotImage::from(image));
    }

    /// Images per topic
    pub fn topics(&self) -> &BTreeMap<String, Vec<SnapshotImage>> {
        &self.topics
    }

    /// Images stored for `topic`
    pub fn images(&self, topic: &str) -> &[SnapshotImage] {
        self.topics.get(topic).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of images across all topics
    pub fn image_count(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    /// Save time (Unix milliseconds)
    pub fn saved_at(&self) -> i64 {
        self.saved_at
    }

    /// Save the snapshot with an atomic replace and file locking
    ///
    /// The JSON is written and synced to a temp file next to `path`, renamed
    /// over it, and the directory entry is synced after the rename.
    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        debug!(
            path = %path.display(),
            images = self.image_count(),
            "Saving session snapshot"
        );

        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(io_error("create snapshot directory"))?;
                parent
            }
            None => Path::new("."),
        };

        let mut stamped = self.clone();
        stamped.saved_at = chrono::Utc::now().timestamp_millis();
        let json = serde_json::to_vec_pretty(&stamped)
            .map_err(|e| SessionError::SerializationError(e.to_string()))?;

        let mut lock = open_lock(path)?;
        let _guard = lock
            .write()
            .map_err(|e| SessionError::LockError(format!("snapshot write lock: {e}")))?;

        let mut staged =
            tempfile::NamedTempFile::new_in(dir).map_err(io_error("stage snapshot"))?;
        staged.write_all(&json).map_err(io_error("write staged snapshot"))?;
        staged.as_file().sync_all().map_err(io_error("sync staged snapshot"))?;
        staged
            .persist(path)
            .map_err(|e| io_error("replace snapshot")(e.error))?;

        // The rename is only durable once the directory entry is on disk
        match std::fs::File::open(dir) {
            Ok(handle) => {
                if let Err(e) = handle.sync_all() {
                    debug!(dir = %dir.display(), error = %e, "Snapshot directory sync skipped");
                }
            }
            Err(e) => debug!(dir = %dir.display(), error = %e, "Snapshot directory not opened"),
        }

        info!(
            path = %path.display(),
            images = self.image_count(),
            bytes = json.len(),
            "Session snapshot saved"
        );
        Ok(())
    }

    /// Load a snapshot with locking
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        debug!(path = %path.display(), "Loading session snapshot");

        let size = match std::fs::metadata(path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SessionError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(io_error("inspect snapshot")(e)),
        };
        if size > MAX_SESSION_FILE_SIZE {
            return Err(SessionError::SnapshotTooLarge {
                size,
                max: MAX_SESSION_FILE_SIZE,
            });
        }

        let lock = open_lock(path)?;
        let _guard = lock
            .read()
            .map_err(|e| SessionError::LockError(format!("snapshot read lock: {e}")))?;

        let raw = std::fs::read(path).map_err(io_error("read snapshot"))?;
        let snapshot: SessionSnapshot = serde_json::from_slice(&raw).map_err(|e| {
            warn!(error = %e, "Failed to deserialize session snapshot");
            SessionError::DeserializationError(e.to_string())
        })?;

        if snapshot.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %snapshot.schema_version,
                expected_version = SCHEMA_VERSION,
                "Session snapshot schema version mismatch"
            );
            return Err(SessionError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: snapshot.schema_version,
            });
        }

        info!(
            images = snapshot.image_count(),
            topics = snapshot.topics.len(),
            "Session snapshot loaded"
        );
        Ok(snapshot)
    }
}

/// Advisory lock guarding `path`, held in a sibling `.lock` file
fn open_lock(path: &Path) -> Result<RwLock<File>, SessionError> {
    let lock_path = path.with_extension("lock");
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map(RwLock::new)
        .map_err(|e| SessionError::LockError(format!("open {}: {e}", lock_path.display())))
}

fn io_error(action: &'static str) -> impl FnOnce(std::io::Error) -> SessionError {
    move |e| SessionError::IoError(format!("{action}: {e}"))
}

/// Errors related to session persistence
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No snapshot at the given path
    #[error("no session snapshot at {0}")]
    NotFound(PathBuf),

    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Snapshot file too large
    #[error("session snapshot too large: {size} bytes (max: {max} bytes)")]
    SnapshotTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
