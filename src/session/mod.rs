//! Pool metadata persistence
//!
//! The rotation pool is snapshotted to a JSON file inside the image directory
//! after every successful download and restored once at setup, so restarts
//! resume the existing pool instead of re-downloading it. Request quota state
//! is deliberately not persisted.

pub mod snapshot;

pub use snapshot::{SessionError, SessionSnapshot, SnapshotImage, SESSION_FILE_NAME};
