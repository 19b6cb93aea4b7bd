//! JSON snapshot of both collections, used by the CLI to persist a
//! [`MemoryStore`](super::memory::MemoryStore) between runs.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pace_proto::project::Project;
use pace_proto::task::Task;

/// Errors reading or writing a snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The file could not be read or written.
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        /// The snapshot path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The file is not a valid snapshot.
    #[error("malformed snapshot at {path}: {source}")]
    Format {
        /// The snapshot path.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
}

/// Every task and project document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Task documents.
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Project documents.
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl Snapshot {
    /// Load a snapshot. A missing file is an empty snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        serde_json::from_str(&text).map_err(|source| SnapshotError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the snapshot as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let io_err = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SnapshotError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }
}
