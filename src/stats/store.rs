use crate::stats::error::StatsError;
use crate::stats::window::Window;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Full collector state as written to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Closed windows, oldest first.
    pub history: Vec<Arc<Window>>,
    pub current_window: Window,
    pub saved_at: DateTime<Utc>,
}

/// Durable home for collector snapshots.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StatsError>;

    /// `Ok(None)` when nothing has been saved yet. Unreadable or malformed
    /// state is an error.
    fn load(&self) -> Result<Option<PersistedSnapshot>, StatsError>;
}

/// JSON file store. Writes go to `<path>.tmp` and are renamed over `path`,
/// so readers only ever see a complete document.
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    // Rotation and periodic saves share one temp path.
    write_lock: Mutex<()>,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> PathBuf {
        let mut tmp = OsString::from(self.path.as_os_str());
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StatsError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| StatsError::io(dir, e))?;
        }

        let json = serde_json::to_vec_pretty(snapshot)?;

        let _guard = self.write_lock.lock();
        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp).map_err(|e| StatsError::io(&tmp, e))?;
        file.write_all(&json).map_err(|e| StatsError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StatsError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| StatsError::io(&self.path, e))
    }

    fn load(&self) -> Result<Option<PersistedSnapshot>, StatsError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StatsError::io(&self.path, e)),
        };
        let snapshot = serde_json::from_slice(&bytes)?;
        Ok(Some(snapshot))
    }
}

/// In-process store holding only the latest snapshot.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    latest: Mutex<Option<PersistedSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: PersistedSnapshot) -> Self {
        Self {
            latest: Mutex::new(Some(snapshot)),
        }
    }

    pub fn latest(&self) -> Option<PersistedSnapshot> {
        self.latest.lock().clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), StatsError> {
        *self.latest.lock() = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedSnapshot>, StatsError> {
        Ok(self.latest.lock().clone())
    }
}
