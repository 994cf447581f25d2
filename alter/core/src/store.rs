//! Session Store
//!
//! Best-effort persistence for archived sessions. The store keeps a single
//! JSON blob holding a capped, newest-first list of [`SessionRecord`]s.
//! Persistence never gets in the user's way: a failed write is logged and
//! swallowed, a corrupt or missing blob reads as an empty archive, and
//! `clear` always succeeds from the caller's point of view.
//!
//! Storage itself sits behind the [`KvStorage`] seam so surfaces can plug
//! in whatever medium they have, and tests run against [`MemoryStorage`].

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::session::SessionRecord;

/// Key under which the archive blob is stored
pub const SESSIONS_KEY: &str = "alter_sessions";

/// Maximum archived sessions; older records are evicted past this
pub const MAX_SESSIONS: usize = 15;

/// A string-blob key/value medium
///
/// The same shape as browser local storage: three operations, string
/// values, nothing transactional.
pub trait KvStorage: Send + Sync {
    /// Read the value for a key, if present
    fn get(&self, key: &str) -> Option<String>;
    /// Write the value for a key, replacing any previous value
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    /// Delete a key; deleting an absent key is not an error
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// File-per-key storage rooted at a caller-supplied directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Create storage rooted at `root`; the directory is created on first write
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KvStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.path_for(key), value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// In-memory storage for tests and headless runs
#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.map.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KvStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// The capped session archive
#[derive(Debug)]
pub struct SessionStore<S: KvStorage> {
    storage: S,
}

impl<S: KvStorage> SessionStore<S> {
    /// Create a store over the given medium
    #[must_use]
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Archive a session snapshot
    ///
    /// The record is prepended (newest first) and the list re-capped at
    /// [`MAX_SESSIONS`]. Serialization or write failure is logged and
    /// swallowed; losing an archive entry must never fail a disconnect.
    pub fn save(&self, record: SessionRecord) {
        let mut sessions = self.load();
        sessions.insert(0, record);
        sessions.truncate(MAX_SESSIONS);
        match serde_json::to_string(&sessions) {
            Ok(blob) => {
                if let Err(e) = self.storage.set(SESSIONS_KEY, &blob) {
                    tracing::warn!(error = %e, "failed to persist session archive");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize session archive");
            }
        }
    }

    /// Load the archive, newest first
    ///
    /// A missing or unparseable blob reads as an empty archive.
    #[must_use]
    pub fn load(&self) -> Vec<SessionRecord> {
        let Some(blob) = self.storage.get(SESSIONS_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str(&blob) {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::warn!(error = %e, "session archive corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    /// Delete the entire archive
    ///
    /// Runs unconditionally whether or not anything is stored.
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove(SESSIONS_KEY) {
            tracing::warn!(error = %e, "failed to clear session archive");
        }
    }
}
