//! # Session Storage
//!
//! Local persistence of the editable fields and the autorun flag, scoped to
//! one user's machine. Having no previous session is the normal first-run
//! state, not an error.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionField {
    Code,
    Markup,
    Manifest,
    Autorun,
}

impl SessionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionField::Code => "code",
            SessionField::Markup => "markup",
            SessionField::Manifest => "manifest",
            SessionField::Autorun => "autorun",
        }
    }
}

/// Everything a previous session left behind. Absent fields were never saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autorun: Option<bool>,
}

impl SessionSnapshot {
    /// Store `value` under `field`; the autorun flag is `"true"` or `"false"`
    pub fn set(&mut self, field: SessionField, value: &str) {
        match field {
            SessionField::Code => self.code = Some(value.to_string()),
            SessionField::Markup => self.markup = Some(value.to_string()),
            SessionField::Manifest => self.manifest_json = Some(value.to_string()),
            SessionField::Autorun => self.autorun = Some(value == "true"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.markup.is_none()
            && self.manifest_json.is_none()
            && self.autorun.is_none()
    }
}

pub trait SessionStore: Send + Sync {
    fn save(&self, field: SessionField, value: &str) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing was ever saved
    fn load(&self) -> Result<Option<SessionSnapshot>, StoreError>;

    fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store, used by tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    snapshot: Mutex<Option<SessionSnapshot>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing session
    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, field: SessionField, value: &str) -> Result<(), StoreError> {
        let mut guard = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get_or_insert_with(SessionSnapshot::default).set(field, value);
        Ok(())
    }

    fn load(&self) -> Result<Option<SessionSnapshot>, StoreError> {
        let guard = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.clone().filter(|s| !s.is_empty()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Session kept as one JSON document on disk
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    // Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<SessionSnapshot>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }
}

impl SessionStore for FileSessionStore {
    fn save(&self, field: SessionField, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut snapshot = match self.read() {
            Ok(existing) => existing.unwrap_or_default(),
            Err(StoreError::Corrupt { path, source }) => {
                tracing::warn!(path = %path.display(), %source, "discarding corrupt session");
                SessionSnapshot::default()
            }
            Err(e) => return Err(e),
        };
        snapshot.set(field, value);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&self.path, encoded)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<SessionSnapshot>, StoreError> {
        Ok(self.read()?.filter(|s| !s.is_empty()))
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
