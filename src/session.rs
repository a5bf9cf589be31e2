//! Persistence of the last session identity.
//!
//! A [`SessionSnapshot`] records which room we were in, as whom, and with
//! which secret role/word. The client writes one after every fold that changes
//! it and reads it back at startup so an application can offer to rejoin.
//! A restored snapshot never presets the identity of a new session; the
//! server's join echo stays authoritative.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::{PlayerId, Role, RoomId};
use crate::state::GameState;

/// What survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

impl SessionSnapshot {
    /// Capture the identity fields of `state`.
    pub fn capture(state: &GameState) -> Self {
        Self {
            room_id: state.room_id().map(str::to_string),
            player_id: state.self_id().map(str::to_string),
            player_name: state.self_name().map(str::to_string),
            role: state.role(),
            word: state.word().map(str::to_string),
        }
    }

    /// `true` when nothing worth restoring was recorded.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Storage backend for [`SessionSnapshot`]s.
pub trait SessionStore: Send {
    /// Read the stored snapshot. `Ok(None)` when nothing was stored yet.
    fn load(&self) -> Result<Option<SessionSnapshot>>;

    /// Replace the stored snapshot.
    fn save(&self, snapshot: &SessionSnapshot) -> Result<()>;
}

/// In-process store, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<SessionSnapshot>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store.
    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            slot: Mutex::new(Some(snapshot)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<SessionSnapshot>> {
        let slot = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(slot.clone())
    }

    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(snapshot.clone());
        Ok(())
    }
}

impl<S: SessionStore + Sync> SessionStore for std::sync::Arc<S> {
    fn load(&self) -> Result<Option<SessionSnapshot>> {
        (**self).load()
    }

    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        (**self).save(snapshot)
    }
}

/// Stores the snapshot as a small JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSessionStore {
    path: PathBuf,
}

impl JsonFileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for JsonFileSessionStore {
    fn load(&self) -> Result<Option<SessionSnapshot>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored session");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::UndercoverError;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("undercover-session-{}.json", uuid::Uuid::new_v4()))
    }

    fn sample() -> SessionSnapshot {
        SessionSnapshot {
            room_id: Some("R1".into()),
            player_id: Some("p1".into()),
            player_name: Some("Alice".into()),
            role: Some(Role::Spy),
            word: Some("pear".into()),
        }
    }

    #[test]
    fn memory_store_replaces_snapshot() {
        let store = MemorySessionStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&sample()).unwrap();
        store.save(&SessionSnapshot::default()).unwrap();
        assert_eq!(store.load().unwrap(), Some(SessionSnapshot::default()));
    }

    #[test]
    fn file_store_missing_file_is_empty() {
        let store = JsonFileSessionStore::new(temp_path());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let path = temp_path();
        JsonFileSessionStore::new(&path).save(&sample()).unwrap();
        let loaded = JsonFileSessionStore::new(&path).load().unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, Some(sample()));
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let path = temp_path();
        std::fs::write(&path, b"{not json").unwrap();
        let err = JsonFileSessionStore::new(&path).load().unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, UndercoverError::Serialization(_)));
    }

    #[test]
    fn empty_snapshot_omits_fields() {
        let json = serde_json::to_string(&SessionSnapshot::default()).unwrap();
        assert_eq!(json, "{}");
        assert!(SessionSnapshot::default().is_empty());
        assert!(!sample().is_empty());
    }

    #[test]
    fn capture_of_fresh_state_is_empty() {
        assert!(SessionSnapshot::capture(&GameState::new()).is_empty());
    }
}
