//! Conversation history store.
//!
//! All saved sessions live in a single JSON file under
//! `~/.local/share/weainote/`. The storage unit is the whole list: every
//! mutation reads it, applies one change, and writes it back. Concurrent
//! writers race and the last writer wins — there are no multi-key
//! transactions at this layer.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::session::ConversationSession;

// ── Store ─────────────────────────────────────────────────────────────────────

pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            path: history_path(),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// All saved sessions, oldest first. A missing file is an empty history.
    pub fn list(&self) -> Result<Vec<ConversationSession>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn get(&self, id: &str) -> Result<Option<ConversationSession>> {
        Ok(self.list()?.into_iter().find(|s| s.id.as_deref() == Some(id)))
    }

    /// Insert or update by id (linear scan). Saving the same session twice
    /// updates the existing entry rather than appending a duplicate.
    pub fn upsert(&self, session: &ConversationSession) -> Result<()> {
        let id = session
            .id
            .as_deref()
            .ok_or_else(|| Error::Storage("session has no id".to_string()))?;
        let mut all = self.list()?;
        match all.iter_mut().find(|s| s.id.as_deref() == Some(id)) {
            Some(slot) => *slot = session.clone(),
            None => all.push(session.clone()),
        }
        self.write(&all)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let mut all = self.list()?;
        all.retain(|s| s.id.as_deref() != Some(id));
        self.write(&all)
    }

    pub fn clear(&self) -> Result<()> {
        self.write(&[])
    }

    /// Persist a new display name. A blank name is a no-op — the display
    /// falls back to the formatted creation timestamp instead of storing an
    /// empty string. Renaming to the current name is also a no-op.
    pub fn rename(&self, id: &str, new_name: &str) -> Result<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Ok(());
        }
        let mut all = self.list()?;
        let Some(session) = all.iter_mut().find(|s| s.id.as_deref() == Some(id)) else {
            return Ok(());
        };
        if session.name.as_deref() == Some(new_name) {
            return Ok(());
        }
        session.name = Some(new_name.to_string());
        self.write(&all)
    }

    fn write(&self, sessions: &[ConversationSession]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(sessions)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn history_path() -> PathBuf {
    data_dir().join("weainote").join("history.json")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            Path::new(&std::env::var("HOME").unwrap_or_default()).join(".local/share")
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;

    fn store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::at(dir.path().join("history.json"));
        (dir, store)
    }

    fn session(id: &str) -> ConversationSession {
        let mut s = ConversationSession::new();
        s.append(Role::User, "hi".to_string());
        s.id = Some(id.to_string());
        s
    }

    #[test]
    fn missing_file_is_empty_history() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn upsert_is_idempotent_per_id() {
        let (_dir, store) = store();
        let mut s = session("chat_1");
        store.upsert(&s).unwrap();
        s.append(Role::Assistant, "hello".to_string());
        store.upsert(&s).unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].messages.len(), 2);
    }

    #[test]
    fn upsert_without_id_is_a_storage_error() {
        let (_dir, store) = store();
        let s = ConversationSession::new();
        assert!(matches!(store.upsert(&s), Err(Error::Storage(_))));
    }

    #[test]
    fn delete_removes_only_the_matching_session() {
        let (_dir, store) = store();
        store.upsert(&session("chat_1")).unwrap();
        store.upsert(&session("chat_2")).unwrap();
        store.delete("chat_1").unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.as_deref(), Some("chat_2"));
    }

    #[test]
    fn clear_empties_the_store() {
        let (_dir, store) = store();
        store.upsert(&session("chat_1")).unwrap();
        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn rename_persists_a_new_name() {
        let (_dir, store) = store();
        store.upsert(&session("chat_1")).unwrap();
        store.rename("chat_1", "research notes").unwrap();
        let saved = store.get("chat_1").unwrap().unwrap();
        assert_eq!(saved.name.as_deref(), Some("research notes"));
    }

    #[test]
    fn blank_rename_leaves_persisted_name_untouched() {
        let (_dir, store) = store();
        store.upsert(&session("chat_1")).unwrap();
        store.rename("chat_1", "kept").unwrap();
        store.rename("chat_1", "   ").unwrap();

        let saved = store.get("chat_1").unwrap().unwrap();
        assert_eq!(saved.name.as_deref(), Some("kept"));
    }

    #[test]
    fn rename_to_current_name_is_a_no_op() {
        let (_dir, store) = store();
        store.upsert(&session("chat_1")).unwrap();
        store.rename("chat_1", "same").unwrap();
        store.rename("chat_1", "same").unwrap();
        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name.as_deref(), Some("same"));
    }
}
