//! Session manager — owns the in-memory "current conversation" and mediates
//! between the prompt resolver, the completion client, and the history store.
//!
//! Lifecycle: Empty (no messages) → Active (first append assigns id and
//! timestamp) → Saved (an explicit save persisted it). Later appends never
//! auto-save; persistence always takes another explicit `save()`.

use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::client::{CompletionClient, Transport, extract_content};
use crate::config::{Config, PromptTemplate};
use crate::error::{Error, Result};
use crate::history::HistoryStore;
use crate::prompt::{self, Role};
use crate::render::{Renderer, RevealSink};

// ── Data model ────────────────────────────────────────────────────────────────

/// One transcript entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Epoch millis of creation.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    /// `"chat_" + creationEpochMillis`, stable once assigned.
    #[serde(default)]
    pub id: Option<String>,
    /// Epoch millis of creation, immutable after assignment.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// User-assigned label; display falls back to the formatted timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Conversation order. Append-only — no reordering operation exists.
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Active,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            id: None,
            timestamp: None,
            name: None,
            messages: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.messages.is_empty() {
            SessionState::Empty
        } else {
            SessionState::Active
        }
    }

    /// Append a message. The first append assigns `id` and `timestamp`
    /// atomically with it.
    pub fn append(&mut self, role: Role, content: String) {
        let now = Utc::now().timestamp_millis();
        if self.id.is_none() {
            self.id = Some(format!("chat_{now}"));
            self.timestamp = Some(now);
        }
        self.messages.push(Message {
            role,
            content,
            timestamp: now,
        });
    }

    /// Display label: the assigned name, else the formatted creation
    /// timestamp, else a placeholder for a session that has no messages yet.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref() {
            if !name.trim().is_empty() {
                return name.to_string();
            }
        }
        match self.timestamp {
            Some(ts) => format_timestamp(ts),
            None => "new conversation".to_string(),
        }
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_timestamp(epoch_millis: i64) -> String {
    match Local.timestamp_millis_opt(epoch_millis).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => epoch_millis.to_string(),
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

pub struct SessionManager {
    current: ConversationSession,
    selected_template: Option<PromptTemplate>,
    in_flight: bool,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            current: ConversationSession::new(),
            selected_template: None,
            in_flight: false,
        }
    }

    pub fn current(&self) -> &ConversationSession {
        &self.current
    }

    pub fn selected_template(&self) -> Option<&PromptTemplate> {
        self.selected_template.as_ref()
    }

    /// Discard the current session and start fresh. No unsaved-changes
    /// warning — unsaved messages are simply gone.
    pub fn new_conversation(&mut self) {
        self.current = ConversationSession::new();
    }

    /// Select a prompt template by id from the given config snapshot.
    /// `None` (or an id that no longer exists) clears the selection.
    pub fn select_template(&mut self, selection: Option<i64>, config: &Config) {
        self.selected_template = selection.and_then(|id| config.template(id).cloned());
    }

    /// Send one message: append the user text (empty sends are permitted),
    /// resolve the prompt, call the provider, and append + reveal the reply.
    ///
    /// A completion failure is not an error of this operation — it becomes a
    /// visible assistant message prefixed "Error:", so the user always sees
    /// why a send failed, inline in the transcript. Only a second send while
    /// one is outstanding is rejected, with `Error::Busy`.
    pub async fn send_message<T: Transport, S: RevealSink>(
        &mut self,
        page_text: &str,
        user_text: &str,
        config: &Config,
        client: &CompletionClient<T>,
        renderer: &Renderer,
        sink: &mut S,
    ) -> Result<()> {
        if self.in_flight {
            return Err(Error::Busy);
        }
        self.in_flight = true;

        self.current.append(Role::User, user_text.to_string());

        let messages = prompt::resolve(
            page_text,
            user_text,
            self.selected_template.as_ref(),
            &config.system_prompt,
        );

        sink.thinking_shown();
        let outcome = match client.complete(&messages, config).await {
            Ok(response) => extract_content(&response).map(str::to_string),
            Err(e) => Err(e),
        };
        sink.thinking_removed();

        match outcome {
            Ok(content) => {
                self.current.append(Role::Assistant, content.clone());
                renderer.reveal(&content, sink).await;
            }
            Err(e) => {
                let text = format!("Error: {e}");
                self.current.append(Role::Assistant, text.clone());
                sink.frame(&renderer.render_message(Role::Assistant, &text), true);
            }
        }

        self.in_flight = false;
        Ok(())
    }

    /// Persist the current session. Assigns id/timestamp first if the
    /// session was never appended to, then upserts — saving twice produces
    /// one history entry, not two.
    pub fn save(&mut self, store: &HistoryStore) -> Result<String> {
        if self.current.id.is_none() {
            let now = Utc::now().timestamp_millis();
            self.current.id = Some(format!("chat_{now}"));
            self.current.timestamp = Some(now);
        }
        store.upsert(&self.current)?;
        Ok(self.current.id.clone().unwrap_or_default())
    }

    /// Replace the current session wholesale with a stored one. The caller
    /// re-renders the full transcript afterwards.
    pub fn load(&mut self, id: &str, store: &HistoryStore) -> Result<()> {
        let session = store
            .get(id)?
            .ok_or_else(|| Error::Storage(format!("no saved conversation with id {id}")))?;
        self.current = session;
        Ok(())
    }

    /// Rename a saved conversation. A blank name reverts the display to the
    /// formatted creation timestamp without persisting an empty string; a
    /// non-blank name is persisted and mirrored into the current session.
    pub fn rename(&mut self, id: &str, new_name: &str, store: &HistoryStore) -> Result<()> {
        if new_name.trim().is_empty() {
            if self.current.id.as_deref() == Some(id) {
                self.current.name = None;
            }
            return Ok(());
        }
        store.rename(id, new_name)?;
        if self.current.id.as_deref() == Some(id) {
            self.current.name = Some(new_name.trim().to_string());
        }
        Ok(())
    }

    /// Destructive and irreversible — the caller confirms with the user
    /// before invoking.
    pub fn delete(&mut self, id: &str, store: &HistoryStore) -> Result<()> {
        store.delete(id)?;
        if self.current.id.as_deref() == Some(id) {
            self.new_conversation();
        }
        Ok(())
    }

    pub fn clear_all(&mut self, store: &HistoryStore) -> Result<()> {
        store.clear()?;
        self.new_conversation();
        Ok(())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
