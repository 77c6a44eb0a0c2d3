//! Prompt resolver — turns page text + user input + an optional template
//! into the message list sent to the provider.
//!
//! This is a total function: missing template, missing question, empty page
//! text all degrade to a best-effort message list, never an error.

use serde::{Deserialize, Serialize};

use crate::config::PromptTemplate;

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// Hard cap on page text fed into a prompt. Everything past the first 2000
/// characters is dropped before substitution.
pub const PAGE_TEXT_CAP: usize = 2000;

/// Substitution markers a template's content may carry.
pub const CONTENT_MARKER: &str = "{content}";
pub const QUESTION_MARKER: &str = "{question}";

/// Build the outbound message list: one system message followed by one user
/// message.
///
/// With a template, its content has `{content}` replaced by the capped page
/// text and `{question}` by the user message — literal substring replacement,
/// first occurrence only, not a template-engine pass. Without one, a default
/// analysis prompt is built, with the question appended only when non-empty.
pub fn resolve(
    page_text: &str,
    user_message: &str,
    selected_template: Option<&PromptTemplate>,
    system_prompt: &str,
) -> Vec<ChatMessage> {
    let page = truncate_chars(page_text, PAGE_TEXT_CAP);

    let user_content = match selected_template {
        Some(template) => template
            .content
            .replacen(CONTENT_MARKER, page, 1)
            .replacen(QUESTION_MARKER, user_message, 1),
        None => {
            let mut content = format!("Please analyze the following web content:\n\n{page}");
            if !user_message.is_empty() {
                content.push_str(&format!("\n\nUser question: {user_message}"));
            }
            content
        }
    };

    vec![
        ChatMessage::new(Role::System, system_prompt),
        ChatMessage::new(Role::User, user_content),
    ]
}

/// First `max` characters of `s` (not bytes — page text is rarely ASCII).
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
