//! Ordered message history for one provider run.
//!
//! A system turn can only enter through [`ConversationHistory::seeded`] or
//! [`ConversationHistory::reset`], so there is at most one and it is always
//! first. Appended turns are never edited.

use crate::api::{ChatMessage, Role};

#[derive(Clone, Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History that starts with the shared system instruction, if any.
    pub fn seeded(system: Option<&str>) -> Self {
        let mut history = Self::new();
        history.reset(system);
        history
    }

    /// Discard every turn, including a previous system turn, then reseed.
    pub fn reset(&mut self, system: Option<&str>) {
        self.messages.clear();
        if let Some(text) = system {
            self.messages.push(ChatMessage::system(text));
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn system(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }
}
