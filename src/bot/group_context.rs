//! Rolling context buffer for group chats.
//!
//! Keeps the last few `name: text` lines per chat. The rendered block is embedded
//! in the group system prompt so replies can follow the conversation.

use std::collections::{HashMap, VecDeque};
use tracing::info;

/// Lines remembered per chat.
pub const GROUP_CONTEXT_SIZE: usize = 10;

/// Confirmation sent after the context of a chat is wiped.
pub const RESET_CONFIRMATION: &str = "Блин, а о чём мы говорили? Всё стёрто начисто.";

/// Buffer of recent lines per chat.
pub struct GroupContextStore {
    capacity: usize,
    chats: HashMap<i64, VecDeque<String>>,
}

impl GroupContextStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            chats: HashMap::new(),
        }
    }

    /// Add a line, dropping the oldest ones past capacity.
    pub fn append(&mut self, chat_id: i64, line: String) {
        let lines = self.chats.entry(chat_id).or_default();
        lines.push_back(line);
        while lines.len() > self.capacity {
            lines.pop_front();
        }
    }

    /// Stored lines joined with newlines, oldest first. Empty if the chat has none.
    pub fn render(&self, chat_id: i64) -> String {
        self.chats
            .get(&chat_id)
            .map(|lines| lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }

    /// Forget everything about a chat.
    pub fn reset(&mut self, chat_id: i64) -> &'static str {
        if let Some(lines) = self.chats.remove(&chat_id) {
            info!("🧹 Cleared context for chat {} ({} lines)", chat_id, lines.len());
        }
        RESET_CONFIRMATION
    }

    #[cfg(test)]
    pub fn len(&self, chat_id: i64) -> usize {
        self.chats.get(&chat_id).map_or(0, VecDeque::len)
    }

    #[cfg(test)]
    pub fn contains(&self, chat_id: i64) -> bool {
        self.chats.contains_key(&chat_id)
    }
}

impl Default for GroupContextStore {
    fn default() -> Self {
        Self::new(GROUP_CONTEXT_SIZE)
    }
}
