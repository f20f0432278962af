//! Per-user rolling window of recent prompts.
//!
//! Only the user's own prompts are kept; assistant replies are never stored.

use std::collections::{HashMap, VecDeque};

/// Prompts remembered per user.
pub const MEMORY_SIZE: usize = 3;

pub struct ConversationMemory {
    capacity: usize,
    users: HashMap<i64, VecDeque<String>>,
}

impl ConversationMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            users: HashMap::new(),
        }
    }

    /// Stored prompts for a user, oldest first.
    pub fn recent_prompts(&self, user_id: i64) -> Vec<String> {
        self.users
            .get(&user_id)
            .map(|prompts| prompts.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record_prompt(&mut self, user_id: i64, text: &str) {
        let prompts = self.users.entry(user_id).or_default();
        prompts.push_back(text.to_string());
        while prompts.len() > self.capacity {
            prompts.pop_front();
        }
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(MEMORY_SIZE)
    }
}
