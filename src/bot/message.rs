//! Inbound message as seen by the router, detached from the Telegram types.

/// Kind of chat a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    /// One-to-one chat with the bot.
    Private,
    /// Groups, supergroups and channels.
    Group,
}

/// A text message with the metadata the router needs.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub chat_type: ChatType,
    pub user_id: i64,
    /// Sender's first name.
    pub display_name: String,
    pub text: String,
}

/// Max chars shown when logging a message.
const PREVIEW_LENGTH: usize = 50;

impl IncomingMessage {
    /// Line stored in the group context: `{display_name}: {text}`.
    pub fn context_line(&self, text: &str) -> String {
        format!("{}: {}", self.display_name, text)
    }

    /// Start of the text for log lines.
    pub fn preview(&self) -> String {
        self.text.chars().take(PREVIEW_LENGTH).collect()
    }
}
