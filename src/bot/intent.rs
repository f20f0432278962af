//! Keyword-based intent classification.

use crate::bot::message::ChatType;

/// Wipes the group context of the chat.
pub const RESET_COMMAND: &str = "/сброс";

const SEARCH_PREFIXES: [&str; 2] = ["гугл ", "поиск "];
const SEARCH_WORD: &str = "гугл";
const DRAW_WORD: &str = "нарисуй";
const GENERATE_WORD: &str = "сгенерируй";
const CHAT_WORD: &str = "чат";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Reset,
    /// Web search. `query` is empty when the user gave only the trigger word.
    Search { query: String },
    ImagePrompt,
    PrivateChat,
    GroupChat,
    Ignored,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Reset => "reset",
            Intent::Search { .. } => "search",
            Intent::ImagePrompt => "image-prompt",
            Intent::PrivateChat => "private-chat",
            Intent::GroupChat => "group-chat",
            Intent::Ignored => "ignored",
        }
    }
}

/// Classify trimmed message text. First match wins.
pub fn classify(text: &str, chat_type: ChatType) -> Intent {
    let lower = text.to_lowercase();
    let is_private = chat_type == ChatType::Private;

    if lower == RESET_COMMAND {
        return Intent::Reset;
    }

    if SEARCH_PREFIXES.iter().any(|p| lower.starts_with(p)) || (lower.contains(SEARCH_WORD) && !is_private) {
        return Intent::Search {
            query: search_query(text).to_string(),
        };
    }

    // The private-chat exclusion applies to the "generate" keyword only; "draw"
    // anywhere in the text matches in every chat.
    if lower.starts_with("нарисуй ")
        || lower.starts_with("сгенерируй ")
        || lower.contains(DRAW_WORD)
        || (lower.contains(GENERATE_WORD) && !is_private)
    {
        return Intent::ImagePrompt;
    }

    if is_private {
        return Intent::PrivateChat;
    }

    if lower.contains(CHAT_WORD) {
        return Intent::GroupChat;
    }

    Intent::Ignored
}

/// Everything after the first whitespace.
fn search_query(text: &str) -> &str {
    text.split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim())
        .unwrap_or("")
}
