//! Message router - applies the length and quota checks, classifies the text
//! and dispatches it to search or completion.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::bot::group_context::GroupContextStore;
use crate::bot::intent::{classify, Intent};
use crate::bot::limiter::{RateLimiter, DEFAULT_DAILY_LIMIT};
use crate::bot::memory::ConversationMemory;
use crate::bot::message::IncomingMessage;

/// Longest accepted message, in characters.
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 200;

pub const QUOTA_EXCEEDED: &str = "Ты исчерпал лимит запросов на сегодня.";
pub const MISSING_QUERY: &str = "Что гуглить-то, брат?";

const ARTIST_PROMPT: &str = "Ты талантливый художник, который описывает визуальные сцены для генерации изображений. Пиши чётко, красиво, с описанием деталей на русском.";
const CHATTY_PROMPT: &str = "Ты — разговорчивый и дерзкий помощник с чувством юмора. Пиши по-русски. Не повторяйся, не говори шаблонно.";

/// Web search backend.
pub trait Searcher: Send + Sync {
    /// Top result for a non-empty query. Failures come back as a readable message.
    fn search(&self, query: &str) -> impl Future<Output = String> + Send;
}

/// Language-model backend.
pub trait Completer: Send + Sync {
    /// Reply to `prompt` given a system prompt and earlier user prompts (oldest
    /// first). Failures come back as a fallback reply.
    fn complete(
        &self,
        system_prompt: &str,
        prior_prompts: &[String],
        prompt: &str,
    ) -> impl Future<Output = String> + Send;
}

/// In-memory state shared by all message handlers.
pub struct Stores {
    pub limiter: Mutex<RateLimiter>,
    pub memory: Mutex<ConversationMemory>,
    pub groups: Mutex<GroupContextStore>,
}

impl Stores {
    pub fn new(daily_request_limit: u32) -> Self {
        Self {
            limiter: Mutex::new(RateLimiter::new(daily_request_limit)),
            memory: Mutex::new(ConversationMemory::default()),
            groups: Mutex::new(GroupContextStore::default()),
        }
    }
}

impl Default for Stores {
    fn default() -> Self {
        Self::new(DEFAULT_DAILY_LIMIT)
    }
}

pub fn length_exceeded_message(max_text_length: usize) -> String {
    format!("Слишком много текста. Урежь до {max_text_length} символов.")
}

pub fn group_system_prompt(context: &str) -> String {
    format!("Ты бот в Telegram-группе. Общайся легко, по-русски. Контекст:\n{context}")
}

pub struct MessageRouter<S, C> {
    max_text_length: usize,
    stores: Stores,
    search: S,
    completion: C,
}

impl<S: Searcher, C: Completer> MessageRouter<S, C> {
    pub fn new(max_text_length: usize, stores: Stores, search: S, completion: C) -> Self {
        Self {
            max_text_length,
            stores,
            search,
            completion,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Handle a message and return the reply to send, if any.
    pub async fn handle(&self, msg: &IncomingMessage) -> Option<String> {
        self.handle_at(msg, Utc::now()).await
    }

    /// Same as [`handle`](Self::handle) with an explicit clock reading.
    pub async fn handle_at(&self, msg: &IncomingMessage, now: DateTime<Utc>) -> Option<String> {
        let text = msg.text.trim();
        let intent = classify(text, msg.chat_type);

        info!(
            "📨 {} ({}) in {}: \"{}\" → {}",
            msg.display_name,
            msg.user_id,
            msg.chat_id,
            msg.preview(),
            intent.name()
        );

        if intent == Intent::Reset {
            let reply = self.stores.groups.lock().await.reset(msg.chat_id);
            return Some(reply.to_string());
        }

        if text.chars().count() > self.max_text_length {
            info!("Message from {} too long, skipping", msg.user_id);
            return Some(length_exceeded_message(self.max_text_length));
        }

        let allowed = self.stores.limiter.lock().await.check_and_consume(msg.user_id, now);
        if !allowed {
            info!("🚫 User {} is out of quota", msg.user_id);
            return Some(QUOTA_EXCEEDED.to_string());
        }

        match intent {
            Intent::Search { query } => {
                if query.is_empty() {
                    return Some(MISSING_QUERY.to_string());
                }
                Some(self.search.search(&query).await)
            }
            Intent::ImagePrompt => Some(self.ask(msg.user_id, ARTIST_PROMPT, text).await),
            Intent::PrivateChat => Some(self.ask(msg.user_id, CHATTY_PROMPT, text).await),
            Intent::GroupChat => {
                let context = {
                    let mut groups = self.stores.groups.lock().await;
                    groups.append(msg.chat_id, msg.context_line(text));
                    groups.render(msg.chat_id)
                };
                let system_prompt = group_system_prompt(&context);
                Some(self.ask(msg.user_id, &system_prompt, text).await)
            }
            // Reset returned above
            Intent::Reset | Intent::Ignored => None,
        }
    }

    /// Run a completion with the user's recent prompts, then remember this one.
    async fn ask(&self, user_id: i64, system_prompt: &str, prompt: &str) -> String {
        let prior = self.stores.memory.lock().await.recent_prompts(user_id);
        let answer = self.completion.complete(system_prompt, &prior, prompt).await;
        self.stores.memory.lock().await.record_prompt(user_id, prompt);
        answer
    }
}
