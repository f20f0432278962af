//! Chat-completion client with API-key rotation and bounded rate-limit retry.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::bot::router::Completer;

/// Reply sent when the completion API fails for any reason.
pub const FALLBACK_REPLY: &str = "Хрррр-бибибибиб.";

const MODEL: &str = "gpt-4o-mini";
const TEMPERATURE: f32 = 0.8;
const MAX_TOKENS: u32 = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

/// Build the message list for one completion: the system prompt, then every prior
/// prompt as a user turn (oldest first), then the current prompt.
pub fn build_messages(system_prompt: &str, prior_prompts: &[String], prompt: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(prior_prompts.len() + 2);
    messages.push(Message {
        role: Role::System,
        content: system_prompt.to_string(),
    });
    for prior in prior_prompts {
        messages.push(Message {
            role: Role::User,
            content: prior.clone(),
        });
    }
    messages.push(Message {
        role: Role::User,
        content: prompt.to_string(),
    });
    messages
}

/// Round-robin set of API keys.
pub struct KeyRing {
    keys: Vec<String>,
    index: AtomicUsize,
}

impl KeyRing {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            index: AtomicUsize::new(0),
        }
    }

    /// Advance to the next key and return it, or None if no keys are configured.
    pub fn next_key(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = (self.index.fetch_add(1, Ordering::Relaxed) + 1) % self.keys.len();
        debug!("Using API key #{idx}");
        Some(&self.keys[idx])
    }
}

/// Timing for completion requests.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Pause before every attempt.
    pub pre_call_delay: Duration,
    /// Pause after a rate-limit response.
    pub cooldown: Duration,
    /// Retries allowed after the first rate-limited attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            pre_call_delay: Duration::from_secs(1),
            cooldown: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

/// Run `attempt` until it stops reporting [`Error::RateLimited`] or the retry
/// budget is spent. Other errors are returned immediately.
pub async fn with_rate_limit_retry<F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<String, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, Error>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(Error::RateLimited) if retries < policy.max_retries => {
                retries += 1;
                warn!(
                    "Rate limited, retry {}/{} in {}s",
                    retries,
                    policy.max_retries,
                    policy.cooldown.as_secs()
                );
                sleep(policy.cooldown).await;
            }
            result => return result,
        }
    }
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'static str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct Client {
    keys: KeyRing,
    base_url: String,
    retry: RetryPolicy,
    http: reqwest::Client,
}

impl Client {
    pub fn new(keys: KeyRing, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            keys,
            base_url: base_url.into(),
            retry,
            http: reqwest::Client::new(),
        }
    }

    /// Send one chat-completion request with the next key in the ring.
    pub async fn chat(&self, messages: &[Message]) -> Result<String, Error> {
        let api_key = self.keys.next_key().ok_or(Error::NoApiKey)?;

        let request = ApiRequest {
            model: MODEL,
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or(Error::Empty)
    }
}

impl Completer for Client {
    async fn complete(&self, system_prompt: &str, prior_prompts: &[String], prompt: &str) -> String {
        let messages = build_messages(system_prompt, prior_prompts, prompt);
        let messages = &messages;

        let result = with_rate_limit_retry(&self.retry, || async move {
            sleep(self.retry.pre_call_delay).await;
            self.chat(messages).await
        })
        .await;

        match result {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Completion failed: {e}");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    NoApiKey,
    Http(String),
    RateLimited,
    Api(String),
    Parse(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NoApiKey => write!(f, "No API key configured"),
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::RateLimited => write!(f, "Rate limited"),
            Error::Api(e) => write!(f, "API error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;
    use std::sync::atomic::AtomicU32;

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            pre_call_delay: Duration::ZERO,
            cooldown: Duration::ZERO,
            max_retries,
        }
    }

    #[test]
    fn test_build_messages_order() {
        let prior = vec!["first".to_string(), "second".to_string()];
        let messages = build_messages("be nice", &prior, "third");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "be nice");
        let user_turns: Vec<&str> = messages[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(user_turns, vec!["first", "second", "third"]);
        assert!(messages[1..].iter().all(|m| m.role == Role::User));
    }

    #[test]
    fn test_build_messages_without_history() {
        let messages = build_messages("sys", &[], "hi");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "hi");
    }

    #[test]
    fn test_request_shape() {
        let request = ApiRequest {
            model: MODEL,
            messages: vec![ApiMessage { role: "system", content: "sys" }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["max_tokens"], 500);
        assert!((json["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  привет  "}}]}"#;
        let parsed: ApiResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("  привет  "));
    }

    #[test]
    fn test_key_ring_advances_before_use() {
        let ring = KeyRing::new(vec!["a".into(), "b".into(), "c".into()]);
        let keys: Vec<&str> = (0..4).map(|_| ring.next_key().unwrap()).collect();
        assert_eq!(keys, vec!["b", "c", "a", "b"]);
    }

    #[test]
    fn test_key_ring_single_key() {
        let ring = KeyRing::new(vec!["only".into()]);
        assert_eq!(ring.next_key(), Some("only"));
        assert_eq!(ring.next_key(), Some("only"));
    }

    #[test]
    fn test_key_ring_empty() {
        let ring = KeyRing::new(vec![]);
        assert!(ring.next_key().is_none());
    }

    #[tokio::test]
    async fn test_retry_recovers_after_rate_limit() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_rate_limit_retry(&instant_policy(3), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::RateLimited)
            } else {
                Ok("done".to_string())
            }
        })
        .await;

        assert_eq!(result, Ok("done".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_rate_limit_retry(&instant_policy(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::RateLimited)
        })
        .await;

        assert_eq!(result, Err(Error::RateLimited));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_errors_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_rate_limit_retry(&instant_policy(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Api("500 Internal Server Error".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::Api(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_without_keys_falls_back() {
        let client = Client::new(KeyRing::new(vec![]), "http://127.0.0.1:9", instant_policy(0));
        let reply = client.complete("sys", &[], "hi").await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_complete_unreachable_host_falls_back() {
        let client = Client::new(KeyRing::new(vec!["sk".into()]), "http://127.0.0.1:9", instant_policy(0));
        let reply = client.complete("sys", &["earlier".to_string()], "hi").await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_complete_gives_up_after_repeated_429() {
        let server = test_server::serve("429 Too Many Requests", r#"{"error":{"message":"slow down"}}"#).await;
        let client = Client::new(KeyRing::new(vec!["sk".into()]), server.url(), instant_policy(3));
        let reply = client.complete("sys", &[], "hi").await;
        assert_eq!(reply, FALLBACK_REPLY);
        assert_eq!(server.hits(), 4);
    }

    #[tokio::test]
    async fn test_complete_server_error_not_retried() {
        let server = test_server::serve("500 Internal Server Error", "oops").await;
        let client = Client::new(KeyRing::new(vec!["sk".into()]), server.url(), instant_policy(3));
        assert_eq!(client.complete("sys", &[], "hi").await, FALLBACK_REPLY);
        assert_eq!(server.hits(), 1);
    }
}
