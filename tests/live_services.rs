//! Integration tests against the real search and completion services.
//!
//! These tests require network access. The completion test also needs
//! OPENAI_TOKEN set (comma-separated keys are fine).
//!
//! Run with: cargo test --features integ_test --test live_services

#[cfg(feature = "integ_test")]
mod tests {
    use std::time::Duration;

    use boltun::bot::{Completer, Searcher};
    use boltun::openai::{Client, KeyRing, RetryPolicy, FALLBACK_REPLY};
    use boltun::search::{SearchClient, DEFAULT_SEARCH_URL, SEARCH_FAILED};

    /// A well-known query should produce a three-line result.
    #[tokio::test]
    async fn test_search_returns_top_result() {
        let client = SearchClient::new(DEFAULT_SEARCH_URL, Duration::from_secs(15)).expect("Failed to build search client");
        let reply = client.search("rust programming language").await;

        assert_ne!(reply, SEARCH_FAILED, "DuckDuckGo unreachable");
        assert!(reply.lines().count() >= 2, "unexpected reply: {reply}");
        assert!(reply.contains("http"), "no URL in reply: {reply}");
    }

    #[tokio::test]
    async fn test_completion_replies() {
        let Ok(keys) = std::env::var("OPENAI_TOKEN") else {
            eprintln!("Skipping test: OPENAI_TOKEN not set");
            return;
        };
        let keys = keys.split(',').map(|k| k.trim().to_string()).collect();

        let client = Client::new(
            KeyRing::new(keys),
            "https://api.openai.com/v1",
            RetryPolicy {
                pre_call_delay: Duration::ZERO,
                cooldown: Duration::from_secs(5),
                max_retries: 1,
            },
        );
        let reply = client
            .complete("Отвечай одним словом.", &["Привет".to_string()], "Какого цвета небо?")
            .await;

        assert_ne!(reply, FALLBACK_REPLY);
        assert!(!reply.is_empty());
    }
}
