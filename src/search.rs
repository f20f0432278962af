//! DuckDuckGo web search, top result only.

use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::bot::router::Searcher;

/// DuckDuckGo HTML endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) boltun/0.1";

pub const NOTHING_FOUND: &str = "Ничего не нашёл, попробуй переформулировать.";
pub const SEARCH_FAILED: &str = "Ошибка при поиске. Попробуй позже.";

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

impl SearchResult {
    /// `title`, `url` and `snippet` on separate lines.
    pub fn format(&self) -> String {
        format!("{}\n{}\n{}", self.title, self.url, self.snippet)
    }
}

pub struct SearchClient {
    base_url: String,
    client: reqwest::Client,
    link_regex: Regex,
    snippet_regex: Regex,
    tag_regex: Regex,
}

impl SearchClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
            link_regex: Regex::new(
                r#"<a[^>]*class="[^"]*result__a[^"]*"[^>]*href="([^"]+)"[^>]*>([\s\S]*?)</a>"#,
            )
            .map_err(|e| e.to_string())?,
            snippet_regex: Regex::new(r#"<a class="result__snippet[^"]*"[^>]*>([\s\S]*?)</a>"#)
                .map_err(|e| e.to_string())?,
            tag_regex: Regex::new(r"<[^>]+>").map_err(|e| e.to_string())?,
        })
    }

    async fn fetch(&self, query: &str) -> Result<String, String> {
        let url = format!("{}?q={}", self.base_url, urlencoding::encode(query));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        debug!("DuckDuckGo response status: {status}");
        if !status.is_success() {
            return Err(format!("DuckDuckGo returned {status}"));
        }

        response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))
    }

    /// First result on a DuckDuckGo HTML results page.
    pub fn parse_top_result(&self, html: &str) -> Option<SearchResult> {
        let mut links = self.link_regex.captures_iter(html);
        let link = links.next()?;
        // Snippet must come from the first result's block, before the next result link
        let block_start = link.get(0).map_or(0, |m| m.end());
        let block_end = links
            .next()
            .and_then(|next| next.get(0))
            .map_or(html.len(), |m| m.start());
        let snippet = self
            .snippet_regex
            .captures(&html[block_start..block_end])
            .map(|caps| self.clean(&caps[1]))
            .unwrap_or_default();

        Some(SearchResult {
            title: self.clean(&link[2]),
            url: decode_redirect_url(&link[1]),
            snippet,
        })
    }

    fn clean(&self, fragment: &str) -> String {
        let text = self.tag_regex.replace_all(fragment, "");
        decode_entities(text.trim())
    }
}

impl Searcher for SearchClient {
    async fn search(&self, query: &str) -> String {
        match self.fetch(query).await {
            Ok(html) => match self.parse_top_result(&html) {
                Some(result) => result.format(),
                None => NOTHING_FOUND.to_string(),
            },
            Err(e) => {
                warn!("Search failed for {:?}: {e}", query);
                SEARCH_FAILED.to_string()
            }
        }
    }
}

/// DuckDuckGo wraps result links as `//duckduckgo.com/l/?uddg=<encoded>&rut=...`.
fn decode_redirect_url(raw_url: &str) -> String {
    if let Some(index) = raw_url.find("uddg=") {
        let encoded = &raw_url[index + 5..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return decoded.into_owned();
        }
    }

    raw_url.to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
