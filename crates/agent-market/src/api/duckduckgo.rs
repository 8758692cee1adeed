//! DuckDuckGo instant-answer search client

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::SearchSource;
use crate::error::{MarketError, Result};

const BASE_URL: &str = "https://api.duckduckgo.com/";
const PROVIDER: &str = "DuckDuckGo";

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// DuckDuckGo client
pub struct DuckDuckGoClient {
    client: Client,
    rate_limiter: SharedRateLimiter,
}

impl DuckDuckGoClient {
    pub fn new(rate_limit: u32, timeout: Duration) -> Result<Self> {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("market-crew/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub async fn instant_answer(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketError::HttpStatus {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
            });
        }

        // The API answers with content-type application/x-javascript
        let body = response.text().await?;
        let data: Value = serde_json::from_str(&body).map_err(|e| MarketError::Parse {
            provider: PROVIDER.to_string(),
            reason: e.to_string(),
        })?;

        let results = parse_instant_answer(&data, limit);
        debug!(query, results = results.len(), "Search completed");
        Ok(results)
    }
}

#[async_trait]
impl SearchSource for DuckDuckGoClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>> {
        self.instant_answer(query, limit).await
    }
}

/// Flatten an instant-answer payload into at most `limit` results
///
/// Order: the abstract, direct results, then related topics with nested
/// topic groups expanded in place.
pub fn parse_instant_answer(data: &Value, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let abstract_text = str_field(data, "AbstractText");
    if !abstract_text.is_empty() {
        let heading = str_field(data, "Heading");
        results.push(SearchResult {
            title: if heading.is_empty() {
                str_field(data, "AbstractSource").to_string()
            } else {
                heading.to_string()
            },
            snippet: abstract_text.to_string(),
            url: str_field(data, "AbstractURL").to_string(),
        });
    }

    for key in ["Results", "RelatedTopics"] {
        if let Some(topics) = data.get(key).and_then(Value::as_array) {
            collect_topics(topics, &mut results);
        }
    }

    results.truncate(limit);
    results
}

fn collect_topics(topics: &[Value], out: &mut Vec<SearchResult>) {
    for topic in topics {
        if let Some(nested) = topic.get("Topics").and_then(Value::as_array) {
            collect_topics(nested, out);
            continue;
        }

        let text = str_field(topic, "Text");
        if text.is_empty() {
            continue;
        }
        let title = text.split_once(" - ").map_or(text, |(head, _)| head);
        out.push(SearchResult {
            title: title.to_string(),
            snippet: text.to_string(),
            url: str_field(topic, "FirstURL").to_string(),
        });
    }
}

fn str_field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).map_or("", str::trim)
}
