//! Tool for searching the web for recent information

use agent_core::Result as AgentResult;
use agent_llm::tools::schema;
use agent_tools::Tool;
use agent_utils::RetryPolicy;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use super::{cached, parse_params, retried};
use crate::api::{SearchResult, SearchSource};
use crate::cache::{CacheKey, MarketCache};
use crate::error::{MarketError, Result};

const MAX_QUERY_LEN: usize = 256;

#[derive(Debug, Deserialize)]
struct WebSearchParams {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

/// Tool returning `{query, results: [SearchResult]}`
pub struct WebSearchTool {
    search: Arc<dyn SearchSource>,
    cache: MarketCache,
    retry: RetryPolicy,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(
        search: Arc<dyn SearchSource>,
        cache: MarketCache,
        retry: RetryPolicy,
        max_results: usize,
    ) -> Self {
        Self {
            search,
            cache,
            retry,
            max_results: max_results.max(1),
        }
    }

    /// Search `query`, returning at most `limit` results (capped by config)
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<SearchResult>> {
        let query = query.split_whitespace().collect::<Vec<_>>().join(" ");
        if query.is_empty() {
            return Err(MarketError::InvalidInput(
                "search query must not be empty".to_string(),
            ));
        }
        if query.len() > MAX_QUERY_LEN {
            return Err(MarketError::InvalidInput(format!(
                "search query longer than {MAX_QUERY_LEN} bytes"
            )));
        }
        let limit = limit.unwrap_or(self.max_results).clamp(1, self.max_results);

        let key = CacheKey::new(query.to_lowercase(), "web_search", json!({ "limit": limit }));
        let results: Vec<SearchResult> = cached(&self.cache, key, || {
            retried(&self.retry, "duckduckgo.search", || self.search.search(&query, limit))
        })
        .await?;

        info!(query = %query, results = results.len(), "Web search");
        Ok(results)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    async fn execute(&self, params: Value) -> AgentResult<Value> {
        let params: WebSearchParams = parse_params(params)?;
        let results = self.search(&params.query, params.limit).await?;

        let note = results
            .is_empty()
            .then_some("No results. Try a shorter query, e.g. the company name.");
        Ok(json!({
            "query": params.query.trim(),
            "results": results,
            "note": note,
        }))
    }

    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet for recent information about a company, its industry or its \
         competitors. Input should be a simple search query string, e.g. \"Apple Inc\" or \
         \"semiconductor industry outlook\"."
    }

    fn input_schema(&self) -> Value {
        schema::object(
            json!({
                "query": schema::string("Simple text search query"),
                "limit": schema::integer("Maximum number of results (default 5)"),
            }),
            &["query"],
        )
    }
}
