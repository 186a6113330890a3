//! SerpAPI client

use super::{SearchResult, WebSearch};
use crate::config::SearchConfig;
use crate::error::{BuzzbotError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Google results through SerpAPI's `search.json` endpoint
pub struct SerpApiSearch {
    client: Client,
    api_base: String,
    api_key: String,
    num_results: usize,
    query_suffix: Option<String>,
}

impl SerpApiSearch {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `BuzzbotError::Config` when no API key is configured.
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let api_key = config
            .serpapi_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BuzzbotError::Config("Missing SerpAPI key".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("buzzbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BuzzbotError::Search(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            num_results: config.num_results,
            query_suffix: config.query_suffix.clone().filter(|s| !s.trim().is_empty()),
        })
    }

    fn contextual_query(&self, query: &str) -> String {
        match &self.query_suffix {
            Some(suffix) => format!("{} {}", query, suffix),
            None => query.to_string(),
        }
    }

    /// Turn a SerpAPI payload into results
    fn parse_results(&self, payload: &Value) -> Result<Vec<SearchResult>> {
        if let Some(error) = payload.get("error").and_then(Value::as_str) {
            return Err(BuzzbotError::Search(format!("SerpAPI error: {}", error)).into());
        }

        let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
        let mut results = Vec::new();

        if let Some(answer_box) = payload.get("answer_box") {
            if let Some(answer) = text(answer_box, "answer").or_else(|| text(answer_box, "snippet")) {
                results.push(SearchResult {
                    title: "Quick Answer".to_string(),
                    url: text(answer_box, "link"),
                    snippet: answer,
                });
            }
        }

        if let Some(description) = payload
            .get("knowledge_graph")
            .and_then(|kg| text(kg, "description"))
        {
            results.push(SearchResult {
                title: "Description".to_string(),
                url: None,
                snippet: description,
            });
        }

        if let Some(organic) = payload.get("organic_results").and_then(Value::as_array) {
            for item in organic.iter().take(self.num_results) {
                results.push(SearchResult {
                    title: text(item, "title").unwrap_or_else(|| "No title".to_string()),
                    url: text(item, "link"),
                    snippet: text(item, "snippet").unwrap_or_else(|| "No description".to_string()),
                });
            }
        }

        Ok(results)
    }
}

#[async_trait]
impl WebSearch for SerpApiSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let q = self.contextual_query(query);
        tracing::info!(query = %q, "Searching the web");

        let num = self.num_results.to_string();
        let response = self
            .client
            .get(format!("{}/search.json", self.api_base))
            .query(&[
                ("engine", "google"),
                ("q", q.as_str()),
                ("api_key", self.api_key.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BuzzbotError::Search(format!("SerpAPI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("SerpAPI returned error {}: {}", status, error_text);
            return Err(
                BuzzbotError::Search(format!("SerpAPI returned error {}: {}", status, error_text))
                    .into(),
            );
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| BuzzbotError::Search(format!("Failed to parse SerpAPI response: {}", e)))?;

        let results = self.parse_results(&payload)?;
        tracing::debug!(results = results.len(), "Web search finished");
        Ok(results)
    }
}
