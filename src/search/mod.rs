//! Web search fallback
//!
//! The turn resolver only depends on the `WebSearch` trait; `SerpApiSearch`
//! is the production implementation.

pub mod serpapi;

pub use serpapi::SerpApiSearch;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One piece of evidence returned by a web search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Result title, or a label such as "Quick Answer"
    pub title: String,
    /// Link to the page, when the result has one
    pub url: Option<String>,
    /// Text snippet
    pub snippet: String,
}

/// Web search port
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the web for `query`
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Render results as the evidence block handed to the LLM
///
/// Labelled results (answer box, description) come first; linked results
/// are numbered with their link.
pub fn format_search_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No web results found.".to_string();
    }

    let mut lines = Vec::new();
    let mut numbered = 0;
    for result in results {
        match &result.url {
            None => lines.push(format!("{}: {}", result.title, result.snippet)),
            Some(url) => {
                if numbered == 0 {
                    lines.push("\nWeb Results:".to_string());
                }
                numbered += 1;
                lines.push(format!("\n[{}] {}", numbered, result.title));
                lines.push(format!("    {}", result.snippet));
                lines.push(format!("    Link: {}", url));
            }
        }
    }
    lines.join("\n")
}
