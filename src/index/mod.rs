//! Local similarity index and the retrieval port
//!
//! Chunks and their embeddings are kept in a flat cosine index saved per
//! knowledge base. The turn resolver only sees the `Retriever` trait.

pub mod flat;

pub use flat::{cosine_similarity, FlatIndex, INDEX_FILE};

use crate::error::Result;
use crate::providers::Embedder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Returned to the grader when retrieval produced nothing usable
pub const NO_RELEVANT_INFO: &str = "No relevant information found in the documents.";

/// Characters of each passage shown to the LLM
pub const PASSAGE_PREVIEW_CHARS: usize = 500;

/// Position of a chunk inside its source file (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum Locator {
    /// Page of a paged document
    Page(u32),
    /// Data row of a table
    Row(u32),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Page(n) => write!(f, "Page {}", n + 1),
            Self::Row(n) => write!(f, "Row {}", n + 1),
        }
    }
}

/// A bounded span of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Chunk text
    pub text: String,
    /// Path of the source file
    pub source: String,
    /// Page or row the chunk came from, when known
    pub locator: Option<Locator>,
}

impl DocumentChunk {
    /// File name of the source, without directories
    pub fn file_name(&self) -> &str {
        Path::new(&self.source)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.source)
    }
}

/// A retrieved chunk with its similarity score (higher is better)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    /// The matching chunk
    pub chunk: DocumentChunk,
    /// Cosine similarity to the query
    pub score: f32,
}

/// Retrieval port: top-k scored passages for a query
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `k` passages, best first
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>>;
}

/// Render passages the way they are shown to the LLM
///
/// Each passage becomes `[i] Source: file (Page n)` followed by at most
/// `PASSAGE_PREVIEW_CHARS` characters of text. An empty slice renders as
/// `NO_RELEVANT_INFO`.
///
/// # Examples
///
/// ```
/// use buzzbot::index::{format_passages, NO_RELEVANT_INFO};
///
/// assert_eq!(format_passages(&[]), NO_RELEVANT_INFO);
/// ```
pub fn format_passages(passages: &[ScoredPassage]) -> String {
    format_passages_limited(passages, passages.len())
}

/// Like `format_passages` but renders only the first `limit` passages
pub fn format_passages_limited(passages: &[ScoredPassage], limit: usize) -> String {
    if passages.is_empty() || limit == 0 {
        return NO_RELEVANT_INFO.to_string();
    }

    passages
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, passage)| {
            let location = passage
                .chunk
                .locator
                .map(|l| l.to_string())
                .unwrap_or_else(|| "Page N/A".to_string());
            let preview: String = passage
                .chunk
                .text
                .chars()
                .take(PASSAGE_PREVIEW_CHARS)
                .collect();
            format!(
                "[{}] Source: {} ({})\n{}",
                i + 1,
                passage.chunk.file_name(),
                location,
                preview
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Retriever over a `FlatIndex`, embedding queries with an `Embedder`
pub struct VectorRetriever {
    index: FlatIndex,
    embedder: Arc<dyn Embedder>,
    min_score: f32,
}

impl VectorRetriever {
    /// Wrap an index; passages scoring below `min_score` are dropped when it
    /// is above zero
    pub fn new(index: FlatIndex, embedder: Arc<dyn Embedder>, min_score: f32) -> Self {
        Self {
            index,
            embedder,
            min_score,
        }
    }

    /// Load the index saved in `dir` and wrap it
    pub fn load(dir: &Path, embedder: Arc<dyn Embedder>, min_score: f32) -> Result<Self> {
        let index = FlatIndex::load(dir)?;
        tracing::info!(
            path = %dir.display(),
            chunks = index.len(),
            "Loaded vector index"
        );
        Ok(Self::new(index, embedder, min_score))
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when the index holds no chunks
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed_query(query).await?;
        let mut passages = self.index.search(&query_vector, k)?;
        if self.min_score > 0.0 {
            passages.retain(|p| p.score >= self.min_score);
        }
        tracing::debug!(
            returned = passages.len(),
            best = passages.first().map(|p| p.score),
            "Retrieved passages"
        );
        Ok(passages)
    }
}
