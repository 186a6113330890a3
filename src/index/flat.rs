//! Brute-force cosine similarity index persisted as JSON

use super::{DocumentChunk, ScoredPassage};
use crate::error::{BuzzbotError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// File name of a saved index inside its directory
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: DocumentChunk,
    embedding: Vec<f32>,
}

/// In-memory vector index searched by exhaustive cosine similarity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimension, 0 while empty
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Add a chunk with its embedding
    ///
    /// The first embedding fixes the dimension of the index.
    pub fn add(&mut self, chunk: DocumentChunk, embedding: Vec<f32>) -> Result<()> {
        if embedding.is_empty() {
            return Err(BuzzbotError::Retrieval("Embedding must not be empty".to_string()).into());
        }
        if self.entries.is_empty() {
            self.dimension = embedding.len();
        } else if embedding.len() != self.dimension {
            return Err(BuzzbotError::Retrieval(format!(
                "Embedding dimension mismatch: {} != {}",
                embedding.len(),
                self.dimension
            ))
            .into());
        }
        self.entries.push(IndexEntry { chunk, embedding });
        Ok(())
    }

    /// The `k` entries most similar to `query`, best first
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPassage>> {
        let mut scored = Vec::with_capacity(self.entries.len());
        for (idx, entry) in self.entries.iter().enumerate() {
            scored.push((idx, cosine_similarity(query, &entry.embedding)?));
        }
        scored.sort_by(|left, right| right.1.partial_cmp(&left.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(idx, score)| ScoredPassage {
                chunk: self.entries[idx].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Write the index to `dir/index.json`, creating `dir` if needed
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory {}", dir.display()))?;
        let path = dir.join(INDEX_FILE);
        let json = serde_json::to_vec(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write index {}", path.display()))?;
        Ok(path)
    }

    /// Read an index previously written by `save`
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE);
        let bytes = std::fs::read(&path).map_err(|e| {
            BuzzbotError::Retrieval(format!("Failed to read index {}: {}", path.display(), e))
        })?;
        let index: Self = serde_json::from_slice(&bytes).map_err(|e| {
            BuzzbotError::Retrieval(format!("Corrupt index {}: {}", path.display(), e))
        })?;
        Ok(index)
    }
}

/// Cosine similarity of two equally sized vectors
///
/// Returns 0.0 when either vector has zero length.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> Result<f32> {
    if query.len() != candidate.len() {
        return Err(BuzzbotError::Retrieval(format!(
            "Vector length mismatch: {} != {}",
            query.len(),
            candidate.len()
        ))
        .into());
    }

    let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
    let query_norm = query.iter().map(|v| v * v).sum::<f32>().sqrt();
    let candidate_norm = candidate.iter().map(|v| v * v).sum::<f32>().sqrt();
    let denom = query_norm * candidate_norm;
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }
    Ok(dot / denom)
}
