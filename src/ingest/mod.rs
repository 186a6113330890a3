//! Folder ingestion
//!
//! Every immediate subfolder of the source directory becomes one knowledge
//! base: its files are loaded, split into chunks, embedded, and written to a
//! flat index under the vector store root. Folders whose name is already
//! recorded are skipped, so re-running ingestion is idempotent.

pub mod loader;
pub mod splitter;

pub use loader::{load_directory, load_file, LoadedDocument};
pub use splitter::TextSplitter;

use crate::config::IngestConfig;
use crate::error::{BuzzbotError, Result};
use crate::index::{DocumentChunk, FlatIndex};
use crate::providers::Embedder;
use crate::storage::{DocumentStore, KnowledgeBase};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of ingesting a single folder
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A knowledge base with this name already exists
    Skipped { name: String },
    /// The folder was indexed and recorded
    Ingested(KnowledgeBase),
    /// No supported file produced any text
    Empty { name: String },
}

/// Summary of a `process_source_directory` run
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: Vec<KnowledgeBase>,
    pub skipped: Vec<String>,
    pub empty: Vec<String>,
    /// Folder name and error message
    pub failed: Vec<(String, String)>,
}

impl IngestReport {
    /// Number of folders examined
    pub fn total(&self) -> usize {
        self.ingested.len() + self.skipped.len() + self.empty.len() + self.failed.len()
    }
}

/// Approximate token count: one token per four characters
pub fn token_count(chunks: &[DocumentChunk]) -> u64 {
    let chars: usize = chunks.iter().map(|c| c.text.chars().count()).sum();
    (chars / 4) as u64
}

/// Builds knowledge bases from folders on disk
pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    config: IngestConfig,
    splitter: TextSplitter,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        config: IngestConfig,
    ) -> Self {
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap);
        Self {
            store,
            embedder,
            config,
            splitter,
        }
    }

    /// Ingest every immediate subfolder of the configured source directory
    ///
    /// A failing folder is logged and recorded in the report; the remaining
    /// folders are still processed.
    ///
    /// # Errors
    ///
    /// Returns an error when the source directory cannot be listed.
    pub async fn process_source_directory(&self) -> Result<IngestReport> {
        let source = &self.config.source_directory;
        if !source.is_dir() {
            return Err(BuzzbotError::Ingestion(format!(
                "Source directory does not exist: {}",
                source.display()
            ))
            .into());
        }

        let mut folders: Vec<PathBuf> = std::fs::read_dir(source)
            .with_context(|| format!("Failed to list {}", source.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        folders.sort();

        tracing::info!(
            source = %source.display(),
            folders = folders.len(),
            "Processing source directory"
        );

        let mut report = IngestReport::default();
        for folder in folders {
            let name = folder_name(&folder);
            match self.ingest_folder(&folder).await {
                Ok(IngestOutcome::Ingested(kb)) => report.ingested.push(kb),
                Ok(IngestOutcome::Skipped { name }) => report.skipped.push(name),
                Ok(IngestOutcome::Empty { name }) => report.empty.push(name),
                Err(e) => {
                    tracing::error!(folder = %name, "Failed to ingest folder: {:#}", e);
                    report.failed.push((name, format!("{:#}", e)));
                }
            }
        }
        Ok(report)
    }

    /// Ingest one folder as a knowledge base named after it
    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestOutcome> {
        let name = folder_name(folder);
        if self.store.find_knowledge_base_by_name(&name)?.is_some() {
            tracing::info!(folder = %name, "Knowledge base already exists, skipping");
            return Ok(IngestOutcome::Skipped { name });
        }

        let source_path = std::fs::canonicalize(folder)
            .with_context(|| format!("Failed to resolve {}", folder.display()))?;

        let documents = load_directory(&source_path);
        let chunks = self.split(&documents);
        if chunks.is_empty() {
            tracing::warn!(folder = %name, "No text found, nothing to index");
            return Ok(IngestOutcome::Empty { name });
        }
        tracing::info!(
            folder = %name,
            documents = documents.len(),
            chunks = chunks.len(),
            "Embedding chunks"
        );

        let tokens = token_count(&chunks);
        let index = self.build_index(chunks).await?;

        let id = uuid::Uuid::new_v4().to_string();
        let index_dir = self.config.vector_store_root.join(&id);
        index.save(&index_dir)?;
        let index_path = std::fs::canonicalize(&index_dir)
            .with_context(|| format!("Failed to resolve {}", index_dir.display()))?;

        let kb = KnowledgeBase::new(id, name, source_path, index_path, tokens);
        if let Err(e) = self.store.insert_knowledge_base(&kb) {
            if let Err(cleanup) = std::fs::remove_dir_all(&kb.index_path) {
                tracing::warn!("Failed to remove orphaned index: {}", cleanup);
            }
            return Err(e);
        }

        tracing::info!(
            folder = %kb.name,
            id = %kb.id,
            tokens = kb.token_count,
            "Knowledge base created"
        );
        Ok(IngestOutcome::Ingested(kb))
    }

    fn split(&self, documents: &[LoadedDocument]) -> Vec<DocumentChunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.splitter
                    .split(&doc.text)
                    .into_iter()
                    .map(|text| DocumentChunk {
                        text,
                        source: doc.source.clone(),
                        locator: doc.locator,
                    })
            })
            .collect()
    }

    async fn build_index(&self, chunks: Vec<DocumentChunk>) -> Result<FlatIndex> {
        let mut index = FlatIndex::new();
        let batch_size = self.config.embedding_batch_size.max(1);

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(BuzzbotError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                ))
                .into());
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                index.add(chunk.clone(), vector)?;
            }
            tracing::debug!(indexed = index.len(), total = chunks.len(), "Embedded batch");
        }
        Ok(index)
    }
}

fn folder_name(folder: &Path) -> String {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}
