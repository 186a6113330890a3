//! Error types for BuzzBot
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for BuzzBot operations
///
/// Covers configuration loading, LLM and embedding providers, retrieval,
/// web search, ingestion, and the document store.
#[derive(Error, Debug)]
pub enum BuzzbotError {
    /// Configuration-related errors (missing keys, invalid ranges)
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM provider errors (API calls, authentication, malformed replies)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Embedding model errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index and retrieval errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Web search errors
    #[error("Search error: {0}")]
    Search(String),

    /// Folder ingestion errors
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// A single document could not be read or parsed
    #[error("Document load error: {0}")]
    DocumentLoad(String),

    /// A turn used more LLM calls than allowed
    #[error("Turn exceeded maximum LLM calls: limit={limit}, {message}")]
    MaxIterationsExceeded {
        /// The configured call limit
        limit: usize,
        /// Additional context about the failure
        message: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite driver errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Document store errors (records, sessions, message log)
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type alias for BuzzBot operations
///
/// Uses `anyhow::Error` so call sites can attach context while
/// propagating with `?`.
pub type Result<T> = anyhow::Result<T>;
