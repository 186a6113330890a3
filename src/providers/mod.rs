//! Provider module for BuzzBot
//!
//! This module contains the LLM and embedding abstractions and their
//! implementations for Google Gemini and Ollama.

pub mod base;
pub mod gemini;
pub mod ollama;

pub use base::{CompletionResponse, Embedder, Message, Provider, TokenUsage};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;

use crate::config::ProviderConfig;
use crate::error::{BuzzbotError, Result};
use std::sync::Arc;

/// Create a chat provider instance based on configuration
///
/// # Arguments
///
/// * `provider_type` - Type of provider ("gemini" or "ollama")
/// * `config` - Provider configuration
///
/// # Errors
///
/// Returns error if provider type is invalid or initialization fails
pub fn create_provider(provider_type: &str, config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    match provider_type {
        "gemini" => Ok(Arc::new(GeminiProvider::new(
            config.gemini.clone(),
            config.temperature,
        )?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            config.ollama.clone(),
            config.temperature,
        )?)),
        _ => Err(BuzzbotError::Provider(format!("Unknown provider type: {}", provider_type)).into()),
    }
}

/// Create an embedder instance based on configuration
///
/// Uses `ProviderConfig::embedding_provider`, which falls back to the chat
/// provider type.
///
/// # Errors
///
/// Returns error if provider type is invalid or initialization fails
pub fn create_embedder(config: &ProviderConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedding_provider() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(
            config.gemini.clone(),
            config.temperature,
        )?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(
            config.ollama.clone(),
            config.temperature,
        )?)),
        other => Err(BuzzbotError::Provider(format!("Unknown embedding provider: {}", other)).into()),
    }
}
