//! Ollama provider implementation for BuzzBot
//!
//! This module implements the `Provider` and `Embedder` traits for Ollama,
//! connecting to a local or remote Ollama server for chat completions
//! (`/api/chat`) and embeddings (`/api/embed`).

use crate::config::OllamaConfig;
use crate::error::{BuzzbotError, Result};
use crate::providers::base::ensure_batch_len;
use crate::providers::{CompletionResponse, Embedder, Message, Provider, TokenUsage};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ollama API provider
///
/// # Examples
///
/// ```no_run
/// use buzzbot::config::OllamaConfig;
/// use buzzbot::providers::{OllamaProvider, Provider, Message};
///
/// # async fn example() -> buzzbot::error::Result<()> {
/// let provider = OllamaProvider::new(OllamaConfig::default(), 0.3)?;
/// let completion = provider.complete(&[Message::user("Hello!")]).await?;
/// println!("{}", completion.text());
/// # Ok(())
/// # }
/// ```
pub struct OllamaProvider {
    client: Client,
    config: OllamaConfig,
    temperature: f32,
}

/// Request structure for Ollama chat API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Message structure for Ollama API
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

/// Response structure from Ollama chat API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
}

/// Request structure for Ollama embed API
#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response structure from Ollama embed API
#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaProvider {
    /// Create a new Ollama provider instance
    ///
    /// # Arguments
    ///
    /// * `config` - Ollama configuration containing host and models
    /// * `temperature` - Sampling temperature for completions
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::config::OllamaConfig;
    /// use buzzbot::providers::OllamaProvider;
    ///
    /// let provider = OllamaProvider::new(OllamaConfig::default(), 0.3);
    /// assert!(provider.is_ok());
    /// ```
    pub fn new(config: OllamaConfig, temperature: f32) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("buzzbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BuzzbotError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Ollama provider: host={}, model={}, embedding_model={}",
            config.host,
            config.model,
            config.embedding_model
        );

        Ok(Self {
            client,
            config,
            temperature,
        })
    }

    /// Get the configured Ollama host
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Get the configured chat model name
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.host.trim_end_matches('/'), path)
    }

    fn convert_messages(messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| OllamaMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
        let ollama_request = OllamaRequest {
            model: self.config.model.clone(),
            messages: Self::convert_messages(messages),
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        tracing::debug!(
            "Sending Ollama request: {} messages",
            ollama_request.messages.len()
        );

        let response = self
            .client
            .post(self.endpoint("chat"))
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Ollama request failed: {}", e);
                BuzzbotError::Provider(format!("Ollama request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama returned error {}: {}", status, error_text);
            return Err(BuzzbotError::Provider(format!(
                "Ollama returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let ollama_response: OllamaResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Ollama response: {}", e);
            BuzzbotError::Provider(format!("Failed to parse Ollama response: {}", e))
        })?;

        tracing::debug!(
            "Ollama response: done={}, prompt_tokens={}, completion_tokens={}",
            ollama_response.done,
            ollama_response.prompt_eval_count,
            ollama_response.eval_count
        );

        let message = Message::assistant(ollama_response.message.content);
        let response = if ollama_response.prompt_eval_count > 0 || ollama_response.eval_count > 0 {
            let usage = TokenUsage::new(
                ollama_response.prompt_eval_count,
                ollama_response.eval_count,
            );
            CompletionResponse::with_usage(message, usage)
        } else {
            CompletionResponse::new(message)
        };

        Ok(response)
    }

    fn get_current_model(&self) -> Result<String> {
        Ok(self.config.model.clone())
    }
}

#[async_trait]
impl Embedder for OllamaProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OllamaEmbedRequest {
            model: &self.config.embedding_model,
            input: texts,
        };

        let response = self
            .client
            .post(self.endpoint("embed"))
            .json(&request)
            .send()
            .await
            .map_err(|e| BuzzbotError::Embedding(format!("Ollama embed request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Ollama embed returned error {}: {}", status, error_text);
            return Err(BuzzbotError::Embedding(format!(
                "Ollama embed returned error {}: {}",
                status, error_text
            ))
            .into());
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|e| {
            BuzzbotError::Embedding(format!("Failed to parse Ollama embed response: {}", e))
        })?;

        ensure_batch_len(texts.len(), &body.embeddings)?;
        Ok(body.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_accessors() {
        let provider = OllamaProvider::new(OllamaConfig::default(), 0.3).unwrap();
        assert_eq!(provider.host(), "http://localhost:11434");
        assert_eq!(provider.model(), "llama3.2:latest");
        assert_eq!(provider.get_current_model().unwrap(), "llama3.2:latest");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = OllamaConfig {
            host: "http://ollama:11434/".to_string(),
            ..OllamaConfig::default()
        };
        let provider = OllamaProvider::new(config, 0.3).unwrap();
        assert_eq!(provider.endpoint("chat"), "http://ollama:11434/api/chat");
    }

    #[test]
    fn test_convert_messages_skips_empty_content() {
        let converted = OllamaProvider::convert_messages(&[
            Message::system("rules"),
            Message::assistant(""),
            Message::user("question"),
        ]);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].content, "question");
    }

    #[test]
    fn test_request_serialization_disables_streaming() {
        let request = OllamaRequest {
            model: "llama3.2:latest".to_string(),
            messages: vec![],
            stream: false,
            options: OllamaOptions { temperature: 0.3 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], false);
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_embed_empty_batch_makes_no_request() {
        let config = OllamaConfig {
            host: "http://127.0.0.1:1".to_string(),
            ..OllamaConfig::default()
        };
        let provider = OllamaProvider::new(config, 0.3).unwrap();
        assert!(provider.embed(&[]).await.unwrap().is_empty());
    }
}
