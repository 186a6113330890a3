//! Google Gemini provider implementation for BuzzBot
//!
//! Talks to the Generative Language REST API: `generateContent` for chat
//! completions and `batchEmbedContents` for embeddings. System messages are
//! folded into `systemInstruction`; assistant turns use the `model` role.

use crate::config::GeminiConfig;
use crate::error::{BuzzbotError, Result};
use crate::providers::base::ensure_batch_len;
use crate::providers::{CompletionResponse, Embedder, Message, Provider, TokenUsage};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API provider
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
    api_key: String,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: GeminiContent,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiProvider {
    /// Create a new Gemini provider instance
    ///
    /// # Errors
    ///
    /// Returns `BuzzbotError::Config` when no API key is configured and
    /// `BuzzbotError::Provider` if the HTTP client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::config::GeminiConfig;
    /// use buzzbot::providers::GeminiProvider;
    ///
    /// let config = GeminiConfig {
    ///     api_key: Some("test-key".to_string()),
    ///     ..GeminiConfig::default()
    /// };
    /// assert!(GeminiProvider::new(config, 0.3).is_ok());
    /// assert!(GeminiProvider::new(GeminiConfig::default(), 0.3).is_err());
    /// ```
    pub fn new(config: GeminiConfig, temperature: f32) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| BuzzbotError::Config("Missing Gemini API key".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("buzzbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BuzzbotError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized Gemini provider: model={}, embedding_model={}",
            config.model,
            config.embedding_model
        );

        Ok(Self {
            client,
            config,
            api_key,
            temperature,
        })
    }

    /// Build a model endpoint URL honouring `GeminiConfig::api_base`
    fn model_endpoint(&self, model: &str, method: &str) -> String {
        let base = self
            .config
            .api_base
            .as_deref()
            .unwrap_or(GEMINI_API_BASE)
            .trim_end_matches('/');
        format!("{}/models/{}:{}", base, model, method)
    }

    fn build_request(&self, messages: &[Message]) -> GenerateRequest {
        let system_text = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let contents = messages
            .iter()
            .filter(|m| m.role != "system" && !m.content.is_empty())
            .map(|m| GeminiContent {
                role: Some(if m.role == "assistant" { "model" } else { "user" }.to_string()),
                parts: vec![GeminiPart {
                    text: m.content.clone(),
                }],
            })
            .collect();

        GenerateRequest {
            system_instruction: (!system_text.is_empty()).then(|| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: system_text }],
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> std::result::Result<reqwest::Response, String> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Gemini request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::error!("Gemini returned error {}: {}", status, error_text);
            return Err(format!("Gemini returned error {}: {}", status, error_text));
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
        let request = self.build_request(messages);
        if request.contents.is_empty() {
            return Err(BuzzbotError::Provider(
                "Gemini request needs at least one user message".to_string(),
            )
            .into());
        }

        tracing::debug!("Sending Gemini request: {} contents", request.contents.len());

        let url = self.model_endpoint(&self.config.model, "generateContent");
        let response = self
            .post_json(&url, &request)
            .await
            .map_err(BuzzbotError::Provider)?;

        let body: GenerateResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}", e);
            BuzzbotError::Provider(format!("Failed to parse Gemini response: {}", e))
        })?;

        let candidate = body.candidates.into_iter().next().ok_or_else(|| {
            BuzzbotError::Provider("Gemini returned no candidates".to_string())
        })?;

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(BuzzbotError::Provider(format!(
                "Gemini returned an empty reply (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
            .into());
        }

        let message = Message::assistant(text);
        Ok(match body.usage_metadata {
            Some(usage) => CompletionResponse::with_usage(
                message,
                TokenUsage::new(usage.prompt_token_count, usage.candidates_token_count),
            ),
            None => CompletionResponse::new(message),
        })
    }

    fn get_current_model(&self) -> Result<String> {
        Ok(self.config.model.clone())
    }
}

#[async_trait]
impl Embedder for GeminiProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = &self.config.embedding_model;
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", model),
                    content: GeminiContent {
                        role: None,
                        parts: vec![GeminiPart { text: text.clone() }],
                    },
                })
                .collect(),
        };

        let url = self.model_endpoint(model, "batchEmbedContents");
        let response = self
            .post_json(&url, &request)
            .await
            .map_err(BuzzbotError::Embedding)?;

        let body: BatchEmbedResponse = response.json().await.map_err(|e| {
            BuzzbotError::Embedding(format!("Failed to parse Gemini embed response: {}", e))
        })?;

        let vectors: Vec<Vec<f32>> = body.embeddings.into_iter().map(|e| e.values).collect();
        ensure_batch_len(texts.len(), &vectors)?;
        Ok(vectors)
    }
}
