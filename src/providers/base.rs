//! Base provider traits and common types for BuzzBot
//!
//! This module defines the `Provider` trait for chat completions and the
//! `Embedder` trait for vector embeddings, along with the message and
//! response types shared by every backend.

use crate::error::{BuzzbotError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message structure for conversation
///
/// Represents a message sent to or received from the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::providers::Message;
    ///
    /// let msg = Message::user("What does the manual say about groups?");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::providers::Message;
    ///
    /// let msg = Message::assistant("Groups are created from the Contacts tab.");
    /// assert_eq!(msg.role, "assistant");
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new system message
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::providers::Message;
    ///
    /// let msg = Message::system("Answer only from the passages below.");
    /// assert_eq!(msg.role, "system");
    /// ```
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Token usage information from a completion
///
/// Tracks the number of tokens used in prompts and completions,
/// as reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    pub prompt_tokens: usize,
    /// Number of tokens in the completion
    pub completion_tokens: usize,
    /// Total tokens used (prompt + completion)
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Completion response with message and optional token usage
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The response message from the LLM
    pub message: Message,
    /// Optional token usage information
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Create a new CompletionResponse
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::providers::{CompletionResponse, Message};
    ///
    /// let response = CompletionResponse::new(Message::assistant("YES"));
    /// assert_eq!(response.text(), "YES");
    /// assert!(response.usage.is_none());
    /// ```
    pub fn new(message: Message) -> Self {
        Self {
            message,
            usage: None,
        }
    }

    /// Create a new CompletionResponse with token usage
    pub fn with_usage(message: Message, usage: TokenUsage) -> Self {
        Self {
            message,
            usage: Some(usage),
        }
    }

    /// The trimmed text of the reply
    pub fn text(&self) -> &str {
        self.message.content.trim()
    }
}

/// Provider trait for chat-completion backends
///
/// # Examples
///
/// ```no_run
/// use buzzbot::providers::{Provider, Message, CompletionResponse};
/// use buzzbot::error::Result;
/// use async_trait::async_trait;
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     async fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
///         let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
///         Ok(CompletionResponse::new(Message::assistant(last)))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Completes a conversation with the given messages
    ///
    /// # Arguments
    ///
    /// * `messages` - System, user, and assistant messages in order
    ///
    /// # Errors
    ///
    /// Returns error if the API call fails or the response is invalid
    async fn complete(&self, messages: &[Message]) -> Result<CompletionResponse>;

    /// Get the name of the currently active model
    ///
    /// The default implementation reports that the information is not
    /// available.
    fn get_current_model(&self) -> Result<String> {
        Err(BuzzbotError::Provider(
            "Current model information is not available from this provider".to_string(),
        )
        .into())
    }
}

/// Embedder trait for embedding backends
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in order
    ///
    /// # Errors
    ///
    /// Returns error if the API call fails or the number of vectors does
    /// not match the number of inputs
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| BuzzbotError::Embedding("Embedder returned no vector".to_string()).into())
    }
}

/// Check that an embedding batch came back with one vector per input
pub(crate) fn ensure_batch_len(expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
    if vectors.len() != expected {
        return Err(BuzzbotError::Embedding(format!(
            "Expected {} embeddings, received {}",
            expected,
            vectors.len()
        ))
        .into());
    }
    Ok(())
}
