//! Conversation history with LLM summarization of older turns
//!
//! The full list of turns is kept in memory. When the number of turns
//! exceeds the summary threshold, every turn except the most recent few is
//! compressed into a short summary by one LLM call, and the context sent to
//! the model becomes the summary followed by the recent turns verbatim.

use crate::config::HistoryConfig;
use crate::error::Result;
use crate::prompts::generate_summary_prompt;
use crate::providers::{Message, Provider};

/// One question and its answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub user: String,
    pub assistant: String,
}

impl Turn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }

    /// The turn as a user message followed by an assistant message
    pub fn messages(&self) -> [Message; 2] {
        [
            Message::user(self.user.clone()),
            Message::assistant(self.assistant.clone()),
        ]
    }
}

/// History context prepared for one content turn
#[derive(Debug, Clone, Default)]
pub struct HistoryContext {
    /// Messages to place between the system prompt and the question
    pub messages: Vec<Message>,
    /// Summary to persist if the turn succeeds
    pub summary: Option<String>,
}

/// Ordered turns of a chat session plus its running summary
///
/// # Summarization
///
/// With `summary_threshold_turns = 2` and `keep_recent_turns = 2`, the third
/// turn triggers the first summary: turn 1 is summarized, turns 2 and 3 stay
/// verbatim. The summary is recomputed from the full history each time, so
/// it never drifts from what was actually said.
#[derive(Debug, Clone)]
pub struct Conversation {
    turns: Vec<Turn>,
    summary: Option<String>,
    /// Persisted summary standing in for turns that are not in memory
    seed: Option<String>,
    summary_threshold_turns: usize,
    keep_recent_turns: usize,
}

impl Conversation {
    /// Creates an empty conversation
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::agent::Conversation;
    /// use buzzbot::config::HistoryConfig;
    ///
    /// let conversation = Conversation::new(&HistoryConfig::default());
    /// assert!(conversation.is_empty());
    /// assert_eq!(conversation.history_meta_answer(), "No conversation history yet.");
    /// ```
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            turns: Vec::new(),
            summary: None,
            seed: None,
            summary_threshold_turns: config.summary_threshold_turns,
            keep_recent_turns: config.keep_recent_turns,
        }
    }

    /// Rebuilds a conversation from a stored message log
    ///
    /// Messages are paired in order as user/assistant; a trailing unpaired
    /// user message is dropped. The persisted `summary` is kept as the
    /// running summary; when the log is empty it also seeds the LLM context.
    pub fn from_messages(
        messages: &[Message],
        summary: Option<String>,
        config: &HistoryConfig,
    ) -> Self {
        let mut conversation = Self::new(config);
        conversation.summary = summary.filter(|s| !s.trim().is_empty());

        let mut pending_user: Option<&str> = None;
        for message in messages {
            match (message.role.as_str(), pending_user) {
                ("user", _) => pending_user = Some(message.content.as_str()),
                ("assistant", Some(user)) => {
                    conversation.turns.push(Turn::new(user, message.content.clone()));
                    pending_user = None;
                }
                _ => {
                    tracing::debug!(role = %message.role, "Skipping unpaired stored message");
                }
            }
        }
        if conversation.turns.is_empty() {
            conversation.seed = conversation.summary.clone();
        }
        conversation
    }

    /// Appends a completed turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Replaces the running summary
    pub fn set_summary(&mut self, summary: Option<String>) {
        self.summary = summary;
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The user's questions in order
    pub fn questions(&self) -> Vec<&str> {
        self.turns.iter().map(|t| t.user.as_str()).collect()
    }

    /// True when the next content turn will call the LLM to summarize
    pub fn needs_summary(&self) -> bool {
        self.turns.len() > self.summary_threshold_turns
            && self.turns.len() > self.keep_recent_turns
    }

    /// Answer to "what did I ask" style questions, built without the LLM
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::agent::{Conversation, Turn};
    /// use buzzbot::config::HistoryConfig;
    ///
    /// let mut conversation = Conversation::new(&HistoryConfig::default());
    /// conversation.push(Turn::new("What is Buzz?", "A messaging app."));
    /// assert_eq!(
    ///     conversation.history_meta_answer(),
    ///     "Previous questions:\n1. What is Buzz?"
    /// );
    /// ```
    pub fn history_meta_answer(&self) -> String {
        let mut sections = Vec::new();
        if let Some(summary) = &self.summary {
            sections.push(format!("Summary of earlier conversation:\n{}", summary));
        }
        if !self.turns.is_empty() {
            let questions = self
                .questions()
                .iter()
                .enumerate()
                .map(|(i, q)| format!("{}. {}", i + 1, q))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("Previous questions:\n{}", questions));
        }

        if sections.is_empty() {
            "No conversation history yet.".to_string()
        } else {
            sections.join("\n\n")
        }
    }

    /// Builds the history part of the LLM context for a content turn
    ///
    /// Does not modify the conversation; the returned summary is applied by
    /// the caller once the turn succeeds. A failed summarization falls back
    /// to the full history verbatim.
    pub async fn build_context(&self, provider: &dyn Provider) -> HistoryContext {
        if !self.needs_summary() {
            return self.verbatim_context();
        }

        let split = self.turns.len() - self.keep_recent_turns;
        let (older, recent) = self.turns.split_at(split);

        match self.summarize(provider, older).await {
            Ok(summary) => {
                tracing::debug!(
                    summarized_turns = older.len(),
                    recent_turns = recent.len(),
                    "Summarized conversation history"
                );
                let mut messages = vec![summary_message(&summary)];
                messages.extend(recent.iter().flat_map(Turn::messages));
                HistoryContext {
                    messages,
                    summary: Some(summary),
                }
            }
            Err(e) => {
                tracing::warn!("History summarization failed, using full history: {:#}", e);
                self.verbatim_context()
            }
        }
    }

    fn verbatim_context(&self) -> HistoryContext {
        let mut messages: Vec<Message> = self.seed.iter().map(|s| summary_message(s)).collect();
        messages.extend(self.turns.iter().flat_map(Turn::messages));
        HistoryContext {
            messages,
            summary: self.summary.clone(),
        }
    }

    async fn summarize(&self, provider: &dyn Provider, older: &[Turn]) -> Result<String> {
        let mut transcript: Vec<Message> = self.seed.iter().map(|s| summary_message(s)).collect();
        transcript.extend(older.iter().flat_map(Turn::messages));

        let prompt = generate_summary_prompt(&transcript);
        let response = provider.complete(&[Message::user(prompt)]).await?;
        Ok(response.text().to_string())
    }
}

/// Earlier summary as context, never attributed to the user
fn summary_message(summary: &str) -> Message {
    Message::system(format!("[Previous conversation summary: {}]", summary))
}
