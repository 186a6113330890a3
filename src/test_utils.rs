//! Test doubles for the provider, retrieval, and search ports
//!
//! Each fake records how often it was called so tests can assert that a
//! path did or did not reach an external service. The `failing`
//! constructors make every call return an error.

use crate::error::{BuzzbotError, Result};
use crate::index::{Retriever, ScoredPassage};
use crate::providers::{CompletionResponse, Embedder, Message, Provider};
use crate::search::{SearchResult, WebSearch};
use crate::storage::KnowledgeBase;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Provider that replays queued replies in order
///
/// Runs out of replies with a `Provider` error. Every request is kept.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    failure: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new<S: Into<String>>(replies: Vec<S>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            failure: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose every call fails with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages of every call so far
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, messages: &[Message]) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages.to_vec());
        }
        if let Some(message) = &self.failure {
            return Err(BuzzbotError::Provider(message.clone()).into());
        }
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut replies| replies.pop_front())
            .ok_or_else(|| BuzzbotError::Provider("No scripted reply left".to_string()))?;
        Ok(CompletionResponse::new(Message::assistant(reply)))
    }
}

/// Retriever returning a fixed passage list
pub struct FakeRetriever {
    passages: Vec<ScoredPassage>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeRetriever {
    pub fn new(passages: Vec<ScoredPassage>) -> Self {
        Self {
            passages,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A retriever whose every call fails with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(BuzzbotError::Retrieval(message.clone()).into());
        }
        Ok(self.passages.iter().take(k).cloned().collect())
    }
}

/// Web search returning fixed results
pub struct FakeSearch {
    results: Vec<SearchResult>,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A search backend whose every call fails with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for FakeSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(BuzzbotError::Search(message.clone()).into());
        }
        Ok(self.results.clone())
    }
}

/// Deterministic embedder built from byte values
pub struct FakeEmbedder {
    dimension: usize,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += f32::from(byte) / 255.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Knowledge base record with a fresh id and 1200 tokens
pub fn sample_knowledge_base(name: &str) -> KnowledgeBase {
    KnowledgeBase::new(
        uuid::Uuid::new_v4().to_string(),
        name,
        format!("/data/static/{}", name),
        format!("/data/vector_stores/{}", name),
        1200,
    )
}
