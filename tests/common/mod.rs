use async_trait::async_trait;
use buzzbot::index::{DocumentChunk, Locator, Retriever, ScoredPassage};
use buzzbot::providers::{CompletionResponse, Embedder, Message, Provider};
use buzzbot::search::{SearchResult, WebSearch};
use buzzbot::storage::SqliteStorage;
use buzzbot::BuzzbotError;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_temp_storage() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("buzzbot.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn passage(source: &str, page: u32, text: &str) -> ScoredPassage {
    ScoredPassage {
        chunk: DocumentChunk {
            text: text.to_string(),
            source: source.to_string(),
            locator: Some(Locator::Page(page)),
        },
        score: 0.9,
    }
}

/// Provider replaying canned replies; fails once they run out
#[allow(dead_code)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, messages: &[Message]) -> buzzbot::Result<CompletionResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BuzzbotError::Provider("provider unavailable".to_string()))?;
        Ok(CompletionResponse::new(Message::assistant(reply)))
    }
}

#[allow(dead_code)]
pub struct FixedRetriever(pub Vec<ScoredPassage>);

#[async_trait]
impl Retriever for FixedRetriever {
    async fn retrieve(&self, _query: &str, k: usize) -> buzzbot::Result<Vec<ScoredPassage>> {
        Ok(self.0.iter().take(k).cloned().collect())
    }
}

#[allow(dead_code)]
pub struct FixedSearch {
    pub results: Vec<SearchResult>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl FixedSearch {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for FixedSearch {
    async fn search(&self, _query: &str) -> buzzbot::Result<Vec<SearchResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.clone())
    }
}

/// Embedder mapping text to letter frequencies
#[allow(dead_code)]
pub struct LetterEmbedder {
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl LetterEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, texts: &[String]) -> buzzbot::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; 26];
                for c in text.to_lowercase().chars().filter(char::is_ascii_lowercase) {
                    vector[(c as u8 - b'a') as usize] += 1.0;
                }
                vector
            })
            .collect())
    }
}
