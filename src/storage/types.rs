use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One ingested folder: its chunks live in the index at `index_path`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Display name, unique across records (the folder name)
    pub name: String,
    /// Absolute path of the ingested folder
    pub source_path: PathBuf,
    /// Absolute path of the saved vector index directory
    pub index_path: PathBuf,
    /// Approximate token count of the ingested text
    pub token_count: u64,
    /// When the folder was ingested
    pub created_at: DateTime<Utc>,
}

impl KnowledgeBase {
    /// Build a new record with a fresh identifier and creation time
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        token_count: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source_path: source_path.into(),
            index_path: index_path.into(),
            token_count,
            created_at: Utc::now(),
        }
    }
}

/// Metadata for a chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique identifier for the session
    pub session_id: String,
    /// Knowledge base the session chats with
    pub knowledge_base_id: String,
    /// Knowledge base display name at session creation
    pub knowledge_base_name: String,
    /// Last time a turn was recorded
    pub last_active: DateTime<Utc>,
    /// Running summary of turns older than the verbatim window
    pub summary: Option<String>,
}

impl SessionRecord {
    /// Start a new session against `kb`
    pub fn start(kb: &KnowledgeBase) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            knowledge_base_id: kb.id.clone(),
            knowledge_base_name: kb.name.clone(),
            last_active: Utc::now(),
            summary: None,
        }
    }

    /// First eight characters of the session id, for listings
    pub fn short_id(&self) -> &str {
        short_id(&self.session_id)
    }
}

/// First eight characters of an identifier
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
