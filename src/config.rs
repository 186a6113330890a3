//! Configuration management for BuzzBot
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{BuzzbotError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for BuzzBot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LLM and embedding provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Document store configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Folder ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Turn resolution configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Web search fallback configuration
    #[serde(default)]
    pub search: SearchConfig,
}

/// Provider configuration
///
/// Specifies which LLM provider answers questions and which one embeds
/// chunks. The embedder defaults to the chat provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use for chat completions
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// Type of provider used for embeddings (defaults to `type`)
    #[serde(default)]
    pub embedding_type: Option<String>,

    /// Sampling temperature for completions
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Google Gemini configuration
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
}

fn default_provider_type() -> String {
    "gemini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

impl ProviderConfig {
    /// Provider name used for embeddings
    pub fn embedding_provider(&self) -> &str {
        self.embedding_type
            .as_deref()
            .unwrap_or(self.provider_type.as_str())
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            embedding_type: None,
            temperature: default_temperature(),
            gemini: GeminiConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// Google Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key for the Generative Language API
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat model
    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// Embedding model
    #[serde(default = "default_gemini_embedding_model")]
    pub embedding_model: String,

    /// Optional API base URL (useful for tests and local mocks)
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_embedding_model() -> String {
    "text-embedding-004".to_string()
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            embedding_model: default_gemini_embedding_model(),
            api_base: None,
        }
    }
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Chat model
    #[serde(default = "default_ollama_model")]
    pub model: String,

    /// Embedding model
    #[serde(default = "default_ollama_embedding_model")]
    pub embedding_model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            embedding_model: default_ollama_embedding_model(),
        }
    }
}

/// Document store configuration
///
/// `url` is either a directory (the database file is
/// `<url>/<database_name>.db`) or a path ending in `.db`. A `sqlite://`
/// prefix is accepted. Collection names become table names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database connection string
    #[serde(default = "default_storage_url")]
    pub url: String,

    /// Database name
    #[serde(default = "default_database_name")]
    pub database_name: String,

    /// Collection holding knowledge-base records
    #[serde(default = "default_kb_collection")]
    pub knowledge_base_collection: String,

    /// Collection holding session metadata
    #[serde(default = "default_session_collection")]
    pub session_collection: String,

    /// Collection holding the chat message log
    #[serde(default = "default_chat_collection")]
    pub chat_collection: String,

    /// Connection busy timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_storage_url() -> String {
    "data".to_string()
}

fn default_database_name() -> String {
    "buzzbot".to_string()
}

fn default_kb_collection() -> String {
    "folders".to_string()
}

fn default_session_collection() -> String {
    "session_metadata".to_string()
}

fn default_chat_collection() -> String {
    "chat_history".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl StorageConfig {
    /// Resolve the SQLite database file from the connection string
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::config::StorageConfig;
    /// use std::path::PathBuf;
    ///
    /// let mut storage = StorageConfig::default();
    /// storage.url = "sqlite:///var/lib/buzzbot".to_string();
    /// assert_eq!(storage.database_file(), PathBuf::from("/var/lib/buzzbot/buzzbot.db"));
    /// ```
    pub fn database_file(&self) -> PathBuf {
        let location = self.url.strip_prefix("sqlite://").unwrap_or(&self.url);
        let location = PathBuf::from(location);
        if location.extension().is_some_and(|ext| ext == "db") {
            location
        } else {
            location.join(format!("{}.db", self.database_name))
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: default_storage_url(),
            database_name: default_database_name(),
            knowledge_base_collection: default_kb_collection(),
            session_collection: default_session_collection(),
            chat_collection: default_chat_collection(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Folder ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory whose immediate subfolders become knowledge bases
    #[serde(default = "default_source_directory")]
    pub source_directory: PathBuf,

    /// Directory under which each knowledge base index is saved
    #[serde(default = "default_vector_store_root")]
    pub vector_store_root: PathBuf,

    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Number of chunks sent per embedding request
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
}

fn default_source_directory() -> PathBuf {
    PathBuf::from("data/static")
}

fn default_vector_store_root() -> PathBuf {
    PathBuf::from("data/vector_stores")
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_embedding_batch_size() -> usize {
    32
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_directory: default_source_directory(),
            vector_store_root: default_vector_store_root(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_batch_size: default_embedding_batch_size(),
        }
    }
}

/// How retrieved passages are judged relevant
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GradingMode {
    /// Ask the LLM for a YES/NO judgment
    #[default]
    Llm,
    /// Relevant unless retrieval produced the "no relevant information" sentinel
    Sentinel,
}

/// Turn resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Number of passages retrieved per question
    #[serde(default = "default_retriever_k")]
    pub retriever_k: usize,

    /// Relevance grading strategy
    #[serde(default)]
    pub grading: GradingMode,

    /// Passages scoring below this cosine similarity are dropped
    #[serde(default)]
    pub min_relevance_score: f32,

    /// Maximum LLM calls a single turn may issue
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// History summarization settings
    #[serde(default)]
    pub history: HistoryConfig,
}

fn default_retriever_k() -> usize {
    5
}

fn default_max_iterations() -> usize {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            retriever_k: default_retriever_k(),
            grading: GradingMode::default(),
            min_relevance_score: 0.0,
            max_iterations: default_max_iterations(),
            history: HistoryConfig::default(),
        }
    }
}

/// History summarization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Summarize once the turn count exceeds this many exchanges
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold_turns: usize,

    /// Most recent turns kept verbatim after summarizing
    #[serde(default = "default_keep_recent")]
    pub keep_recent_turns: usize,
}

fn default_summary_threshold() -> usize {
    2
}

fn default_keep_recent() -> usize {
    2
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            summary_threshold_turns: default_summary_threshold(),
            keep_recent_turns: default_keep_recent(),
        }
    }
}

/// Web search fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Offer web search when the documents cannot answer
    #[serde(default = "default_search_enabled")]
    pub enabled: bool,

    /// SerpAPI key
    #[serde(default)]
    pub serpapi_api_key: Option<String>,

    /// SerpAPI base URL
    #[serde(default = "default_serpapi_base")]
    pub api_base: String,

    /// Organic results kept per search
    #[serde(default = "default_num_results")]
    pub num_results: usize,

    /// Text appended to every web query to keep results on topic
    #[serde(default)]
    pub query_suffix: Option<String>,

    /// HTTP timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_seconds: u64,
}

fn default_search_enabled() -> bool {
    true
}

fn default_serpapi_base() -> String {
    "https://serpapi.com".to_string()
}

fn default_num_results() -> usize {
    5
}

fn default_search_timeout() -> u64 {
    30
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: default_search_enabled(),
            serpapi_api_key: None,
            api_base: default_serpapi_base(),
            num_results: default_num_results(),
            query_suffix: None,
            timeout_seconds: default_search_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BuzzbotError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| BuzzbotError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Provider overrides
        if let Ok(provider_type) = std::env::var("BUZZBOT_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(embedding_type) = std::env::var("BUZZBOT_EMBEDDING_PROVIDER") {
            self.provider.embedding_type = Some(embedding_type);
        }

        if let Some(api_key) = env_with_fallback("BUZZBOT_LLM_API_KEY", "GOOGLE_API_KEY") {
            self.provider.gemini.api_key = Some(api_key);
        }

        if let Ok(model) = std::env::var("BUZZBOT_LLM_MODEL") {
            match self.provider.provider_type.as_str() {
                "ollama" => self.provider.ollama.model = model,
                _ => self.provider.gemini.model = model,
            }
        }

        if let Ok(temperature) = std::env::var("BUZZBOT_LLM_TEMPERATURE") {
            if let Ok(value) = temperature.parse() {
                self.provider.temperature = value;
            } else {
                tracing::warn!("Invalid BUZZBOT_LLM_TEMPERATURE: {}", temperature);
            }
        }

        if let Ok(ollama_host) = std::env::var("BUZZBOT_OLLAMA_HOST") {
            self.provider.ollama.host = ollama_host;
        }

        // Storage overrides
        if let Ok(url) = std::env::var("BUZZBOT_DATABASE_URL") {
            self.storage.url = url;
        }

        if let Ok(name) = std::env::var("BUZZBOT_DB_NAME") {
            self.storage.database_name = name;
        }

        if let Ok(name) = std::env::var("BUZZBOT_KB_COLLECTION") {
            self.storage.knowledge_base_collection = name;
        }

        if let Ok(name) = std::env::var("BUZZBOT_CHAT_COLLECTION") {
            self.storage.chat_collection = name;
        }

        if let Ok(name) = std::env::var("BUZZBOT_SESSION_COLLECTION") {
            self.storage.session_collection = name;
        }

        // Ingestion overrides
        if let Ok(dir) = std::env::var("BUZZBOT_SOURCE_DIRECTORY") {
            self.ingest.source_directory = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("BUZZBOT_VECTOR_STORE_ROOT") {
            self.ingest.vector_store_root = PathBuf::from(dir);
        }

        if let Ok(size) = std::env::var("BUZZBOT_CHUNK_SIZE") {
            if let Ok(value) = size.parse() {
                self.ingest.chunk_size = value;
            } else {
                tracing::warn!("Invalid BUZZBOT_CHUNK_SIZE: {}", size);
            }
        }

        if let Ok(overlap) = std::env::var("BUZZBOT_CHUNK_OVERLAP") {
            if let Ok(value) = overlap.parse() {
                self.ingest.chunk_overlap = value;
            } else {
                tracing::warn!("Invalid BUZZBOT_CHUNK_OVERLAP: {}", overlap);
            }
        }

        // Agent overrides
        if let Ok(k) = std::env::var("BUZZBOT_RETRIEVER_K") {
            if let Ok(value) = k.parse() {
                self.agent.retriever_k = value;
            } else {
                tracing::warn!("Invalid BUZZBOT_RETRIEVER_K: {}", k);
            }
        }

        if let Ok(max_iterations) = std::env::var("BUZZBOT_AGENT_MAX_ITERATIONS") {
            if let Ok(value) = max_iterations.parse() {
                self.agent.max_iterations = value;
            } else {
                tracing::warn!("Invalid BUZZBOT_AGENT_MAX_ITERATIONS: {}", max_iterations);
            }
        }

        // Search overrides
        if let Some(api_key) = env_with_fallback("BUZZBOT_SERPAPI_API_KEY", "SERPAPI_API_KEY") {
            self.search.serpapi_api_key = Some(api_key);
        }

        if let Ok(enabled) = std::env::var("BUZZBOT_WEB_SEARCH") {
            match enabled.parse::<bool>() {
                Ok(v) => self.search.enabled = v,
                Err(_) => tracing::warn!("Invalid value for BUZZBOT_WEB_SEARCH: {}", enabled),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(ref storage_path) = cli.storage_path {
            self.storage.url = storage_path.display().to_string();
            tracing::debug!(url = %self.storage.url, "CLI override: storage path");
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges and
    /// that required keys are present. Web search without an API key is
    /// downgraded to disabled rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns `BuzzbotError::Config` if any validation check fails
    pub fn validate(&mut self) -> Result<()> {
        let valid_providers = ["gemini", "ollama"];
        for provider in [
            self.provider.provider_type.as_str(),
            self.provider.embedding_provider(),
        ] {
            if !valid_providers.contains(&provider) {
                return Err(BuzzbotError::Config(format!(
                    "Invalid provider type: {}. Must be one of: {}",
                    provider,
                    valid_providers.join(", ")
                ))
                .into());
            }
        }

        let needs_gemini_key = self.provider.provider_type == "gemini"
            || self.provider.embedding_provider() == "gemini";
        let has_gemini_key = self
            .provider
            .gemini
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if needs_gemini_key && !has_gemini_key {
            return Err(BuzzbotError::Config(
                "Missing LLM API key (set BUZZBOT_LLM_API_KEY or provider.gemini.api_key)"
                    .to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(BuzzbotError::Config(
                "provider.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.storage.url.trim().is_empty() {
            return Err(BuzzbotError::Config("storage.url cannot be empty".to_string()).into());
        }

        let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| BuzzbotError::Config(e.to_string()))?;
        for (key, value) in [
            ("storage.database_name", &self.storage.database_name),
            (
                "storage.knowledge_base_collection",
                &self.storage.knowledge_base_collection,
            ),
            ("storage.session_collection", &self.storage.session_collection),
            ("storage.chat_collection", &self.storage.chat_collection),
        ] {
            if !identifier.is_match(value) {
                return Err(BuzzbotError::Config(format!(
                    "{} must be a plain identifier, got '{}'",
                    key, value
                ))
                .into());
            }
        }

        if self.ingest.chunk_size == 0 {
            return Err(
                BuzzbotError::Config("ingest.chunk_size must be greater than 0".to_string()).into(),
            );
        }

        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(BuzzbotError::Config(
                "ingest.chunk_overlap must be smaller than ingest.chunk_size".to_string(),
            )
            .into());
        }

        if self.ingest.embedding_batch_size == 0 {
            return Err(BuzzbotError::Config(
                "ingest.embedding_batch_size must be greater than 0".to_string(),
            )
            .into());
        }

        if self.agent.retriever_k == 0 {
            return Err(
                BuzzbotError::Config("agent.retriever_k must be greater than 0".to_string()).into(),
            );
        }

        if self.agent.max_iterations == 0 {
            return Err(BuzzbotError::Config(
                "agent.max_iterations must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=1.0).contains(&self.agent.min_relevance_score) {
            return Err(BuzzbotError::Config(
                "agent.min_relevance_score must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        let has_serpapi_key = self
            .search
            .serpapi_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if self.search.enabled && !has_serpapi_key {
            tracing::warn!("Web search enabled but no SerpAPI key configured; disabling it");
            self.search.enabled = false;
        }

        Ok(())
    }
}

fn env_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            storage: StorageConfig::default(),
            ingest: IngestConfig::default(),
            agent: AgentConfig::default(),
            search: SearchConfig::default(),
        }
    }
}
