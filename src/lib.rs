//! BuzzBot - document question answering library
//!
//! This library provides the core functionality for BuzzBot: turning
//! folders of documents into searchable knowledge bases and answering
//! questions about them in persistent chat sessions.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `ingest`: Document loading, chunking, and knowledge base creation
//! - `index`: On-disk vector index and similarity retrieval
//! - `agent`: Turn resolution, history summarization, and chat sessions
//! - `providers`: LLM and embedding providers (Ollama, Gemini)
//! - `search`: Web search fallback (SerpAPI)
//! - `storage`: Knowledge base, session, and message persistence
//! - `prompts`: Prompt templates for answering, grading, and summarizing
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use buzzbot::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!     println!("Chatting through {}", config.provider.provider_type);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod prompts;
pub mod providers;
pub mod search;
pub mod storage;

// Re-export commonly used types
pub use agent::{ChatSession, TurnResolver};
pub use config::Config;
pub use error::{BuzzbotError, Result};

#[cfg(test)]
pub mod test_utils;
