//! Command-line interface definition for BuzzBot
//!
//! This module defines the CLI structure using clap's derive API. Running
//! without a subcommand opens the interactive menu.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// BuzzBot - document question answering over local knowledge bases
///
/// Ingest folders of documents, then chat with them. Questions the
/// documents cannot answer can fall back to a web search.
#[derive(Parser, Debug, Clone)]
#[command(name = "buzzbot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Override the database location from the config file
    #[arg(long, env = "BUZZBOT_STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    /// Command to execute (defaults to the interactive menu)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for BuzzBot
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Open the interactive menu
    Menu,

    /// Ingest every subfolder of the source directory, or a single folder
    Ingest {
        /// Ingest only this folder instead of scanning the source directory
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },

    /// Start a new chat session against a knowledge base
    Chat {
        /// Knowledge base id or name
        #[arg(short, long)]
        kb: String,

        /// Disable the web search fallback for this session
        #[arg(long)]
        no_web: bool,
    },

    /// Resume a previous chat session
    Resume {
        /// Session identifier
        session_id: String,

        /// Disable the web search fallback for this session
        #[arg(long)]
        no_web: bool,
    },

    /// List ingested knowledge bases
    Folders,

    /// List previous chat sessions, most recent first
    Sessions,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The command to run, falling back to the menu
    pub fn command_or_menu(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Menu)
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            log_json: false,
            storage_path: None,
            command: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert_eq!(cli.command_or_menu(), Commands::Menu);
    }

    #[test]
    fn test_cli_without_subcommand_opens_menu() {
        let cli = Cli::try_parse_from(["buzzbot"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.command_or_menu(), Commands::Menu);
    }

    #[test]
    fn test_cli_parse_ingest_all() {
        let cli = Cli::try_parse_from(["buzzbot", "ingest"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Ingest { folder: None }));
    }

    #[test]
    fn test_cli_parse_ingest_single_folder() {
        let cli = Cli::try_parse_from(["buzzbot", "ingest", "--folder", "data/manuals"]).unwrap();
        if let Some(Commands::Ingest { folder }) = cli.command {
            assert_eq!(folder, Some(PathBuf::from("data/manuals")));
        } else {
            panic!("Expected Ingest command");
        }
    }

    #[test]
    fn test_cli_parse_chat() {
        let cli = Cli::try_parse_from(["buzzbot", "chat", "--kb", "manuals"]).unwrap();
        if let Some(Commands::Chat { kb, no_web }) = cli.command {
            assert_eq!(kb, "manuals");
            assert!(!no_web);
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_parse_chat_requires_kb() {
        assert!(Cli::try_parse_from(["buzzbot", "chat"]).is_err());
    }

    #[test]
    fn test_cli_parse_resume_no_web() {
        let cli = Cli::try_parse_from(["buzzbot", "resume", "abc-123", "--no-web"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Resume {
                session_id: "abc-123".to_string(),
                no_web: true,
            })
        );
    }

    #[test]
    fn test_cli_parse_listing_commands() {
        let folders = Cli::try_parse_from(["buzzbot", "folders"]).unwrap();
        assert_eq!(folders.command, Some(Commands::Folders));

        let sessions = Cli::try_parse_from(["buzzbot", "sessions"]).unwrap();
        assert_eq!(sessions.command, Some(Commands::Sessions));
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "buzzbot",
            "--config",
            "custom.yaml",
            "--verbose",
            "--log-json",
            "--storage-path",
            "/tmp/buzz",
            "sessions",
        ])
        .unwrap();
        assert_eq!(cli.config, Some("custom.yaml".to_string()));
        assert!(cli.verbose);
        assert!(cli.log_json);
        assert_eq!(cli.storage_path, Some(PathBuf::from("/tmp/buzz")));
    }
}
