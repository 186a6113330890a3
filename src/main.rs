//! BuzzBot - document question answering CLI
//!
#![doc = "BuzzBot - document question answering CLI"]
#![doc = "Main entry point for the BuzzBot application."]

use anyhow::Result;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use buzzbot::cli::{Cli, Commands};
use buzzbot::commands;
use buzzbot::config::Config;
use buzzbot::storage::{DocumentStore, SqliteStorage};

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets such as GEMINI_API_KEY may live in a local .env file
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    init_tracing(&cli);

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let mut config = Config::load(config_path, &cli)?;
    config.validate()?;

    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStorage::open(&config.storage)?);

    match cli.command_or_menu() {
        Commands::Menu => {
            commands::menu::run_menu(&config, store).await?;
        }
        Commands::Ingest { folder } => {
            tracing::info!("Starting ingestion");
            commands::ingest::run_ingest(&config, store, folder.as_deref()).await?;
        }
        Commands::Chat { kb, no_web } => {
            tracing::info!("Starting chat for knowledge base: {}", kb);
            let mut rl = rustyline::DefaultEditor::new()?;
            commands::chat::start_chat(&config, store, &kb, !no_web, &mut rl).await?;
        }
        Commands::Resume { session_id, no_web } => {
            tracing::info!("Resuming session: {}", session_id);
            let mut rl = rustyline::DefaultEditor::new()?;
            commands::chat::resume_chat(&config, store, &session_id, !no_web, &mut rl).await?;
        }
        Commands::Folders => {
            commands::history::list_knowledge_bases(store.as_ref())?;
        }
        Commands::Sessions => {
            commands::history::list_sessions(store.as_ref())?;
        }
    }
    Ok(())
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins over `--verbose`. Logs go to stderr so they do not mix
/// with chat output.
fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "buzzbot=debug"
    } else {
        "buzzbot=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if cli.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
