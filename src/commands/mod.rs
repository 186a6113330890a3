/*!
Command handlers for the CLI

This module provides the handlers invoked by the CLI entrypoint:

- `menu`   — Interactive main menu
- `ingest` — Turn source folders into knowledge bases
- `chat`   — Start or resume a chat session

Listing commands (`folders`, `sessions`) live in `history`.
*/

use crate::agent::{ChatSession, TurnResolver};
use crate::config::Config;
use crate::error::{BuzzbotError, Result};
use crate::index::VectorRetriever;
use crate::providers::{create_embedder, create_provider};
use crate::search::SerpApiSearch;
use crate::storage::{DocumentStore, KnowledgeBase};
use std::sync::Arc;

// Tables of knowledge bases and sessions
pub mod history;

// Special commands parser for the chat loop
pub mod special_commands;

/// Look up a knowledge base by id, id prefix, or name
fn find_knowledge_base(store: &dyn DocumentStore, reference: &str) -> Result<KnowledgeBase> {
    let reference = reference.trim();
    if let Some(kb) = store.find_knowledge_base(reference)? {
        return Ok(kb);
    }
    store
        .find_knowledge_base_by_name(reference)?
        .ok_or_else(|| {
            BuzzbotError::Storage(format!("No folder found for '{}'", reference)).into()
        })
}

/// Wire the provider, retriever, and optional web search for `kb`
fn build_resolver(config: &Config, kb: &KnowledgeBase) -> Result<TurnResolver> {
    let provider = create_provider(&config.provider.provider_type, &config.provider)?;
    let embedder = create_embedder(&config.provider)?;
    let retriever =
        VectorRetriever::load(&kb.index_path, embedder, config.agent.min_relevance_score)?;

    let resolver = TurnResolver::new(provider, Arc::new(retriever), kb.clone(), config.agent.clone());
    if !config.search.enabled {
        return Ok(resolver);
    }
    let search = SerpApiSearch::new(&config.search)?;
    Ok(resolver.with_web_search(Arc::new(search)))
}

// Ingestion command handler
pub mod ingest {
    //! Folder ingestion handler.
    //!
    //! Creates the embedder and an `Ingestor`, then processes either one
    //! folder or every subfolder of the configured source directory.

    use super::*;
    use crate::ingest::{IngestOutcome, IngestReport, Ingestor};
    use colored::Colorize;
    use std::path::Path;

    /// Ingest `folder`, or every folder under `ingest.source_directory`
    pub async fn run_ingest(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        folder: Option<&Path>,
    ) -> Result<()> {
        let embedder = create_embedder(&config.provider)?;
        let ingestor = Ingestor::new(store, embedder, config.ingest.clone());

        match folder {
            Some(folder) => {
                println!("Processing folder: {}", folder.display());
                let outcome = ingestor.ingest_folder(folder).await?;
                print_outcome(&outcome);
            }
            None => {
                println!(
                    "Processing folders in: {}",
                    config.ingest.source_directory.display()
                );
                let report = ingestor.process_source_directory().await?;
                print_report(&report);
            }
        }
        Ok(())
    }

    fn print_outcome(outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Ingested(kb) => println!(
                "{}",
                format!(
                    "Processed '{}' (~{} tokens, id {})",
                    kb.name,
                    kb.token_count,
                    crate::storage::short_id(&kb.id)
                )
                .green()
            ),
            IngestOutcome::Skipped { name } => {
                println!("{}", format!("'{}' already exists, skipped", name).yellow())
            }
            IngestOutcome::Empty { name } => println!(
                "{}",
                format!("'{}' has no readable documents, skipped", name).yellow()
            ),
        }
    }

    fn print_report(report: &IngestReport) {
        if report.total() == 0 {
            println!("{}", "No folders found.".yellow());
            return;
        }
        for kb in &report.ingested {
            print_outcome(&IngestOutcome::Ingested(kb.clone()));
        }
        for name in &report.skipped {
            print_outcome(&IngestOutcome::Skipped { name: name.clone() });
        }
        for name in &report.empty {
            print_outcome(&IngestOutcome::Empty { name: name.clone() });
        }
        for (name, error) in &report.failed {
            eprintln!("{}", format!("Failed to process '{}': {}", name, error).red());
        }
        println!(
            "{}",
            format!(
                "Folders: {} total, {} processed, {} skipped, {} failed",
                report.total(),
                report.ingested.len(),
                report.skipped.len() + report.empty.len(),
                report.failed.len()
            )
            .cyan()
        );
    }
}

// Chat command handler
pub mod chat {
    //! Interactive chat handler.
    //!
    //! Builds a `ChatSession` for a knowledge base and runs a
    //! readline-based loop that answers each question in turn.

    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use crate::agent::{AnswerRoute, SourceRef, TurnOutcome};
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;

    /// Start a new session against the knowledge base `kb_ref`
    pub async fn start_chat(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        kb_ref: &str,
        web_enabled: bool,
        rl: &mut DefaultEditor,
    ) -> Result<()> {
        let kb = find_knowledge_base(store.as_ref(), kb_ref)?;
        let resolver = build_resolver(config, &kb)?;
        let mut session =
            ChatSession::start(resolver, store, &config.agent.history, web_enabled);
        tracing::info!(session = %session.session_id(), folder = %kb.name, "Starting chat");
        run_chat_loop(&mut session, rl).await
    }

    /// Resume the stored session `session_ref` (full id or prefix)
    pub async fn resume_chat(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        session_ref: &str,
        web_enabled: bool,
        rl: &mut DefaultEditor,
    ) -> Result<()> {
        let record = store
            .find_session(session_ref.trim())?
            .ok_or_else(|| BuzzbotError::Storage(format!("Session '{}' not found", session_ref)))?;

        let kb = store
            .find_knowledge_base(&record.knowledge_base_id)?
            .ok_or_else(|| {
                BuzzbotError::Storage(format!(
                    "Folder '{}' of session {} no longer exists",
                    record.knowledge_base_name,
                    record.short_id()
                ))
            })?;

        let resolver = build_resolver(config, &kb)?;
        let mut session =
            ChatSession::resume(record, resolver, store, &config.agent.history, web_enabled)?;
        run_chat_loop(&mut session, rl).await
    }

    /// Read questions until `exit`, answering each through the session
    pub async fn run_chat_loop(session: &mut ChatSession, rl: &mut DefaultEditor) -> Result<()> {
        print_welcome_banner(session);

        loop {
            let prompt = format!("{} ", "You:".green().bold());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    match parse_special_command(trimmed) {
                        Ok(SpecialCommand::Exit) => break,
                        Ok(SpecialCommand::Help) => {
                            print_help();
                            continue;
                        }
                        Ok(SpecialCommand::ShowKnowledgeBase) => {
                            print_knowledge_base(session.knowledge_base());
                            continue;
                        }
                        Ok(SpecialCommand::ShowHistory) => {
                            println!("\n{}\n", session.conversation().history_meta_answer());
                            continue;
                        }
                        Ok(SpecialCommand::SetWeb(requested)) => {
                            let wanted = requested.unwrap_or(!session.web_enabled());
                            let enabled = session.set_web_enabled(wanted);
                            if wanted && !enabled {
                                println!(
                                    "{}",
                                    "Web search is unavailable (no SerpAPI key configured)".yellow()
                                );
                            } else {
                                println!("Web search: {}\n", web_status(enabled));
                            }
                            continue;
                        }
                        Ok(SpecialCommand::None) => {}
                        Err(e) => {
                            println!("{}\n", e.to_string().yellow());
                            continue;
                        }
                    }

                    print!("{}", "Thinking...".dimmed());
                    std::io::stdout().flush()?;
                    let result = session.handle_input(trimmed).await;
                    print!("\r{}\r", " ".repeat(12));

                    match result {
                        Ok(Some(outcome)) => print_outcome(&outcome),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!("Turn failed: {:#}", e);
                            eprintln!("{}\n", format!("Error: {:#}", e).red());
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("CTRL-C");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("CTRL-D");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Session {} saved.\n", session.record().short_id().cyan());
        Ok(())
    }

    fn web_status(enabled: bool) -> colored::ColoredString {
        if enabled {
            "ON".green()
        } else {
            "OFF".red()
        }
    }

    fn print_welcome_banner(session: &ChatSession) {
        println!("\n{}", "=".repeat(60));
        println!(
            "Chat Started | Folder: {}",
            session.knowledge_base().name.bold()
        );
        println!("Session: {}", session.session_id().cyan());
        println!("Web search: {}", web_status(session.web_enabled()));
        if !session.conversation().is_empty() {
            println!("Loaded {} previous turns", session.conversation().len());
        }
        println!("{}", "=".repeat(60));
        println!("Type '/help' for available commands, 'exit' to quit\n");
    }

    fn print_knowledge_base(kb: &KnowledgeBase) {
        println!("\nFolder:  {}", kb.name.bold());
        println!("ID:      {}", kb.id);
        println!("Source:  {}", kb.source_path.display());
        println!("Tokens:  ~{}", kb.token_count);
        println!("Created: {}\n", kb.created_at.format("%Y-%m-%d %H:%M UTC"));
    }

    /// Render grouped sources, e.g. `guide.pdf (Page 2, Page 5)`
    pub(crate) fn format_source(source: &SourceRef) -> String {
        if source.locators.is_empty() {
            return source.file.clone();
        }
        let locations = source
            .locators
            .iter()
            .map(|l| l.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} ({})", source.file, locations)
    }

    fn print_outcome(outcome: &TurnOutcome) {
        println!("\n{} {}\n", "BuzzBot:".blue().bold(), outcome.answer);

        if !outcome.sources.is_empty() {
            println!("{}", "Sources:".bold());
            for source in &outcome.sources {
                println!("  - {}", format_source(source));
            }
            println!();
        }
        if !outcome.web_links.is_empty() {
            println!("{}", "Web sources:".bold());
            for link in &outcome.web_links {
                println!("  - {}", link);
            }
            println!();
        }
        if outcome.route == AnswerRoute::CannotAnswer {
            tracing::debug!("Question not covered by the knowledge base");
        }
    }

}

// Interactive menu handler
pub mod menu {
    //! Main menu loop.
    //!
    //! Offers ingestion, new chats, and resuming sessions until the user
    //! quits. Failures of a single action are reported and the menu is
    //! shown again.

    use super::chat::{resume_chat, start_chat};
    use super::history::{list_knowledge_bases, list_sessions};
    use super::ingest::run_ingest;
    use super::*;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// A parsed main menu choice
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MenuChoice {
        ProcessFolders,
        NewChat,
        ResumeSession,
        Quit,
    }

    /// Parse a menu choice; `None` for anything unrecognised
    pub fn parse_menu_choice(input: &str) -> Option<MenuChoice> {
        match input.trim().to_lowercase().as_str() {
            "1" => Some(MenuChoice::ProcessFolders),
            "2" => Some(MenuChoice::NewChat),
            "3" => Some(MenuChoice::ResumeSession),
            "4" | "q" | "quit" | "exit" => Some(MenuChoice::Quit),
            _ => None,
        }
    }

    /// Interpret a yes/no answer where empty input means yes
    pub fn parse_yes_default(input: &str) -> bool {
        !matches!(input.trim().to_lowercase().as_str(), "n" | "no")
    }

    /// Run the menu until the user quits
    pub async fn run_menu(config: &Config, store: Arc<dyn DocumentStore>) -> Result<()> {
        tracing::info!("Starting interactive menu");
        let mut rl = DefaultEditor::new()?;

        loop {
            print_menu();
            let line = match rl.readline("Enter choice (1-4): ") {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            };

            let result = match parse_menu_choice(&line) {
                Some(MenuChoice::ProcessFolders) => run_ingest(config, store.clone(), None).await,
                Some(MenuChoice::NewChat) => new_chat(config, store.clone(), &mut rl).await,
                Some(MenuChoice::ResumeSession) => resume(config, store.clone(), &mut rl).await,
                Some(MenuChoice::Quit) => break,
                None => {
                    println!("{}", "Invalid choice. Please enter 1-4.".yellow());
                    continue;
                }
            };

            if let Err(e) = result {
                tracing::error!("Menu action failed: {:#}", e);
                eprintln!("{}", format!("Error: {:#}", e).red());
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_menu() {
        println!("\n{}", "=".repeat(40));
        println!("{}", "BuzzBot".bold());
        println!("{}", "=".repeat(40));
        println!("1. Process Static Folders");
        println!("2. Start New Chat");
        println!("3. Resume Previous Session");
        println!("4. Quit");
    }

    /// Read one line; `None` when the user backs out
    fn prompt_line(rl: &mut DefaultEditor, prompt: &str) -> Result<Option<String>> {
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim().to_string();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("b") {
                    Ok(None)
                } else {
                    Ok(Some(trimmed))
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn ask_web_search(config: &Config, rl: &mut DefaultEditor) -> Result<bool> {
        if !config.search.enabled {
            println!(
                "{}",
                "Web search unavailable (no SerpAPI key configured)".yellow()
            );
            return Ok(false);
        }
        let answer = match rl.readline("Enable web search? (Y/n): ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => String::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(parse_yes_default(&answer))
    }

    async fn new_chat(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        rl: &mut DefaultEditor,
    ) -> Result<()> {
        if list_knowledge_bases(store.as_ref())?.is_empty() {
            return Ok(());
        }
        let Some(kb_ref) = prompt_line(rl, "Enter folder ID (or 'b' to go back): ")? else {
            return Ok(());
        };
        let web_enabled = ask_web_search(config, rl)?;
        start_chat(config, store, &kb_ref, web_enabled, rl).await
    }

    async fn resume(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        rl: &mut DefaultEditor,
    ) -> Result<()> {
        if list_sessions(store.as_ref())?.is_empty() {
            return Ok(());
        }
        let Some(session_ref) = prompt_line(rl, "Enter session ID (or 'b' to go back): ")? else {
            return Ok(());
        };
        let web_enabled = ask_web_search(config, rl)?;
        resume_chat(config, store, &session_ref, web_enabled, rl).await
    }

}
