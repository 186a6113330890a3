//! Tables of knowledge bases and sessions

use crate::error::Result;
use crate::storage::{short_id, DocumentStore, KnowledgeBase, SessionRecord};
use colored::Colorize;
use prettytable::{format, Table};

/// Print every knowledge base; returns the records shown
pub fn list_knowledge_bases(store: &dyn DocumentStore) -> Result<Vec<KnowledgeBase>> {
    let knowledge_bases = store.list_knowledge_bases()?;
    if knowledge_bases.is_empty() {
        println!(
            "{}",
            "No folders processed yet. Run 'Process Static Folders' first.".yellow()
        );
        return Ok(knowledge_bases);
    }

    println!("\nAvailable Folders:");
    knowledge_base_table(&knowledge_bases).printstd();
    println!();
    Ok(knowledge_bases)
}

/// Print every session, most recent first; returns the records shown
pub fn list_sessions(store: &dyn DocumentStore) -> Result<Vec<SessionRecord>> {
    let sessions = store.list_sessions()?;
    if sessions.is_empty() {
        println!("{}", "No previous sessions found.".yellow());
        return Ok(sessions);
    }

    println!("\nPrevious Sessions:");
    session_table(&sessions).printstd();
    println!();
    Ok(sessions)
}

fn knowledge_base_table(knowledge_bases: &[KnowledgeBase]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Name".bold(),
        "Tokens".bold(),
        "Created".bold()
    ]);

    for kb in knowledge_bases {
        table.add_row(prettytable::row![
            short_id(&kb.id).cyan(),
            kb.name,
            kb.token_count,
            kb.created_at.format("%Y-%m-%d %H:%M").to_string()
        ]);
    }
    table
}

fn session_table(sessions: &[SessionRecord]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Session".bold(),
        "Folder".bold(),
        "Last Active".bold(),
        "Summary".bold()
    ]);

    for session in sessions {
        let summary = match &session.summary {
            Some(s) if s.chars().count() > 40 => {
                format!("{}...", s.chars().take(37).collect::<String>())
            }
            Some(s) => s.clone(),
            None => "-".to_string(),
        };
        table.add_row(prettytable::row![
            session.short_id().cyan(),
            session.knowledge_base_name,
            session.last_active.format("%Y-%m-%d %H:%M").to_string(),
            summary
        ]);
    }
    table
}
