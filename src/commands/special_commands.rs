//! Special commands parser for the chat loop
//!
//! Lines starting with `/` (plus the bare words `exit` and `quit`) control
//! the session instead of being sent as questions. Commands are
//! case-insensitive.

use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },
}

/// Commands handled by the chat loop itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Show the command reference
    Help,

    /// Show the knowledge base the session is bound to
    ShowKnowledgeBase,

    /// Turn the web search fallback on or off; `None` toggles
    SetWeb(Option<bool>),

    /// Show the questions asked so far and the running summary
    ShowHistory,

    /// Leave the chat and return to the menu
    Exit,

    /// Not a special command; the input is a question
    None,
}

/// Parse a line of chat input
///
/// # Errors
///
/// Returns `CommandError::UnknownCommand` for an unrecognised `/command` and
/// `CommandError::UnsupportedArgument` for `/web` with an argument other
/// than `on` or `off`.
///
/// # Examples
///
/// ```
/// use buzzbot::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(parse_special_command("/web off").unwrap(), SpecialCommand::SetWeb(Some(false)));
/// assert_eq!(parse_special_command("EXIT").unwrap(), SpecialCommand::Exit);
/// assert_eq!(parse_special_command("How do I add a contact?").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    match lower.as_str() {
        "exit" | "quit" | "/exit" | "/quit" => Ok(SpecialCommand::Exit),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/kb" | "/folder" => Ok(SpecialCommand::ShowKnowledgeBase),
        "/history" => Ok(SpecialCommand::ShowHistory),

        "/web" => Ok(SpecialCommand::SetWeb(None)),
        "/web on" => Ok(SpecialCommand::SetWeb(Some(true))),
        "/web off" => Ok(SpecialCommand::SetWeb(Some(false))),
        input if input.starts_with("/web ") => Err(CommandError::UnsupportedArgument {
            command: "/web".to_string(),
            arg: input[5..].trim().to_string(),
        }),

        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

/// Print the command reference
pub fn print_help() {
    println!(
        r#"
Chat Commands
=============

  /help, /?       - Show this help message
  /kb             - Show the knowledge base of this session
  /history        - Show the questions asked so far
  /web on|off     - Enable or disable the web search fallback
  /web            - Toggle the web search fallback
  exit, quit      - Leave the chat and return to the menu

Anything else is sent as a question. Questions like "what did I ask" or
"what is in this folder" are answered locally without calling the model.
"#
    );
}
