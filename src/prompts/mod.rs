//! Prompts sent to the LLM
//!
//! Each step of a turn that calls the model has its own prompt builder:
//! relevance grading, answering from documents, answering from web results,
//! and compressing older conversation history.

pub mod answer_prompt;
pub mod grading_prompt;

pub use answer_prompt::{
    generate_document_answer_prompt, generate_web_synthesis_prompt, WEB_NO_RELIABLE_ANSWER,
};
pub use grading_prompt::{generate_grading_prompt, is_relevant_reply};

use crate::providers::Message;

/// Generates the history summarization prompt for `messages`
///
/// User messages are rendered as `User:` lines and everything else as
/// `Assistant:` lines.
///
/// # Examples
///
/// ```
/// use buzzbot::prompts::generate_summary_prompt;
/// use buzzbot::providers::Message;
///
/// let prompt = generate_summary_prompt(&[Message::user("Hi"), Message::assistant("Hello")]);
/// assert!(prompt.contains("User: Hi\nAssistant: Hello\n"));
/// assert!(prompt.ends_with("Summary:"));
/// ```
pub fn generate_summary_prompt(messages: &[Message]) -> String {
    let conversation: String = messages
        .iter()
        .map(|m| match m.role.as_str() {
            "system" => format!("{}\n", m.content),
            "user" => format!("User: {}\n", m.content),
            _ => format!("Assistant: {}\n", m.content),
        })
        .collect();

    format!(
        "Summarize the following conversation history concisely, capturing key points, \
         questions asked, and answers provided. Keep it under 200 words.\n\n\
         Conversation:\n{}\nSummary:",
        conversation
    )
}
