//! Relevance grading prompt

/// Generates the YES/NO relevance grading prompt
///
/// # Arguments
///
/// * `query` - The user question
/// * `passages` - Passage preview, already truncated by the caller
///
/// # Examples
///
/// ```
/// use buzzbot::prompts::grading_prompt::generate_grading_prompt;
///
/// let prompt = generate_grading_prompt("How do I mute a group?", "[1] Source: guide.pdf (Page 4)\nMute...");
/// assert!(prompt.contains("How do I mute a group?"));
/// assert!(prompt.contains("YES"));
/// ```
pub fn generate_grading_prompt(query: &str, passages: &str) -> String {
    format!(
        r#"You are a relevance grader.
User Question: {query}

Retrieved Documents:
{passages}

Does the retrieved information contain the answer to the user's question?
Respond ONLY with 'YES' or 'NO'."#
    )
}

/// Interpret a grader reply: relevant iff it starts with YES
pub fn is_relevant_reply(reply: &str) -> bool {
    reply.trim().to_uppercase().starts_with("YES")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_relevant_reply() {
        assert!(is_relevant_reply("YES"));
        assert!(is_relevant_reply("  yes - the passage explains it"));
        assert!(!is_relevant_reply("NO"));
        assert!(!is_relevant_reply("Not sure, YES maybe"));
        assert!(!is_relevant_reply(""));
    }
}
