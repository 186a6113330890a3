//! Answer prompts
//!
//! Prompts for the two answering paths of a turn: from retrieved document
//! passages, and from web search results when the documents fall short.

/// Reply the model is told to give when web results are not useful
pub const WEB_NO_RELIABLE_ANSWER: &str =
    "I could not find a reliable answer even after searching the web.";

/// Generates the system prompt for answering from document passages
///
/// The prompt carries only the retrieved passages; conversation history is
/// sent as separate messages after it.
///
/// # Arguments
///
/// * `knowledge_base` - Name of the knowledge base being queried
/// * `context` - Passages rendered by `index::format_passages`
///
/// # Examples
///
/// ```
/// use buzzbot::prompts::answer_prompt::generate_document_answer_prompt;
///
/// let prompt = generate_document_answer_prompt("manuals", "[1] Source: a.pdf (Page 1)\nText");
/// assert!(prompt.contains("manuals"));
/// assert!(prompt.contains("[1] Source: a.pdf (Page 1)"));
/// ```
pub fn generate_document_answer_prompt(knowledge_base: &str, context: &str) -> String {
    format!(
        r#"You are BuzzBot, an assistant answering questions about the "{knowledge_base}" knowledge base.

Use ONLY the retrieved passages below to answer the question.

RULES:
1. NEVER use general knowledge. Only use the provided passages.
2. Do NOT make up information. If the passages do not contain the answer, say so.
3. Use the conversation history only to clarify follow-up questions.
4. Keep answers clean, structured and concise.

CITATIONS:
- Cite the source on a separate line below the text it supports.
- Paged documents (PDF): Source: [Document Name] (Page [X])
- Other documents: Source: [Document Name]
- Group citations at the bottom when they apply to the whole answer.

Retrieved passages:
{context}"#
    )
}

/// Generates the prompt that turns web search results into an answer
///
/// # Examples
///
/// ```
/// use buzzbot::prompts::answer_prompt::{generate_web_synthesis_prompt, WEB_NO_RELIABLE_ANSWER};
///
/// let prompt = generate_web_synthesis_prompt("What is Buzz?", "Quick Answer: A messenger");
/// assert!(prompt.starts_with("User asked: What is Buzz?"));
/// assert!(prompt.contains(WEB_NO_RELIABLE_ANSWER));
/// ```
pub fn generate_web_synthesis_prompt(query: &str, web_results: &str) -> String {
    format!(
        r#"User asked: {query}

Local document knowledge was insufficient.
Here is the WEB SEARCH RESULT:
{web_results}

Create the best possible answer using ONLY this web data.
Format your answer clearly with proper spacing and structure.
Cite web sources as: Source: Web Search - [Link]
If the web data is not useful, say:
"{WEB_NO_RELIABLE_ANSWER}""#
    )
}
