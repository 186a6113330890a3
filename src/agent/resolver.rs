//! Per-turn answer policy
//!
//! A question is first classified by keyword. Meta questions about the
//! conversation or the knowledge base are answered by formatting local
//! state. Everything else goes through retrieval, relevance grading, and
//! then one of three routes: answer from documents, answer from web search
//! results, or the fixed cannot-answer reply.

use super::conversation::{Conversation, HistoryContext};
use crate::config::{AgentConfig, GradingMode};
use crate::error::{BuzzbotError, Result};
use crate::index::{format_passages, format_passages_limited, Locator, Retriever, ScoredPassage};
use crate::prompts::{
    generate_document_answer_prompt, generate_grading_prompt, generate_web_synthesis_prompt,
    is_relevant_reply,
};
use crate::providers::{Message, Provider};
use crate::search::{format_search_results, WebSearch};
use crate::storage::KnowledgeBase;
use std::sync::Arc;
use tracing::{debug, info};

/// Reply when the documents do not cover a question and web search is off
pub const CANNOT_ANSWER: &str = "I cannot answer this question from the local knowledge base.";

/// Passages shown to the relevance grader
const GRADING_PASSAGES: usize = 3;

const HISTORY_KEYWORDS: [&str; 6] = [
    "what did i ask",
    "previous question",
    "conversation history",
    "what we discussed",
    "earlier question",
    "what have we talked about",
];

const KNOWLEDGE_BASE_KEYWORDS: [&str; 5] = [
    "what is in this folder",
    "what's in this folder",
    "which folder",
    "what knowledge base",
    "what documents do you have",
];

/// Kind of meta question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKind {
    /// About earlier turns of this conversation
    History,
    /// About the knowledge base being queried
    KnowledgeBase,
}

/// Classification of a user query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Meta(MetaKind),
    Content,
}

/// Classify `query` by case-insensitive keyword match
///
/// # Examples
///
/// ```
/// use buzzbot::agent::{classify_query, MetaKind, QueryKind};
///
/// assert_eq!(classify_query("What did I ask before?"), QueryKind::Meta(MetaKind::History));
/// assert_eq!(classify_query("Which folder is this?"), QueryKind::Meta(MetaKind::KnowledgeBase));
/// assert_eq!(classify_query("How do I create a group?"), QueryKind::Content);
/// ```
pub fn classify_query(query: &str) -> QueryKind {
    let lowered = query.to_lowercase();
    if HISTORY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        QueryKind::Meta(MetaKind::History)
    } else if KNOWLEDGE_BASE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        QueryKind::Meta(MetaKind::KnowledgeBase)
    } else {
        QueryKind::Content
    }
}

/// How a turn was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerRoute {
    History,
    KnowledgeBase,
    Documents,
    WebSearch,
    CannotAnswer,
}

/// A source file cited by a document answer, with the pages or rows used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub file: String,
    pub locators: Vec<Locator>,
}

/// Result of resolving one turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub answer: String,
    pub route: AnswerRoute,
    /// Document sources, grouped by file in retrieval order
    pub sources: Vec<SourceRef>,
    /// Links of the web results used
    pub web_links: Vec<String>,
    /// Running summary to persist with this turn
    pub summary: Option<String>,
}

impl TurnOutcome {
    fn local(answer: String, route: AnswerRoute, summary: Option<String>) -> Self {
        Self {
            answer,
            route,
            sources: Vec::new(),
            web_links: Vec::new(),
            summary,
        }
    }
}

/// Counts LLM calls within a single turn
#[derive(Debug)]
struct CallBudget {
    limit: usize,
    used: usize,
}

impl CallBudget {
    fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    fn spend(&mut self) -> Result<()> {
        if self.used >= self.limit {
            return Err(BuzzbotError::MaxIterationsExceeded {
                limit: self.limit,
                message: format!("turn needed more than {} LLM calls", self.limit),
            }
            .into());
        }
        self.used += 1;
        Ok(())
    }
}

/// Answers turns against one knowledge base
pub struct TurnResolver {
    provider: Arc<dyn Provider>,
    retriever: Arc<dyn Retriever>,
    web_search: Option<Arc<dyn WebSearch>>,
    knowledge_base: KnowledgeBase,
    config: AgentConfig,
}

impl TurnResolver {
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn Retriever>,
        knowledge_base: KnowledgeBase,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            retriever,
            web_search: None,
            knowledge_base,
            config,
        }
    }

    /// Enables the web search fallback
    pub fn with_web_search(mut self, web_search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge_base
    }

    /// Whether a web search backend is configured
    pub fn has_web_search(&self) -> bool {
        self.web_search.is_some()
    }

    /// Resolve one non-empty query
    ///
    /// `conversation` is only read; the caller records the turn and applies
    /// `TurnOutcome::summary` once the turn has been persisted.
    ///
    /// # Errors
    ///
    /// Any retrieval, grading, search, or LLM failure aborts the turn.
    /// Exceeding `max_iterations` LLM calls returns
    /// `BuzzbotError::MaxIterationsExceeded`.
    pub async fn resolve(
        &self,
        query: &str,
        conversation: &Conversation,
        web_enabled: bool,
    ) -> Result<TurnOutcome> {
        let current_summary = conversation.summary().map(str::to_string);

        match classify_query(query) {
            QueryKind::Meta(MetaKind::History) => {
                debug!("Answering history question locally");
                Ok(TurnOutcome::local(
                    conversation.history_meta_answer(),
                    AnswerRoute::History,
                    current_summary,
                ))
            }
            QueryKind::Meta(MetaKind::KnowledgeBase) => {
                debug!("Answering knowledge base question locally");
                Ok(TurnOutcome::local(
                    self.knowledge_base_answer(),
                    AnswerRoute::KnowledgeBase,
                    current_summary,
                ))
            }
            QueryKind::Content => self.resolve_content(query, conversation, web_enabled).await,
        }
    }

    async fn resolve_content(
        &self,
        query: &str,
        conversation: &Conversation,
        web_enabled: bool,
    ) -> Result<TurnOutcome> {
        let mut budget = CallBudget::new(self.config.max_iterations);

        if conversation.needs_summary() {
            budget.spend()?;
        }
        let history = conversation.build_context(self.provider.as_ref()).await;

        let passages = self.retriever.retrieve(query, self.config.retriever_k).await?;
        let relevant = self.grade(query, &passages, &mut budget).await?;
        info!(
            passages = passages.len(),
            relevant,
            grading = ?self.config.grading,
            "Graded retrieval"
        );

        if relevant {
            return self.answer_from_documents(query, &passages, history, &mut budget).await;
        }

        match (&self.web_search, web_enabled) {
            (Some(search), true) => {
                self.answer_from_web(search.as_ref(), query, history, &mut budget)
                    .await
            }
            _ => Ok(TurnOutcome::local(
                CANNOT_ANSWER.to_string(),
                AnswerRoute::CannotAnswer,
                history.summary,
            )),
        }
    }

    async fn grade(
        &self,
        query: &str,
        passages: &[ScoredPassage],
        budget: &mut CallBudget,
    ) -> Result<bool> {
        if passages.is_empty() {
            return Ok(false);
        }
        match self.config.grading {
            GradingMode::Sentinel => Ok(true),
            GradingMode::Llm => {
                let preview = format_passages_limited(passages, GRADING_PASSAGES);
                let prompt = generate_grading_prompt(query, &preview);
                budget.spend()?;
                let response = self.provider.complete(&[Message::user(prompt)]).await?;
                debug!(reply = %response.text(), "Relevance grader replied");
                Ok(is_relevant_reply(response.text()))
            }
        }
    }

    async fn answer_from_documents(
        &self,
        query: &str,
        passages: &[ScoredPassage],
        history: HistoryContext,
        budget: &mut CallBudget,
    ) -> Result<TurnOutcome> {
        let system =
            generate_document_answer_prompt(&self.knowledge_base.name, &format_passages(passages));
        let mut messages = Vec::with_capacity(history.messages.len() + 2);
        messages.push(Message::system(system));
        messages.extend(history.messages);
        messages.push(Message::user(query));

        budget.spend()?;
        let response = self.provider.complete(&messages).await?;

        Ok(TurnOutcome {
            answer: response.text().to_string(),
            route: AnswerRoute::Documents,
            sources: group_sources(passages),
            web_links: Vec::new(),
            summary: history.summary,
        })
    }

    async fn answer_from_web(
        &self,
        search: &dyn WebSearch,
        query: &str,
        history: HistoryContext,
        budget: &mut CallBudget,
    ) -> Result<TurnOutcome> {
        info!("Documents not relevant, falling back to web search");
        let results = search.search(query).await?;
        let prompt = generate_web_synthesis_prompt(query, &format_search_results(&results));

        budget.spend()?;
        let response = self.provider.complete(&[Message::user(prompt)]).await?;

        let mut web_links: Vec<String> = Vec::new();
        for url in results.iter().filter_map(|r| r.url.clone()) {
            if !web_links.contains(&url) {
                web_links.push(url);
            }
        }

        Ok(TurnOutcome {
            answer: response.text().to_string(),
            route: AnswerRoute::WebSearch,
            sources: Vec::new(),
            web_links,
            summary: history.summary,
        })
    }

    fn knowledge_base_answer(&self) -> String {
        let kb = &self.knowledge_base;
        format!(
            "You are chatting with the knowledge base '{}'.\nSource folder: {}\nApproximate tokens: {}\nCreated: {}",
            kb.name,
            kb.source_path.display(),
            kb.token_count,
            kb.created_at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Group passages by file name, keeping first-seen order and sorted locators
fn group_sources(passages: &[ScoredPassage]) -> Vec<SourceRef> {
    let mut sources: Vec<SourceRef> = Vec::new();
    for passage in passages {
        let file = passage.chunk.file_name().to_string();
        let index = match sources.iter().position(|s| s.file == file) {
            Some(index) => index,
            None => {
                sources.push(SourceRef {
                    file,
                    locators: Vec::new(),
                });
                sources.len() - 1
            }
        };
        if let Some(locator) = passage.chunk.locator {
            let locators = &mut sources[index].locators;
            if !locators.contains(&locator) {
                locators.push(locator);
            }
        }
    }
    for source in &mut sources {
        source.locators.sort();
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::index::DocumentChunk;
    use crate::search::SearchResult;
    use crate::test_utils::{sample_knowledge_base, FakeRetriever, FakeSearch, ScriptedProvider};

    fn passage(source: &str, locator: Option<Locator>) -> ScoredPassage {
        ScoredPassage {
            chunk: DocumentChunk {
                text: "Open Contacts and tap New Group.".to_string(),
                source: source.to_string(),
                locator,
            },
            score: 0.8,
        }
    }

    fn resolver(
        provider: Arc<ScriptedProvider>,
        retriever: Arc<FakeRetriever>,
        grading: GradingMode,
    ) -> TurnResolver {
        let config = AgentConfig {
            grading,
            ..AgentConfig::default()
        };
        TurnResolver::new(provider, retriever, sample_knowledge_base("manuals"), config)
    }

    fn empty_conversation() -> Conversation {
        Conversation::new(&HistoryConfig::default())
    }

    #[test]
    fn test_classify_query_is_case_insensitive() {
        assert_eq!(
            classify_query("Show me the CONVERSATION HISTORY"),
            QueryKind::Meta(MetaKind::History)
        );
        assert_eq!(
            classify_query("What's in this folder?"),
            QueryKind::Meta(MetaKind::KnowledgeBase)
        );
        assert_eq!(classify_query("What is Buzz?"), QueryKind::Content);
    }

    #[test]
    fn test_call_budget_limit() {
        let mut budget = CallBudget::new(1);
        assert!(budget.spend().is_ok());
        let err = budget.spend().unwrap_err();
        assert!(err.to_string().contains("limit=1"));
    }

    #[test]
    fn test_group_sources_merges_pages() {
        let grouped = group_sources(&[
            passage("/d/guide.pdf", Some(Locator::Page(4))),
            passage("/d/notes.txt", None),
            passage("/d/guide.pdf", Some(Locator::Page(1))),
            passage("/d/guide.pdf", Some(Locator::Page(4))),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].file, "guide.pdf");
        assert_eq!(grouped[0].locators, vec![Locator::Page(1), Locator::Page(4)]);
        assert!(grouped[1].locators.is_empty());
    }

    #[tokio::test]
    async fn test_history_meta_skips_retrieval_and_llm() {
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let retriever = Arc::new(FakeRetriever::new(vec![passage("/d/a.txt", None)]));
        let resolver = resolver(provider.clone(), retriever.clone(), GradingMode::Llm);

        let outcome = resolver
            .resolve("what did I ask?", &empty_conversation(), true)
            .await
            .unwrap();
        assert_eq!(outcome.route, AnswerRoute::History);
        assert_eq!(outcome.answer, "No conversation history yet.");
        assert_eq!(provider.call_count(), 0);
        assert_eq!(retriever.call_count(), 0);
    }

    #[tokio::test]
    async fn test_knowledge_base_meta_answer() {
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let retriever = Arc::new(FakeRetriever::new(Vec::new()));
        let resolver = resolver(provider.clone(), retriever.clone(), GradingMode::Llm);

        let outcome = resolver
            .resolve("What is in this folder?", &empty_conversation(), false)
            .await
            .unwrap();
        assert_eq!(outcome.route, AnswerRoute::KnowledgeBase);
        assert!(outcome.answer.contains("'manuals'"));
        assert!(outcome.answer.contains("Approximate tokens: 1200"));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(retriever.call_count(), 0);
    }

    #[tokio::test]
    async fn test_relevant_passages_answer_from_documents() {
        let provider = Arc::new(ScriptedProvider::new(vec!["YES", "Tap New Group."]));
        let retriever = Arc::new(FakeRetriever::new(vec![passage(
            "/d/guide.pdf",
            Some(Locator::Page(2)),
        )]));
        let resolver = resolver(provider.clone(), retriever, GradingMode::Llm);

        let outcome = resolver
            .resolve("How do I create a group?", &empty_conversation(), false)
            .await
            .unwrap();
        assert_eq!(outcome.route, AnswerRoute::Documents);
        assert_eq!(outcome.answer, "Tap New Group.");
        assert_eq!(outcome.sources[0].locators, vec![Locator::Page(2)]);

        let requests = provider.requests();
        assert!(requests[0][0].content.starts_with("You are a relevance grader."));
        let answer_request = &requests[1];
        assert_eq!(answer_request[0].role, "system");
        assert!(answer_request[0].content.contains("[1] Source: guide.pdf (Page 3)"));
        assert_eq!(answer_request.last().map(|m| m.content.as_str()), Some("How do I create a group?"));
    }

    #[tokio::test]
    async fn test_irrelevant_without_web_returns_fixed_message() {
        let provider = Arc::new(ScriptedProvider::new(vec!["NO"]));
        let retriever = Arc::new(FakeRetriever::new(vec![passage("/d/a.txt", None)]));
        let resolver = resolver(provider.clone(), retriever, GradingMode::Llm);

        let outcome = resolver
            .resolve("Who won the match?", &empty_conversation(), true)
            .await
            .unwrap();
        assert_eq!(outcome.route, AnswerRoute::CannotAnswer);
        assert_eq!(outcome.answer, CANNOT_ANSWER);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_passages_skip_grader() {
        let provider = Arc::new(ScriptedProvider::new(Vec::<String>::new()));
        let retriever = Arc::new(FakeRetriever::new(Vec::new()));
        let resolver = resolver(provider.clone(), retriever, GradingMode::Llm);

        let outcome = resolver
            .resolve("Anything?", &empty_conversation(), false)
            .await
            .unwrap();
        assert_eq!(outcome.answer, CANNOT_ANSWER);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_sentinel_grading_needs_no_llm_call() {
        let provider = Arc::new(ScriptedProvider::new(vec!["From the guide."]));
        let retriever = Arc::new(FakeRetriever::new(vec![passage("/d/a.txt", None)]));
        let resolver = resolver(provider.clone(), retriever, GradingMode::Sentinel);

        let outcome = resolver
            .resolve("How do groups work?", &empty_conversation(), false)
            .await
            .unwrap();
        assert_eq!(outcome.route, AnswerRoute::Documents);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_web_fallback_synthesizes_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec!["NO", "Buzz costs $5."]));
        let retriever = Arc::new(FakeRetriever::new(vec![passage("/d/a.txt", None)]));
        let search = Arc::new(FakeSearch::new(vec![SearchResult {
            title: "Pricing".to_string(),
            url: Some("https://buzz.example/pricing".to_string()),
            snippet: "Plans start at $5".to_string(),
        }]));
        let resolver =
            resolver(provider.clone(), retriever, GradingMode::Llm).with_web_search(search.clone());

        let outcome = resolver
            .resolve("How much is Buzz?", &empty_conversation(), true)
            .await
            .unwrap();
        assert_eq!(outcome.route, AnswerRoute::WebSearch);
        assert_eq!(outcome.answer, "Buzz costs $5.");
        assert_eq!(outcome.web_links, vec!["https://buzz.example/pricing".to_string()]);
        assert_eq!(search.call_count(), 1);
        assert!(provider.requests()[1][0].content.starts_with("User asked: How much is Buzz?"));
    }

    #[tokio::test]
    async fn test_web_disabled_for_session_skips_search() {
        let provider = Arc::new(ScriptedProvider::new(vec!["NO"]));
        let retriever = Arc::new(FakeRetriever::new(vec![passage("/d/a.txt", None)]));
        let search = Arc::new(FakeSearch::new(Vec::new()));
        let resolver =
            resolver(provider, retriever, GradingMode::Llm).with_web_search(search.clone());

        let outcome = resolver
            .resolve("How much is Buzz?", &empty_conversation(), false)
            .await
            .unwrap();
        assert_eq!(outcome.answer, CANNOT_ANSWER);
        assert_eq!(search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_max_iterations_exceeded() {
        let provider = Arc::new(ScriptedProvider::new(vec!["YES", "answer"]));
        let retriever = Arc::new(FakeRetriever::new(vec![passage("/d/a.txt", None)]));
        let config = AgentConfig {
            max_iterations: 1,
            ..AgentConfig::default()
        };
        let resolver = TurnResolver::new(
            provider.clone(),
            retriever,
            sample_knowledge_base("manuals"),
            config,
        );

        let err = resolver
            .resolve("How do groups work?", &empty_conversation(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuzzbotError>(),
            Some(BuzzbotError::MaxIterationsExceeded { limit: 1, .. })
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_aborts_turn() {
        let provider = Arc::new(ScriptedProvider::failing("service unavailable"));
        let retriever = Arc::new(FakeRetriever::new(vec![passage("/d/a.txt", None)]));
        let resolver = resolver(provider, retriever, GradingMode::Llm);

        let err = resolver
            .resolve("How do groups work?", &empty_conversation(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("service unavailable"));
    }

    #[tokio::test]
    async fn test_retrieval_failure_aborts_turn_before_llm() {
        let provider = Arc::new(ScriptedProvider::new(vec!["YES", "answer"]));
        let retriever = Arc::new(FakeRetriever::failing("index is corrupt"));
        let resolver = resolver(provider.clone(), retriever.clone(), GradingMode::Llm);

        let err = resolver
            .resolve("How do groups work?", &empty_conversation(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuzzbotError>(),
            Some(BuzzbotError::Retrieval(_))
        ));
        assert_eq!(retriever.call_count(), 1);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_search_failure_aborts_web_fallback() {
        let provider = Arc::new(ScriptedProvider::new(vec!["NO", "unused"]));
        let retriever = Arc::new(FakeRetriever::new(vec![passage("/d/a.txt", None)]));
        let search = Arc::new(FakeSearch::failing("quota exhausted"));
        let resolver =
            resolver(provider.clone(), retriever, GradingMode::Llm).with_web_search(search.clone());

        let err = resolver
            .resolve("How much is Buzz?", &empty_conversation(), true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exhausted"));
        assert_eq!(search.call_count(), 1);
        // Only the grader ran; no synthesis call after the failed search
        assert_eq!(provider.call_count(), 1);
    }
}
