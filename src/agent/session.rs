//! A chat session bound to one knowledge base

use super::conversation::{Conversation, Turn};
use super::resolver::{TurnOutcome, TurnResolver};
use crate::config::HistoryConfig;
use crate::error::{BuzzbotError, Result};
use crate::providers::Message;
use crate::storage::{DocumentStore, KnowledgeBase, SessionRecord};
use chrono::Utc;
use std::sync::Arc;

/// Holds the in-memory conversation of a session and commits turns to the
/// document store
///
/// A turn is first written to the store and only then appended in memory,
/// so a failed turn leaves both untouched.
pub struct ChatSession {
    record: SessionRecord,
    conversation: Conversation,
    resolver: TurnResolver,
    store: Arc<dyn DocumentStore>,
    web_enabled: bool,
}

impl ChatSession {
    /// Start a fresh session; nothing is stored until the first turn
    pub fn start(
        resolver: TurnResolver,
        store: Arc<dyn DocumentStore>,
        history: &HistoryConfig,
        web_enabled: bool,
    ) -> Self {
        let record = SessionRecord::start(resolver.knowledge_base());
        let web_enabled = web_enabled && resolver.has_web_search();
        Self {
            record,
            conversation: Conversation::new(history),
            resolver,
            store,
            web_enabled,
        }
    }

    /// Continue a stored session from its message log and summary
    ///
    /// # Errors
    ///
    /// Returns `BuzzbotError::Storage` when `record` belongs to another
    /// knowledge base than the resolver, or when the log cannot be loaded.
    pub fn resume(
        record: SessionRecord,
        resolver: TurnResolver,
        store: Arc<dyn DocumentStore>,
        history: &HistoryConfig,
        web_enabled: bool,
    ) -> Result<Self> {
        if record.knowledge_base_id != resolver.knowledge_base().id {
            return Err(BuzzbotError::Storage(format!(
                "Session {} belongs to knowledge base {}",
                record.short_id(),
                record.knowledge_base_id
            ))
            .into());
        }

        let messages = store.load_messages(&record.session_id)?;
        let conversation = Conversation::from_messages(&messages, record.summary.clone(), history);
        tracing::info!(
            session = %record.short_id(),
            turns = conversation.len(),
            has_summary = record.summary.is_some(),
            "Resumed session"
        );

        let web_enabled = web_enabled && resolver.has_web_search();
        Ok(Self {
            record,
            conversation,
            resolver,
            store,
            web_enabled,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.record.session_id
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        self.resolver.knowledge_base()
    }

    pub fn web_enabled(&self) -> bool {
        self.web_enabled
    }

    /// Turn the web fallback on or off; returns the resulting state
    ///
    /// Stays off when no web search backend is configured.
    pub fn set_web_enabled(&mut self, enabled: bool) -> bool {
        self.web_enabled = enabled && self.resolver.has_web_search();
        self.web_enabled
    }

    /// Answer one line of user input
    ///
    /// Blank input is ignored and returns `Ok(None)` without touching the
    /// store.
    ///
    /// # Errors
    ///
    /// Propagates resolver and storage errors. On error neither the
    /// in-memory conversation nor the store is changed.
    pub async fn handle_input(&mut self, input: &str) -> Result<Option<TurnOutcome>> {
        let query = input.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let outcome = self
            .resolver
            .resolve(query, &self.conversation, self.web_enabled)
            .await?;

        let mut record = self.record.clone();
        record.last_active = Utc::now();
        record.summary = outcome.summary.clone();
        self.store.record_turn(
            &record,
            &Message::user(query),
            &Message::assistant(outcome.answer.clone()),
        )?;

        self.record = record;
        self.conversation.push(Turn::new(query, outcome.answer.clone()));
        self.conversation.set_summary(outcome.summary.clone());
        tracing::debug!(
            session = %self.record.short_id(),
            route = ?outcome.route,
            turns = self.conversation.len(),
            "Turn recorded"
        );
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AnswerRoute;
    use crate::config::AgentConfig;
    use crate::storage::MemoryStorage;
    use crate::test_utils::{sample_knowledge_base, FakeRetriever, FakeSearch, ScriptedProvider};

    fn session(provider: Arc<ScriptedProvider>, store: Arc<MemoryStorage>) -> ChatSession {
        let resolver = TurnResolver::new(
            provider,
            Arc::new(FakeRetriever::new(Vec::new())),
            sample_knowledge_base("manuals"),
            AgentConfig::default(),
        );
        ChatSession::start(resolver, store, &HistoryConfig::default(), true)
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let store = Arc::new(MemoryStorage::new());
        let mut chat = session(Arc::new(ScriptedProvider::new(Vec::<String>::new())), store.clone());

        assert!(chat.handle_input("   ").await.unwrap().is_none());
        assert_eq!(store.write_count(), 0);
        assert!(chat.conversation().is_empty());
    }

    #[tokio::test]
    async fn test_turn_is_persisted_then_appended() {
        let store = Arc::new(MemoryStorage::new());
        let mut chat = session(Arc::new(ScriptedProvider::new(Vec::<String>::new())), store.clone());

        let outcome = chat.handle_input("Anything about billing?").await.unwrap().unwrap();
        assert_eq!(outcome.route, AnswerRoute::CannotAnswer);
        assert_eq!(chat.conversation().len(), 1);

        let messages = store.load_messages(chat.session_id()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Anything about billing?");
        assert!(store.find_session(chat.session_id()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retrieval_failure_leaves_session_untouched() {
        let store = Arc::new(MemoryStorage::new());
        let resolver = TurnResolver::new(
            Arc::new(ScriptedProvider::new(vec!["YES", "answer"])),
            Arc::new(FakeRetriever::failing("index is corrupt")),
            sample_knowledge_base("manuals"),
            AgentConfig::default(),
        );
        let mut chat = ChatSession::start(resolver, store.clone(), &HistoryConfig::default(), false);

        let err = chat.handle_input("How do groups work?").await.unwrap_err();
        assert!(err.to_string().contains("index is corrupt"));
        assert!(chat.conversation().is_empty());
        assert_eq!(store.write_count(), 0);
        assert!(store.load_messages(chat.session_id()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_failure_keeps_earlier_turns_only() {
        let store = Arc::new(MemoryStorage::new());
        let search = Arc::new(FakeSearch::failing("quota exhausted"));
        let resolver = TurnResolver::new(
            Arc::new(ScriptedProvider::new(Vec::<String>::new())),
            Arc::new(FakeRetriever::new(Vec::new())),
            sample_knowledge_base("manuals"),
            AgentConfig::default(),
        )
        .with_web_search(search.clone());
        let mut chat = ChatSession::start(resolver, store.clone(), &HistoryConfig::default(), false);

        // Web off: empty retrieval is a cannot-answer turn that gets recorded
        chat.handle_input("Anything about billing?").await.unwrap();
        assert_eq!(chat.conversation().len(), 1);
        let writes = store.write_count();

        assert!(chat.set_web_enabled(true));
        let err = chat.handle_input("What is the capital of France?").await.unwrap_err();
        assert!(err.to_string().contains("quota exhausted"));
        assert_eq!(search.call_count(), 1);
        assert_eq!(chat.conversation().len(), 1);
        assert_eq!(store.write_count(), writes);
        assert_eq!(store.load_messages(chat.session_id()).unwrap().len(), 2);
    }

    #[test]
    fn test_web_stays_off_without_backend() {
        let store = Arc::new(MemoryStorage::new());
        let mut chat = session(Arc::new(ScriptedProvider::new(Vec::<String>::new())), store);
        assert!(!chat.web_enabled());
        assert!(!chat.set_web_enabled(true));
    }

    #[test]
    fn test_resume_rejects_foreign_session() {
        let store = Arc::new(MemoryStorage::new());
        let other = SessionRecord::start(&sample_knowledge_base("other"));
        let resolver = TurnResolver::new(
            Arc::new(ScriptedProvider::new(Vec::<String>::new())),
            Arc::new(FakeRetriever::new(Vec::new())),
            sample_knowledge_base("manuals"),
            AgentConfig::default(),
        );
        let result = ChatSession::resume(other, resolver, store, &HistoryConfig::default(), false);
        assert!(result.is_err());
    }
}
