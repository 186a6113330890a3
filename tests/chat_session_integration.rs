//! Integration tests for chat sessions over a SQLite store
//!
//! Covers the answer routes end to end:
//! - Document answers with grouped sources
//! - Cannot-answer and web fallback when documents are not relevant
//! - Failed turns leaving the store untouched
//! - Summaries persisted and restored on resume

mod common;

use buzzbot::agent::{AnswerRoute, ChatSession, TurnResolver, CANNOT_ANSWER};
use buzzbot::config::{AgentConfig, GradingMode, HistoryConfig};
use buzzbot::index::Locator;
use buzzbot::search::SearchResult;
use buzzbot::storage::{DocumentStore, KnowledgeBase, SqliteStorage};
use common::{create_temp_storage, passage, FixedRetriever, FixedSearch, ScriptedProvider};
use std::sync::Arc;

fn knowledge_base(store: &SqliteStorage) -> KnowledgeBase {
    let kb = KnowledgeBase::new(
        uuid::Uuid::new_v4().to_string(),
        "manuals",
        "/data/static/manuals",
        "/data/vector_stores/manuals",
        2400,
    );
    store.insert_knowledge_base(&kb).expect("insert kb");
    kb
}

fn resolver(
    provider: Arc<ScriptedProvider>,
    kb: KnowledgeBase,
    retriever: FixedRetriever,
    grading: GradingMode,
) -> TurnResolver {
    let config = AgentConfig {
        grading,
        ..AgentConfig::default()
    };
    TurnResolver::new(provider, Arc::new(retriever), kb, config)
}

#[tokio::test]
async fn test_document_answer_is_persisted_with_sources() {
    let (store, _tmp) = create_temp_storage();
    let kb = knowledge_base(&store);
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let provider = Arc::new(ScriptedProvider::new(&[
        "YES",
        "Tap New Group in Contacts (Source: guide.pdf, Page 3)",
    ]));
    let retriever = FixedRetriever(vec![
        passage("/docs/guide.pdf", 2, "Tap New Group in Contacts."),
        passage("/docs/guide.pdf", 0, "Contacts overview."),
        passage("/docs/faq.pdf", 4, "Groups hold up to 50 people."),
    ]);
    let resolver = resolver(provider.clone(), kb, retriever, GradingMode::Llm);
    let mut session = ChatSession::start(resolver, store.clone(), &HistoryConfig::default(), false);

    let outcome = session
        .handle_input("How do I create a group?")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.route, AnswerRoute::Documents);
    assert!(outcome.answer.contains("New Group"));
    assert_eq!(outcome.sources.len(), 2);
    assert_eq!(outcome.sources[0].file, "guide.pdf");
    assert_eq!(
        outcome.sources[0].locators,
        vec![Locator::Page(0), Locator::Page(2)]
    );
    assert_eq!(provider.call_count(), 2);

    let messages = store.load_messages(session.session_id()).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[0].content, "How do I create a group?");
    assert_eq!(messages[1].role, "assistant");

    let sessions = store.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].knowledge_base_name, "manuals");
}

#[tokio::test]
async fn test_irrelevant_passages_without_web_cannot_answer() {
    let (store, _tmp) = create_temp_storage();
    let kb = knowledge_base(&store);
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let provider = Arc::new(ScriptedProvider::new(&["NO"]));
    let retriever = FixedRetriever(vec![passage("/docs/guide.pdf", 0, "Unrelated.")]);
    let search = Arc::new(FixedSearch::new(Vec::new()));
    let resolver =
        resolver(provider.clone(), kb, retriever, GradingMode::Llm).with_web_search(search.clone());
    let mut session = ChatSession::start(resolver, store, &HistoryConfig::default(), false);

    let outcome = session
        .handle_input("What is the capital of France?")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.route, AnswerRoute::CannotAnswer);
    assert_eq!(outcome.answer, CANNOT_ANSWER);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(search.call_count(), 0);
}

#[tokio::test]
async fn test_web_fallback_lists_links() {
    let (store, _tmp) = create_temp_storage();
    let kb = knowledge_base(&store);
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let provider = Arc::new(ScriptedProvider::new(&["Paris is the capital of France."]));
    let search = Arc::new(FixedSearch::new(vec![
        SearchResult {
            title: "France".to_string(),
            url: Some("https://example.org/france".to_string()),
            snippet: "Paris is the capital.".to_string(),
        },
        SearchResult {
            title: "France again".to_string(),
            url: Some("https://example.org/france".to_string()),
            snippet: "Capital: Paris.".to_string(),
        },
    ]));
    let resolver = resolver(provider.clone(), kb, FixedRetriever(Vec::new()), GradingMode::Llm)
        .with_web_search(search.clone());
    let mut session = ChatSession::start(resolver, store, &HistoryConfig::default(), true);

    let outcome = session
        .handle_input("What is the capital of France?")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.route, AnswerRoute::WebSearch);
    assert_eq!(outcome.web_links, vec!["https://example.org/france".to_string()]);
    assert_eq!(search.call_count(), 1);
    // Empty retrieval skips grading: only the synthesis call is made
    assert_eq!(provider.call_count(), 1);
    let prompt = &provider.requests()[0][0].content;
    assert!(prompt.contains("WEB SEARCH RESULT"));
}

#[tokio::test]
async fn test_failed_turn_leaves_store_unchanged() {
    let (store, _tmp) = create_temp_storage();
    let kb = knowledge_base(&store);
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let provider = Arc::new(ScriptedProvider::new(&[]));
    let retriever = FixedRetriever(vec![passage("/docs/guide.pdf", 0, "Groups.")]);
    let resolver = resolver(provider, kb, retriever, GradingMode::Llm);
    let mut session = ChatSession::start(resolver, store.clone(), &HistoryConfig::default(), false);

    let result = session.handle_input("How do I create a group?").await;

    assert!(result.is_err());
    assert!(session.conversation().is_empty());
    assert!(store.list_sessions().unwrap().is_empty());
    assert!(store.load_messages(session.session_id()).unwrap().is_empty());
}

#[tokio::test]
async fn test_meta_questions_do_not_call_the_model() {
    let (store, _tmp) = create_temp_storage();
    let kb = knowledge_base(&store);
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let provider = Arc::new(ScriptedProvider::new(&[]));
    let resolver = resolver(
        provider.clone(),
        kb,
        FixedRetriever(Vec::new()),
        GradingMode::Llm,
    );
    let mut session = ChatSession::start(resolver, store.clone(), &HistoryConfig::default(), false);

    let kb_answer = session
        .handle_input("Which folder is this?")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kb_answer.route, AnswerRoute::KnowledgeBase);
    assert!(kb_answer.answer.contains("'manuals'"));
    assert!(kb_answer.answer.contains("Approximate tokens: 2400"));

    let history_answer = session
        .handle_input("What did I ask so far?")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(history_answer.route, AnswerRoute::History);
    assert!(history_answer.answer.contains("1. Which folder is this?"));

    assert_eq!(provider.call_count(), 0);
    assert_eq!(store.load_messages(session.session_id()).unwrap().len(), 4);
}

#[tokio::test]
async fn test_summary_survives_resume() {
    let (store, _tmp) = create_temp_storage();
    let kb = knowledge_base(&store);
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let history = HistoryConfig {
        summary_threshold_turns: 2,
        keep_recent_turns: 2,
    };

    let provider = Arc::new(ScriptedProvider::new(&[
        "Answer one",
        "Answer two",
        "Answer three",
        "User asked about groups, contacts, and sharing.",
        "Answer four",
    ]));
    let retriever = FixedRetriever(vec![passage("/docs/guide.pdf", 0, "Groups.")]);
    let first = resolver(provider.clone(), kb.clone(), retriever, GradingMode::Sentinel);
    let mut session = ChatSession::start(first, store.clone(), &history, false);

    for question in [
        "How do I create a group?",
        "How do I add a contact?",
        "How do I share a file?",
        "How do I leave a group?",
    ] {
        session.handle_input(question).await.unwrap();
    }
    assert_eq!(provider.call_count(), 5);
    assert_eq!(
        session.conversation().summary(),
        Some("User asked about groups, contacts, and sharing.")
    );

    let record = store.find_session(session.session_id()).unwrap().unwrap();
    assert_eq!(
        record.summary.as_deref(),
        Some("User asked about groups, contacts, and sharing.")
    );

    let provider = Arc::new(ScriptedProvider::new(&[]));
    let second = resolver(
        provider,
        kb,
        FixedRetriever(Vec::new()),
        GradingMode::Sentinel,
    );
    let resumed = ChatSession::resume(record, second, store, &history, false).unwrap();
    assert_eq!(resumed.conversation().len(), 4);
    assert_eq!(
        resumed.conversation().summary(),
        Some("User asked about groups, contacts, and sharing.")
    );
}
