//! Conversational retrieval pipeline
//!
//! `TurnResolver` decides how each question is answered, `Conversation`
//! bounds the history sent to the model, and `ChatSession` ties both to
//! the document store.

pub mod conversation;
pub mod resolver;
pub mod session;

pub use conversation::{Conversation, HistoryContext, Turn};
pub use resolver::{
    classify_query, AnswerRoute, MetaKind, QueryKind, SourceRef, TurnOutcome, TurnResolver,
    CANNOT_ANSWER,
};
pub use session::ChatSession;
