//! In-process `DocumentStore` used by tests and dry runs

use super::{ambiguous_reference, validate_reference, DocumentStore, KnowledgeBase, SessionRecord};
use crate::error::{BuzzbotError, Result};
use crate::providers::Message;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    knowledge_bases: Vec<KnowledgeBase>,
    sessions: HashMap<String, SessionRecord>,
    messages: HashMap<String, Vec<Message>>,
    writes: usize,
}

/// Document store held entirely in memory
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful write operations so far
    pub fn write_count(&self) -> usize {
        self.lock().map(|s| s.writes).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| BuzzbotError::Storage("Memory store lock poisoned".to_string()).into())
    }
}

/// Exact id match first, then a prefix that must be unique
fn find_by_id<'a, T: Clone + 'a>(
    items: impl Iterator<Item = &'a T> + Clone,
    id_of: impl Fn(&T) -> &str,
    reference: &str,
) -> Result<Option<T>> {
    let reference = validate_reference(reference)?;
    if let Some(exact) = items.clone().find(|item| id_of(*item) == reference) {
        return Ok(Some(exact.clone()));
    }

    let mut prefixed = items.filter(|item| id_of(*item).starts_with(reference));
    let first = prefixed.next().cloned();
    if prefixed.next().is_some() {
        return Err(ambiguous_reference(reference));
    }
    Ok(first)
}

impl DocumentStore for MemoryStorage {
    fn insert_knowledge_base(&self, kb: &KnowledgeBase) -> Result<()> {
        let mut state = self.lock()?;
        if state
            .knowledge_bases
            .iter()
            .any(|existing| existing.name == kb.name || existing.id == kb.id)
        {
            return Err(
                BuzzbotError::Storage(format!("Knowledge base '{}' already exists", kb.name))
                    .into(),
            );
        }
        state.knowledge_bases.push(kb.clone());
        state.writes += 1;
        Ok(())
    }

    fn find_knowledge_base(&self, id: &str) -> Result<Option<KnowledgeBase>> {
        let state = self.lock()?;
        let found = find_by_id(state.knowledge_bases.iter(), |kb| kb.id.as_str(), id)?;
        Ok(found)
    }

    fn find_knowledge_base_by_name(&self, name: &str) -> Result<Option<KnowledgeBase>> {
        Ok(self
            .lock()?
            .knowledge_bases
            .iter()
            .find(|kb| kb.name == name)
            .cloned())
    }

    fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>> {
        Ok(self.lock()?.knowledge_bases.clone())
    }

    fn upsert_session(&self, session: &SessionRecord) -> Result<()> {
        let mut state = self.lock()?;
        state
            .sessions
            .insert(session.session_id.clone(), session.clone());
        state.writes += 1;
        Ok(())
    }

    fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let state = self.lock()?;
        let found = find_by_id(state.sessions.values(), |s| s.session_id.as_str(), session_id)?;
        Ok(found)
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let mut sessions: Vec<_> = self.lock()?.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(sessions)
    }

    fn load_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .lock()?
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn record_turn(
        &self,
        session: &SessionRecord,
        user: &Message,
        assistant: &Message,
    ) -> Result<()> {
        let mut state = self.lock()?;
        let log = state
            .messages
            .entry(session.session_id.clone())
            .or_default();
        log.push(user.clone());
        log.push(assistant.clone());
        state
            .sessions
            .insert(session.session_id.clone(), session.clone());
        state.writes += 1;
        Ok(())
    }
}
