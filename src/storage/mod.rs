//! Document store for knowledge-base records, session metadata, and the
//! per-session chat message log.
//!
//! `DocumentStore` is the port the rest of the crate talks to.
//! `SqliteStorage` is the persistent implementation; `MemoryStorage` backs
//! tests.

use crate::config::StorageConfig;
use crate::error::{BuzzbotError, Result};
use crate::providers::Message;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub mod memory;
pub mod types;

pub use memory::MemoryStorage;
pub use types::{short_id, KnowledgeBase, SessionRecord};

/// Persistence port used by ingestion and chat
pub trait DocumentStore: Send + Sync {
    /// Insert a new knowledge base; names are unique
    fn insert_knowledge_base(&self, kb: &KnowledgeBase) -> Result<()>;

    /// Find a knowledge base by full id or 8-character prefix
    fn find_knowledge_base(&self, id: &str) -> Result<Option<KnowledgeBase>>;

    /// Find a knowledge base by display name
    fn find_knowledge_base_by_name(&self, name: &str) -> Result<Option<KnowledgeBase>>;

    /// All knowledge bases, oldest first
    fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>>;

    /// Create or update session metadata
    fn upsert_session(&self, session: &SessionRecord) -> Result<()>;

    /// Find a session by full id or 8-character prefix
    fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// All sessions, most recently active first
    fn list_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// The message log of a session in insertion order
    fn load_messages(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Append one turn and update the session metadata atomically
    fn record_turn(&self, session: &SessionRecord, user: &Message, assistant: &Message)
        -> Result<()>;
}

/// Table names derived from the configured collections
#[derive(Debug, Clone)]
struct Tables {
    knowledge_bases: String,
    sessions: String,
    messages: String,
}

impl From<&StorageConfig> for Tables {
    fn from(config: &StorageConfig) -> Self {
        Self {
            knowledge_bases: config.knowledge_base_collection.clone(),
            sessions: config.session_collection.clone(),
            messages: config.chat_collection.clone(),
        }
    }
}

/// SQLite-backed document store
///
/// The connection is opened once and shared behind a mutex.
pub struct SqliteStorage {
    db_path: PathBuf,
    conn: Mutex<Connection>,
    tables: Tables,
}

impl SqliteStorage {
    /// Open the store described by `config`
    ///
    /// Creates the database file and schema if needed and checks the
    /// connection. Failure here is fatal for the binary.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        Self::open_at(
            config.database_file(),
            Tables::from(config),
            Duration::from_millis(config.connect_timeout_ms),
        )
    }

    /// Open a store at an explicit database path with default table names
    ///
    /// # Examples
    ///
    /// ```
    /// use buzzbot::storage::{DocumentStore, SqliteStorage};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::new_with_path(dir.path().join("buzz.db")).unwrap();
    /// assert!(storage.list_sessions().unwrap().is_empty());
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let defaults = StorageConfig::default();
        Self::open_at(
            db_path.into(),
            Tables::from(&defaults),
            Duration::from_millis(defaults.connect_timeout_ms),
        )
    }

    fn open_at(db_path: PathBuf, tables: Tables, timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create parent directory for database")
                    .map_err(|e| BuzzbotError::Storage(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))
            .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)))?;
        conn.busy_timeout(timeout)
            .map_err(|e| BuzzbotError::Storage(e.to_string()))?;

        let storage = Self {
            db_path,
            conn: Mutex::new(conn),
            tables,
        };
        storage.init()?;
        storage.ping()?;

        tracing::info!(path = %storage.db_path.display(), "Opened document store");
        Ok(storage)
    }

    /// Path of the underlying database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BuzzbotError::Storage("Database connection lock poisoned".to_string()).into())
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let Tables {
            knowledge_bases,
            sessions,
            messages,
        } = &self.tables;
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{knowledge_bases}" (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                source_path TEXT NOT NULL,
                index_path TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS "{sessions}" (
                session_id TEXT PRIMARY KEY,
                knowledge_base_id TEXT NOT NULL,
                knowledge_base_name TEXT NOT NULL,
                last_active TEXT NOT NULL,
                summary TEXT
            );
            CREATE TABLE IF NOT EXISTS "{messages}" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS "{messages}_by_session" ON "{messages}" (session_id, id);
            "#
        ))
        .context("Failed to create tables")
        .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)))?;
        Ok(())
    }

    /// Connectivity check run at startup
    fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        let one: i64 = conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .map_err(|e| BuzzbotError::Storage(format!("Database unreachable: {}", e)))?;
        debug_assert_eq!(one, 1);
        Ok(())
    }

    /// Look up one row by exact id, falling back to a unique id prefix
    fn find_by_id<T>(
        &self,
        table: &str,
        columns: &str,
        id_column: &str,
        reference: &str,
        from_row: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        let reference = validate_reference(reference)?;
        let conn = self.lock()?;

        let exact = conn
            .query_row(
                &format!(
                    r#"SELECT {columns} FROM "{table}" WHERE {id_column} = ?1"#
                ),
                params![reference],
                from_row,
            )
            .optional()
            .context("Failed to query by id")
            .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)))?;
        if exact.is_some() {
            return Ok(exact);
        }

        let mut stmt = conn
            .prepare(&format!(
                r#"SELECT {columns} FROM "{table}"
                WHERE {id_column} LIKE ?1 ESCAPE '\' LIMIT 2"#
            ))
            .context("Failed to prepare prefix query")
            .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)))?;
        let mut matches = stmt
            .query_map(params![format!("{}%", escape_like(reference))], from_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<T>>>())
            .context("Failed to query by id prefix")
            .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)))?;

        if matches.len() > 1 {
            return Err(ambiguous_reference(reference));
        }
        Ok(matches.pop())
    }
}

/// Trim an id reference and reject empty input
pub(crate) fn validate_reference(reference: &str) -> Result<&str> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(BuzzbotError::Storage("Invalid ID: the reference is empty".to_string()).into());
    }
    Ok(reference)
}

pub(crate) fn ambiguous_reference(reference: &str) -> anyhow::Error {
    BuzzbotError::Storage(format!(
        "Ambiguous ID '{}': it matches more than one record",
        reference
    ))
    .into()
}

/// Escape `LIKE` wildcards so user input only matches literally
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

const KNOWLEDGE_BASE_COLUMNS: &str = "id, name, source_path, index_path, token_count, created_at";

const SESSION_COLUMNS: &str =
    "session_id, knowledge_base_id, knowledge_base_name, last_active, summary";

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            tracing::warn!("Unparseable timestamp in store: {}", raw);
            Utc::now()
        })
}

fn knowledge_base_from_row(row: &Row<'_>) -> rusqlite::Result<KnowledgeBase> {
    let source_path: String = row.get(2)?;
    let index_path: String = row.get(3)?;
    let token_count: i64 = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(KnowledgeBase {
        id: row.get(0)?,
        name: row.get(1)?,
        source_path: PathBuf::from(source_path),
        index_path: PathBuf::from(index_path),
        token_count: token_count.max(0) as u64,
        created_at: parse_timestamp(&created_at),
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let last_active: String = row.get(3)?;
    Ok(SessionRecord {
        session_id: row.get(0)?,
        knowledge_base_id: row.get(1)?,
        knowledge_base_name: row.get(2)?,
        last_active: parse_timestamp(&last_active),
        summary: row.get(4)?,
    })
}

fn upsert_session_sql(table: &str) -> String {
    format!(
        r#"INSERT INTO "{table}" (session_id, knowledge_base_id, knowledge_base_name, last_active, summary)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(session_id) DO UPDATE SET
            knowledge_base_id = excluded.knowledge_base_id,
            knowledge_base_name = excluded.knowledge_base_name,
            last_active = excluded.last_active,
            summary = excluded.summary"#
    )
}

impl DocumentStore for SqliteStorage {
    fn insert_knowledge_base(&self, kb: &KnowledgeBase) -> Result<()> {
        let conn = self.lock()?;
        let result = conn.execute(
            &format!(
                r#"INSERT INTO "{}" (id, name, source_path, index_path, token_count, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                self.tables.knowledge_bases
            ),
            params![
                kb.id,
                kb.name,
                kb.source_path.display().to_string(),
                kb.index_path.display().to_string(),
                kb.token_count as i64,
                timestamp(&kb.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(BuzzbotError::Storage(format!(
                    "Knowledge base '{}' already exists",
                    kb.name
                ))
                .into())
            }
            Err(e) => Err(BuzzbotError::Storage(format!("Failed to insert knowledge base: {}", e)).into()),
        }
    }

    fn find_knowledge_base(&self, id: &str) -> Result<Option<KnowledgeBase>> {
        self.find_by_id(
            &self.tables.knowledge_bases,
            KNOWLEDGE_BASE_COLUMNS,
            "id",
            id,
            knowledge_base_from_row,
        )
    }

    fn find_knowledge_base_by_name(&self, name: &str) -> Result<Option<KnowledgeBase>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                r#"SELECT id, name, source_path, index_path, token_count, created_at
                FROM "{}" WHERE name = ?1"#,
                self.tables.knowledge_bases
            ),
            params![name],
            knowledge_base_from_row,
        )
        .optional()
        .context("Failed to query knowledge base by name")
        .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)).into())
    }

    fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBase>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                r#"SELECT id, name, source_path, index_path, token_count, created_at
                FROM "{}" ORDER BY created_at ASC"#,
                self.tables.knowledge_bases
            ))
            .map_err(|e| BuzzbotError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], knowledge_base_from_row)
            .map_err(|e| BuzzbotError::Storage(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| BuzzbotError::Storage(format!("Failed to list knowledge bases: {}", e)).into())
    }

    fn upsert_session(&self, session: &SessionRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &upsert_session_sql(&self.tables.sessions),
            params![
                session.session_id,
                session.knowledge_base_id,
                session.knowledge_base_name,
                timestamp(&session.last_active),
                session.summary,
            ],
        )
        .map_err(|e| BuzzbotError::Storage(format!("Failed to save session: {}", e)))?;
        Ok(())
    }

    fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.find_by_id(
            &self.tables.sessions,
            SESSION_COLUMNS,
            "session_id",
            session_id,
            session_from_row,
        )
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                r#"SELECT session_id, knowledge_base_id, knowledge_base_name, last_active, summary
                FROM "{}" ORDER BY last_active DESC"#,
                self.tables.sessions
            ))
            .map_err(|e| BuzzbotError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map([], session_from_row)
            .map_err(|e| BuzzbotError::Storage(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| BuzzbotError::Storage(format!("Failed to list sessions: {}", e)).into())
    }

    fn load_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                r#"SELECT role, content FROM "{}" WHERE session_id = ?1 ORDER BY id ASC"#,
                self.tables.messages
            ))
            .map_err(|e| BuzzbotError::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(Message {
                    role: row.get(0)?,
                    content: row.get(1)?,
                })
            })
            .map_err(|e| BuzzbotError::Storage(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| BuzzbotError::Storage(format!("Failed to load messages: {}", e)).into())
    }

    fn record_turn(
        &self,
        session: &SessionRecord,
        user: &Message,
        assistant: &Message,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)))?;

        let now = timestamp(&Utc::now());
        let insert = format!(
            r#"INSERT INTO "{}" (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)"#,
            self.tables.messages
        );
        for message in [user, assistant] {
            tx.execute(
                &insert,
                params![session.session_id, message.role, message.content, now],
            )
            .context("Failed to append message")
            .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)))?;
        }

        tx.execute(
            &upsert_session_sql(&self.tables.sessions),
            params![
                session.session_id,
                session.knowledge_base_id,
                session.knowledge_base_name,
                timestamp(&session.last_active),
                session.summary,
            ],
        )
        .context("Failed to update session metadata")
        .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| BuzzbotError::Storage(format!("{:#}", e)))?;

        Ok(())
    }
}
